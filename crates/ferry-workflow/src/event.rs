use std::any::Any;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::payload::Payload;

/// One run-lifecycle event.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// An executor invocation finished. `value` is its completion value, if any.
    ExecutorCompleted {
        executor_id: String,
        value: Option<Payload>,
    },
    /// A result surfaced to the caller: either a streaming partial
    /// (`terminal == false`, from `yield_output`) or the completion value of an
    /// output-designated executor (`terminal == true`).
    WorkflowOutput {
        executor_id: String,
        value: Payload,
        terminal: bool,
    },
    /// An executor invocation failed.
    WorkflowError { executor_id: String, error: String },
}

impl WorkflowEvent {
    /// Executor the event originated from.
    pub fn executor_id(&self) -> &str {
        match self {
            Self::ExecutorCompleted { executor_id, .. }
            | Self::WorkflowOutput { executor_id, .. }
            | Self::WorkflowError { executor_id, .. } => executor_id,
        }
    }

    /// The payload of a `WorkflowOutput` event, if it is a `T`.
    pub fn output<T: Any>(&self) -> Option<&T> {
        match self {
            Self::WorkflowOutput { value, .. } => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// The completion value of an `ExecutorCompleted` event, if it is a `T`.
    pub fn completed_value<T: Any>(&self) -> Option<&T> {
        match self {
            Self::ExecutorCompleted { value: Some(v), .. } => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_terminal_output(&self) -> bool {
        matches!(self, Self::WorkflowOutput { terminal: true, .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::WorkflowError { .. })
    }
}

/// The ordered, finite event sequence of one run.
///
/// Closes when the run drains. Once the run's cancellation is requested the
/// stream ends immediately, dropping anything still buffered.
pub struct EventStream {
    rx: mpsc::Receiver<WorkflowEvent>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    done: bool,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<WorkflowEvent>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancelled: Box::pin(cancel.cancelled_owned()),
            done: false,
        }
    }
}

impl Stream for EventStream {
    type Item = WorkflowEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        if this.cancelled.poll_unpin(cx).is_ready() {
            this.done = true;
            this.rx.close();
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn completed(id: &str, v: &str) -> WorkflowEvent {
        WorkflowEvent::ExecutorCompleted {
            executor_id: id.into(),
            value: Some(Payload::new(v.to_string())),
        }
    }

    #[test]
    fn test_event_accessors() {
        let ev = completed("a", "hi!");
        assert_eq!(ev.executor_id(), "a");
        assert_eq!(ev.completed_value::<String>().unwrap(), "hi!");
        assert!(ev.output::<String>().is_none());

        let out = WorkflowEvent::WorkflowOutput {
            executor_id: "c".into(),
            value: Payload::new(3u32),
            terminal: true,
        };
        assert!(out.is_terminal_output());
        assert_eq!(out.output::<u32>(), Some(&3));

        let err = WorkflowEvent::WorkflowError {
            executor_id: "b".into(),
            error: "boom".into(),
        };
        assert!(err.is_error());
        assert_eq!(err.executor_id(), "b");
    }

    #[tokio::test]
    async fn test_stream_closes_with_sender() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = EventStream::new(rx, CancellationToken::new());

        tx.send(completed("a", "1")).await.unwrap();
        tx.send(completed("b", "2")).await.unwrap();
        drop(tx);

        let events: Vec<_> = (&mut stream).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].executor_id(), "a");
        assert_eq!(events[1].executor_id(), "b");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_ends_on_cancel_despite_buffered_events() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let mut stream = EventStream::new(rx, cancel.clone());

        tx.send(completed("a", "1")).await.unwrap();
        assert!(stream.next().await.is_some());

        tx.send(completed("b", "2")).await.unwrap();
        cancel.cancel();
        assert!(stream.next().await.is_none());
        // Sender stays open but the stream is finished.
        assert!(tx.send(completed("c", "3")).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_consumer() {
        let (_tx, rx) = mpsc::channel::<WorkflowEvent>(4);
        let cancel = CancellationToken::new();
        let mut stream = EventStream::new(rx, cancel.clone());

        let waiter = tokio::spawn(async move { stream.next().await.is_none() });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();

        let closed = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("consumer not woken")
            .unwrap();
        assert!(closed);
    }
}
