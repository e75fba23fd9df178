use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use ferry_core::error::{FerryError, Result};

use crate::event::WorkflowEvent;
use crate::payload::Payload;

/// Untyped per-invocation plumbing shared by every `ExecutionContext`.
///
/// Holds only a weak handle on the event channel: the run's stream closes
/// when the scheduler finishes, however long a context clone lives on.
#[derive(Clone)]
pub(crate) struct ContextCore {
    executor_id: Arc<str>,
    events: mpsc::WeakSender<WorkflowEvent>,
    forwarded: mpsc::UnboundedSender<Payload>,
    cancel: CancellationToken,
    /// Raised by the scheduler once the invocation has returned.
    finished: CancellationToken,
}

impl ContextCore {
    pub(crate) fn new(
        executor_id: Arc<str>,
        events: &mpsc::Sender<WorkflowEvent>,
        forwarded: mpsc::UnboundedSender<Payload>,
        cancel: CancellationToken,
        finished: CancellationToken,
    ) -> Self {
        Self {
            executor_id,
            events: events.downgrade(),
            forwarded,
            cancel,
            finished,
        }
    }

    fn invocation_over(&self) -> FerryError {
        FerryError::executor(
            &*self.executor_id,
            "output yielded after the invocation completed",
        )
    }
}

/// Handle given to an executor for one invocation.
///
/// `O` is the executor's output type: values passed to [`send`](Self::send)
/// are routed along the same edges as the completion value.
pub struct ExecutionContext<O> {
    core: ContextCore,
    _output: PhantomData<fn(O)>,
}

impl<O> Clone for ExecutionContext<O> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _output: PhantomData,
        }
    }
}

impl<O: Send + Sync + 'static> ExecutionContext<O> {
    pub(crate) fn new(core: ContextCore) -> Self {
        Self {
            core,
            _output: PhantomData,
        }
    }

    /// Id of the executor this invocation belongs to.
    pub fn executor_id(&self) -> &str {
        &self.core.executor_id
    }

    /// Emit a streaming `WorkflowOutput` event right away.
    ///
    /// The value may be of any type; consumers tell partial chunks from final
    /// artifacts by payload type and by the event's `terminal` flag, which is
    /// always `false` here. Fails with [`FerryError::Cancelled`] once the run
    /// has been cancelled, so executors can bail out with `?`. A clone kept
    /// past the end of its invocation can no longer yield.
    pub async fn yield_output<T: Any + Send + Sync>(&self, value: T) -> Result<()> {
        if self.core.cancel.is_cancelled() {
            return Err(FerryError::Cancelled);
        }
        if self.core.finished.is_cancelled() {
            return Err(self.core.invocation_over());
        }
        let Some(events) = self.core.events.upgrade() else {
            return Err(self.core.invocation_over());
        };
        trace!(executor_id = %self.core.executor_id, "Yielding streaming output");
        let event = WorkflowEvent::WorkflowOutput {
            executor_id: self.core.executor_id.to_string(),
            value: Payload::new(value),
            terminal: false,
        };
        tokio::select! {
            biased;
            _ = self.core.cancel.cancelled() => Err(FerryError::Cancelled),
            _ = self.core.finished.cancelled() => Err(self.core.invocation_over()),
            sent = events.send(event) => sent.map_err(|_| FerryError::Cancelled),
        }
    }

    /// Push a message along this executor's outgoing edges without completing.
    ///
    /// Sent messages are routed in call order once the invocation finishes,
    /// ahead of the completion value.
    pub fn send(&self, value: O) {
        // The receiver only disappears once the invocation is over or the run
        // is shutting down; late messages are dropped either way.
        let _ = self.core.forwarded.send(Payload::new(value));
    }

    /// Token raised when the run is cancelled or aborted.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.core.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        ctx: ExecutionContext<String>,
        events_tx: mpsc::Sender<WorkflowEvent>,
        events: mpsc::Receiver<WorkflowEvent>,
        fwd: mpsc::UnboundedReceiver<Payload>,
        cancel: CancellationToken,
        finished: CancellationToken,
    }

    fn context() -> Harness {
        let (events_tx, events) = mpsc::channel(8);
        let (fwd_tx, fwd) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let core = ContextCore::new(
            Arc::from("summarize"),
            &events_tx,
            fwd_tx,
            cancel.clone(),
            finished.clone(),
        );
        Harness {
            ctx: ExecutionContext::new(core),
            events_tx,
            events,
            fwd,
            cancel,
            finished,
        }
    }

    #[tokio::test]
    async fn test_yield_emits_partial_output() {
        let Harness {
            ctx,
            mut events,
            events_tx: _events_tx,
            ..
        } = context();
        ctx.yield_output("chunk".to_string()).await.unwrap();

        match events.recv().await {
            Some(WorkflowEvent::WorkflowOutput {
                executor_id,
                value,
                terminal,
            }) => {
                assert_eq!(executor_id, "summarize");
                assert!(!terminal);
                assert_eq!(value.downcast_ref::<String>().unwrap(), "chunk");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_yield_after_cancel_fails() {
        let Harness {
            ctx,
            mut events,
            cancel,
            ..
        } = context();
        cancel.cancel();

        let err = ctx.yield_output(1u32).await.unwrap_err();
        assert!(matches!(err, FerryError::Cancelled));
        assert!(ctx.is_cancelled());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_queues_in_order() {
        let Harness { ctx, mut fwd, .. } = context();
        ctx.send("one".into());
        ctx.send("two".into());

        let first = fwd.try_recv().unwrap();
        let second = fwd.try_recv().unwrap();
        assert_eq!(first.downcast_ref::<String>().unwrap(), "one");
        assert_eq!(second.downcast_ref::<String>().unwrap(), "two");
    }

    #[tokio::test]
    async fn test_yield_fails_when_consumer_gone() {
        let Harness { ctx, events, .. } = context();
        drop(events);
        assert!(ctx.yield_output(()).await.is_err());
        assert_eq!(ctx.executor_id(), "summarize");
    }

    #[tokio::test]
    async fn test_yield_after_invocation_finished_fails() {
        let Harness {
            ctx,
            mut events,
            finished,
            ..
        } = context();
        let late = ctx.clone();
        finished.cancel();

        let err = late.yield_output("late".to_string()).await.unwrap_err();
        assert!(matches!(err, FerryError::Executor { .. }));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finish_releases_yield_blocked_on_full_channel() {
        let Harness {
            ctx,
            events_tx,
            events: _events,
            finished,
            ..
        } = context();
        for _ in 0..8 {
            events_tx
                .send(WorkflowEvent::WorkflowError {
                    executor_id: "filler".into(),
                    error: String::new(),
                })
                .await
                .unwrap();
        }

        let blocked = tokio::spawn(async move { ctx.yield_output(1u8).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        finished.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), blocked)
            .await
            .expect("yield stayed blocked after the invocation finished")
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_context_does_not_keep_channel_open() {
        let Harness {
            ctx,
            events_tx,
            mut events,
            ..
        } = context();
        drop(events_tx);

        assert!(events.recv().await.is_none());
        assert!(ctx.yield_output(()).await.is_err());
    }
}
