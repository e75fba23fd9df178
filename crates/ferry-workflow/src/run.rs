use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};

use ferry_core::config::{FailurePolicy, WorkflowConfig};
use ferry_core::error::{FerryError, Result};
use ferry_core::types::RunId;

use crate::builder::WorkflowGraph;
use crate::context::ContextCore;
use crate::event::{EventStream, WorkflowEvent};
use crate::payload::Payload;

/// Per-run scheduling settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub failure_policy: FailurePolicy,
    /// Capacity of the event channel between the run and its consumer.
    pub event_buffer: usize,
    /// Maximum concurrent invocations (0 = unbounded).
    pub max_concurrency: usize,
    /// Time in-flight invocations get to exit after cancellation.
    pub cancel_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&WorkflowConfig::default())
    }
}

impl From<&WorkflowConfig> for RunOptions {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            failure_policy: config.failure_policy,
            event_buffer: config.event_buffer,
            max_concurrency: config.max_concurrency,
            cancel_grace: Duration::from_millis(config.cancel_grace_ms),
        }
    }
}

impl RunOptions {
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}

/// Outcome of one executor invocation.
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub executor_id: String,
    pub succeeded: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// What happened during a run, in completion order.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub workflow: String,
    pub invocations: Vec<InvocationRecord>,
    /// The run stopped before draining (cancellation or abort).
    pub cancelled: bool,
    /// The run was stopped by `FailurePolicy::AbortRun`.
    pub aborted: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Drained without cancellation and without any failed invocation.
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.invocations.iter().all(|r| r.succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &InvocationRecord> {
        self.invocations.iter().filter(|r| !r.succeeded)
    }
}

/// Handle on one in-progress run: its event stream plus cancellation.
///
/// Consume it as a `Stream` of [`WorkflowEvent`]s; the stream closes when the
/// run is complete. Dropping the handle cancels the run.
pub struct WorkflowRun {
    run_id: RunId,
    events: EventStream,
    cancel: CancellationToken,
    guard: Option<DropGuard>,
    task: JoinHandle<RunSummary>,
}

impl WorkflowRun {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Request cancellation. No new work is dispatched, in-flight executors
    /// observe their token, and the event stream closes.
    pub fn cancel(&self) {
        info!(run_id = %self.run_id, "Workflow run cancellation requested");
        self.cancel.cancel();
    }

    /// A token that cancels this run when raised, for handing to other tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn next_event(&mut self) -> Option<WorkflowEvent> {
        self.events.next().await
    }

    /// Discard any remaining events and wait for the run to wind down.
    pub async fn finish(self) -> Result<RunSummary> {
        let WorkflowRun {
            mut events,
            guard,
            task,
            ..
        } = self;
        while events.next().await.is_some() {}
        let summary = task
            .await
            .map_err(|e| FerryError::Internal(format!("scheduler task failed: {}", e)));
        if let Some(guard) = guard {
            guard.disarm();
        }
        summary
    }
}

impl Stream for WorkflowRun {
    type Item = WorkflowEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_next_unpin(cx)
    }
}

/// Spawn the scheduler for one run.
pub(crate) fn start(graph: Arc<WorkflowGraph>, input: Payload, options: RunOptions) -> WorkflowRun {
    let run_id = RunId::new();
    let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
    let cancel = CancellationToken::new();

    let span = info_span!("workflow_run", run_id = %run_id, workflow = %graph.name);
    let scheduler = Scheduler::new(graph, options, run_id.clone(), tx, cancel.child_token());
    let task = tokio::spawn(scheduler.drive(input).instrument(span));

    WorkflowRun {
        run_id,
        events: EventStream::new(rx, cancel.clone()),
        guard: Some(cancel.clone().drop_guard()),
        cancel,
        task,
    }
}

struct Delivery {
    target: usize,
    message: Payload,
}

struct Invocation {
    executor: usize,
    started_at: DateTime<Utc>,
    elapsed_ms: u64,
    result: Result<Option<Payload>>,
    forwarded: Vec<Payload>,
}

/// Event-driven dataflow over a mailbox queue.
///
/// Deliveries are dispatched oldest first. A delivery whose target is still
/// running stays queued, so each executor sees its messages one at a time in
/// enqueue order while different executors run concurrently.
struct Scheduler {
    graph: Arc<WorkflowGraph>,
    options: RunOptions,
    run_id: RunId,
    events: mpsc::Sender<WorkflowEvent>,
    /// Child of the consumer's token; also raised by `FailurePolicy::AbortRun`.
    cancel: CancellationToken,
    pending: VecDeque<Delivery>,
    busy: Vec<bool>,
    in_flight: JoinSet<Invocation>,
    records: Vec<InvocationRecord>,
    aborted: bool,
}

impl Scheduler {
    fn new(
        graph: Arc<WorkflowGraph>,
        options: RunOptions,
        run_id: RunId,
        events: mpsc::Sender<WorkflowEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let busy = vec![false; graph.executors.len()];
        Self {
            graph,
            options,
            run_id,
            events,
            cancel,
            pending: VecDeque::new(),
            busy,
            in_flight: JoinSet::new(),
            records: Vec::new(),
            aborted: false,
        }
    }

    async fn drive(mut self, input: Payload) -> RunSummary {
        let started = Instant::now();
        info!(start = %self.graph.ids[self.graph.start], "Workflow run started");

        self.pending.push_back(Delivery {
            target: self.graph.start,
            message: input,
        });

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.dispatch();
            if self.in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                joined = self.in_flight.join_next() => joined,
            };

            match joined {
                Some(Ok(invocation)) => self.complete(invocation).await,
                Some(Err(e)) => error!(error = %e, "Executor task failed to join"),
                None => {}
            }
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            self.wind_down().await;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if cancelled {
            info!(
                invocations = self.records.len(),
                aborted = self.aborted,
                elapsed_ms,
                "Workflow run cancelled"
            );
        } else {
            info!(invocations = self.records.len(), elapsed_ms, "Workflow run completed");
        }

        RunSummary {
            run_id: self.run_id,
            workflow: self.graph.name.clone(),
            invocations: self.records,
            cancelled,
            aborted: self.aborted,
            elapsed_ms,
        }
    }

    /// Start every queued delivery whose target is idle.
    fn dispatch(&mut self) {
        let mut i = 0;
        while i < self.pending.len() {
            let limit = self.options.max_concurrency;
            if limit > 0 && self.in_flight.len() >= limit {
                break;
            }
            if self.busy[self.pending[i].target] {
                i += 1;
                continue;
            }
            if let Some(delivery) = self.pending.remove(i) {
                self.spawn(delivery);
            }
        }
    }

    fn spawn(&mut self, delivery: Delivery) {
        let Delivery { target, message } = delivery;
        let executor = Arc::clone(&self.graph.executors[target]);
        let executor_id = Arc::clone(&self.graph.ids[target]);
        self.busy[target] = true;

        debug!(
            executor_id = %executor_id,
            message_type = message.type_name(),
            "Dispatching executor"
        );

        let (fwd_tx, mut fwd_rx) = mpsc::unbounded_channel();
        let finished = CancellationToken::new();
        let core = ContextCore::new(
            Arc::clone(&executor_id),
            &self.events,
            fwd_tx,
            self.cancel.clone(),
            finished.clone(),
        );
        let span = info_span!("executor", executor_id = %executor_id);

        self.in_flight.spawn(
            async move {
                // Also raised if the task is aborted during wind-down.
                let finished = finished.drop_guard();
                let started_at = Utc::now();
                let started = Instant::now();
                let result = match AssertUnwindSafe(executor.invoke(message, core))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => Err(FerryError::executor(
                        &*executor_id,
                        panic_message(panic.as_ref()),
                    )),
                };
                drop(finished);

                let mut forwarded = Vec::new();
                while let Ok(message) = fwd_rx.try_recv() {
                    forwarded.push(message);
                }

                Invocation {
                    executor: target,
                    started_at,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    result,
                    forwarded,
                }
            }
            .instrument(span),
        );
    }

    async fn complete(&mut self, invocation: Invocation) {
        let Invocation {
            executor,
            started_at,
            elapsed_ms,
            result,
            forwarded,
        } = invocation;
        self.busy[executor] = false;
        let executor_id = self.graph.ids[executor].to_string();

        match result {
            Ok(value) => {
                self.record(&executor_id, started_at, elapsed_ms, None);
                debug!(
                    executor_id = %executor_id,
                    elapsed_ms,
                    has_value = value.is_some(),
                    forwarded = forwarded.len(),
                    "Executor completed"
                );

                self.emit(WorkflowEvent::ExecutorCompleted {
                    executor_id: executor_id.clone(),
                    value: value.clone(),
                })
                .await;

                if self.graph.is_output[executor] {
                    if let Some(v) = &value {
                        self.emit(WorkflowEvent::WorkflowOutput {
                            executor_id: executor_id.clone(),
                            value: v.clone(),
                            terminal: true,
                        })
                        .await;
                    }
                }

                for message in forwarded.into_iter().chain(value) {
                    self.route(executor, message);
                }
            }
            Err(e) => {
                let error = e.to_string();
                warn!(executor_id = %executor_id, error = %error, "Executor failed");
                self.record(&executor_id, started_at, elapsed_ms, Some(error.clone()));

                self.emit(WorkflowEvent::WorkflowError {
                    executor_id: executor_id.clone(),
                    error,
                })
                .await;

                if self.options.failure_policy == FailurePolicy::AbortRun {
                    warn!(executor_id = %executor_id, "Aborting workflow run after executor failure");
                    self.aborted = true;
                    self.cancel.cancel();
                }
            }
        }
    }

    /// Enqueue `message` on every outgoing edge of `source` that fires, in
    /// edge order.
    fn route(&mut self, source: usize, message: Payload) {
        let graph = Arc::clone(&self.graph);
        let mut fired = 0;
        for &edge_idx in &graph.outgoing[source] {
            if graph.edges[edge_idx].fires(&message) {
                self.pending.push_back(Delivery {
                    target: graph.edge_targets[edge_idx],
                    message: message.clone(),
                });
                fired += 1;
            }
        }
        if fired == 0 {
            debug!(executor_id = %graph.ids[source], "No outgoing edge fired, branch ends");
        }
    }

    /// Deliver an event unless the run is cancelled. A vanished consumer
    /// cancels the run.
    async fn emit(&self, event: WorkflowEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("Event consumer dropped, cancelling workflow run");
                    self.cancel.cancel();
                }
            }
        }
    }

    fn record(
        &mut self,
        executor_id: &str,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        error: Option<String>,
    ) {
        self.records.push(InvocationRecord {
            executor_id: executor_id.to_string(),
            succeeded: error.is_none(),
            error,
            started_at,
            elapsed_ms,
        });
    }

    /// Give in-flight invocations the grace period to observe cancellation,
    /// then abort whatever is left. Their results produce no events.
    async fn wind_down(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        debug!(in_flight = self.in_flight.len(), "Waiting for in-flight executors to stop");

        let grace = self.options.cancel_grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = self.in_flight.join_next().await {
                if let Ok(inv) = joined {
                    let executor_id = self.graph.ids[inv.executor].to_string();
                    let error = inv.result.err().map(|e| e.to_string());
                    self.record(&executor_id, inv.started_at, inv.elapsed_ms, error);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = self.in_flight.len(),
                "Aborting executors that ignored cancellation"
            );
            self.in_flight.shutdown().await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("executor panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("executor panicked: {}", msg)
    } else {
        "executor panicked".to_string()
    }
}
