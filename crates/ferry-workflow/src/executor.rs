use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;

use ferry_core::error::{FerryError, Result};

use crate::context::{ContextCore, ExecutionContext};
use crate::payload::{MessageType, Payload};

/// A named, typed processing unit, a vertex of the workflow graph.
///
/// `handle` may be invoked many times per run, concurrently with other
/// executors, but never concurrently with itself within one run. Returning
/// `Ok(Some(v))` completes with `v`, which is routed along outgoing edges and
/// surfaced as the run's result if the executor is output-designated.
/// `Ok(None)` completes without a value; such executors act only through
/// [`ExecutionContext::send`] and [`ExecutionContext::yield_output`].
pub trait Executor: Send + Sync + 'static {
    /// Message type accepted by this executor.
    type Input: Clone + Send + Sync + 'static;

    /// Message type routed to connected executors. Use `()` for sinks.
    type Output: Send + Sync + 'static;

    /// Unique id within one workflow.
    fn id(&self) -> &str;

    /// Process one message.
    fn handle(
        &self,
        input: Self::Input,
        ctx: ExecutionContext<Self::Output>,
    ) -> BoxFuture<'_, Result<Option<Self::Output>>>;
}

/// Object-safe view of an executor, as stored in a built graph.
pub(crate) trait ErasedExecutor: Send + Sync + 'static {
    fn id(&self) -> &str;
    fn input_type(&self) -> MessageType;
    fn output_type(&self) -> MessageType;
    fn invoke(&self, input: Payload, core: ContextCore) -> BoxFuture<'_, Result<Option<Payload>>>;
}

pub(crate) struct Typed<E>(pub(crate) E);

impl<E: Executor> ErasedExecutor for Typed<E> {
    fn id(&self) -> &str {
        self.0.id()
    }

    fn input_type(&self) -> MessageType {
        MessageType::of::<E::Input>()
    }

    fn output_type(&self) -> MessageType {
        MessageType::of::<E::Output>()
    }

    fn invoke(&self, input: Payload, core: ContextCore) -> BoxFuture<'_, Result<Option<Payload>>> {
        Box::pin(async move {
            let message = input.downcast::<E::Input>().ok_or_else(|| FerryError::MessageType {
                executor: self.0.id().to_string(),
                expected: self.input_type().name().to_string(),
                found: input.type_name().to_string(),
            })?;
            let output = self.0.handle(message, ExecutionContext::new(core)).await?;
            Ok(output.map(Payload::new))
        })
    }
}

pub(crate) fn erase<E: Executor>(executor: E) -> Arc<dyn ErasedExecutor> {
    Arc::new(Typed(executor))
}

/// An executor backed by a processing function.
pub struct FnExecutor<I, O, F> {
    id: String,
    func: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnExecutor<I, O, F> {
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
            _types: PhantomData,
        }
    }
}

impl<I, O, F, Fut> Executor for FnExecutor<I, O, F>
where
    I: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
    F: Fn(I, ExecutionContext<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<O>>> + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(&self, input: I, ctx: ExecutionContext<O>) -> BoxFuture<'_, Result<Option<O>>> {
        Box::pin((self.func)(input, ctx))
    }
}

/// Build an executor from an async processing function.
///
/// ```ignore
/// let shout = from_fn("shout", |text: String, _ctx| async move {
///     Ok(Some(text.to_uppercase()))
/// });
/// ```
pub fn from_fn<I, O, F, Fut>(id: impl Into<String>, func: F) -> FnExecutor<I, O, F>
where
    I: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
    F: Fn(I, ExecutionContext<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<O>>> + Send + 'static,
{
    FnExecutor::new(id, func)
}
