use std::fmt;

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::info;

use ferry_core::error::{FerryError, Result};
use ferry_llm::ChatAgent;
use ferry_workflow::{ExecutionContext, Executor};

use super::cancellable;
use super::transcribe::Transcription;

pub const SUMMARIZER_INSTRUCTIONS: &str = "\
You are an assistant that reviews and refines audio transcriptions, producing a polished document with clear and fluent text.
Correct any speech errors or inaccuracies, and ensure the content is cohesive. Be sure to keep all the information and the context.
When you create the document, remove any redundant phrases or filler words commonly found in spoken language. Pay attention to ensuring proper grammar, punctuation, and sentence structure.
If any speaker uses first-person language (e.g., 'I', 'we'), rewrite the content so that all statements are expressed in the third person in the document. Maintain consistency in style and clarity throughout the text.
Do not reference that the text originated from a transcription or mention any processing steps; simply present the finalized document.";

/// One streamed fragment of the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryChunk(pub String);

impl fmt::Display for SummaryChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Streams a polished summary of the transcription.
///
/// Each fragment is yielded as a [`SummaryChunk`]; the full text is sent on
/// to the document step and the invocation completes without a value.
pub struct SummarizeExecutor {
    agent: ChatAgent,
}

impl SummarizeExecutor {
    pub const ID: &'static str = "summarize";

    pub fn new(agent: ChatAgent) -> Self {
        Self { agent }
    }
}

impl Executor for SummarizeExecutor {
    type Input = Transcription;
    type Output = String;

    fn id(&self) -> &str {
        Self::ID
    }

    fn handle(
        &self,
        input: Transcription,
        ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            info!("Starting summarization");
            let token = ctx.cancellation_token();
            let mut fragments = cancellable(token, self.agent.run_streaming(&input.text)).await?;

            let mut content = String::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(FerryError::Cancelled),
                    next = fragments.next() => next,
                };
                let Some(fragment) = next else { break };
                let fragment = fragment?;
                content.push_str(&fragment);
                ctx.yield_output(SummaryChunk(fragment)).await?;
            }

            info!(chars = content.len(), "Summarization completed");
            ctx.send(content);
            Ok(None)
        })
    }
}
