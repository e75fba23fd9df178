use futures::future::BoxFuture;
use tracing::info;

use ferry_core::error::Result;
use ferry_llm::ChatAgent;
use ferry_workflow::{ExecutionContext, Executor};

use super::cancellable;
use super::language::Language;
use super::transcribe::Transcription;

pub const TRANSLATOR_INSTRUCTIONS: &str = "You are an Assistant that translates text in Italian. \
The user will provide the text. You should only respond with the translated text without any \
additional information or formatting.";

/// Translates a transcription to Italian.
pub struct TranslateExecutor {
    agent: ChatAgent,
}

impl TranslateExecutor {
    pub const ID: &'static str = "translate";

    pub fn new(agent: ChatAgent) -> Self {
        Self { agent }
    }
}

impl Executor for TranslateExecutor {
    type Input = Transcription;
    type Output = Transcription;

    fn id(&self) -> &str {
        Self::ID
    }

    fn handle(
        &self,
        input: Transcription,
        ctx: ExecutionContext<Transcription>,
    ) -> BoxFuture<'_, Result<Option<Transcription>>> {
        Box::pin(async move {
            let from = Language::from_code(&input.language)
                .map(Language::name)
                .unwrap_or(input.language.as_str());
            info!(from, "Translating text to Italian");
            let text = cancellable(ctx.cancellation_token(), self.agent.run(&input.text)).await?;
            info!("Translation completed");
            Ok(Some(Transcription::new(text, "it")))
        })
    }
}
