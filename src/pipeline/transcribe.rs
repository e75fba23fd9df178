use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use ferry_core::error::Result;
use ferry_core::traits::Transcriber;
use ferry_workflow::{ExecutionContext, Executor, InputStream};

use super::cancellable;
use super::language::{Language, LanguageDetector};

/// Text recognized from audio, tagged with its language code.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub language: String,
}

impl Transcription {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
        }
    }
}

impl fmt::Display for Transcription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.language, self.text)
    }
}

/// Reads the audio stream, transcribes it and detects its language.
pub struct TranscribeExecutor {
    transcriber: Arc<dyn Transcriber>,
    detector: Arc<dyn LanguageDetector>,
}

impl TranscribeExecutor {
    pub const ID: &'static str = "transcribe";

    pub fn new(transcriber: Arc<dyn Transcriber>, detector: Arc<dyn LanguageDetector>) -> Self {
        Self {
            transcriber,
            detector,
        }
    }
}

impl Executor for TranscribeExecutor {
    type Input = InputStream;
    type Output = Transcription;

    fn id(&self) -> &str {
        Self::ID
    }

    fn handle(
        &self,
        input: InputStream,
        ctx: ExecutionContext<Transcription>,
    ) -> BoxFuture<'_, Result<Option<Transcription>>> {
        Box::pin(async move {
            info!(file = %input.name(), "Starting transcription");
            let audio = input.read_to_end().await?;
            let text = cancellable(
                ctx.cancellation_token(),
                self.transcriber.transcribe(audio, input.name()),
            )
            .await?;

            let language = self.detector.detect(&text).unwrap_or_else(|| {
                warn!("Transcript language undetermined, treating it as English");
                Language::English
            });
            info!(language = language.code(), "Transcription completed");
            Ok(Some(Transcription::new(text, language.code())))
        })
    }
}
