//! The transcription manager: audio in, polished Italian summary out.
//!
//! ```text
//! transcribe ──(lang != it)──▶ translate ──▶ summarize ──▶ create-document
//!      └──────(lang == it)────────────────────▲
//! ```

pub mod document;
pub mod language;
pub mod summarize;
pub mod transcribe;
pub mod translate;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ferry_core::config::ModelConfig;
use ferry_core::error::{FerryError, GraphValidationError, Result};
use ferry_core::traits::{ChatClient, Transcriber};
use ferry_llm::ChatAgent;
use ferry_workflow::{InputStream, Payload, RunOptions, Workflow, WorkflowBuilder};

pub use document::{CreateDocumentExecutor, Document};
pub use language::{Language, LanguageDetector, LinguaDetector};
pub use summarize::{SummarizeExecutor, SummaryChunk, SUMMARIZER_INSTRUCTIONS};
pub use transcribe::{TranscribeExecutor, Transcription};
pub use translate::{TranslateExecutor, TRANSLATOR_INSTRUCTIONS};

pub const WORKFLOW_NAME: &str = "transcription-manager";

/// Collaborators the pipeline needs.
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub detector: Arc<dyn LanguageDetector>,
    pub chat: Arc<dyn ChatClient>,
    pub model: ModelConfig,
}

pub fn transcription_workflow(
    services: Services,
    options: RunOptions,
) -> std::result::Result<Workflow<InputStream>, GraphValidationError> {
    let translator = ChatAgent::new(
        "translator",
        services.chat.clone(),
        services.model.clone(),
        TRANSLATOR_INSTRUCTIONS,
    );
    let summarizer = ChatAgent::new(
        "summarizer",
        services.chat,
        services.model.with_temperature(0.0),
        SUMMARIZER_INSTRUCTIONS,
    );

    WorkflowBuilder::new(TranscribeExecutor::new(
        services.transcriber,
        services.detector,
    ))
    .with_name(WORKFLOW_NAME)
    .add_executor(TranslateExecutor::new(translator))
    .add_executor(SummarizeExecutor::new(summarizer))
    .add_executor(CreateDocumentExecutor)
    .add_edge_if(
        TranscribeExecutor::ID,
        TranslateExecutor::ID,
        |t: &Transcription| t.language != Language::Italian.code(),
    )
    .add_edge_if(
        TranscribeExecutor::ID,
        SummarizeExecutor::ID,
        |t: &Transcription| t.language == Language::Italian.code(),
    )
    .add_edge(TranslateExecutor::ID, SummarizeExecutor::ID)
    .mark_output(SummarizeExecutor::ID)
    .add_edge(SummarizeExecutor::ID, CreateDocumentExecutor::ID)
    .mark_output(CreateDocumentExecutor::ID)
    .with_options(options)
    .build()
}

/// Console rendering of a completion value, for the types that have one.
pub fn printable(value: &Payload) -> Option<String> {
    if let Some(t) = value.downcast_ref::<Transcription>() {
        Some(t.to_string())
    } else {
        value.downcast_ref::<String>().cloned()
    }
}

/// Run `fut` unless `token` fires first.
pub(crate) async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FerryError::Cancelled),
        result = fut => result,
    }
}
