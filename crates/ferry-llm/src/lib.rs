pub mod agent;
pub mod providers;
pub mod retry;
pub mod streaming;

use std::sync::Arc;

use ferry_core::config::ModelConfig;
use ferry_core::traits::ChatClient;

pub use agent::ChatAgent;
pub use providers::openai::OpenAiClient;
pub use providers::transcription::OpenAiTranscriber;
pub use retry::RetryingClient;

/// Create a chat client for the configured provider, wrapped in retries when
/// `[model.retry]` is set.
///
/// Every provider name maps to the OpenAI-compatible client; point
/// `base_url` at the deployment for Azure, Ollama, vLLM and the like.
pub fn create_client(config: &ModelConfig) -> Arc<dyn ChatClient> {
    let client: Arc<dyn ChatClient> = Arc::new(OpenAiClient::new());
    match &config.retry {
        Some(retry) => Arc::new(RetryingClient::new(client, retry.clone())),
        None => client,
    }
}
