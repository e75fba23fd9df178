use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Chat client: streaming chat completions from a language model backend.
pub trait ChatClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Speech-to-text backend.
pub trait Transcriber: Send + Sync + 'static {
    /// Transcribe an encoded audio file. `file_name` carries the container
    /// format hint (e.g. `input.mp3`).
    fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> BoxFuture<'_, Result<String>>;
}
