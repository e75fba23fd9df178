use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

use ferry_core::config::ModelConfig;
use ferry_core::error::Result;
use ferry_core::traits::ChatClient;
use ferry_core::types::{ChatMessage, StreamDelta};

/// A single-turn chat agent: fixed instructions plus one user message.
#[derive(Clone)]
pub struct ChatAgent {
    name: String,
    client: Arc<dyn ChatClient>,
    config: ModelConfig,
    instructions: String,
}

impl ChatAgent {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ChatClient>,
        config: ModelConfig,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            config,
            instructions: instructions.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn messages(&self, text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.instructions.as_str()),
            ChatMessage::user(text),
        ]
    }

    /// Stream the reply as text fragments.
    pub async fn run_streaming(&self, text: &str) -> Result<BoxStream<'_, Result<String>>> {
        debug!(agent = %self.name, chars = text.len(), "Agent request");
        let deltas = self
            .client
            .chat_stream(&self.config, self.messages(text))
            .await?;

        Ok(deltas
            .filter_map(|delta| async move {
                match delta {
                    Ok(StreamDelta::TextDelta(t)) => Some(Ok(t)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed())
    }

    /// Run to completion and return the full reply.
    pub async fn run(&self, text: &str) -> Result<String> {
        let mut fragments = self.run_streaming(text).await?;
        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            reply.push_str(&fragment?);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::types::Role;
    use ferry_test_utils::{test_model_config, MockChatClient};

    #[tokio::test]
    async fn test_run_collects_reply_and_sends_instructions() {
        let mock = Arc::new(MockChatClient::new().with_reply("Buongiorno a tutti"));
        let agent = ChatAgent::new("translator", mock.clone(), test_model_config(), "Translate.");

        assert_eq!(agent.run("Good morning everyone").await.unwrap(), "Buongiorno a tutti");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][0].content, "Translate.");
        assert_eq!(requests[0][1].content, "Good morning everyone");
    }

    #[tokio::test]
    async fn test_streaming_yields_fragments() {
        let mock = Arc::new(MockChatClient::new().with_reply("one two three"));
        let agent = ChatAgent::new("summarizer", mock, test_model_config(), "Summarize.");

        let fragments: Vec<String> = agent
            .run_streaming("text")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["one ", "two ", "three"]);
    }

    #[tokio::test]
    async fn test_request_error_propagates() {
        let mock = Arc::new(MockChatClient::new().with_error("HTTP 500"));
        let agent = ChatAgent::new("a", mock, test_model_config(), "x");
        assert!(agent.run("text").await.is_err());
    }
}
