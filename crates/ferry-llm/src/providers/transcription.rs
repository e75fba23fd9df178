use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use ferry_core::config::TranscriptionConfig;
use ferry_core::error::{FerryError, Result};
use ferry_core::traits::Transcriber;

const OPENAI_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Speech-to-text over the OpenAI `audio/transcriptions` endpoint.
pub struct OpenAiTranscriber {
    http: Client,
    config: TranscriptionConfig,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiTranscriber {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> BoxFuture<'_, Result<String>> {
        let file_name = file_name.to_string();

        Box::pin(async move {
            let url = self
                .config
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_TRANSCRIPTION_URL);

            debug!(
                model = %self.config.model_id,
                file_name = %file_name,
                bytes = audio.len(),
                "Sending transcription request"
            );

            let form = Form::new()
                .text("model", self.config.model_id.clone())
                .text("response_format", "json")
                .part("file", Part::bytes(audio).file_name(file_name));

            let mut req = self.http.post(url).multipart(form);
            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| FerryError::Transcription(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(FerryError::Transcription(format!("HTTP {}: {}", status, body)));
            }

            let parsed: TranscriptionResponse = response
                .json()
                .await
                .map_err(|e| FerryError::Transcription(e.to_string()))?;
            Ok(parsed.text)
        })
    }
}
