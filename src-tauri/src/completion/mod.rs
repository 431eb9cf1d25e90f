// Client for a local OpenAI-compatible model server (LM Studio).

use serde_json::{json, Value};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ModelEndpointSettings;

pub mod dispatch;
pub mod stream;

pub use dispatch::{CompletionDispatcher, CompletionRequest, StreamEvent, TokioCompletionDispatcher};
pub use stream::{SseDecoder, SseEvent};

/// Total budget for a non-streaming generation.
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest gap allowed between two chunks of a streamed generation.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("The model server did not answer in time. Check that it is running and a model is loaded.")]
    Timeout,
    #[error("Connection refused. Make sure the model server is running on the configured host and port.")]
    ConnectionRefused,
    #[error("Could not resolve the model server host. Check the host name in settings.")]
    Dns,
    #[error("The model server is unreachable. Check your network connection.")]
    Unreachable,
    #[error("Permission denied while connecting to the model server. Check firewall settings.")]
    PermissionDenied,
    #[error("The model server returned HTTP {0}")]
    Status(u16),
    #[error("The model server is disabled in settings")]
    Disabled,
    #[error("Invalid response from the model server: {0}")]
    InvalidResponse(String),
    #[error("Request to the model server failed: {0}")]
    Other(String),
}

impl CompletionError {
    /// Categorize a transport failure by walking its source chain.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return CompletionError::Timeout;
        }

        let mut source: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = source {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => return CompletionError::ConnectionRefused,
                    std::io::ErrorKind::PermissionDenied => return CompletionError::PermissionDenied,
                    std::io::ErrorKind::TimedOut => return CompletionError::Timeout,
                    _ => {}
                }
            }

            let message = e.to_string().to_lowercase();
            if message.contains("dns error")
                || message.contains("failed to lookup address")
                || message.contains("no such host")
            {
                return CompletionError::Dns;
            }
            if message.contains("connection refused") || message.contains("actively refused") {
                return CompletionError::ConnectionRefused;
            }
            if message.contains("unreachable") {
                return CompletionError::Unreachable;
            }
            if message.contains("permission denied") || message.contains("access is denied") {
                return CompletionError::PermissionDenied;
            }

            source = e.source();
        }

        CompletionError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::from_transport(&err)
    }
}

#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    settings: ModelEndpointSettings,
    base_url: String,
}

impl CompletionClient {
    pub fn new(settings: &ModelEndpointSettings) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        Ok(Self {
            http,
            settings: settings.clone(),
            base_url: settings.base_url(),
        })
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    fn ensure_enabled(&self) -> Result<(), CompletionError> {
        if self.settings.enabled {
            Ok(())
        } else {
            Err(CompletionError::Disabled)
        }
    }

    /// `Ok(false)` when disabled or the server answers with an error status.
    pub async fn test_connection(&self) -> Result<bool, CompletionError> {
        if !self.settings.enabled {
            return Ok(false);
        }

        let url = format!("{}/models", self.base_url);
        debug!("Testing model server connection at {}", url);

        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| {
                let err = CompletionError::from_transport(&e);
                error!("Model server connection test failed: {}", e);
                err
            })?;

        Ok(response.status().is_success())
    }

    pub async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        if !self.settings.enabled {
            return Ok(Vec::new());
        }

        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CompletionError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        Ok(body["data"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn chat_body(&self, text: &str, system_prompt: Option<&str>, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(prompt) = system_prompt {
            messages.push(json!({ "role": "system", "content": prompt }));
        }
        messages.push(json!({ "role": "user", "content": text }));

        let model = if self.settings.model.is_empty() {
            "default"
        } else {
            self.settings.model.as_str()
        };

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    pub async fn generate_completion(
        &self,
        text: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, CompletionError> {
        self.ensure_enabled()?;

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&self.chat_body(text, system_prompt, false))
            .timeout(GENERATE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CompletionError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        Ok(body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Stream a generation. `on_chunk` sees every text delta in order, then
    /// exactly one of `on_complete` (full text) or `on_error` runs.
    pub async fn generate_completion_streaming<C, D, E>(
        &self,
        text: &str,
        system_prompt: Option<&str>,
        mut on_chunk: C,
        on_complete: D,
        on_error: E,
    ) where
        C: FnMut(&str),
        D: FnOnce(String),
        E: FnOnce(CompletionError),
    {
        match self.stream_chat(text, system_prompt, &mut on_chunk).await {
            Ok(full) => {
                info!("Streamed completion finished ({} chars)", full.chars().count());
                on_complete(full)
            }
            Err(e) => {
                warn!("Streamed completion failed: {}", e);
                on_error(e)
            }
        }
    }

    async fn stream_chat<C>(
        &self,
        text: &str,
        system_prompt: Option<&str>,
        on_chunk: &mut C,
    ) -> Result<String, CompletionError>
    where
        C: FnMut(&str),
    {
        self.ensure_enabled()?;

        let url = format!("{}/chat/completions", self.base_url);
        let request = self
            .http
            .post(&url)
            .json(&self.chat_body(text, system_prompt, true))
            .send();

        let mut response = tokio::time::timeout(STREAM_IDLE_TIMEOUT, request)
            .await
            .map_err(|_| CompletionError::Timeout)??;

        if !response.status().is_success() {
            return Err(CompletionError::Status(response.status().as_u16()));
        }

        let mut decoder = SseDecoder::new();
        let mut full = String::new();

        loop {
            let next = tokio::time::timeout(STREAM_IDLE_TIMEOUT, response.chunk())
                .await
                .map_err(|_| CompletionError::Timeout)??;

            let (events, finished) = match next {
                Some(bytes) => (decoder.push(&bytes), false),
                None => (decoder.finish(), true),
            };

            for event in events {
                match event {
                    SseEvent::Delta(delta) => {
                        full.push_str(&delta);
                        on_chunk(&delta);
                    }
                    SseEvent::Done => return Ok(full),
                }
            }

            if finished {
                return Ok(full);
            }
        }
    }
}
