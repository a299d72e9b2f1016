use super::types::*;
use crate::{Error, Result, config::UpstreamConfig};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The inference server as seen by the gateway.
///
/// Callers apply option defaults before handing requests over; implementations
/// forward what they are given.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn list_models(&self) -> Result<Value>;

    async fn show_model(&self, name: &str) -> Result<Value>;

    async fn generate(&self, request: &GenerateParams) -> Result<Value>;

    async fn chat(&self, request: &ChatParams) -> Result<Value>;

    async fn pull_model(&self, name: &str) -> Result<Value>;

    /// Resolves once the upstream has accepted the request with a success
    /// status; the body is then yielded chunk by chunk.
    async fn generate_stream(&self, request: &GenerateParams) -> Result<ChunkStream>;
}

#[derive(Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a Options,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a Value>,
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: &'a Options,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a Value>,
}

#[derive(Serialize)]
struct PullPayload<'a> {
    name: &'a str,
    stream: bool,
}

/// reqwest-backed client for an Ollama-compatible server.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    pull_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
            pull_timeout: config.pull_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json(&self, request: RequestBuilder, timeout: Duration) -> Result<Value> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        let response = ensure_success(response).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| map_send_error(e, timeout))?;

        Ok(body)
    }

    fn generate_payload<'a>(&self, request: &'a GenerateParams, stream: bool) -> GeneratePayload<'a> {
        GeneratePayload {
            model: &request.model,
            prompt: &request.prompt,
            stream,
            options: &request.options,
            keep_alive: request.options.get("keep_alive"),
        }
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        Error::Network(err)
    }
}

/// Turns a non-2xx upstream answer into an error carrying its status and body.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        Err(Error::upstream(format!("upstream returned {}", status)))
    } else {
        Err(Error::upstream(format!("upstream returned {}: {}", status, body)))
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn list_models(&self) -> Result<Value> {
        debug!("Listing upstream models");
        let request = self.client.get(self.url("/api/tags"));
        self.send_json(request, self.request_timeout).await
    }

    async fn show_model(&self, name: &str) -> Result<Value> {
        debug!("Fetching info for model {}", name);
        let request = self
            .client
            .get(self.url("/api/show"))
            .query(&[("name", name)]);
        self.send_json(request, self.request_timeout).await
    }

    async fn generate(&self, request: &GenerateParams) -> Result<Value> {
        debug!("Forwarding generate for model {}", request.model);
        let builder = self
            .client
            .post(self.url("/api/generate"))
            .json(&self.generate_payload(request, false));
        self.send_json(builder, self.request_timeout).await
    }

    async fn chat(&self, request: &ChatParams) -> Result<Value> {
        debug!(
            "Forwarding chat for model {} with {} messages",
            request.model,
            request.messages.len()
        );
        let payload = ChatPayload {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            options: &request.options,
            keep_alive: request.options.get("keep_alive"),
        };
        let builder = self.client.post(self.url("/api/chat")).json(&payload);
        self.send_json(builder, self.request_timeout).await
    }

    async fn pull_model(&self, name: &str) -> Result<Value> {
        debug!("Pulling model {} (timeout {:?})", name, self.pull_timeout);
        let builder = self.client.post(self.url("/api/pull")).json(&PullPayload {
            name,
            stream: false,
        });
        self.send_json(builder, self.pull_timeout).await
    }

    async fn generate_stream(&self, request: &GenerateParams) -> Result<ChunkStream> {
        debug!("Opening streaming generate for model {}", request.model);
        let builder = self
            .client
            .post(self.url("/api/generate"))
            .json(&self.generate_payload(request, true));

        // reqwest's per-request timeout would also cut off a long-running body,
        // so only connection and response headers are bounded here.
        let response = tokio::time::timeout(self.request_timeout, builder.send())
            .await
            .map_err(|_| Error::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            })??;

        let response = ensure_success(response).await?;
        Ok(response.bytes_stream().map_err(Error::from).boxed())
    }
}
