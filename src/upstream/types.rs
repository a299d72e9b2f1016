use super::OptionDefaults;
use crate::{Error, Result};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw upstream bytes, relayed without inspection.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

pub type Options = Map<String, Value>;

/// Body of `POST /api/generate` and `POST /api/generate/stream`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub options: Option<Options>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub options: Option<Options>,
}

/// Body of `POST /api/models/pull`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    /// Absent on assistant turns that only carry tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    // images, tool calls and whatever else the client sends ride along untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub model: String,
    pub prompt: String,
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub options: Options,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::validation(format!("{} required", field))),
    }
}

impl GenerateRequest {
    pub fn validate(self) -> Result<GenerateParams> {
        let model = required(self.model, "model")?;
        let prompt = required(self.prompt, "prompt")?;

        Ok(GenerateParams {
            model,
            prompt,
            options: self.options.unwrap_or_default(),
        })
    }
}

impl ChatRequest {
    pub fn validate(self) -> Result<ChatParams> {
        let model = required(self.model, "model")?;
        let messages = match self.messages {
            Some(messages) if !messages.is_empty() => messages,
            _ => return Err(Error::validation("messages required")),
        };

        Ok(ChatParams {
            model,
            messages,
            options: self.options.unwrap_or_default(),
        })
    }
}

impl PullRequest {
    pub fn validate(self) -> Result<String> {
        required(self.name, "name")
    }
}

impl GenerateParams {
    pub fn with_defaults(mut self, defaults: &OptionDefaults) -> Self {
        self.options = defaults.apply(self.options);
        self
    }
}

impl ChatParams {
    pub fn with_defaults(mut self, defaults: &OptionDefaults) -> Self {
        self.options = defaults.apply(self.options);
        self
    }
}

/// A chat reply without `message` is unusable even when the upstream said 200.
pub fn ensure_chat_message(response: &Value) -> Result<()> {
    match response.get("message") {
        Some(message) if !message.is_null() => Ok(()),
        _ => Err(Error::protocol(
            "invalid response structure: missing `message` field",
        )),
    }
}
