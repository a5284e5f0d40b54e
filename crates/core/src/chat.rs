//! OpenAI-compatible chat-completion wire types.
//!
//! Requests are accepted leniently (unknown fields ignored, sampling
//! parameters parsed but unused); responses are emitted schema-exact.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Roles a request turn may carry.
pub const ALLOWED_ROLES: &[&str] = &["system", "developer", "user", "assistant", "tool"];

// ── Request ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Echoed back; never used for routing.
    #[serde(default)]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// A turn's content: a plain string or a list of typed parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// Flatten to text. Text parts are joined with `\n`; other parts are ignored.
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl ChatRequest {
    /// Validate the turns and return the text of the last user turn.
    pub fn prompt_text(&self) -> Result<String, BridgeError> {
        if self.messages.is_empty() {
            return Err(BridgeError::invalid("messages must not be empty"));
        }
        if let Some(bad) = self
            .messages
            .iter()
            .find(|m| !ALLOWED_ROLES.contains(&m.role.as_str()))
        {
            return Err(BridgeError::invalid(format!(
                "unsupported role '{}'",
                bad.role
            )));
        }

        let last_user = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .ok_or_else(|| BridgeError::invalid("no user message found"))?;

        let text = last_user
            .content
            .as_ref()
            .map(MessageContent::text)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(BridgeError::invalid("user message content is empty"));
        }
        Ok(text)
    }
}

// ── Streaming chunks ──────────────────────────────────────────

/// Fields shared by every chunk of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: String,
    pub created: i64,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    /// Always present on the wire; `null` until the terminal chunk.
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    fn with(header: &ChunkHeader, delta: ChunkDelta, finish_reason: Option<&str>) -> Self {
        Self {
            id: header.id.clone(),
            object: "chat.completion.chunk".into(),
            created: header.created,
            model: header.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    /// The opening chunk: `delta: {"role": "assistant"}`.
    pub fn role(header: &ChunkHeader) -> Self {
        let delta = ChunkDelta {
            role: Some("assistant".into()),
            content: None,
        };
        Self::with(header, delta, None)
    }

    pub fn content(header: &ChunkHeader, text: impl Into<String>) -> Self {
        let delta = ChunkDelta {
            role: None,
            content: Some(text.into()),
        };
        Self::with(header, delta, None)
    }

    /// The terminal chunk: empty delta, `finish_reason: "stop"`.
    pub fn stop(header: &ChunkHeader) -> Self {
        Self::with(header, ChunkDelta::default(), Some("stop"))
    }

    pub fn is_terminal(&self) -> bool {
        self.choices.iter().any(|c| c.finish_reason.is_some())
    }

    /// Content carried by this chunk, if any.
    pub fn content_delta(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.delta.content.as_deref())
    }
}

// ── Non-streaming response ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

impl ChatCompletion {
    pub fn new(header: &ChunkHeader, content: String) -> Self {
        Self {
            id: header.id.clone(),
            object: "chat.completion".into(),
            created: header.created,
            model: header.model.clone(),
            choices: vec![CompletionChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".into(),
                    content,
                },
                finish_reason: "stop".into(),
            }],
        }
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&BridgeError> for ErrorResponse {
    fn from(err: &BridgeError) -> Self {
        Self {
            error: ErrorBody {
                message: err.to_string(),
                kind: err.error_type().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(body: serde_json::Value) -> ChatRequest {
        serde_json::from_value(body).unwrap()
    }

    fn header() -> ChunkHeader {
        ChunkHeader {
            id: "chatcmpl-abc".into(),
            created: 1_700_000_000,
            model: "gpt-4".into(),
        }
    }

    #[test]
    fn uses_last_user_turn() {
        let req = request(json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "ok"},
                {"role": "user", "content": "second"}
            ],
            "temperature": 0.2,
            "top_p": 1
        }));
        assert_eq!(req.prompt_text().unwrap(), "second");
        assert!(!req.stream);
    }

    #[test]
    fn joins_text_parts_and_ignores_others() {
        let req = request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "line one"},
                {"type": "image_url", "image_url": {"url": "http://x"}},
                {"type": "text", "text": "line two"}
            ]}]
        }));
        assert_eq!(req.prompt_text().unwrap(), "line one\nline two");
    }

    #[test]
    fn rejects_invalid_turns() {
        let empty = request(json!({"model": "m", "messages": []}));
        assert!(matches!(empty.prompt_text(), Err(BridgeError::RequestInvalid(_))));

        let bad_role = request(json!({"model": "m", "messages": [{"role": "robot", "content": "hi"}]}));
        let err = bad_role.prompt_text().unwrap_err();
        assert!(err.to_string().contains("robot"));

        let no_user = request(json!({"model": "m", "messages": [{"role": "system", "content": "hi"}]}));
        assert!(no_user.prompt_text().is_err());

        let blank = request(json!({"model": "m", "messages": [{"role": "user", "content": "   "}]}));
        assert!(blank.prompt_text().is_err());

        let null_content = request(json!({"model": "m", "messages": [{"role": "user", "content": null}]}));
        assert!(null_content.prompt_text().is_err());
    }

    #[test]
    fn role_chunk_shape() {
        let value = serde_json::to_value(ChatCompletionChunk::role(&header())).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "chatcmpl-abc",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000,
                "model": "gpt-4",
                "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
            })
        );
    }

    #[test]
    fn content_and_stop_chunk_shape() {
        let content = serde_json::to_value(ChatCompletionChunk::content(&header(), "Hi")).unwrap();
        assert_eq!(content["choices"][0]["delta"], json!({"content": "Hi"}));
        assert!(content["choices"][0]["finish_reason"].is_null());

        let stop = ChatCompletionChunk::stop(&header());
        assert!(stop.is_terminal());
        let stop = serde_json::to_value(stop).unwrap();
        assert_eq!(stop["choices"][0]["delta"], json!({}));
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn completion_and_error_shape() {
        let value = serde_json::to_value(ChatCompletion::new(&header(), "Hello!".into())).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(value["choices"][0]["message"]["content"], "Hello!");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");

        let err = ErrorResponse::from(&BridgeError::ProjectNotFound("demo".into()));
        assert_eq!(
            serde_json::to_value(err).unwrap(),
            json!({"error": {"message": "Project not found: demo", "type": "not_found_error"}})
        );
    }
}
