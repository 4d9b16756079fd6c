use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::{debug, error, warn};

use crate::llm::client_core::OpenAIClient;
use crate::llm::tool_def::ToolDef;
use crate::llm::types::{ChatMessage, ChatRequest, Usage};

/// One decoded fragment of a chat completion stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCallDelta {
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    Completion {
        finish_reason: String,
    },
}

pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

// Wire types for OpenAI-compatible `chat.completion.chunk` payloads
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamChoiceDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    // tool_calls are streamed as incremental deltas
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCallDelta {
    pub index: Option<usize>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    #[serde(default)]
    pub kind: Option<String>, // "function"
    #[serde(default)]
    pub function: Option<ToolCallFunctionDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCallFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>, // partial JSON string
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: StreamChoiceDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatStreamChunk {
    /// Flatten the first choice into events: text, then tool-call deltas, then the finish reason.
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        let Some(choice) = self.choices.into_iter().next() else {
            return out;
        };
        if let Some(text) = choice.delta.content
            && !text.is_empty()
        {
            out.push(StreamEvent::TextDelta(text));
        }
        // Only one concurrent tool call is expected; the first slot wins
        if let Some(tc) = choice.delta.tool_calls.into_iter().next() {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            out.push(StreamEvent::ToolCallDelta {
                id: tc.id,
                name,
                arguments,
            });
        }
        if let Some(reason) = choice.finish_reason {
            out.push(StreamEvent::Completion {
                finish_reason: reason,
            });
        }
        out
    }
}

/// Splits a byte stream into SSE `data:` payloads, keeping partial lines between reads.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        let mut start = 0usize;
        for i in 0..self.buf.len() {
            if self.buf[i] != b'\n' {
                continue;
            }
            payloads.extend(Self::payload_of(&self.buf[start..i]));
            start = i + 1;
        }
        if start > 0 {
            self.buf.drain(0..start);
        }
        payloads
    }

    /// Flush a trailing line the server closed without a newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        Self::payload_of(&rest)
    }

    fn payload_of(line: &[u8]) -> Option<String> {
        let Ok(s) = std::str::from_utf8(line) else {
            warn!("dropping non utf-8 stream line");
            return None;
        };
        let s = s.trim();
        if s.is_empty() || s.starts_with(':') {
            return None;
        }
        let payload = s.strip_prefix("data:").map_or(s, str::trim);
        (payload != "[DONE]").then(|| payload.to_string())
    }
}

pub fn decode_payload(payload: &str) -> Vec<StreamEvent> {
    match serde_json::from_str::<ChatStreamChunk>(payload) {
        Ok(chunk) => {
            if let Some(usage) = &chunk.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    total_tokens = usage.total_tokens,
                    "stream usage"
                );
            }
            chunk.into_events()
        }
        Err(e) => {
            warn!(payload, err = %e, "failed to parse stream chunk");
            Vec::new()
        }
    }
}

impl OpenAIClient {
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
    ) -> Result<ChatEventStream> {
        let url = self.endpoint();
        let req = ChatRequest {
            model: model.to_string(),
            messages,
            tools,
            temperature: None,
            stream: Some(true),
        };

        if let Ok(payload) = serde_json::to_string_pretty(&req) {
            debug!(payload=%payload, endpoint=%url, "sending chat.completions payload (stream)");
        }

        let resp = self
            .inner
            .post(url)
            .headers(self.headers()?)
            .json(&req)
            .send()
            .await
            .context("send chat request (stream)")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let e = anyhow::anyhow!("chat error: {} - {}", status, text);
            let kind = crate::llm::classify_error(Some(status), &e);
            error!(status=%status.as_u16(), %kind, body=%text, "chat stream rejected");
            return Err(e);
        }

        let mut byte_stream = resp.bytes_stream();
        let mut lines = SseLineBuffer::new();

        let stream = async_stream::try_stream! {
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.context("byte stream read error")?;
                for payload in lines.push(&chunk) {
                    debug!(response_chunk=%payload, "llm chat_stream response");
                    for event in decode_payload(&payload) {
                        yield event;
                    }
                }
            }
            if let Some(payload) = lines.finish() {
                debug!(response_chunk=%payload, "llm chat_stream unterminated last line");
                for event in decode_payload(&payload) {
                    yield event;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
