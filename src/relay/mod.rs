//! Streaming relay between a caller and the chat completion service.
//!
//! A relay forwards the conversation with the `generate_image` tool declared, passes text
//! deltas through as they arrive, and when the model finishes a tool call it generates the
//! image, appends the call and its result to the conversation and opens a new stream.

mod accumulator;
mod backend;
mod state;
mod turn;

use anyhow::Result;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

pub use backend::{ChatBackend, ImageGenerator};
pub use state::{RelayState, Step};
pub use turn::{Turn, build_conversation};

use crate::config::DEFAULT_SYSTEM_PROMPT;
use crate::llm::{ChatMessage, ToolDef, generate_image_tool_def};

/// Events sent to the caller, serialized as `{"status": ...}` objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutboundEvent {
    Streaming { content: String },
    GeneratingImage,
    Done,
    Error { message: String },
}

pub type OutboundStream = Pin<Box<dyn Stream<Item = Result<OutboundEvent>> + Send>>;

#[derive(Clone)]
pub struct Relay {
    chat: Arc<dyn ChatBackend>,
    images: Arc<dyn ImageGenerator>,
    model: String,
    system_prompt: String,
    tools: Vec<ToolDef>,
}

impl Relay {
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        images: Arc<dyn ImageGenerator>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            images,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: vec![generate_image_tool_def()],
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn conversation(&self, turns: &[Turn]) -> Vec<ChatMessage> {
        build_conversation(&self.system_prompt, turns)
    }

    /// Run one exchange. Nothing happens until the stream is polled; polling a second stream
    /// for the same turns repeats every call, tool calls included.
    ///
    /// The stream yields at most one `Err`, always as its last item.
    pub fn relay(&self, turns: Vec<Turn>) -> OutboundStream {
        let chat = self.chat.clone();
        let images = self.images.clone();
        let model = self.model.clone();
        let tools = self.tools.clone();
        let mut conversation = self.conversation(&turns);

        let stream = async_stream::try_stream! {
            let mut round = 0usize;
            'rounds: loop {
                round += 1;
                info!(round, messages = conversation.len(), %model, "opening chat stream");
                let mut stream = chat
                    .open_stream(&model, conversation.clone(), tools.clone())
                    .await?;

                let mut state = RelayState::Streaming;
                while let Some(event) = stream.next().await {
                    let Step { next, emit } = state.advance(event?);
                    if let Some(out) = emit {
                        yield out;
                    }
                    match next {
                        RelayState::Finished => {
                            info!(round, "chat stream finished");
                            break 'rounds;
                        }
                        RelayState::InvokingTool(call) => {
                            yield OutboundEvent::GeneratingImage;
                            info!(round, call_id = %call.id, quality = %call.quality, "invoking generate_image");
                            let image_url = images.generate_image(&call.prompt, call.quality).await?;
                            conversation.push(call.assistant_record());
                            conversation.push(call.tool_result(image_url));
                            continue 'rounds;
                        }
                        other => state = other,
                    }
                }

                // Closed without a stop signal or a complete tool call
                debug!(round, "chat stream ended without finish signal");
                break 'rounds;
            }
        };
        Box::pin(stream)
    }
}
