use anyhow::Result;
use async_trait::async_trait;

use crate::llm::{ChatEventStream, ChatMessage, ImageQuality, OpenAIClient, ToolDef};

/// Opens one streamed chat completion.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
    ) -> Result<ChatEventStream>;
}

/// Produces one image and returns where it can be fetched.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str, quality: ImageQuality) -> Result<String>;
}

#[async_trait]
impl ChatBackend for OpenAIClient {
    async fn open_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDef>,
    ) -> Result<ChatEventStream> {
        self.chat_stream(model, messages, tools).await
    }
}

#[async_trait]
impl ImageGenerator for OpenAIClient {
    async fn generate_image(&self, prompt: &str, quality: ImageQuality) -> Result<String> {
        OpenAIClient::generate_image(self, prompt, quality).await
    }
}
