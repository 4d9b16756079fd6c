use crate::llm::{ChatMessage, ContentPart, ImageUrl, Role};

/// One conversation message as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub body: TurnBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnBody {
    Text(String),
    /// `images` holds base64 payloads and is never empty.
    WithImages { text: String, images: Vec<String> },
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>, images: Vec<String>) -> Self {
        let text = text.into();
        let body = if images.is_empty() {
            TurnBody::Text(text)
        } else {
            TurnBody::WithImages { text, images }
        };
        Self { role, body }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, text, Vec::new())
    }

    pub fn to_message(&self) -> ChatMessage {
        match &self.body {
            TurnBody::Text(text) => ChatMessage::text(self.role, text.clone()),
            TurnBody::WithImages { text, images } => {
                let mut parts = Vec::with_capacity(images.len() + 1);
                parts.push(ContentPart::Text { text: text.clone() });
                parts.extend(images.iter().map(|data| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_uri(data),
                    },
                }));
                ChatMessage::parts(self.role, parts)
            }
        }
    }
}

pub fn image_data_uri(base64_data: &str) -> String {
    format!("data:image/png;base64,{base64_data}")
}

/// System prompt first, then every caller turn in order.
pub fn build_conversation(system_prompt: &str, turns: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage::text(Role::System, system_prompt));
    messages.extend(turns.iter().map(Turn::to_message));
    messages
}
