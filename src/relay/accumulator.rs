use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, GENERATE_IMAGE_TOOL, ImageQuality, ToolCall, ToolCallFunction};

#[derive(Debug, Clone, Deserialize)]
struct GenerateImageArgs {
    prompt: String,
    #[serde(default)]
    quality: Option<String>,
}

/// Collects streamed argument fragments of the in-flight tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

/// A tool call whose arguments parsed; ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyToolCall {
    pub id: String,
    pub raw_arguments: String,
    pub prompt: String,
    pub quality: ImageQuality,
}

impl ToolCallAccumulator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn set_id(&mut self, id: &str) {
        if self.id.is_empty() {
            self.id = id.to_string();
        }
    }

    pub fn push(&mut self, name_delta: Option<&str>, args_delta: Option<&str>) {
        if let Some(n) = name_delta
            && !n.is_empty()
        {
            self.name.push_str(n);
        }
        if let Some(a) = args_delta
            && !a.is_empty()
        {
            self.arguments.push_str(a);
            debug!(fragment = a, "tool call arguments fragment");
        }
    }

    /// Parse the accumulated arguments once they look like a closed JSON object.
    pub fn try_complete(&self) -> Option<ReadyToolCall> {
        if !self.arguments.trim_end().ends_with('}') {
            return None;
        }
        let args: GenerateImageArgs = match serde_json::from_str(&self.arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(err = %e, "tool call arguments not parseable yet");
                return None;
            }
        };
        if !self.name.is_empty() && self.name != GENERATE_IMAGE_TOOL {
            warn!(name = %self.name, "model called an undeclared tool, treating it as generate_image");
        }
        Some(ReadyToolCall {
            id: self.id.clone(),
            raw_arguments: self.arguments.clone(),
            prompt: args.prompt,
            quality: ImageQuality::from_arg(args.quality.as_deref()),
        })
    }
}

impl ReadyToolCall {
    pub fn assistant_record(&self) -> ChatMessage {
        ChatMessage::assistant_tool_call(ToolCall {
            id: self.id.clone(),
            r#type: "function".into(),
            function: ToolCallFunction {
                name: GENERATE_IMAGE_TOOL.into(),
                arguments: self.raw_arguments.clone(),
            },
        })
    }

    pub fn tool_result(&self, image_url: impl Into<String>) -> ChatMessage {
        ChatMessage::tool_result(self.id.clone(), image_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MessageContent, Role};

    #[test]
    fn assembles_fragments_until_closed() {
        let mut acc = ToolCallAccumulator::new("call_1");
        for frag in ["{\"pro", "mpt\": \"a ", "cat\", \"quality\"", ": \"hd\""] {
            acc.push(None, Some(frag));
            assert!(acc.try_complete().is_none());
        }
        acc.push(None, Some("}"));
        let call = acc.try_complete().unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.prompt, "a cat");
        assert_eq!(call.quality, ImageQuality::Hd);
        assert_eq!(call.raw_arguments, acc.arguments());
    }

    #[test]
    fn never_closing_brace_never_completes() {
        let mut acc = ToolCallAccumulator::new("call_1");
        acc.push(Some("generate_image"), Some("{\"prompt\": \""));
        for _ in 0..500 {
            acc.push(None, Some("x"));
            assert!(acc.try_complete().is_none());
        }
    }

    #[test]
    fn inner_brace_is_not_enough() {
        let mut acc = ToolCallAccumulator::new("call_1");
        acc.push(None, Some("{\"prompt\": \"{x}"));
        assert!(acc.try_complete().is_none());
        acc.push(None, Some("\"}  "));
        assert_eq!(acc.try_complete().unwrap().prompt, "{x}");
    }

    #[test]
    fn missing_prompt_does_not_complete() {
        let mut acc = ToolCallAccumulator::new("call_1");
        acc.push(None, Some("{\"quality\": \"hd\"}"));
        assert!(acc.try_complete().is_none());
    }

    #[test]
    fn quality_defaults_to_standard() {
        let mut acc = ToolCallAccumulator::new("call_1");
        acc.push(None, Some("{\"prompt\": \"a dog\"}"));
        assert_eq!(acc.try_complete().unwrap().quality, ImageQuality::Standard);
    }

    #[test]
    fn id_is_set_once() {
        let mut acc = ToolCallAccumulator::default();
        acc.set_id("call_a");
        acc.set_id("call_b");
        assert_eq!(acc.id(), "call_a");
    }

    #[test]
    fn records_share_the_call_id() {
        let mut acc = ToolCallAccumulator::new("call_7");
        acc.push(Some("generate_image"), Some("{\"prompt\":\"sun\"}"));
        let call = acc.try_complete().unwrap();

        let record = call.assistant_record();
        assert_eq!(record.role, Role::Assistant);
        assert!(record.content.is_none());
        assert_eq!(record.tool_calls[0].id, "call_7");
        assert_eq!(record.tool_calls[0].function.name, "generate_image");
        assert_eq!(record.tool_calls[0].function.arguments, "{\"prompt\":\"sun\"}");

        let result = call.tool_result("https://img/sun.png");
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("call_7"));
        assert_eq!(
            result.content,
            Some(MessageContent::Text("https://img/sun.png".into()))
        );
    }
}
