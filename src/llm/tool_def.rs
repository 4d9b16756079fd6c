use serde::{Deserialize, Serialize};
use serde_json::json;

pub const GENERATE_IMAGE_TOOL: &str = "generate_image";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON Schema object
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub kind: String, // "function"
    pub function: ToolFunctionDef,
}

/// The single tool offered to the model.
pub fn generate_image_tool_def() -> ToolDef {
    ToolDef {
        kind: "function".into(),
        function: ToolFunctionDef {
            name: GENERATE_IMAGE_TOOL.into(),
            description: "When the user requests it, generate an image from a text prompt. Use 'hd' quality only when the user asks for a detailed or high quality picture.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The prompt that will generate the image"
                    },
                    "quality": {
                        "type": "string",
                        "enum": ["standard", "hd"],
                        "description": "Image quality. Can be 'hd' or 'standard'"
                    }
                },
                "required": ["prompt"]
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_prompt_and_quality() {
        let def = generate_image_tool_def();
        let v = serde_json::to_value(&def).unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "generate_image");
        assert_eq!(
            v["function"]["parameters"]["properties"]["quality"]["enum"],
            json!(["standard", "hd"])
        );
        assert_eq!(v["function"]["parameters"]["required"], json!(["prompt"]));
    }
}
