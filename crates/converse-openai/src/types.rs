// OpenAI API wire types and history conversion

use converse_core::{Content, ContentItem, Message, MessageRole, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub stream: bool,
    pub stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ApiTool>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiTool {
    pub r#type: &'static str,
    pub function: ToolSchema,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: ContentList,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiToolCall {
    pub id: String,
    pub r#type: &'static str,
    pub function: ApiFunctionCall,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiImageUrl {
    pub url: String,
    pub detail: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

/// Message content; serializes as a bare string for the common
/// single-text case, as the API prefers
#[derive(Debug)]
pub(crate) struct ContentList(pub Vec<ContentPart>);

impl Serialize for ContentList {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let [ContentPart::Text { text }] = self.0.as_slice() {
            return serializer.serialize_str(text);
        }
        self.0.serialize(serializer)
    }
}

// ============================================================================
// History conversion
// ============================================================================

pub(crate) fn convert_content(content: &Content) -> ContentList {
    convert_items(content.items())
}

fn convert_items(items: &[ContentItem]) -> ContentList {
    let parts = items
        .iter()
        .map(|item| match item {
            ContentItem::Text { text } => ContentPart::Text { text: text.clone() },
            ContentItem::ImageUrl { image_url } => ContentPart::ImageUrl {
                image_url: ApiImageUrl {
                    url: image_url.clone(),
                    detail: "auto",
                },
            },
            ContentItem::Json { data } => ContentPart::Text {
                text: data.to_string(),
            },
        })
        .collect();
    ContentList(parts)
}

/// Convert one history message to the wire format
///
/// A tool result with auxiliary content expands into two wire messages,
/// because tool messages only carry a plain string result.
pub(crate) fn convert_message(message: &Message) -> Vec<ApiMessage> {
    if message.role == MessageRole::Tool {
        let primary = message
            .content
            .items()
            .first()
            .map(|item| match item {
                ContentItem::Text { text } => text.clone(),
                ContentItem::Json { data } => data.to_string(),
                ContentItem::ImageUrl { image_url } => image_url.clone(),
            })
            .unwrap_or_default();

        let mut converted = vec![ApiMessage {
            role: "tool".to_string(),
            content: ContentList(vec![ContentPart::Text { text: primary }]),
            tool_calls: None,
            tool_call_id: message.tool_call_id.clone(),
        }];

        if message.content.items().len() > 1 {
            let secondary = convert_items(&message.content.items()[1..]);
            if !secondary.0.is_empty() {
                converted.push(ApiMessage {
                    role: "user".to_string(),
                    content: secondary,
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }

        return converted;
    }

    let content = convert_content(&message.content);
    if content.0.is_empty() && message.tool_calls.is_empty() {
        return Vec::new();
    }

    let tool_calls = if message.role == MessageRole::Assistant && !message.tool_calls.is_empty() {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| {
                    // The backend rejects tool calls whose recorded
                    // arguments are not valid JSON
                    let arguments = if serde_json::from_str::<Value>(&call.arguments).is_ok() {
                        call.arguments.clone()
                    } else {
                        "{}".to_string()
                    };
                    ApiToolCall {
                        id: call.id.clone(),
                        r#type: "function",
                        function: ApiFunctionCall {
                            name: call.name.clone(),
                            arguments,
                        },
                    }
                })
                .collect(),
        )
    } else {
        None
    };

    vec![ApiMessage {
        role: message.role.to_string(),
        content,
        tool_calls,
        tool_call_id: None,
    }]
}

// ============================================================================
// Streaming response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}
