// Anthropic Claude provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use converse_core::{
    ChatError, Content, ContentItem, Message, MessageRole, Provider, ProviderStream, Result,
    ToolRegistry,
};

use crate::stream::AnthropicStream;

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic Claude provider
///
/// Stateless across calls: it holds only the endpoint, model identifier
/// and credentials.
///
/// # Example
///
/// ```ignore
/// use converse_anthropic::AnthropicProvider;
///
/// let provider = AnthropicProvider::from_env("claude-3-5-sonnet-20241022")?;
/// // or
/// let provider = AnthropicProvider::new("your-api-key", "claude-3-5-sonnet-20241022")
///     .with_base_url("https://api.example.com/v1/messages");
/// ```
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl AnthropicProvider {
    /// Create a new provider with the given API key and model
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Create a new provider from the ANTHROPIC_API_KEY environment variable
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ChatError::provider("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    /// Use a custom API URL
    pub fn with_base_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn company(&self) -> &str {
        "Anthropic"
    }

    async fn generate(
        &self,
        system_prompt: Option<&Content>,
        history: &[Message],
        tools: Option<&ToolRegistry>,
    ) -> Result<Box<dyn ProviderStream>> {
        let schemas = tools.map(ToolRegistry::schemas).unwrap_or_default();
        let has_tools = !schemas.is_empty();

        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: history.iter().map(convert_message).collect(),
            stream: true,
            system: system_prompt.map(convert_items),
            tools: if has_tools {
                Some(
                    schemas
                        .into_iter()
                        .map(|schema| ApiTool {
                            name: schema.name,
                            description: schema.description,
                            input_schema: schema.parameters,
                        })
                        .collect(),
                )
            } else {
                None
            },
            tool_choice: has_tools.then_some(ToolChoice { r#type: "auto" }),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| ChatError::provider(format!("error making request: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::provider(format!(
                "Anthropic API error ({status}): {body}"
            )));
        }

        Ok(Box::new(AnthropicStream::from_response(
            self.model.clone(),
            response,
        )))
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<Vec<ApiContentBlock>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ApiImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<ApiContentBlock>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

// ============================================================================
// History conversion
// ============================================================================

pub(crate) fn convert_items(content: &Content) -> Vec<ApiContentBlock> {
    content
        .items()
        .iter()
        .map(|item| match item {
            ContentItem::Text { text } => ApiContentBlock::Text {
                // The API rejects empty text blocks
                text: if text.trim().is_empty() {
                    "(Empty)".to_string()
                } else {
                    text.clone()
                },
            },
            ContentItem::ImageUrl { image_url } => ApiContentBlock::Image {
                source: convert_image(image_url),
            },
            ContentItem::Json { data } => ApiContentBlock::Text {
                text: data.to_string(),
            },
        })
        .collect()
}

fn convert_image(url: &str) -> ApiImageSource {
    if let Some(data_value) = url.strip_prefix("data:") {
        if let Some((media_type, data)) = data_value.split_once(";base64,") {
            return ApiImageSource::Base64 {
                media_type: media_type.to_string(),
                data: data.to_string(),
            };
        }
    }
    ApiImageSource::Url {
        url: url.to_string(),
    }
}

fn convert_message(message: &Message) -> ApiMessage {
    if message.role == MessageRole::Tool {
        // The API wants tool results inside user messages
        return ApiMessage {
            role: "user",
            content: vec![ApiContentBlock::ToolResult {
                tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                content: convert_items(&message.content),
            }],
        };
    }

    let mut content = convert_items(&message.content);
    for call in &message.tool_calls {
        content.push(ApiContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({})),
        });
    }

    ApiMessage {
        role: match message.role {
            MessageRole::Assistant => "assistant",
            _ => "user",
        },
        content,
    }
}
