// OpenAI chat-completions provider

use async_trait::async_trait;
use reqwest::Client;

use converse_core::{ChatError, Content, Message, Provider, ProviderStream, Result, ToolRegistry};

use crate::stream::OpenAiStream;
use crate::types::{convert_content, convert_message, ApiMessage, ApiRequest, ApiTool, StreamOptions};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions provider
///
/// Stateless across calls: it holds only the endpoint, model identifier
/// and credentials. Works against any OpenAI-compatible endpoint via
/// `with_base_url`.
///
/// # Example
///
/// ```ignore
/// use converse_openai::OpenAiProvider;
///
/// let provider = OpenAiProvider::from_env("gpt-4o")?;
/// // or
/// let provider = OpenAiProvider::new("your-api-key", "gpt-4o")
///     .with_base_url("https://api.example.com/v1/chat/completions");
/// ```
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    api_url: String,
    max_completion_tokens: Option<u32>,
}

impl OpenAiProvider {
    /// Create a new provider with the given API key and model
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            api_url: DEFAULT_API_URL.to_string(),
            max_completion_tokens: None,
        }
    }

    /// Create a new provider from the OPENAI_API_KEY environment variable
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ChatError::provider("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key, model))
    }

    /// Use a custom API URL (for OpenAI-compatible APIs)
    pub fn with_base_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Cap the number of completion tokens per turn
    pub fn with_max_completion_tokens(mut self, max_completion_tokens: u32) -> Self {
        self.max_completion_tokens = Some(max_completion_tokens);
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn company(&self) -> &str {
        "OpenAI"
    }

    async fn generate(
        &self,
        system_prompt: Option<&Content>,
        history: &[Message],
        tools: Option<&ToolRegistry>,
    ) -> Result<Box<dyn ProviderStream>> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system_prompt) = system_prompt {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: convert_content(system_prompt),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        for message in history {
            messages.extend(convert_message(message));
        }

        let schemas = tools.map(ToolRegistry::schemas).unwrap_or_default();
        let request = ApiRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            max_completion_tokens: self.max_completion_tokens,
            tools: if schemas.is_empty() {
                None
            } else {
                Some(
                    schemas
                        .into_iter()
                        .map(|function| ApiTool {
                            r#type: "function",
                            function,
                        })
                        .collect(),
                )
            },
        };

        let mut builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|err| ChatError::provider(format!("error making request: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::provider(format!(
                "OpenAI API error ({status}): {body}"
            )));
        }

        Ok(Box::new(OpenAiStream::from_response(
            self.model.clone(),
            response,
        )))
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
