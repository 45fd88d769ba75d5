// Incremental decoder for the typed event-block framing
//
// The Messages API streams explicitly typed events: message_start opens
// the turn, content_block_start/delta/stop carry text and tool-call
// fragments, message_delta reports usage and the stop reason, and
// message_stop ends the sequence. A content_block_stop closes the open
// tool call; text blocks close silently.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use converse_core::{
    ChatError, Message, ProviderStream, Result, StreamStatus, TokenUsage, ToolCall,
};

use crate::pricing::PRICING;

type SseEvents = Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event>> + Send>>;

/// Statuses produced by one event but not yet pulled; their effect on the
/// assembled message is applied as each one is consumed
enum Pending {
    Text(String),
    Begin(ToolCall),
    Data(String),
    Ready,
}

pub struct AnthropicStream {
    events: SseEvents,
    model: String,
    message: Message,
    last_text: String,
    usage: TokenUsage,
    pending: VecDeque<Pending>,
    tool_open: bool,
    done: bool,
    error: Option<ChatError>,
}

impl AnthropicStream {
    pub(crate) fn from_response(model: impl Into<String>, response: reqwest::Response) -> Self {
        Self::from_sse(model, response.bytes_stream())
    }

    /// Build a decoder over any SSE byte stream
    pub fn from_sse<S, B, E>(model: impl Into<String>, bytes: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let events = bytes.eventsource().map(|event| {
            event.map_err(|err| ChatError::decode(format!("error reading stream: {err}")))
        });
        Self {
            events: Box::pin(events),
            model: model.into(),
            message: Message::assistant(),
            last_text: String::new(),
            usage: TokenUsage::default(),
            pending: VecDeque::new(),
            tool_open: false,
            done: false,
            error: None,
        }
    }

    fn fail(&mut self, error: ChatError) -> ChatError {
        self.error = Some(error.clone());
        error
    }

    fn apply_pending(&mut self) -> Option<StreamStatus> {
        match self.pending.pop_front()? {
            Pending::Text(text) => {
                self.message.content.append_text(&text);
                self.last_text = text;
                Some(StreamStatus::Text)
            }
            Pending::Begin(call) => {
                self.message.tool_calls.push(call);
                self.tool_open = true;
                Some(StreamStatus::ToolCallBegin)
            }
            Pending::Data(arguments) => {
                if let Some(call) = self.message.tool_calls.last_mut() {
                    call.arguments.push_str(&arguments);
                }
                Some(StreamStatus::ToolCallData)
            }
            Pending::Ready => {
                self.tool_open = false;
                Some(StreamStatus::ToolCallReady)
            }
        }
    }

    fn ingest(&mut self, data: &str) -> Result<()> {
        let event: StreamEvent = serde_json::from_str(data)
            .map_err(|err| ChatError::decode(format!("error decoding event: {err}")))?;

        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(role) = message.role.as_deref() {
                    self.message.role = role.into();
                }
                if let Some(usage) = message.usage {
                    self.usage.add(usage.into());
                }
            }
            StreamEvent::ContentBlockStart { content_block } => {
                if let ContentBlockStart::ToolUse { id, name } = content_block {
                    self.pending.push_back(Pending::Begin(ToolCall {
                        id,
                        name,
                        arguments: String::new(),
                    }));
                }
            }
            StreamEvent::ContentBlockDelta { delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    if !text.is_empty() {
                        self.pending.push_back(Pending::Text(text));
                    }
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if !self.tool_open {
                        return Err(ChatError::decode(
                            "input_json_delta without an open tool call",
                        ));
                    }
                    self.pending.push_back(Pending::Data(partial_json));
                }
            },
            StreamEvent::ContentBlockStop => {
                if self.tool_open {
                    self.pending.push_back(Pending::Ready);
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    // Usage arrives incrementally; reports are summed as
                    // received
                    self.usage.add(usage.into());
                }
                if let Some(reason) = delta.stop_reason {
                    if reason != "tool_use" && reason != "end_turn" {
                        return Err(ChatError::UnexpectedStop(reason));
                    }
                }
            }
            StreamEvent::MessageStop => self.done = true,
            StreamEvent::Error { error } => {
                return Err(ChatError::decode(format!(
                    "{}: {}",
                    error.kind, error.message
                )));
            }
            StreamEvent::Ping => {}
            StreamEvent::Unknown => {
                debug!("skipping unknown stream event");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderStream for AnthropicStream {
    async fn next_status(&mut self) -> Result<Option<StreamStatus>> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        loop {
            if let Some(status) = self.apply_pending() {
                return Ok(Some(status));
            }
            if self.done {
                return Ok(None);
            }
            match self.events.next().await {
                None => self.done = true,
                Some(Err(error)) => return Err(self.fail(error)),
                Some(Ok(event)) => {
                    if let Err(error) = self.ingest(&event.data) {
                        return Err(self.fail(error));
                    }
                }
            }
        }
    }

    fn message(&self) -> &Message {
        &self.message
    }

    fn last_text(&self) -> &str {
        &self.last_text
    }

    fn tool_call(&self) -> Option<&ToolCall> {
        self.message.tool_calls.last()
    }

    fn usage(&self) -> TokenUsage {
        self.usage
    }

    fn cost_usd(&self) -> f64 {
        PRICING.cost_usd(&self.model, self.usage)
    }

    fn into_message(self: Box<Self>) -> Message {
        self.message
    }
}

// ============================================================================
// Streaming event types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    ContentBlockStop,
    MessageDelta {
        delta: MessageDeltaInfo,
        #[serde(default)]
        usage: Option<ApiUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockStart {
    Text {
        #[serde(default)]
        #[allow(dead_code)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct MessageDeltaInfo {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<ApiUsage> for TokenUsage {
    fn from(usage: ApiUsage) -> Self {
        TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}
