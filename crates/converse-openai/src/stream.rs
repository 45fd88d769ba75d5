// Incremental decoder for the chat-completions stream framing
//
// Chunks address tool calls by array index: a delta for the open index
// appends argument bytes, a delta for a fresh index opens the next call.
// The framing has no explicit close event, so readiness is synthesized -
// for the previous call when a fresh index appears, and for the still-open
// call at end of stream. The [DONE] sentinel carries no payload.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use tracing::warn;

use converse_core::{
    ChatError, Message, ProviderStream, Result, StreamStatus, TokenUsage, ToolCall,
};

use crate::pricing::PRICING;
use crate::types::ChatCompletionChunk;

type SseEvents = Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event>> + Send>>;

/// Statuses produced by one chunk but not yet pulled; their effect on the
/// assembled message is applied as each one is consumed, so the accessors
/// always describe the most recently pulled status
enum Pending {
    Text(String),
    Begin(ToolCall),
    Data(String),
    Ready,
}

pub struct OpenAiStream {
    events: SseEvents,
    model: String,
    message: Message,
    last_text: String,
    usage: TokenUsage,
    pending: VecDeque<Pending>,
    open_call: bool,
    done: bool,
    error: Option<ChatError>,
}

impl OpenAiStream {
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
            open_call: false,
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
                self.open_call = true;
                Some(StreamStatus::ToolCallBegin)
            }
            Pending::Data(arguments) => {
                if let Some(call) = self.message.tool_calls.last_mut() {
                    call.arguments.push_str(&arguments);
                }
                Some(StreamStatus::ToolCallData)
            }
            Pending::Ready => {
                self.open_call = false;
                Some(StreamStatus::ToolCallReady)
            }
        }
    }

    fn ingest(&mut self, data: &str) -> Result<()> {
        // The sentinel carries no payload; the sequence ends at EOF
        if data == "[DONE]" {
            return Ok(());
        }

        let chunk: ChatCompletionChunk = serde_json::from_str(data)
            .map_err(|err| ChatError::decode(format!("error decoding chunk: {err}")))?;

        if let Some(usage) = chunk.usage {
            // Reported once, on the final chunk, as cumulative totals
            self.usage = TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            };
        } else if chunk.choices.is_empty() {
            warn!("ignoring chunk with no choices and no usage payload");
            return Ok(());
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };

        if let Some(reason) = &choice.finish_reason {
            if reason != "stop" && reason != "tool_calls" {
                return Err(ChatError::UnexpectedStop(reason.clone()));
            }
        }

        let delta = choice.delta;
        if let Some(role) = delta.role.as_deref() {
            self.message.role = role.into();
        }
        if let Some(text) = delta.content {
            if !text.is_empty() {
                self.pending.push_back(Pending::Text(text));
            }
        }

        if delta.tool_calls.len() > 1 {
            return Err(ChatError::decode(
                "received more than one tool call in a single chunk",
            ));
        }
        let Some(tool_delta) = delta.tool_calls.into_iter().next() else {
            return Ok(());
        };

        let count = self.message.tool_calls.len();
        if tool_delta.index < count {
            if tool_delta.index + 1 != count {
                return Err(ChatError::decode(format!(
                    "tool call index mismatch: got {}, open index is {}",
                    tool_delta.index,
                    count - 1
                )));
            }
            let arguments = tool_delta
                .function
                .and_then(|function| function.arguments)
                .unwrap_or_default();
            self.pending.push_back(Pending::Data(arguments));
        } else if tool_delta.index == count {
            // A fresh index implies the previous call is complete
            if self.open_call {
                self.pending.push_back(Pending::Ready);
            }
            let function = tool_delta.function.unwrap_or_default();
            self.pending.push_back(Pending::Begin(ToolCall {
                id: tool_delta.id.unwrap_or_default(),
                name: function.name.unwrap_or_default(),
                arguments: function.arguments.unwrap_or_default(),
            }));
        } else {
            return Err(ChatError::decode(format!(
                "tool call index mismatch: got {}, next index is {}",
                tool_delta.index, count
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ProviderStream for OpenAiStream {
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
                None => {
                    self.done = true;
                    if self.open_call {
                        self.pending.push_back(Pending::Ready);
                    }
                }
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
