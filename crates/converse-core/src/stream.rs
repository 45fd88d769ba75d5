// Provider and stream-decoder contracts
//
// A Provider initiates one backend request and hands back a ProviderStream:
// a single-pass, non-restartable decoder bound to that response. Both
// vendor framings normalize to the same StreamStatus sequence, so the
// engine never sees vendor-specific shapes.

use async_trait::async_trait;

use crate::content::Content;
use crate::error::Result;
use crate::message::Message;
use crate::tools::{ToolCall, ToolRegistry};

/// One unit of normalized streaming progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// A non-empty text delta was appended to the assembled message;
    /// retrievable via `last_text`
    Text,
    /// A new tool call slot was opened; its id and name are now fixed
    ToolCallBegin,
    /// Bytes were appended to the open tool call's arguments
    ToolCallData,
    /// The open tool call's argument accumulation is closed; it is now
    /// safe to execute
    ToolCallReady,
}

/// Token counts as reported by the vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A stateful decoder bound to exactly one in-flight response
///
/// Pulling `next_status` is the only way to advance decode state; each
/// status corresponds to consuming one unit of vendor framing. Errors are
/// sticky: once `next_status` returns an error, iteration must stop, and
/// `message` holds the best-effort partial turn. Reaching the end with no
/// error and zero open tool calls is the success terminal state.
#[async_trait]
pub trait ProviderStream: Send {
    /// Pull the next status; `Ok(None)` is the end of the sequence
    async fn next_status(&mut self) -> Result<Option<StreamStatus>>;

    /// The in-progress (and, after the end, final) assistant message
    fn message(&self) -> &Message;

    /// The text fragment of the most recent `Text` status (a delta, not
    /// cumulative)
    fn last_text(&self) -> &str;

    /// The tool call of the most recently opened or closed slot
    fn tool_call(&self) -> Option<&ToolCall>;

    /// Token counts accumulated from vendor usage reports
    fn usage(&self) -> TokenUsage;

    /// Cost of this response in USD; zero for unrecognized models
    fn cost_usd(&self) -> f64;

    /// Hand the finished message off by value
    fn into_message(self: Box<Self>) -> Message;
}

/// A capability that initiates one backend request per call
///
/// Providers are stateless across calls except for fixed configuration
/// (endpoint, model, credentials); they hold no conversation state. Any
/// failure before the backend begins streaming is an `Err` here - the
/// engine never iterates a stream born broken.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The company operating the backend, for display
    fn company(&self) -> &str;

    /// Initiate one streaming generation request
    async fn generate(
        &self,
        system_prompt: Option<&Content>,
        history: &[Message],
        tools: Option<&ToolRegistry>,
    ) -> Result<Box<dyn ProviderStream>>;
}
