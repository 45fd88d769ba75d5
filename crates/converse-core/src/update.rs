// Updates delivered to the caller during a chat call
//
// Updates arrive in causal order: all of a turn's text deltas precede that
// turn's tool lifecycle updates, because a turn's content is fully
// assembled before its trailing tool calls are executed.

use crate::error::ChatError;
use crate::tools::{ToolOutcome, ToolRef};

/// An externally observable progress event emitted during a chat call
#[derive(Debug)]
pub enum Update {
    /// A fragment of assistant text, in stream order
    TextDelta { text: String },

    /// The backend opened a call to the given tool
    ToolStart { tool: ToolRef },

    /// A progress report from a running tool
    ToolStatus { tool: ToolRef, status: String },

    /// A tool finished; its result has been recorded in history
    ToolDone { tool: ToolRef, result: ToolOutcome },

    /// The chat call failed; no further updates will follow
    Error { error: ChatError },
}
