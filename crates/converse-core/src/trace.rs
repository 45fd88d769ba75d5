// Per-step diagnostic sink
//
// The engine offers one snapshot per step to an injectable observer. The
// default is no observer; nothing in the core writes files or touches
// process-wide state.

use crate::content::Content;
use crate::message::Message;
use crate::tools::ToolSchema;

/// Everything one step saw and produced
#[derive(Debug)]
pub struct StepSnapshot<'a> {
    /// The assistant message received from the backend this step
    pub received_message: &'a Message,
    /// Tool result (and auxiliary) messages produced this step
    pub tool_results: &'a [Message],
    /// The full history as it will be sent on the next step
    pub sent_messages: &'a [Message],
    /// The system prompt used for this step, if any
    pub system_prompt: Option<&'a Content>,
    /// Tool schemas advertised to the backend
    pub tool_schemas: Vec<ToolSchema>,
}

/// Observer invoked once per completed step
pub trait StepTrace: Send + Sync {
    fn record(&self, snapshot: &StepSnapshot<'_>);
}
