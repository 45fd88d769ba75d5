// Conversation engine
//
// Conversation owns the append-only message history and drives the step
// loop: stream one assistant turn, execute any tool calls it requested,
// append the results, and repeat until the backend stops calling tools.
//
// Concurrency shape: the update sequence returned by `chat` is the outer
// supervisory task - the sole writer of history and the sole publisher of
// updates. Per step, the decoder is drained on a spawned inner task that
// forwards owned events over a bounded channel; its join handle doubles as
// the completion signal and its return value as the error slot. Finished
// messages are handed across that boundary by value and never mutated
// after the handoff.

use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::content::Content;
use crate::error::{ChatError, Result};
use crate::message::{Message, MessageRole};
use crate::stream::{Provider, ProviderStream, StreamStatus};
use crate::tools::{ToolCall, ToolContext, ToolOutcome, ToolRef, ToolRegistry};
use crate::trace::{StepSnapshot, StepTrace};
use crate::update::Update;

type SystemPromptFn = dyn Fn() -> Content + Send + Sync;

/// A multi-turn, tool-augmented conversation against one provider
///
/// Not safe for concurrent chat invocations: `chat` borrows the
/// conversation exclusively, so at most one step loop can be active at a
/// time.
pub struct Conversation {
    provider: Box<dyn Provider>,
    registry: Option<ToolRegistry>,
    messages: Vec<Message>,
    total_cost: f64,
    system_prompt: Option<Box<SystemPromptFn>>,
    trace: Option<Arc<dyn StepTrace>>,
}

impl Conversation {
    /// Create a conversation with no tools
    pub fn new(provider: impl Provider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            registry: None,
            messages: Vec::new(),
            total_cost: 0.0,
            system_prompt: None,
            trace: None,
        }
    }

    /// Register a tool the backend may call
    pub fn add_tool(&mut self, tool: impl crate::tools::Tool + 'static) {
        self.registry.get_or_insert_with(ToolRegistry::new).add(tool);
    }

    /// Set the system prompt resolver; it is re-evaluated before every
    /// step, so the prompt may change over the course of a conversation
    pub fn set_system_prompt(&mut self, prompt: impl Fn() -> Content + Send + Sync + 'static) {
        self.system_prompt = Some(Box::new(prompt));
    }

    /// Install a per-step diagnostic sink
    pub fn set_trace(&mut self, trace: Arc<dyn StepTrace>) {
        self.trace = Some(trace);
    }

    /// Accumulated cost of the conversation so far, in USD
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// The conversation history
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Send a text message and stream back updates until the backend stops
    /// calling tools
    pub fn chat(&mut self, text: impl Into<String>) -> BoxStream<'_, Update> {
        self.chat_content(Content::from_text(text), CancellationToken::new())
    }

    /// Send a message (which may contain images) and stream back updates.
    /// The token cancels the exchange at the next opportunity; callers
    /// impose deadlines by cancelling it themselves.
    pub fn chat_content(
        &mut self,
        content: Content,
        cancel: CancellationToken,
    ) -> BoxStream<'_, Update> {
        self.messages.push(Message::user(content));

        Box::pin(stream! {
            loop {
                if cancel.is_cancelled() {
                    yield Update::Error { error: ChatError::Cancelled };
                    return;
                }

                let system_prompt = self.system_prompt.as_ref().map(|prompt| prompt());

                let provider_stream = match self
                    .provider
                    .generate(system_prompt.as_ref(), &self.messages, self.registry.as_ref())
                    .await
                {
                    Ok(provider_stream) => provider_stream,
                    Err(error) => {
                        yield Update::Error { error };
                        return;
                    }
                };

                // Drain the decoder on its own task so cancellation never
                // waits on a slow network read.
                let (event_tx, mut event_rx) = mpsc::channel(1);
                let drain = tokio::spawn(drain_stream(provider_stream, event_tx));

                let mut ready_calls: Vec<(ToolRef, ToolCall)> = Vec::new();
                let mut step_failed: Option<ChatError> = None;

                loop {
                    let drained = tokio::select! {
                        _ = cancel.cancelled() => Drained::Cancelled,
                        event = event_rx.recv() => Drained::Event(event),
                    };
                    match drained {
                        Drained::Cancelled => {
                            drain.abort();
                            yield Update::Error { error: ChatError::Cancelled };
                            return;
                        }
                        Drained::Event(Some(StepEvent::Text(text))) => {
                            yield Update::TextDelta { text };
                        }
                        Drained::Event(Some(StepEvent::ToolCallBegin(call))) => {
                            match self.lookup_tool(&call.name) {
                                Some(tool) => yield Update::ToolStart { tool },
                                None => {
                                    step_failed = Some(ChatError::UnknownTool(call.name));
                                    break;
                                }
                            }
                        }
                        Drained::Event(Some(StepEvent::ToolCallReady(call))) => {
                            match self.lookup_tool(&call.name) {
                                Some(tool) => ready_calls.push((tool, call)),
                                None => {
                                    step_failed = Some(ChatError::UnknownTool(call.name));
                                    break;
                                }
                            }
                        }
                        Drained::Event(None) => break,
                    }
                }

                if let Some(error) = step_failed {
                    // The step is unusable; drop the decoder and discard
                    // the partial turn.
                    drain.abort();
                    yield Update::Error { error };
                    return;
                }

                // The drain task wrote its outcome before closing the
                // event channel, so this resolves immediately.
                let outcome = match drain.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(error)) => {
                        yield Update::Error { error };
                        return;
                    }
                    Err(join_error) => {
                        yield Update::Error {
                            error: ChatError::decode(format!("stream task failed: {join_error}")),
                        };
                        return;
                    }
                };

                debug!(
                    company = self.provider.company(),
                    cost_usd = outcome.cost,
                    tool_calls = ready_calls.len(),
                    "assistant turn complete"
                );

                let assistant_index = self.messages.len();
                self.messages.push(outcome.message);

                // Tool calls run only after the whole turn - including any
                // text trailing a call - has been captured, sequentially
                // and in the order they became ready.
                let ran_tools = !ready_calls.is_empty();
                let mut tool_messages: Vec<Message> = Vec::new();
                for (tool, call) in ready_calls {
                    let call_id = call.correlation_id().to_string();

                    let duplicate = self
                        .messages
                        .iter()
                        .any(|message| message.tool_call_id.as_deref() == Some(call_id.as_str()));

                    let result = if duplicate {
                        warn!(
                            id = %call_id,
                            tool = %call.name,
                            "tool call has already been run; skipping duplicate"
                        );
                        ToolOutcome::error(format!(
                            "duplicate tool call {call_id:?}; its result is already in the conversation"
                        ))
                    } else {
                        // The registry was used to resolve the tool, so it
                        // is present here.
                        let Some(registry) = self.registry.as_ref() else {
                            break;
                        };
                        let (status_tx, mut status_rx) = mpsc::channel(1);
                        let ctx = ToolContext::new(cancel.clone(), status_tx);
                        let run = registry.run(&ctx, &call.name, &call.arguments);
                        tokio::pin!(run);
                        let result = loop {
                            let progress = tokio::select! {
                                Some(status) = status_rx.recv() => RunProgress::Status(status),
                                outcome = &mut run => RunProgress::Finished(outcome),
                            };
                            match progress {
                                RunProgress::Status(status) => {
                                    yield Update::ToolStatus { tool: tool.clone(), status };
                                }
                                RunProgress::Finished(result) => break result,
                            }
                        };
                        // Statuses reported just before the tool returned
                        // may still be queued.
                        while let Ok(status) = status_rx.try_recv() {
                            yield Update::ToolStatus { tool: tool.clone(), status };
                        }
                        result
                    };

                    yield Update::ToolDone { tool, result: result.clone() };

                    tool_messages.push(Message::tool_result(
                        call_id,
                        Content::from_raw_json(result.json().clone()),
                    ));

                    let images = result.images();
                    if !images.is_empty() {
                        // Tool messages can't carry image content on the
                        // wire, so the images ride along in a synthetic
                        // user message.
                        // TODO: Name every image in the text, not just the first.
                        let mut content = Content::from_text(format!(
                            "Here is {}. This is an automated message, not actually from the user.",
                            images[0].name
                        ));
                        for image in images {
                            content.add_image(image.url.clone());
                        }
                        tool_messages.push(Message::user(content));
                    }
                }

                // The wire protocol expects tool results directly after the
                // assistant turn that requested them; auxiliary messages
                // come after. The sort is stable, so each subgroup keeps
                // its order.
                tool_messages.sort_by_key(|message| message.role != MessageRole::Tool);

                let batch_start = self.messages.len();
                self.messages.extend(tool_messages);
                self.total_cost += outcome.cost;

                if let Some(trace) = &self.trace {
                    trace.record(&StepSnapshot {
                        received_message: &self.messages[assistant_index],
                        tool_results: &self.messages[batch_start..],
                        sent_messages: &self.messages,
                        system_prompt: system_prompt.as_ref(),
                        tool_schemas: self
                            .registry
                            .as_ref()
                            .map(ToolRegistry::schemas)
                            .unwrap_or_default(),
                    });
                }

                // The backend should look at the tool results, so keep
                // going; otherwise the conversation awaits external input.
                if !ran_tools {
                    return;
                }
            }
        })
    }

    fn lookup_tool(&self, name: &str) -> Option<ToolRef> {
        self.registry.as_ref().and_then(|registry| registry.get(name))
    }
}

enum Drained {
    Cancelled,
    Event(Option<StepEvent>),
}

enum RunProgress {
    Status(String),
    Finished(ToolOutcome),
}

/// Owned events forwarded from the drain task to the step loop
enum StepEvent {
    Text(String),
    ToolCallBegin(ToolCall),
    ToolCallReady(ToolCall),
}

/// Values handed off once a decode completes; never mutated afterwards
struct StepOutcome {
    message: Message,
    cost: f64,
}

async fn drain_stream(
    mut provider_stream: Box<dyn ProviderStream>,
    events: mpsc::Sender<StepEvent>,
) -> Result<StepOutcome> {
    loop {
        let status = provider_stream.next_status().await?;
        let event = match status {
            None => break,
            Some(StreamStatus::Text) => {
                Some(StepEvent::Text(provider_stream.last_text().to_string()))
            }
            Some(StreamStatus::ToolCallBegin) => {
                let call = provider_stream
                    .tool_call()
                    .cloned()
                    .ok_or_else(|| ChatError::decode("tool call begin without a tool call"))?;
                Some(StepEvent::ToolCallBegin(call))
            }
            // Argument bytes accumulate inside the decoder; the loop only
            // cares about complete calls.
            Some(StreamStatus::ToolCallData) => None,
            Some(StreamStatus::ToolCallReady) => {
                let call = provider_stream
                    .tool_call()
                    .cloned()
                    .ok_or_else(|| ChatError::decode("tool call ready without a tool call"))?;
                Some(StepEvent::ToolCallReady(call))
            }
        };
        if let Some(event) = event {
            if events.send(event).await.is_err() {
                // The step loop went away; it either failed or was
                // cancelled, so the outcome would be discarded anyway.
                return Err(ChatError::Cancelled);
            }
        }
    }

    Ok(StepOutcome {
        cost: provider_stream.cost_usd(),
        message: provider_stream.into_message(),
    })
}
