// Tool contracts and the in-memory registry
//
// The engine treats tools as a collaborator: it looks a tool up when the
// backend opens a call, advertises schemas to providers, and invokes the
// tool once the call's arguments are complete. Tool-layer failures
// (including malformed argument JSON) are in-band: they come back as an
// error-shaped result, not as an engine error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A tool call requested by the backend, embedded in an assistant turn
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned ID; may be empty, in which case the tool name is
    /// the correlation key
    #[serde(default)]
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Raw JSON text, accumulated incrementally while streaming
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    /// The key a tool result message is correlated by
    pub fn correlation_id(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

/// Schema advertised to the backend for one tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments
    pub parameters: Value,
}

/// Lightweight descriptor carried in updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRef {
    pub name: String,
    pub label: String,
}

/// A named image artifact produced by a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolImage {
    pub name: String,
    /// Image reference, usually a data: URL
    pub url: String,
}

/// The result of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    json: Value,
    images: Vec<ToolImage>,
}

impl ToolOutcome {
    /// A successful result carrying the given JSON value
    pub fn success(json: Value) -> Self {
        Self {
            json,
            images: Vec::new(),
        }
    }

    /// An error-shaped result; the backend sees it like any other result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            json: json!({ "error": message.into() }),
            images: Vec::new(),
        }
    }

    /// Attach a named image artifact
    pub fn with_image(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.images.push(ToolImage {
            name: name.into(),
            url: url.into(),
        });
        self
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    pub fn images(&self) -> &[ToolImage] {
        &self.images
    }

    pub fn is_error(&self) -> bool {
        self.json.get("error").is_some()
    }
}

/// Per-invocation context handed to a running tool
pub struct ToolContext {
    /// Cancellation signal for the surrounding chat call
    pub cancel: CancellationToken,
    status: mpsc::Sender<String>,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, status: mpsc::Sender<String>) -> Self {
        Self { cancel, status }
    }

    /// Report a human-readable progress status; surfaced to the caller as
    /// a `ToolStatus` update. Dropped silently if nobody is listening.
    pub async fn report(&self, status: impl Into<String>) {
        let _ = self.status.send(status.into()).await;
    }
}

/// A named capability the backend can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema advertised to the backend
    fn schema(&self) -> ToolSchema;

    /// Human-readable label for progress display
    fn label(&self) -> String {
        self.schema().name
    }

    /// Execute the tool. Errors are folded into an error-shaped result by
    /// the registry.
    async fn run(&self, ctx: &ToolContext, arguments: Value) -> anyhow::Result<ToolOutcome>;
}

/// In-memory tool registry
///
/// Lookup and invocation surface used by the engine; `schemas` is consumed
/// by providers to advertise tool-call capability to the backend.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Later registrations win lookups over earlier ones
    /// with the same name.
    pub fn add(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(0, Arc::new(tool));
    }

    /// Look up a tool descriptor by name
    pub fn get(&self, name: &str) -> Option<ToolRef> {
        self.find(name).map(|tool| ToolRef {
            name: name.to_string(),
            label: tool.label(),
        })
    }

    /// Schemas for every registered tool, in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().rev().map(|tool| tool.schema()).collect()
    }

    /// Invoke a tool with raw JSON arguments
    ///
    /// All failure modes come back in-band: an unknown name, argument text
    /// that is not valid JSON, and errors returned by the tool itself.
    pub async fn run(&self, ctx: &ToolContext, name: &str, arguments: &str) -> ToolOutcome {
        let Some(tool) = self.find(name) else {
            return ToolOutcome::error(format!("tool {name:?} not found"));
        };
        let arguments: Value = match serde_json::from_str(if arguments.is_empty() {
            "{}"
        } else {
            arguments
        }) {
            Ok(value) => value,
            Err(err) => return ToolOutcome::error(format!("invalid arguments JSON: {err}")),
        };
        match tool.run(ctx, arguments).await {
            Ok(outcome) => outcome,
            Err(err) => ToolOutcome::error(err.to_string()),
        }
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.schema().name == name)
    }
}
