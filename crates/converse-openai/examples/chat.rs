// One-shot chat against the live API
//
// Usage: OPENAI_API_KEY=... cargo run --example chat

use async_trait::async_trait;
use converse_core::{
    Content, Conversation, Tool, ToolContext, ToolOutcome, ToolSchema, Update,
};
use converse_openai::OpenAiProvider;
use futures::StreamExt;
use serde_json::{json, Value};

struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "current_time".to_string(),
            description: "Returns the current UTC time as a unix timestamp".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    async fn run(&self, ctx: &ToolContext, _arguments: Value) -> anyhow::Result<ToolOutcome> {
        ctx.report("reading the clock").await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs();
        Ok(ToolOutcome::success(json!({ "unix_time": now })))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let provider = OpenAiProvider::from_env("gpt-4o-mini")?;
    let mut conversation = Conversation::new(provider);
    conversation.add_tool(CurrentTimeTool);
    conversation.set_system_prompt(|| Content::from_text("Answer in one short sentence."));

    let mut updates = conversation.chat("What time is it right now?");
    while let Some(update) = updates.next().await {
        match update {
            Update::TextDelta { text } => print!("{text}"),
            Update::ToolStart { tool } => println!("[calling {}]", tool.name),
            Update::ToolStatus { status, .. } => println!("[{status}]"),
            Update::ToolDone { tool, .. } => println!("[{} done]", tool.name),
            Update::Error { error } => eprintln!("error: {error}"),
        }
    }
    drop(updates);

    println!("\n(total cost: ${:.6})", conversation.total_cost());
    Ok(())
}
