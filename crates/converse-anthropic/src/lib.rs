// Anthropic Provider Implementation
//
// This crate provides an Anthropic Claude provider. It implements the
// Provider trait from converse-core, decoding the typed event-block
// framing (message_start / content_block_* / message_delta / message_stop)
// into the shared StreamStatus sequence.

mod pricing;
mod provider;
mod stream;

#[cfg(test)]
mod tests;

pub use provider::AnthropicProvider;
pub use stream::AnthropicStream;

// Re-export core contracts for convenience
pub use converse_core::{Provider, ProviderStream};
