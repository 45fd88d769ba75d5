// Model pricing lookup
//
// Each provider crate carries its own table of known models. Lookup tries
// an exact model-identifier match first, then the longest known prefix of
// the identifier, and prices unknown models at zero.

use crate::stream::TokenUsage;

/// Price of one model in USD per million tokens
#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    /// Model identifier, or a prefix of one
    pub model: &'static str,
    /// Input cost per million tokens
    pub input: f64,
    /// Output cost per million tokens
    pub output: f64,
}

/// A provider's table of known model prices
#[derive(Debug, Clone, Copy)]
pub struct PriceTable {
    entries: &'static [ModelPrice],
}

impl PriceTable {
    pub const fn new(entries: &'static [ModelPrice]) -> Self {
        Self { entries }
    }

    /// Cost in USD for the given usage, or zero for unknown models
    ///
    /// Exact match wins; otherwise the longest matching prefix wins, which
    /// keeps dated model identifiers priced like their base model.
    pub fn cost_usd(&self, model: &str, usage: TokenUsage) -> f64 {
        let price = self
            .entries
            .iter()
            .find(|price| price.model == model)
            .or_else(|| {
                self.entries
                    .iter()
                    .filter(|price| model.starts_with(price.model))
                    .max_by_key(|price| price.model.len())
            });

        match price {
            Some(price) => {
                usage.input_tokens as f64 * price.input / 1e6
                    + usage.output_tokens as f64 * price.output / 1e6
            }
            None => 0.0,
        }
    }
}
