// Known model prices, USD per million tokens
//
// Entries are base-model prefixes; dated identifiers such as
// claude-3-5-sonnet-20241022 price through the prefix lookup.

use converse_core::{ModelPrice, PriceTable};

pub(crate) const PRICING: PriceTable = PriceTable::new(&[
    // Claude 3.7 models
    ModelPrice { model: "claude-3-7-sonnet", input: 3.00, output: 15.00 },
    // Claude 3.5 models
    ModelPrice { model: "claude-3-5-sonnet", input: 3.00, output: 15.00 },
    ModelPrice { model: "claude-3-5-haiku", input: 0.80, output: 4.00 },
    // Claude 3 models
    ModelPrice { model: "claude-3-opus", input: 15.00, output: 75.00 },
    ModelPrice { model: "claude-3-sonnet", input: 3.00, output: 15.00 },
    ModelPrice { model: "claude-3-haiku", input: 0.25, output: 1.25 },
]);
