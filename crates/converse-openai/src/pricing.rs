// Known model prices, USD per million tokens
//
// Dated model identifiers price like their base model through the prefix
// lookup, so only divergent dated entries are listed explicitly.

use converse_core::{ModelPrice, PriceTable};

pub(crate) const PRICING: PriceTable = PriceTable::new(&[
    // GPT-4o models
    ModelPrice { model: "gpt-4o", input: 2.50, output: 10.00 },
    ModelPrice { model: "gpt-4o-2024-05-13", input: 5.00, output: 15.00 },
    ModelPrice { model: "gpt-4o-realtime-preview", input: 5.00, output: 20.00 },
    ModelPrice { model: "chatgpt-4o-latest", input: 5.00, output: 15.00 },
    // GPT-4o mini models
    ModelPrice { model: "gpt-4o-mini", input: 0.15, output: 0.60 },
    ModelPrice { model: "gpt-4o-mini-realtime-preview", input: 0.60, output: 2.40 },
    // O1 models
    ModelPrice { model: "o1", input: 15.00, output: 60.00 },
    ModelPrice { model: "o1-pro", input: 150.00, output: 600.00 },
    ModelPrice { model: "o1-mini", input: 1.10, output: 4.40 },
    // O3 models
    ModelPrice { model: "o3-mini", input: 1.10, output: 4.40 },
    // GPT-4 Turbo models
    ModelPrice { model: "gpt-4-turbo", input: 10.00, output: 30.00 },
    ModelPrice { model: "gpt-4-0125-preview", input: 10.00, output: 30.00 },
    ModelPrice { model: "gpt-4-1106-preview", input: 10.00, output: 30.00 },
    // GPT-4 models
    ModelPrice { model: "gpt-4", input: 30.00, output: 60.00 },
    ModelPrice { model: "gpt-4-32k", input: 60.00, output: 120.00 },
    // GPT-3.5 models
    ModelPrice { model: "gpt-3.5-turbo", input: 0.50, output: 1.50 },
    ModelPrice { model: "gpt-3.5-turbo-1106", input: 1.00, output: 2.00 },
]);
