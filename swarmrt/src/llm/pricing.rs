//! Hard-coded per-model price table and cost accounting.
//!
//! Matches the reference implementation's `MODEL_PRICING` table: dollars
//! per 1K tokens, `(input, output)`. Unknown models fall back to the
//! most-expensive-tier default rather than erroring, so cost accounting
//! never blocks a response on an unrecognized model string.

use super::types::TokenUsage;

const DEFAULT_PRICE: (f64, f64) = (0.01, 0.03);

fn price_table(model: &str) -> (f64, f64) {
    match model {
        // OpenAI
        "gpt-4o" => (0.005, 0.015),
        "gpt-4o-mini" => (0.00015, 0.0006),
        "gpt-4-turbo" => (0.01, 0.03),
        "gpt-3.5-turbo" => (0.0005, 0.0015),
        // Anthropic
        "claude-3-opus" => (0.015, 0.075),
        "claude-3-sonnet" => (0.003, 0.015),
        "claude-3.5-sonnet" => (0.003, 0.015),
        "claude-3-haiku" => (0.00025, 0.00125),
        "claude-3.5-haiku" => (0.00025, 0.00125),
        _ => DEFAULT_PRICE,
    }
}

/// Compute dollar cost for a usage record against a model's price table.
pub fn calculate_cost(model: &str, usage: TokenUsage) -> f64 {
    let (input_per_1k, output_per_1k) = price_table(model);
    let input_cost = (usage.prompt_tokens as f64 / 1000.0) * input_per_1k;
    let output_cost = (usage.completion_tokens as f64 / 1000.0) * output_per_1k;
    input_cost + output_cost
}

/// Cheap token-count fallback for when a provider response omits usage:
/// roughly 4 characters per token (an estimate only, never exact).
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() as f64) / 4.0).ceil() as u32
}
