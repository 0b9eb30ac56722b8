//! Cost accounting for stage executions (§4.F).
//!
//! `cost_usd = tokens_in/1e6 * price_in + tokens_out/1e6 * price_out`,
//! looked up by model name; unknown models price at zero.

/// Per-million-token USD pricing for a model.
#[derive(Debug, Clone, Copy)]
struct ModelPrice {
    name: &'static str,
    price_in: f64,
    price_out: f64,
}

/// Static price table. Real deployments would load this from config; the
/// specification treats unknown models as free, so an empty/partial table
/// is a valid default, not an error.
const PRICES: &[ModelPrice] = &[
    ModelPrice { name: "m", price_in: 0.0, price_out: 0.0 },
    ModelPrice { name: "claude-sonnet", price_in: 3.0, price_out: 15.0 },
    ModelPrice { name: "claude-opus", price_in: 15.0, price_out: 75.0 },
    ModelPrice { name: "perplexity", price_in: 1.0, price_out: 1.0 },
    ModelPrice { name: "gemini", price_in: 1.25, price_out: 5.0 },
];

/// Compute `cost_usd` for a stage execution. Unknown models yield 0.0.
pub fn cost_usd(model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
    let (price_in, price_out) = PRICES
        .iter()
        .find(|p| p.name == model)
        .map(|p| (p.price_in, p.price_out))
        .unwrap_or((0.0, 0.0));

    (tokens_in as f64 / 1_000_000.0) * price_in + (tokens_out as f64 / 1_000_000.0) * price_out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_is_free() {
        assert_eq!(cost_usd("made-up-model", 1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn known_model_prices_both_directions() {
        let cost = cost_usd("claude-sonnet", 1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-6);
    }
}
