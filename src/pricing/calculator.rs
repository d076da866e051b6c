use crate::pricing::models::{CostBreakdown, ModelPricing};
use std::collections::HashMap;
use tracing::debug;

/// Prices applied to models that are neither overridden nor in the built-in table
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(0.000_001_0, 0.000_002_0);

/// Decimal places kept in reported costs
const COST_DECIMALS: i32 = 6;

/// Built-in USD per-token prices
const PRICE_TABLE: &[(&str, ModelPricing)] = &[
    ("gpt-4o", ModelPricing::new(0.000_005_0, 0.000_015_0)),
    ("gpt-4o-mini", ModelPricing::new(0.000_000_15, 0.000_000_60)),
    ("gpt-4-turbo", ModelPricing::new(0.000_010_0, 0.000_030_0)),
    ("gpt-4", ModelPricing::new(0.000_030_0, 0.000_060_0)),
    ("gpt-3.5-turbo", ModelPricing::new(0.000_000_50, 0.000_001_50)),
    ("claude-3-5-sonnet", ModelPricing::new(0.000_003_0, 0.000_015_0)),
    ("claude-3-5-haiku", ModelPricing::new(0.000_000_80, 0.000_004_0)),
    ("claude-3-opus", ModelPricing::new(0.000_015_0, 0.000_075_0)),
    ("claude-3-haiku", ModelPricing::new(0.000_000_25, 0.000_001_25)),
];

/// Round a USD amount to the reporting precision
pub fn round_cost(value: f64) -> f64 {
    let factor = 10f64.powi(COST_DECIMALS);
    (value * factor).round() / factor
}

/// Maps (model, tokens in, tokens out) to an estimated cost
#[derive(Debug, Clone, Default)]
pub struct CostModel {
    overrides: HashMap<String, ModelPricing>,
}

impl CostModel {
    /// Cost model using only the built-in table
    pub fn new() -> Self {
        Self::default()
    }

    /// Cost model whose overrides take precedence over the built-in table
    pub fn with_overrides(overrides: HashMap<String, ModelPricing>) -> Self {
        Self { overrides }
    }

    /// Resolve prices for a model.
    ///
    /// Exact names win, then the longest known prefix (so dated snapshots such as
    /// `gpt-4o-2024-08-06` price like `gpt-4o`), then [`DEFAULT_PRICING`].
    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        if let Some(price) = self.overrides.get(model) {
            return *price;
        }
        if let Some((_, price)) = PRICE_TABLE.iter().find(|(name, _)| *name == model) {
            return *price;
        }

        let best_prefix = self
            .overrides
            .iter()
            .map(|(name, price)| (name.as_str(), *price))
            .chain(PRICE_TABLE.iter().copied())
            .filter(|(name, _)| model.starts_with(name))
            .max_by_key(|(name, _)| name.len());

        match best_prefix {
            Some((_, price)) => price,
            None => {
                debug!(model = %model, "No pricing for model, using default prices");
                DEFAULT_PRICING
            }
        }
    }

    /// Per-component cost, each rounded to the reporting precision
    pub fn breakdown(&self, model: &str, input_tokens: u32, output_tokens: u32) -> CostBreakdown {
        let price = self.pricing_for(model);
        let input_cost = f64::from(input_tokens) * price.input;
        let output_cost = f64::from(output_tokens) * price.output;

        CostBreakdown {
            input_cost: round_cost(input_cost),
            output_cost: round_cost(output_cost),
            total_cost: round_cost(input_cost + output_cost),
        }
    }

    /// `input_tokens * price_in + output_tokens * price_out`, rounded
    pub fn cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.breakdown(model, input_tokens, output_tokens).total_cost
    }
}
