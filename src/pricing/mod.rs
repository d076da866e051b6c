pub mod calculator;
pub mod models;

pub use calculator::{round_cost, CostModel, DEFAULT_PRICING};
pub use models::{CostBreakdown, ModelPricing};
