pub mod analysis;
pub mod anthropic;
pub mod openai;

pub use analysis::{FunnelAnalysis, FunnelAnalysisRequest};
