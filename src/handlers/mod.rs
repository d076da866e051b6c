pub mod funnel_analysis;
pub mod health;
