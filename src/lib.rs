//! Funnel analysis service.
//!
//! Accepts an ad and its landing page, asks a configured AI provider for a
//! coherence diagnosis, and caches, meters and bills the result per user.

pub mod access;
pub mod ai_config;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod error_log;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod pricing;
pub mod prompt;
pub mod providers;
pub mod server;
pub mod signals;
pub mod usage;

pub use logging::init_tracing;
