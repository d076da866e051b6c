use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::pricing::ModelPricing;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub provider: ProviderDefaults,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite database path (default: "./data/funnel.db")
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Analysis result cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Entries older than this are treated as misses (default: 86400 = 24h)
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Prefix of every cache key
    #[serde(default = "default_cache_namespace")]
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
            namespace: default_cache_namespace(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Identifier looked up at the `service` configuration level
    #[serde(default = "default_service_identifier")]
    pub service_identifier: String,
    /// Feature key checked in the plan's feature map and counted in feature usage
    #[serde(default = "default_feature")]
    pub feature: String,
    /// Upper bound for each of adText / landingPageText, in characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Consult plan-level configurations between service and global
    #[serde(default = "default_use_plan_tier")]
    pub use_plan_tier: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            service_identifier: default_service_identifier(),
            feature: default_feature(),
            max_input_chars: default_max_input_chars(),
            use_plan_tier: default_use_plan_tier(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderDefaults {
    /// Used when a provider row has no timeout of its own
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            default_timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PricingConfig {
    /// Model name -> per-token prices, checked before the built-in table
    #[serde(default)]
    pub overrides: HashMap<String, ModelPricing>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Expose Prometheus metrics on /metrics (default: true)
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_database_path() -> String {
    "./data/funnel.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_cache_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_cache_namespace() -> String {
    "funnel_analysis".to_string()
}

fn default_service_identifier() -> String {
    "funnel_analysis".to_string()
}

fn default_feature() -> String {
    "funnel_analysis".to_string()
}

fn default_max_input_chars() -> usize {
    20_000
}

fn default_use_plan_tier() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_metrics_enabled() -> bool {
    true
}

/// Load configuration from `config.toml` (optional) and `FUNNEL_ANALYZER__*` env vars
pub fn load_config() -> anyhow::Result<Config> {
    load_config_from("config")
}

/// Load configuration from a file stem or path, then apply env overrides
pub fn load_config_from(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("FUNNEL_ANALYZER").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        anyhow::bail!("server.port must be greater than 0");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("server.log_format must be 'text' or 'json', got '{}'", other),
    }

    if cfg.server.max_body_bytes == 0 {
        anyhow::bail!("server.max_body_bytes must be greater than 0");
    }

    if cfg.database.path.trim().is_empty() {
        anyhow::bail!("database.path cannot be empty");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be greater than 0");
    }

    if cfg.cache.ttl_seconds == 0 {
        anyhow::bail!("cache.ttl_seconds must be greater than 0");
    }

    if cfg.cache.namespace.trim().is_empty() {
        anyhow::bail!("cache.namespace cannot be empty");
    }

    if cfg.analysis.service_identifier.trim().is_empty() {
        anyhow::bail!("analysis.service_identifier cannot be empty");
    }

    if cfg.analysis.feature.trim().is_empty() {
        anyhow::bail!("analysis.feature cannot be empty");
    }

    if cfg.analysis.max_input_chars == 0 {
        anyhow::bail!("analysis.max_input_chars must be greater than 0");
    }

    if cfg.provider.default_timeout_seconds == 0 {
        anyhow::bail!("provider.default_timeout_seconds must be greater than 0");
    }

    for (model, price) in &cfg.pricing.overrides {
        if price.input < 0.0 || price.output < 0.0 {
            anyhow::bail!("pricing override for '{}' cannot be negative", model);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.cache.ttl_seconds, 86_400);
        assert_eq!(cfg.cache.namespace, "funnel_analysis");
        assert_eq!(cfg.analysis.service_identifier, "funnel_analysis");
        assert!(cfg.analysis.use_plan_tier);
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut cfg = Config::default();
        cfg.cache.ttl_seconds = 0;

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cache.ttl_seconds"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut cfg = Config::default();
        cfg.server.log_format = "xml".to_string();

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("log_format"));
    }

    #[test]
    fn test_validate_rejects_negative_price_override() {
        let mut cfg = Config::default();
        cfg.pricing.overrides.insert(
            "custom-model".to_string(),
            ModelPricing {
                input: -1.0,
                output: 0.0,
            },
        );

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("custom-model"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[cache]
ttl_seconds = 3600

[pricing.overrides."my-model"]
input = 0.000001
output = 0.000002
"#
        )
        .unwrap();

        let cfg = load_config_from(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.cache.ttl_seconds, 3600);
        assert_eq!(cfg.cache.namespace, "funnel_analysis");
        assert_eq!(cfg.pricing.overrides["my-model"].output, 0.000002);
    }

    #[test]
    fn test_load_config_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.database.path, "./data/funnel.db");
    }
}
