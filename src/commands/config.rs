use anyhow::Result;
use funnel_analyzer::config::Config;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration (file merged with env overrides)
pub fn show(cfg: &Config) -> Result<()> {
    println!("Current Configuration:");
    println!();
    println!("{}", render(cfg)?);

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
pub fn validate(cfg: &Config) -> Result<()> {
    println!("✓ Configuration is valid");
    println!();
    println!("Summary:");
    println!("  Pricing Overrides: {}", cfg.pricing.overrides.len());
    println!("  Cache TTL: {}s", cfg.cache.ttl_seconds);
    println!("  Metrics: {}", cfg.metrics.enabled);

    info!("Configuration validation successful");
    Ok(())
}

fn render(cfg: &Config) -> Result<String> {
    Ok(toml::to_string_pretty(cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_analyzer::config::validate_config;

    #[test]
    fn test_rendered_config_parses_back() {
        let text = render(&Config::default()).unwrap();
        assert!(text.contains("[server]"));
        assert!(text.contains("ttl_seconds = 86400"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert!(validate_config(&parsed).is_ok());
        assert_eq!(parsed.analysis.feature, "funnel_analysis");
    }
}
