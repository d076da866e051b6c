use funnel_analyzer::{config::load_config_from, db};
use std::io::Write;

#[tokio::test]
async fn test_missing_config_file_uses_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = load_config_from(dir.path().join("absent.toml"))?;

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.cache.ttl_seconds, 86_400);
    assert!(config.analysis.use_plan_tier);
    Ok(())
}

#[tokio::test]
async fn test_config_file_drives_database_setup() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("nested").join("funnel.db");
    let config_path = dir.path().join("funnel.toml");

    let mut file = std::fs::File::create(&config_path)?;
    writeln!(
        file,
        r#"
[server]
port = 9090
log_format = "json"

[database]
path = "{}"

[cache]
ttl_seconds = 600

[pricing.overrides."my-model"]
input = 0.000001
output = 0.000002
"#,
        db_path.display()
    )?;

    let config = load_config_from(&config_path)?;
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.cache.ttl_seconds, 600);
    assert_eq!(config.pricing.overrides.len(), 1);

    // Connecting creates the parent directory and runs migrations
    let pool = db::connect(&config.database).await?;
    let (tables,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('analysis_cache', 'error_logs', 'feature_usage')",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(tables, 3);
    assert!(db_path.exists());

    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_values_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("bad.toml");
    std::fs::write(&config_path, "[analysis]\nmax_input_chars = 0\n")?;

    let err = load_config_from(&config_path).unwrap_err();
    assert!(err.to_string().contains("max_input_chars"));
    Ok(())
}
