use anyhow::Result;
use funnel_analyzer::{config::Config, server};
use std::path::PathBuf;
use tracing::info;

/// Execute the start command
///
/// Runs the server in the foreground until SIGTERM or SIGINT.
pub async fn execute(cfg: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config = %config_path.display(),
        "Starting funnel analyzer in foreground mode"
    );

    server::start_server(cfg, config_path).await
}
