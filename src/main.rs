use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use funnel_analyzer::{config, logging::init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.get_command();

    if let cli::Commands::Version = command {
        println!("funnel-analyzer v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration before tracing so the log settings apply
    let cfg = config::load_config_from(&args.config)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    match command {
        cli::Commands::Start => commands::start::execute(cfg, args.config).await?,
        cli::Commands::Test => commands::test::execute(&cfg)?,
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&cfg)?,
            cli::ConfigCommands::Validate => commands::config::validate(&cfg)?,
        },
        // Handled before configuration is loaded
        cli::Commands::Version => {}
    }

    Ok(())
}
