use clap::Parser;
use trend_pullback::cli::{Cli, Commands};
use trend_pullback::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize telemetry
    trend_pullback::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(portfolios = config.portfolios.len(), "Starting paper trading");
            args.execute(config).await?;
        }
        Commands::Replay(args) => {
            tracing::info!("Starting replay");
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
