use clap::Parser;
use predictor_engine::cli::{Cli, Commands};
use predictor_engine::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            let mut config: Config = toml::from_str(include_str!("../config.toml.example"))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
    };

    predictor_engine::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(bots = args.bots, "Starting round engine");
            args.execute(&config).await?;
        }
        Commands::Leaderboard(args) => args.execute(&config).await?,
        Commands::Compact(args) => args.execute(&config).await?,
        Commands::Config => {
            println!("Current configuration:");
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
