use anyhow::Result;
use clap::Parser;
use toolgate_app::cli::{Cli, Command};
use toolgate_app::commands;
use toolgate_app::config::Config;
use toolgate_app::context::Toolgate;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolgate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;

    let toolgate = Toolgate::open(config).await?;
    match cli.command {
        Command::Init => commands::init::run(&toolgate, &config_path).await,
        Command::Tools { operations } => {
            commands::tools::run(&toolgate, operations);
            Ok(())
        }
        Command::Agents(command) => commands::agents::run(&toolgate, command).await,
        Command::Exec(args) => commands::exec::run(&toolgate, args).await,
        Command::Audit(command) => commands::audit::run(&toolgate, command).await,
        Command::Health => commands::health::run(&toolgate).await,
    }
}
