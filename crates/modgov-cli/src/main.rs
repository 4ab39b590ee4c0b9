mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let manager = commands::build_manager(cli.dev_mode);

    match cli.command {
        Command::Install { dir } => commands::install(&manager, dir).await,
        Command::DeployCanary { dir, percent } => commands::deploy_canary(&manager, dir, percent).await,
        Command::Reload { module_id } => commands::reload(&manager, module_id).await,
        Command::Uninstall { module_id } => commands::uninstall(&manager, module_id).await,
        Command::Invoke { fqsid, caller } => commands::invoke(&manager, fqsid, caller).await,
        Command::List => commands::list(&manager).await,
    }
}
