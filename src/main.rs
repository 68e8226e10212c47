use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;

use nse_bias_engine::app_config::{AppConfig, RunMode};
use nse_bias_engine::logging;
use nse_bias_engine::notifier::notifier_from_env;
use nse_bias_engine::nse::{EngineConfig, Engine, NSEClient, NSECommands, StateStore};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let app = AppConfig::from_env()?;
    if let Err(e) = app.validate() {
        println!("{} {:#}", "Invalid configuration:".red().bold(), e);
        NSECommands::print_usage();
        return Err(e);
    }
    let config = EngineConfig::from_env().context("Invalid engine configuration")?;

    let engine = Engine {
        source: Arc::new(NSEClient::new()?),
        notifier: notifier_from_env(),
        state: StateStore::new(&app.instruments, app.max_history).into_shared(),
        config: Arc::new(config),
        ignore_market_hours: app.ignore_market_hours,
    };

    match app.mode {
        RunMode::Once => NSECommands::run_once(&app, &engine).await?,
        RunMode::Watch => NSECommands::run_watch(app, engine).await?,
        RunMode::Server => NSECommands::run_server(app, engine).await?,
    }

    Ok(())
}
