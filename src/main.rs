use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info, LevelFilter};
use tokio::sync::Mutex;

use studydesk::{App, Cli, Config, DeskState, Result};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp_secs().format_module_path(true);
    // Dependency chatter stays out of verbose output
    builder.filter_module("reqwest", LevelFilter::Warn);
    builder.filter_module("hyper_util", LevelFilter::Warn);
    builder.init();

    info!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    let mut desk = DeskState::open(&config)?;
    desk.load();
    let desk = Arc::new(Mutex::new(desk));

    let app = App::new(desk.clone(), config, config_path, cli.verbose);
    let outcome = app.run(cli.command).await;

    // Mutations persist as they happen; this catches anything left over
    if let Err(e) = desk.lock().await.save() {
        error!("Failed to save data on exit: {}", e);
    }
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);
    info!("Application starting up");

    let result = run(cli).await;

    info!("Application shutting down");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", console::style("Error:").red().bold(), e.user_message());
            ExitCode::FAILURE
        }
    }
}
