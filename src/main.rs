mod bot;
mod cli;
mod config;
mod document;
mod error;
mod session;
mod survey;
mod ui;
mod workflow;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt::init();
    }

    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Some(Command::Check) => Ok(cli::check()),
        Some(Command::Config) => {
            cli::config_cmd()?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            bot::run().await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
