//! CLI command handling for Bindery.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{Config, config_path};
use crate::ui::StatusLine;

#[derive(Parser)]
#[command(name = "bindery")]
#[command(about = "Bindery - answer a short survey, get a book back")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check configuration and external tools
    Check,
    /// Create the config file if needed and open it in $EDITOR
    Config,
}

const CONFIG_TEMPLATE: &str = r#"# Bindery configuration.

[telegram]
# Telegram bot token from @BotFather. Can also be set with BOT_TOKEN.
bot_token = ""
# User ids allowed to talk to the bot. Empty means open to everyone.
allowed_users = []

[workflow]
# Endpoint of the external writing workflow. Can also be set with WEBHOOK_URL.
# webhook_url = "https://example.com/webhook/books"

[converter]
# EPUB-to-MOBI executable used for MOBI output (part of Calibre).
ebook_convert = "ebook-convert"
"#;

/// Report the state of every concern the bot depends on.
///
/// Only a missing bot token blocks startup; the webhook URL and the MOBI
/// converter are submit-time concerns and report as warnings.
pub fn check() -> ExitCode {
    println!();

    let path = config_path();
    let mut lines = vec![if path.exists() {
        StatusLine::ok(format!("Config: {}", path.display()))
    } else {
        StatusLine::warn(format!(
            "Config: {} (not created yet, run: bindery config)",
            path.display()
        ))
    }];

    match Config::load() {
        Ok(config) => {
            lines.push(if config.telegram.bot_token.is_empty() {
                StatusLine::error("Bot token: not set (BOT_TOKEN or [telegram] bot_token)")
            } else {
                StatusLine::ok("Bot token: set")
            });

            lines.push(config.workflow.webhook_url.as_deref().map_or_else(
                || StatusLine::warn("Webhook: not configured (surveys will fail at submit)"),
                |url| StatusLine::ok(format!("Webhook: {url}")),
            ));

            let tool = &config.converter.ebook_convert;
            lines.push(if tool_on_path(tool) {
                StatusLine::ok(format!("MOBI converter: {tool}"))
            } else {
                StatusLine::warn(format!(
                    "MOBI converter: {tool} not found (MOBI surveys will fail; install Calibre)"
                ))
            });
        }
        Err(e) => lines.push(StatusLine::error(format!("Config: {e}"))),
    }

    let failed = lines.iter().any(StatusLine::is_error);
    for line in &lines {
        line.print();
    }
    println!();

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Check if an executable resolves through PATH.
fn tool_on_path(tool: &str) -> bool {
    std::process::Command::new("which")
        .arg(tool)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Create the config file on first run, print its path, and open $EDITOR
/// when one is set.
pub fn config_cmd() -> Result<()> {
    let path = config_path();

    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        std::fs::write(&path, CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    } else {
        println!("{}", path.display());
    }

    if let Ok(editor) = std::env::var("EDITOR") {
        std::process::Command::new(editor)
            .arg(&path)
            .status()
            .context("Failed to launch $EDITOR")?;
    }

    Ok(())
}
