//! Telegram bot handler.
//!
//! Routes inbound events to the survey flow: bot commands, plain-text
//! replies for the book-details steps, and callback queries for the
//! inline-keyboard steps. Events for different users interleave freely;
//! two rapid events for the same user (a double-tapped Apply) race on
//! that user's session entry - the store does not serialize per-user
//! access beyond one step's check-and-mutate.

// Dispatcher endpoints take their arguments owned.
#![allow(clippy::needless_pass_by_value)]

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use teloxide::utils::command::BotCommands;

use crate::config::{Config, ConverterConfig, config_path};
use crate::document::{self, Document};
use crate::error::{AssemblyError, FlowError, SubmitError};
use crate::session::{CompletedSurvey, SessionStore, SurveyStep};
use crate::survey::{self, Control, Prompt};
use crate::workflow::WorkflowClient;

/// Version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "greet the bot")]
    Start,
    #[command(description = "show available commands")]
    Help,
    #[command(description = "start a new book survey")]
    Begin,
    #[command(description = "leave the optional prompt blank")]
    Skip,
    #[command(description = "cancel the survey in progress")]
    Cancel,
    #[command(description = "check that the bot is alive")]
    Ping,
    #[command(description = "show version info")]
    Version,
}

/// Shared service state, constructed once at start and injected into every
/// handler.
struct App {
    sessions: SessionStore,
    workflow: WorkflowClient,
    converter: ConverterConfig,
    allowed_users: HashSet<u64>,
}

impl App {
    fn allows(&self, user_id: u64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }
}

pub async fn run() -> Result<()> {
    let config = Config::load()?;

    if config.telegram.bot_token.is_empty() {
        anyhow::bail!(
            "No bot token configured.\n\n\
             Set BOT_TOKEN, or add bot_token to the [telegram] section of {}",
            config_path().display()
        );
    }

    let bot = Bot::new(&config.telegram.bot_token);
    let me = bot.get_me().await.context("Failed to connect to Telegram")?;

    // Register bot commands for autocomplete.
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        tracing::warn!("Failed to register commands: {e}");
    }

    // Header with version
    println!();
    println!(
        "{} (@{}) {}",
        style(me.user.full_name()).bold(),
        style(me.username()).dim(),
        style(format!("v{VERSION}")).dim()
    );
    println!();
    println!("  Listening... {}", style("(Ctrl+C to stop)").dim());
    println!();

    let app = Arc::new(App {
        sessions: SessionStore::default(),
        workflow: WorkflowClient::from_config(&config),
        converter: config.converter.clone(),
        allowed_users: config.telegram.allowed_users.iter().copied().collect(),
    });

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![app])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Clean exit message
    println!();
    println!("  Stopped.");
    println!();

    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    app: Arc<App>,
) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if !app.allows(user.id.0) {
        return Ok(());
    }
    let chat_id = msg.chat.id;

    match cmd {
        Command::Start | Command::Help => {
            bot.send_message(chat_id, help_text()).await?;
        }
        Command::Ping => {
            bot.send_message(chat_id, "pong!!!").await?;
        }
        Command::Version => {
            bot.send_message(chat_id, format!("Bindery v{VERSION}")).await?;
        }
        Command::Begin => {
            let prompt = survey::begin(&app.sessions, user.id.0);
            send_prompt(&bot, chat_id, &prompt).await?;
        }
        Command::Skip => match survey::skip_extra(&app.sessions, user.id.0) {
            Ok(prompt) => send_prompt(&bot, chat_id, &prompt).await?,
            Err(e) => {
                bot.send_message(chat_id, flow_hint(&e)).await?;
            }
        },
        Command::Cancel => {
            let reply = if app.sessions.get(user.id.0).is_some() {
                app.sessions.remove(user.id.0);
                "Survey cancelled."
            } else {
                "Nothing to cancel."
            };
            bot.send_message(chat_id, reply).await?;
        }
    }

    Ok(())
}

/// Plain-text messages answer the book-details steps.
async fn handle_message(bot: Bot, msg: Message, app: Arc<App>) -> ResponseResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if !app.allows(user.id.0) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    // Unknown slash commands never count as survey answers.
    if text.starts_with('/') {
        bot.send_message(
            msg.chat.id,
            "I don't recognize that command. Send /help to see what I can do.",
        )
        .await?;
        return Ok(());
    }

    match survey::submit_text(&app.sessions, user.id.0, text) {
        Ok(prompt) => send_prompt(&bot, msg.chat.id, &prompt).await?,
        Err(FlowError::NoSession) => {
            bot.send_message(msg.chat.id, "Send /begin to start a book survey.")
                .await?;
        }
        Err(e @ FlowError::OutOfOrder { .. }) => {
            bot.send_message(msg.chat.id, flow_hint(&e)).await?;
        }
    }

    Ok(())
}

/// Callback queries answer the inline-keyboard steps and the Apply/Edit
/// controls on the summary.
async fn handle_callback(bot: Bot, q: CallbackQuery, app: Arc<App>) -> ResponseResult<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let user_id = q.from.id.0;
    if !app.allows(user_id) {
        return Ok(());
    }
    // Inaccessible messages cannot be edited, so they end the flow here.
    let (Some(data), Some(message)) = (q.data.as_deref(), q.regular_message()) else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let message_id = message.id;

    let Some(control) = Control::parse(data) else {
        tracing::warn!("Unrecognized control id: {data}");
        return Ok(());
    };

    match control {
        Control::Edit => {
            // Edit loops back to step one with a fresh record.
            let prompt = survey::begin(&app.sessions, user_id);
            bot.edit_message_text(
                chat_id,
                message_id,
                format!("Starting over.\n\n{}", prompt.text),
            )
            .await?;
        }
        Control::Apply => handle_apply(&bot, &app, user_id, chat_id, message_id).await?,
        Control::Choice(choice) => match survey::submit_choice(&app.sessions, user_id, choice) {
            Ok(prompt) => edit_prompt(&bot, chat_id, message_id, &prompt).await?,
            Err(e) => {
                // Stale keyboard from an earlier message; the session is
                // untouched, so just leave it be.
                tracing::debug!("Ignoring control {data} for user {user_id}: {e}");
            }
        },
    }

    Ok(())
}

/// Submit the finished survey and deliver the assembled document.
async fn handle_apply(
    bot: &Bot,
    app: &App,
    user_id: u64,
    chat_id: ChatId,
    message_id: MessageId,
) -> ResponseResult<()> {
    let Some(survey) = app.sessions.get(user_id).and_then(|s| s.complete()) else {
        bot.edit_message_text(
            chat_id,
            message_id,
            "That survey is no longer active. Send /begin to start again.",
        )
        .await?;
        return Ok(());
    };

    // In-place update strips the keyboard so Apply is gone while we work.
    bot.edit_message_text(chat_id, message_id, "Sending your book brief to the writing workflow…")
        .await?;

    let session_id = chat_id.to_string();
    match submit_and_assemble(app, &survey, &session_id).await {
        Ok(doc) => {
            bot.send_document(chat_id, InputFile::memory(doc.bytes).file_name(doc.file_name))
                .caption("✅ Here is your book")
                .await?;
            // Clear the survey only once the whole cycle has resolved.
            app.sessions.remove(user_id);
            let _ = bot
                .edit_message_text(chat_id, message_id, "✅ Done! Your book is below.")
                .await;
        }
        Err(e) => {
            tracing::error!("Submission for session {session_id} failed: {e:?}");
            let _ = bot
                .edit_message_text(chat_id, message_id, user_message(&e))
                .await;
        }
    }

    Ok(())
}

async fn submit_and_assemble(
    app: &App,
    survey: &CompletedSurvey,
    session_id: &str,
) -> Result<Document, SubmitError> {
    let text = app.workflow.submit(survey, session_id).await?;
    let doc = document::assemble(
        survey.format,
        &survey.book_title,
        &text,
        &app.converter.ebook_convert,
    )
    .await?;
    Ok(doc)
}

async fn send_prompt(bot: &Bot, chat_id: ChatId, prompt: &Prompt) -> ResponseResult<()> {
    let mut request = bot.send_message(chat_id, &prompt.text);
    if let Some(keyboard) = &prompt.keyboard {
        request = request.reply_markup(keyboard.clone());
    }
    request.await?;
    Ok(())
}

async fn edit_prompt(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    prompt: &Prompt,
) -> ResponseResult<()> {
    let mut request = bot.edit_message_text(chat_id, message_id, &prompt.text);
    if let Some(keyboard) = &prompt.keyboard {
        request = request.reply_markup(keyboard.clone());
    }
    request.await?;
    Ok(())
}

fn help_text() -> String {
    "I'm Bindery, the book-binding bot.\n\n\
     Commands:\n\
     /begin - start a new book survey\n\
     /skip - leave the optional prompt blank\n\
     /cancel - cancel the survey in progress\n\
     /ping - check that I'm alive\n\
     /version - show version info\n\
     /help - show this message\n\n\
     Send /begin and I'll walk you through a short survey, then deliver a \
     generated book in the format you pick."
        .to_string()
}

/// Point the user back at whatever the survey is actually waiting on.
fn flow_hint(error: &FlowError) -> String {
    match error {
        FlowError::NoSession => "No survey in progress. Send /begin to start one.".to_string(),
        FlowError::OutOfOrder { expected } => match expected {
            SurveyStep::Title | SurveyStep::Length | SurveyStep::ExtraPrompt => format!(
                "The survey is waiting on the {expected} step - answer with a message."
            ),
            SurveyStep::Confirm => {
                "Your survey is complete - use Apply or Edit above.".to_string()
            }
            _ => "Use the buttons above to pick an option.".to_string(),
        },
    }
}

/// Categorized, friendly messages for submission failures.
///
/// The diagnostic detail is logged for operators; the user only sees which
/// kind of thing went wrong and what to do about it.
fn user_message(error: &SubmitError) -> String {
    match error {
        SubmitError::NotConfigured => {
            "⚠️ The writing workflow is not configured. Ask the bot operator to set the webhook URL."
        }
        SubmitError::Upstream(_) => {
            "⚠️ The writing workflow could not produce your book. Please try again in a little while."
        }
        SubmitError::Assembly(AssemblyError::ConverterMissing { .. }) => {
            "⚠️ MOBI output needs Calibre's ebook-convert tool on the bot's host. Pick another format with Edit, or ask the operator to install Calibre."
        }
        SubmitError::Assembly(_) => {
            "⚠️ Your book was generated, but the file could not be assembled. Please try again."
        }
    }
    .to_string()
}
