//! The six-step survey flow.
//!
//! A survey walks one fixed path: book details (title, length, optional
//! prompt) as plain-text replies, then writing style, bot mode, engagement
//! level, book format, and citation format as inline-keyboard choices, then
//! a summary with Apply/Edit. Every submission checks the step the session
//! is waiting on; answers for any other step are rejected and leave the
//! session untouched.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::error::FlowError;
use crate::session::{
    BookFormat, BotMode, CitationFormat, EngagementLevel, SessionStore, SurveyStep, WritingStyle,
};

/// The UI payload for one step: message text plus an optional keyboard.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Prompt {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }
}

/// A parsed callback control id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Choice(Choice),
    Apply,
    Edit,
}

/// One answer delivered by an inline-keyboard button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Style(WritingStyle),
    Mode(BotMode),
    Engagement(EngagementLevel),
    Format(BookFormat),
    Citation(CitationFormat),
}

impl Choice {
    /// The step this answer belongs to.
    #[must_use]
    pub const fn step(self) -> SurveyStep {
        match self {
            Self::Style(_) => SurveyStep::WritingStyle,
            Self::Mode(_) => SurveyStep::BotMode,
            Self::Engagement(_) => SurveyStep::Engagement,
            Self::Format(_) => SurveyStep::Format,
            Self::Citation(_) => SurveyStep::Citation,
        }
    }
}

impl Control {
    /// Parse callback data into a control. Unrecognized ids yield `None`;
    /// unrecognized book-format values fall back to EPUB per
    /// `BookFormat::from_wire`.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "apply" => return Some(Self::Apply),
            "edit" => return Some(Self::Edit),
            _ => {}
        }

        let (kind, value) = data.split_once(':')?;
        let choice = match kind {
            "style" => Choice::Style(WritingStyle::from_wire(value)?),
            "mode" => Choice::Mode(BotMode::from_wire(value)?),
            "engagement" => Choice::Engagement(EngagementLevel::from_wire(value)?),
            "format" => Choice::Format(BookFormat::from_wire(value)),
            "citation" => Choice::Citation(CitationFormat::from_wire(value)?),
            _ => return None,
        };
        Some(Self::Choice(choice))
    }
}

/// Start (or restart) the survey for a user, replacing any prior session.
pub fn begin(store: &SessionStore, user_id: u64) -> Prompt {
    store.begin(user_id);
    Prompt::text_only("📖 Survey: Book Details\n\nWhat is the title of your book?")
}

/// Record a plain-text answer for whichever text step the survey is on.
pub fn submit_text(store: &SessionStore, user_id: u64, text: &str) -> Result<Prompt, FlowError> {
    let answer = text.trim().to_string();
    store
        .with(user_id, |session| match session.step {
            SurveyStep::Title => {
                session.book_title = Some(answer);
                session.step = SurveyStep::Length;
                Ok(Prompt::text_only(
                    "How long should the book be, in words?",
                ))
            }
            SurveyStep::Length => {
                session.book_length = Some(answer);
                session.step = SurveyStep::ExtraPrompt;
                Ok(Prompt::text_only(
                    "Anything else the writer should know? Send /skip to leave this blank.",
                ))
            }
            SurveyStep::ExtraPrompt => {
                session.extra_prompt = Some(answer);
                session.step = SurveyStep::WritingStyle;
                Ok(writing_style_prompt())
            }
            expected => Err(FlowError::OutOfOrder { expected }),
        })
        .ok_or(FlowError::NoSession)?
}

/// Leave the optional prompt blank and move on to the choice steps.
pub fn skip_extra(store: &SessionStore, user_id: u64) -> Result<Prompt, FlowError> {
    store
        .with(user_id, |session| match session.step {
            SurveyStep::ExtraPrompt => {
                session.extra_prompt = Some(String::new());
                session.step = SurveyStep::WritingStyle;
                Ok(writing_style_prompt())
            }
            expected => Err(FlowError::OutOfOrder { expected }),
        })
        .ok_or(FlowError::NoSession)?
}

/// Record an inline-keyboard answer and advance to the next prompt, or to
/// the summary once the final choice lands.
pub fn submit_choice(
    store: &SessionStore,
    user_id: u64,
    choice: Choice,
) -> Result<Prompt, FlowError> {
    store
        .with(user_id, |session| {
            if session.step != choice.step() {
                return Err(FlowError::OutOfOrder {
                    expected: session.step,
                });
            }

            match choice {
                Choice::Style(style) => {
                    session.writing_style = Some(style);
                    session.step = SurveyStep::BotMode;
                    Ok(bot_mode_prompt())
                }
                Choice::Mode(mode) => {
                    session.bot_mode = Some(mode);
                    session.step = SurveyStep::Engagement;
                    Ok(engagement_prompt())
                }
                Choice::Engagement(level) => {
                    session.engagement = Some(level);
                    session.step = SurveyStep::Format;
                    Ok(format_prompt())
                }
                Choice::Format(format) => {
                    session.format = Some(format);
                    session.step = SurveyStep::Citation;
                    Ok(citation_prompt())
                }
                Choice::Citation(citation) => {
                    session.citation = Some(citation);
                    session.step = SurveyStep::Confirm;
                    session.complete().map_or(
                        // Unreachable while steps advance in order.
                        Err(FlowError::OutOfOrder {
                            expected: SurveyStep::Title,
                        }),
                        |survey| Ok(summary_prompt(&survey.summary())),
                    )
                }
            }
        })
        .ok_or(FlowError::NoSession)?
}

fn writing_style_prompt() -> Prompt {
    let mut text = String::from("Select a writing style:\n");
    for style in WritingStyle::ALL {
        text.push_str(&format!("\n• {}: {}", style.label(), style.description()));
    }

    let rows = WritingStyle::ALL
        .into_iter()
        .map(|style| {
            vec![InlineKeyboardButton::callback(
                style.label(),
                format!("style:{}", style.wire()),
            )]
        })
        .collect::<Vec<_>>();

    Prompt {
        text,
        keyboard: Some(InlineKeyboardMarkup::new(rows)),
    }
}

fn bot_mode_prompt() -> Prompt {
    let row = [BotMode::Brainstorm, BotMode::Writer]
        .into_iter()
        .map(|mode| InlineKeyboardButton::callback(mode.label(), format!("mode:{}", mode.wire())))
        .collect::<Vec<_>>();

    Prompt {
        text: "Select bot mode:".to_string(),
        keyboard: Some(InlineKeyboardMarkup::new([row])),
    }
}

fn engagement_prompt() -> Prompt {
    let row = [EngagementLevel::Low, EngagementLevel::High]
        .into_iter()
        .map(|level| {
            InlineKeyboardButton::callback(level.label(), format!("engagement:{}", level.wire()))
        })
        .collect::<Vec<_>>();

    Prompt {
        text: "Select user engagement level:".to_string(),
        keyboard: Some(InlineKeyboardMarkup::new([row])),
    }
}

fn format_prompt() -> Prompt {
    let rows = BookFormat::ALL
        .into_iter()
        .map(|format| {
            vec![InlineKeyboardButton::callback(
                format.label(),
                format!("format:{}", format.wire()),
            )]
        })
        .collect::<Vec<_>>();

    Prompt {
        text: "Select book format:".to_string(),
        keyboard: Some(InlineKeyboardMarkup::new(rows)),
    }
}

fn citation_prompt() -> Prompt {
    let row = CitationFormat::ALL
        .into_iter()
        .map(|citation| {
            InlineKeyboardButton::callback(citation.label(), format!("citation:{}", citation.wire()))
        })
        .collect::<Vec<_>>();

    Prompt {
        text: "Select citation format:".to_string(),
        keyboard: Some(InlineKeyboardMarkup::new([row])),
    }
}

fn summary_prompt(summary: &str) -> Prompt {
    let row = vec![
        InlineKeyboardButton::callback("Apply", "apply"),
        InlineKeyboardButton::callback("Edit", "edit"),
    ];

    Prompt {
        text: format!("{summary}\nApply to send the brief to the writing workflow, or Edit to start over."),
        keyboard: Some(InlineKeyboardMarkup::new([row])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_to_confirm(store: &SessionStore, user_id: u64) -> Prompt {
        begin(store, user_id);
        submit_text(store, user_id, "My Book").unwrap();
        submit_text(store, user_id, "40000").unwrap();
        skip_extra(store, user_id).unwrap();
        submit_choice(store, user_id, Choice::Style(WritingStyle::Mystery)).unwrap();
        submit_choice(store, user_id, Choice::Mode(BotMode::Brainstorm)).unwrap();
        submit_choice(store, user_id, Choice::Engagement(EngagementLevel::Low)).unwrap();
        submit_choice(store, user_id, Choice::Format(BookFormat::Pdf)).unwrap();
        submit_choice(store, user_id, Choice::Citation(CitationFormat::Chicago)).unwrap()
    }

    #[test]
    fn full_walk_produces_summary_with_answers() {
        let store = SessionStore::default();
        let summary = walk_to_confirm(&store, 1);

        assert!(summary.text.contains("Book Title: My Book"));
        assert!(summary.text.contains("Book Length, words: 40000"));
        assert!(summary.text.contains("Writing Style: Mystery/Detective"));
        assert!(summary.text.contains("Bot Mode: Brainstorm Mode"));
        assert!(summary.text.contains("User Engagement Level: Low Engagement Level"));
        assert!(summary.text.contains("Book Format: PDF"));
        assert!(summary.text.contains("Citation Format: Chicago"));
        assert!(summary.keyboard.is_some());

        let session = store.get(1).unwrap();
        assert_eq!(session.step, SurveyStep::Confirm);
        assert!(session.complete().is_some());
    }

    #[test]
    fn typed_extra_prompt_is_kept() {
        let store = SessionStore::default();
        begin(&store, 1);
        submit_text(&store, 1, "T").unwrap();
        submit_text(&store, 1, "100").unwrap();
        submit_text(&store, 1, "make it rhyme").unwrap();

        let session = store.get(1).unwrap();
        assert_eq!(session.extra_prompt.as_deref(), Some("make it rhyme"));
        assert_eq!(session.step, SurveyStep::WritingStyle);
    }

    #[test]
    fn out_of_order_choice_is_rejected_and_ignored() {
        let store = SessionStore::default();
        begin(&store, 1);
        submit_text(&store, 1, "T").unwrap();

        let err = submit_choice(&store, 1, Choice::Format(BookFormat::Mobi)).unwrap_err();
        assert_eq!(
            err,
            FlowError::OutOfOrder {
                expected: SurveyStep::Length
            }
        );

        // The stale answer must not have overwritten anything.
        let session = store.get(1).unwrap();
        assert_eq!(session.step, SurveyStep::Length);
        assert!(session.format.is_none());
    }

    #[test]
    fn text_during_choice_step_is_rejected() {
        let store = SessionStore::default();
        begin(&store, 1);
        submit_text(&store, 1, "T").unwrap();
        submit_text(&store, 1, "100").unwrap();
        skip_extra(&store, 1).unwrap();

        let err = submit_text(&store, 1, "fantasy please").unwrap_err();
        assert_eq!(
            err,
            FlowError::OutOfOrder {
                expected: SurveyStep::WritingStyle
            }
        );
    }

    #[test]
    fn submitting_without_begin_is_a_protocol_violation() {
        let store = SessionStore::default();
        assert_eq!(
            submit_text(&store, 9, "T").unwrap_err(),
            FlowError::NoSession
        );
        assert_eq!(
            submit_choice(&store, 9, Choice::Mode(BotMode::Writer)).unwrap_err(),
            FlowError::NoSession
        );
    }

    #[test]
    fn edit_resets_without_stale_fields() {
        let store = SessionStore::default();
        walk_to_confirm(&store, 1);

        // Edit loops back to step one with a fresh record.
        begin(&store, 1);
        let session = store.get(1).unwrap();
        assert_eq!(session.step, SurveyStep::Title);
        assert!(session.book_title.is_none());
        assert!(session.format.is_none());
    }

    #[test]
    fn parse_recognizes_every_control() {
        assert_eq!(Control::parse("apply"), Some(Control::Apply));
        assert_eq!(Control::parse("edit"), Some(Control::Edit));
        assert_eq!(
            Control::parse("style:sci_fi"),
            Some(Control::Choice(Choice::Style(WritingStyle::SciFi)))
        );
        assert_eq!(
            Control::parse("mode:writer"),
            Some(Control::Choice(Choice::Mode(BotMode::Writer)))
        );
        assert_eq!(
            Control::parse("engagement:high"),
            Some(Control::Choice(Choice::Engagement(EngagementLevel::High)))
        );
        assert_eq!(
            Control::parse("citation:mla"),
            Some(Control::Choice(Choice::Citation(CitationFormat::Mla)))
        );
        assert_eq!(Control::parse("bogus"), None);
        assert_eq!(Control::parse("style:noir"), None);
    }

    #[test]
    fn parse_defaults_unknown_format_to_epub() {
        assert_eq!(
            Control::parse("format:azw3"),
            Some(Control::Choice(Choice::Format(BookFormat::Epub)))
        );
    }
}
