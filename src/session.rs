//! Per-user survey sessions.
//!
//! One user has at most one survey in progress at a time. The record is
//! either absent (no survey), partially filled (mid-survey), or complete
//! (awaiting confirm). Fields are populated strictly in step order; the
//! `step` field records which answer the survey is waiting on.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

/// The fixed order of the survey. `Confirm` means every answer has been
/// collected and the summary is on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SurveyStep {
    #[default]
    Title,
    Length,
    ExtraPrompt,
    WritingStyle,
    BotMode,
    Engagement,
    Format,
    Citation,
    Confirm,
}

impl fmt::Display for SurveyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Title => "book title",
            Self::Length => "book length",
            Self::ExtraPrompt => "additional prompt",
            Self::WritingStyle => "writing style",
            Self::BotMode => "bot mode",
            Self::Engagement => "engagement level",
            Self::Format => "book format",
            Self::Citation => "citation format",
            Self::Confirm => "confirm",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WritingStyle {
    #[serde(rename = "sci_fi")]
    SciFi,
    #[serde(rename = "fantasy")]
    Fantasy,
    #[serde(rename = "mystery_detective")]
    Mystery,
    #[serde(rename = "romance")]
    Romance,
    #[serde(rename = "historical")]
    Historical,
}

impl WritingStyle {
    pub const ALL: [Self; 5] = [
        Self::SciFi,
        Self::Fantasy,
        Self::Mystery,
        Self::Romance,
        Self::Historical,
    ];

    /// Stable value used in callback data and the webhook payload.
    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::SciFi => "sci_fi",
            Self::Fantasy => "fantasy",
            Self::Mystery => "mystery_detective",
            Self::Romance => "romance",
            Self::Historical => "historical",
        }
    }

    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.wire() == value)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SciFi => "Science Fiction",
            Self::Fantasy => "Fantasy",
            Self::Mystery => "Mystery/Detective",
            Self::Romance => "Romance",
            Self::Historical => "Historical",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::SciFi => "Focuses on technology, the future, and space.",
            Self::Fantasy => "Based on magic, mythical creatures, and imaginary worlds.",
            Self::Mystery => "Solving crimes and unraveling secrets.",
            Self::Romance => "Relationships and emotions between characters.",
            Self::Historical => "Events based on real history.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BotMode {
    #[serde(rename = "Brainstorm Mode")]
    Brainstorm,
    #[serde(rename = "Writer Mode")]
    Writer,
}

impl BotMode {
    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::Brainstorm => "brainstorm",
            Self::Writer => "writer",
        }
    }

    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        [Self::Brainstorm, Self::Writer]
            .into_iter()
            .find(|m| m.wire() == value)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Brainstorm => "Brainstorm Mode",
            Self::Writer => "Writer Mode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngagementLevel {
    #[serde(rename = "Low Engagement Level")]
    Low,
    #[serde(rename = "High Engagement Level")]
    High,
}

impl EngagementLevel {
    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        [Self::Low, Self::High]
            .into_iter()
            .find(|l| l.wire() == value)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low Engagement Level",
            Self::High => "High Engagement Level",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Docx,
    Pdf,
    Epub,
    Mobi,
}

impl BookFormat {
    pub const ALL: [Self; 4] = [Self::Docx, Self::Pdf, Self::Epub, Self::Mobi];

    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Mobi => "mobi",
        }
    }

    /// Parse a wire value, falling back to EPUB for anything unrecognized.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|f| f.wire() == value)
            .unwrap_or(Self::Epub)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Docx => "DOCX",
            Self::Pdf => "PDF",
            Self::Epub => "EPUB",
            Self::Mobi => "MOBI",
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        self.wire()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationFormat {
    Apa,
    Mla,
    Chicago,
}

impl CitationFormat {
    pub const ALL: [Self; 3] = [Self::Apa, Self::Mla, Self::Chicago];

    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::Apa => "apa",
            Self::Mla => "mla",
            Self::Chicago => "chicago",
        }
    }

    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.wire() == value)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Apa => "APA",
            Self::Mla => "MLA",
            Self::Chicago => "Chicago",
        }
    }
}

/// One user's in-progress survey answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveySession {
    pub step: SurveyStep,
    pub book_title: Option<String>,
    pub book_length: Option<String>,
    pub extra_prompt: Option<String>,
    pub writing_style: Option<WritingStyle>,
    pub bot_mode: Option<BotMode>,
    pub engagement: Option<EngagementLevel>,
    pub format: Option<BookFormat>,
    pub citation: Option<CitationFormat>,
}

impl SurveySession {
    /// A fully-answered survey, available once every producing step has run.
    #[must_use]
    pub fn complete(&self) -> Option<CompletedSurvey> {
        Some(CompletedSurvey {
            book_title: self.book_title.clone()?,
            book_length: self.book_length.clone()?,
            extra_prompt: self.extra_prompt.clone()?,
            writing_style: self.writing_style?,
            bot_mode: self.bot_mode?,
            engagement: self.engagement?,
            format: self.format?,
            citation: self.citation?,
        })
    }
}

/// Every survey answer, with the optional prompt normalized to an empty
/// string when the user skipped it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSurvey {
    pub book_title: String,
    pub book_length: String,
    pub extra_prompt: String,
    pub writing_style: WritingStyle,
    pub bot_mode: BotMode,
    pub engagement: EngagementLevel,
    pub format: BookFormat,
    pub citation: CitationFormat,
}

impl CompletedSurvey {
    /// Human-readable recap shown on the confirm screen. The blank optional
    /// prompt is omitted.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = String::from("You have selected the following parameters:\n");
        summary.push_str(&format!("Book Title: {}\n", self.book_title));
        summary.push_str(&format!("Book Length, words: {}\n", self.book_length));
        if !self.extra_prompt.is_empty() {
            summary.push_str(&format!("Additional Prompt: {}\n", self.extra_prompt));
        }
        summary.push_str(&format!("Writing Style: {}\n", self.writing_style.label()));
        summary.push_str(&format!("Bot Mode: {}\n", self.bot_mode.label()));
        summary.push_str(&format!(
            "User Engagement Level: {}\n",
            self.engagement.label()
        ));
        summary.push_str(&format!("Book Format: {}\n", self.format.label()));
        summary.push_str(&format!("Citation Format: {}\n", self.citation.label()));
        summary
    }
}

/// In-memory map from user id to survey session.
///
/// Constructed once at service start and shared with every handler. No
/// expiry and no persistence; restarting the process drops all surveys.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<u64, SurveySession>>,
}

impl SessionStore {
    /// Replace the user's session with a fresh, empty one.
    pub fn begin(&self, user_id: u64) {
        self.lock().insert(user_id, SurveySession::default());
    }

    /// Snapshot of the user's session, if any.
    #[must_use]
    pub fn get(&self, user_id: u64) -> Option<SurveySession> {
        self.lock().get(&user_id).cloned()
    }

    /// Drop the user's session. Removing an absent session is a no-op.
    pub fn remove(&self, user_id: u64) {
        self.lock().remove(&user_id);
    }

    /// Run `f` against the user's session while holding the store lock, so
    /// a step's check-and-mutate happens atomically. Returns `None` when no
    /// session exists for the user.
    pub fn with<T>(&self, user_id: u64, f: impl FnOnce(&mut SurveySession) -> T) -> Option<T> {
        self.lock().get_mut(&user_id).map(f)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SurveySession>> {
        // A poisoned lock only means a handler panicked mid-update; the map
        // itself is still usable.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
