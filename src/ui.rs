//! Status indicators for operator-facing CLI output.
//!
//! `bindery check` reports each concern as `[•ok]`, `[•??]`, or `[•!!]`.
//! Warn is for things the bot can run without (webhook URL, the MOBI
//! converter); they fail at submit time, not at startup.

use console::style;

/// Status indicator states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Green `[•ok]` - ready.
    Ok,
    /// Yellow `[•??]` - missing, but only needed at submit time.
    Warn,
    /// Red `[•!!]` - the bot cannot start.
    Error,
}

impl Status {
    #[must_use]
    pub fn render(self) -> String {
        match self {
            Self::Ok => format!("[{}]", style("•ok").green()),
            Self::Warn => format!("[{}]", style("•??").yellow()),
            Self::Error => format!("[{}]", style("•!!").red()),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// A status line with indicator and message.
pub struct StatusLine {
    status: Status,
    message: String,
}

impl StatusLine {
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Status::Ok, message)
    }

    #[must_use]
    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Status::Warn, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, message)
    }

    /// Print the status line with proper indentation.
    pub fn print(&self) {
        println!("  {} {}", self.status, self.message);
    }

    /// Whether this line blocks the bot from starting.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}
