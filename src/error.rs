//! Error types for Bindery.

use crate::session::SurveyStep;

/// Errors raised while walking a user through the survey.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("no survey in progress")]
    NoSession,

    #[error("the survey is waiting on the {expected} step")]
    OutOfOrder { expected: SurveyStep },
}

/// Errors surfaced when a finished survey is submitted to the workflow.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("webhook URL is not configured")]
    NotConfigured,

    #[error("workflow request failed: {0}")]
    Upstream(String),

    #[error("document assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}

/// Errors raised while assembling the generated text into a document.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("failed to archive {format} package: {source}")]
    Archive {
        format: &'static str,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to encode PDF: {0}")]
    Pdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "'{tool}' was not found on this host.\n\n\
         MOBI output needs Calibre's ebook-convert.\n\n\
         Try:\n\
         • Install Calibre: https://calibre-ebook.com/download\n\
         • Verify {tool} is in PATH\n\
         • Check availability: which {tool}"
    )]
    ConverterMissing { tool: String },

    #[error("'{tool}' exited with {status}: {stderr}")]
    ConverterFailed {
        tool: String,
        status: String,
        stderr: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converter_missing_message_names_the_tool() {
        let err = AssemblyError::ConverterMissing {
            tool: "ebook-convert".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ebook-convert"));
        assert!(msg.contains("Calibre"));
    }

    #[test]
    fn out_of_order_names_the_expected_step() {
        let err = FlowError::OutOfOrder {
            expected: SurveyStep::WritingStyle,
        };
        assert!(err.to_string().contains("writing style"));
    }
}
