//! Client for the external writing workflow.
//!
//! A finished survey is POSTed once to the configured webhook; the
//! workflow answers with the generated book text. No retry, no backoff,
//! and no timeout beyond the HTTP client default; generation can take a
//! while and the caller owns the user-facing messaging.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::SubmitError;
use crate::session::{
    BookFormat, BotMode, CitationFormat, CompletedSurvey, EngagementLevel, WritingStyle,
};

/// Gateway to the writing workflow webhook.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

/// Outbound payload. Field names are fixed by the downstream workflow
/// contract.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowRequest<'a> {
    book_title: &'a str,
    book_length: &'a str,
    additional_prompt: &'a str,
    writing_style: WritingStyle,
    #[serde(rename = "discordBotMode")]
    bot_mode: BotMode,
    user_engagement_level: EngagementLevel,
    book_format: BookFormat,
    citation_format: CitationFormat,
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct WorkflowReply {
    #[serde(default)]
    ok: bool,
    #[serde(rename = "bookText")]
    book_text: Option<String>,
}

/// The workflow answers with either the reply object or a one-element
/// array wrapping it; both shapes are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplyShape {
    One(WorkflowReply),
    Many(Vec<WorkflowReply>),
}

impl WorkflowClient {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.workflow.webhook_url.clone(),
        }
    }

    /// Send a finished survey to the workflow and return the generated
    /// book text.
    ///
    /// `session_id` is the correlation identifier derived from the
    /// originating conversation; the workflow uses it to disambiguate
    /// concurrent requests.
    ///
    /// # Errors
    ///
    /// `NotConfigured` when no webhook URL is set (no request is made),
    /// `Upstream` for transport failures, non-success statuses, and reply
    /// bodies without `ok: true` plus the generated text.
    pub async fn submit(
        &self,
        survey: &CompletedSurvey,
        session_id: &str,
    ) -> Result<String, SubmitError> {
        let Some(url) = self.webhook_url.as_deref() else {
            return Err(SubmitError::NotConfigured);
        };

        let request = WorkflowRequest {
            book_title: &survey.book_title,
            book_length: &survey.book_length,
            additional_prompt: &survey.extra_prompt,
            writing_style: survey.writing_style,
            bot_mode: survey.bot_mode,
            user_engagement_level: survey.engagement,
            book_format: survey.format,
            citation_format: survey.citation,
            session_id,
        };

        tracing::info!("Submitting survey {session_id} to the writing workflow");

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SubmitError::Upstream(format!("could not reach the webhook: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Upstream(format!(
                "webhook returned {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::Upstream(format!("could not read the reply: {e}")))?;

        interpret_reply(&body)
    }
}

/// Normalize the reply body and extract the generated text.
fn interpret_reply(body: &str) -> Result<String, SubmitError> {
    let shape: ReplyShape = serde_json::from_str(body)
        .map_err(|e| SubmitError::Upstream(format!("reply was not valid JSON: {e}")))?;

    let reply = match shape {
        ReplyShape::One(reply) => reply,
        ReplyShape::Many(replies) => replies
            .into_iter()
            .next()
            .ok_or_else(|| SubmitError::Upstream("reply array was empty".to_string()))?,
    };

    if !reply.ok {
        return Err(SubmitError::Upstream(
            "workflow reported a failure (ok was not true)".to_string(),
        ));
    }

    reply.book_text.map_or_else(
        || Err(SubmitError::Upstream("reply had no bookText".to_string())),
        Ok,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SurveySession, SurveyStep};

    fn survey() -> CompletedSurvey {
        SurveySession {
            step: SurveyStep::Confirm,
            book_title: Some("Tides of Iron".to_string()),
            book_length: Some("50000".to_string()),
            extra_prompt: Some(String::new()),
            writing_style: Some(WritingStyle::SciFi),
            bot_mode: Some(BotMode::Brainstorm),
            engagement: Some(EngagementLevel::Low),
            format: Some(BookFormat::Mobi),
            citation: Some(CitationFormat::Mla),
        }
        .complete()
        .unwrap()
    }

    #[test]
    fn payload_uses_the_contract_field_names() {
        let survey = survey();
        let request = WorkflowRequest {
            book_title: &survey.book_title,
            book_length: &survey.book_length,
            additional_prompt: &survey.extra_prompt,
            writing_style: survey.writing_style,
            bot_mode: survey.bot_mode,
            user_engagement_level: survey.engagement,
            book_format: survey.format,
            citation_format: survey.citation,
            session_id: "12345",
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["bookTitle"], "Tides of Iron");
        assert_eq!(value["bookLength"], "50000");
        assert_eq!(value["additionalPrompt"], "");
        assert_eq!(value["writingStyle"], "sci_fi");
        assert_eq!(value["discordBotMode"], "Brainstorm Mode");
        assert_eq!(value["userEngagementLevel"], "Low Engagement Level");
        assert_eq!(value["bookFormat"], "mobi");
        assert_eq!(value["citationFormat"], "mla");
        assert_eq!(value["sessionId"], "12345");
    }

    #[tokio::test]
    async fn unconfigured_endpoint_fails_without_a_request() {
        let client = WorkflowClient {
            client: reqwest::Client::new(),
            webhook_url: None,
        };

        let err = client.submit(&survey(), "1").await.unwrap_err();
        assert!(matches!(err, SubmitError::NotConfigured));
    }

    #[test]
    fn reply_object_is_accepted() {
        let text = interpret_reply(r#"{"ok": true, "bookText": "Chapter 1"}"#).unwrap();
        assert_eq!(text, "Chapter 1");
    }

    #[test]
    fn one_element_array_is_normalized() {
        let text = interpret_reply(r#"[{"ok": true, "bookText": "Chapter 1"}]"#).unwrap();
        assert_eq!(text, "Chapter 1");
    }

    #[test]
    fn missing_book_text_is_an_upstream_error() {
        let err = interpret_reply(r#"{"ok": true}"#).unwrap_err();
        assert!(matches!(err, SubmitError::Upstream(_)));
    }

    #[test]
    fn unsuccessful_reply_is_an_upstream_error() {
        let err = interpret_reply(r#"{"ok": false, "bookText": "ignored"}"#).unwrap_err();
        assert!(matches!(err, SubmitError::Upstream(_)));

        let err = interpret_reply("[]").unwrap_err();
        assert!(matches!(err, SubmitError::Upstream(_)));
    }

    #[test]
    fn garbage_reply_is_an_upstream_error() {
        let err = interpret_reply("<html>oops</html>").unwrap_err();
        assert!(matches!(err, SubmitError::Upstream(_)));
    }
}
