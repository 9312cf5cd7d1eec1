//! Configuration loading and management.
//!
//! Settings live in `~/bindery/config.toml`; the `BOT_TOKEN`,
//! `WEBHOOK_URL`, and `EBOOK_CONVERT` environment variables override the
//! file. A missing webhook URL is not a startup error; it surfaces to the
//! user at submit time.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Bindery configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// User ids allowed to talk to the bot. Empty means open to everyone.
    #[serde(default)]
    pub allowed_users: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Endpoint of the external writing workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// EPUB-to-MOBI executable, resolved through PATH unless absolute.
    #[serde(default = "default_ebook_convert")]
    pub ebook_convert: String,
}

fn default_ebook_convert() -> String {
    "ebook-convert".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ebook_convert: default_ebook_convert(),
        }
    }
}

impl Config {
    /// Load configuration: the default path if present, then environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            Self::from_toml_str(&contents)?
        } else {
            Self::default()
        };

        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config.toml")
    }

    /// Apply environment overrides through an injected lookup.
    #[must_use]
    pub fn with_env_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token) = get("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(url) = get("WEBHOOK_URL") {
            self.workflow.webhook_url = Some(url);
        }
        if let Some(tool) = get("EBOOK_CONVERT") {
            self.converter.ebook_convert = tool;
        }
        self
    }

}

/// Get the Bindery config directory (~/bindery).
pub fn config_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("./bindery"),
        |d| d.home_dir().join("bindery"),
    )
}

/// Get the config file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let config = Config::from_toml_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            allowed_users = [1, 2]

            [workflow]
            webhook_url = "https://example.com/hook"

            [converter]
            ebook_convert = "/opt/calibre/ebook-convert"
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.allowed_users, vec![1, 2]);
        assert_eq!(
            config.workflow.webhook_url.as_deref(),
            Some("https://example.com/hook")
        );
        assert_eq!(config.converter.ebook_convert, "/opt/calibre/ebook-convert");
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert!(config.telegram.bot_token.is_empty());
        assert!(config.telegram.allowed_users.is_empty());
        assert!(config.workflow.webhook_url.is_none());
        assert_eq!(config.converter.ebook_convert, "ebook-convert");
    }

    #[test]
    fn env_overrides_win_over_the_file() {
        let config = Config::from_toml_str(
            r#"
            [telegram]
            bot_token = "from-file"
            "#,
        )
        .unwrap()
        .with_env_overrides(|key| match key {
            "BOT_TOKEN" => Some("from-env".to_string()),
            "WEBHOOK_URL" => Some("https://env.example/hook".to_string()),
            _ => None,
        });

        assert_eq!(config.telegram.bot_token, "from-env");
        assert_eq!(
            config.workflow.webhook_url.as_deref(),
            Some("https://env.example/hook")
        );
        assert_eq!(config.converter.ebook_convert, "ebook-convert");
    }
}
