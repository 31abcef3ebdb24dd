use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::auth::OAuthSettings;
use crate::error::{AgentError, Result};
use crate::reconcile::{
    PollInterval, ReplyTemplate, DEFAULT_LABEL, DEFAULT_REPLY_BODY, DEFAULT_REPLY_SUBJECT,
};

/// Service configuration. Every flag falls back to an environment variable,
/// which may also come from a `.env` file in the working directory.
#[derive(Debug, Clone, Parser)]
#[command(name = "autoreply", version, about = "Gmail auto-reply agent")]
pub struct Config {
    /// OAuth client identifier
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered for the OAuth client
    #[arg(long, env = "REDIRECT_URI")]
    pub redirect_uri: String,

    /// Port for the authorization endpoints
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Where the token bundle is stored
    #[arg(long, env = "TOKEN_PATH", default_value = "./token.json")]
    pub token_path: PathBuf,

    /// Label applied to every message that received an auto-reply
    #[arg(long, env = "AUTOREPLY_LABEL", default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Leave messages that already carry the label out of the unread listing
    #[arg(long, env = "SKIP_LABELED", default_value_t = true, action = clap::ArgAction::Set)]
    pub skip_labeled: bool,

    #[arg(long, env = "POLL_MIN_SECS", default_value_t = 45)]
    pub poll_min_secs: u64,

    #[arg(long, env = "POLL_MAX_SECS", default_value_t = 120)]
    pub poll_max_secs: u64,

    #[arg(long, env = "REPLY_SUBJECT", default_value = DEFAULT_REPLY_SUBJECT)]
    pub reply_subject: String,

    #[arg(long, env = "REPLY_BODY", default_value = DEFAULT_REPLY_BODY)]
    pub reply_body: String,

    /// Upper bound on every remote call
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(AgentError::Config("label must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AgentError::Config(
                "request timeout must be at least one second".to_string(),
            ));
        }
        self.poll_interval()?;
        Ok(())
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }

    pub fn poll_interval(&self) -> Result<PollInterval> {
        PollInterval::from_secs(self.poll_min_secs, self.poll_max_secs)
    }

    pub fn reply_template(&self) -> ReplyTemplate {
        ReplyTemplate {
            subject: self.reply_subject.clone(),
            body: self.reply_body.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
