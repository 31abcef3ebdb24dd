use thiserror::Error;

const REDACTED_BODY_MAX_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("authorization rejected: {0}")]
    Auth(String),

    #[error("transient provider failure: {0}")]
    TransientProvider(String),

    #[error("unexpected provider response: {0}")]
    Provider(String),

    #[error("cannot encode message: {0}")]
    Encoding(String),

    #[error("{0}")]
    Config(String),

    #[error("json serialization: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filesystem: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Errors that make every later provider call in the same cycle pointless.
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::MissingCredentials(_))
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Provider(error.to_string())
        } else {
            Self::TransientProvider(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

pub(crate) fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        trimmed.to_string()
    } else {
        let mut end = REDACTED_BODY_MAX_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}…[truncated {} bytes]",
            &trimmed[..end],
            trimmed.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{redact_response_body, AgentError};

    #[test]
    fn short_bodies_are_kept_whole() {
        assert_eq!(redact_response_body("  {\"error\":1}  "), "{\"error\":1}");
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(150);
        let redacted = redact_response_body(&body);
        assert!(redacted.contains("[truncated 300 bytes]"));
        assert!(redacted.len() < body.len());
    }

    #[test]
    fn only_auth_and_missing_credentials_abort_a_cycle() {
        assert!(AgentError::Auth("expired".to_string()).aborts_cycle());
        assert!(AgentError::MissingCredentials("no file".to_string()).aborts_cycle());
        assert!(!AgentError::TransientProvider("503".to_string()).aborts_cycle());
        assert!(!AgentError::Encoding("bad header".to_string()).aborts_cycle());
    }
}
