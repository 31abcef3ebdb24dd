use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{CredentialStore, Credentials};
use crate::error::{AgentError, Result};

/// JSON token bundle on disk, the same file Google's client libraries write.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for TokenFile {
    fn load(&self) -> Result<Credentials> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(AgentError::MissingCredentials(format!(
                    "no token file at {}; authorize via /auth/start first",
                    self.path.display()
                )));
            }
            Err(error) => return Err(error.into()),
        };

        let credentials: Credentials = serde_json::from_str(&raw).map_err(|error| {
            AgentError::MissingCredentials(format!(
                "token file {} is not a token bundle: {error}",
                self.path.display()
            ))
        })?;
        credentials.validate()
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let encoded = serde_json::to_vec(credentials)?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        std::fs::write(&staging, encoded)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::TokenFile;
    use crate::credentials::{CredentialStore, Credentials};
    use crate::error::AgentError;

    fn temp_token_path() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("autoreply-token-test-{}", Uuid::new_v4()))
            .join("token.json")
    }

    #[test]
    fn save_then_load_round_trips_including_unknown_fields() {
        let path = temp_token_path();
        let store = TokenFile::new(&path);

        let credentials: Credentials = serde_json::from_value(json!({
            "access_token": "ya29.access",
            "refresh_token": "1//refresh",
            "scope": "https://www.googleapis.com/auth/gmail.send https://www.googleapis.com/auth/gmail.modify",
            "token_type": "Bearer",
            "expiry_date": 1767225600000i64,
            "id_token": "eyJhbGciOi"
        }))
        .expect("decode token bundle");

        store.save(&credentials).expect("save token bundle");
        let loaded = store.load().expect("load token bundle");

        assert_eq!(loaded, credentials);
        assert_eq!(
            loaded.extra.get("id_token").and_then(|v| v.as_str()),
            Some("eyJhbGciOi")
        );

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read token file"))
                .expect("parse token file");
        assert_eq!(on_disk["expiry_date"], json!(1767225600000i64));

        let _ = std::fs::remove_dir_all(path.parent().expect("parent dir"));
    }

    #[test]
    fn missing_file_is_missing_credentials() {
        let store = TokenFile::new(temp_token_path());
        assert!(matches!(
            store.load(),
            Err(AgentError::MissingCredentials(_))
        ));
    }

    #[test]
    fn malformed_file_is_missing_credentials() {
        let path = temp_token_path();
        std::fs::create_dir_all(path.parent().expect("parent dir")).expect("create dir");
        std::fs::write(&path, r#"{"refresh_token":"only"}"#).expect("write file");

        let store = TokenFile::new(&path);
        assert!(matches!(
            store.load(),
            Err(AgentError::MissingCredentials(_))
        ));

        let _ = std::fs::remove_dir_all(path.parent().expect("parent dir"));
    }
}
