use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{AgentError, Result};

pub mod token_file;

pub use token_file::TokenFile;

const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Delegated-access token bundle in the layout Google's client libraries write
/// to `token.json`. Fields this crate does not read are kept in `extra` so the
/// file survives a load/save cycle untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            scope: None,
            token_type: None,
            expiry_date: None,
            extra: Map::new(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// A bundle without an expiry is treated as valid until the provider says otherwise.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at()
            .is_some_and(|expires_at| expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub(crate) fn validate(self) -> Result<Self> {
        if self.access_token.trim().is_empty() {
            return Err(AgentError::MissingCredentials(
                "stored token bundle has an empty access_token".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Durable home of the token bundle.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credentials>;

    fn save(&self, credentials: &Credentials) -> Result<()>;
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials>;
}

/// Hands out credentials that are usable right now, refreshing and persisting
/// them first when the stored access token has expired.
#[derive(Clone)]
pub struct CredentialProvider {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
}

impl CredentialProvider {
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { store, refresher }
    }

    pub async fn valid_credentials(&self) -> Result<Credentials> {
        let credentials = self.store.load()?;
        if !credentials.is_expired() {
            return Ok(credentials);
        }

        if credentials.refresh_token.is_none() {
            return Err(AgentError::Auth(
                "access token expired and no refresh token is stored".to_string(),
            ));
        }

        let refreshed = self.refresher.refresh(&credentials).await?;
        self.store.save(&refreshed)?;
        info!("refreshed access token");
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use super::{CredentialProvider, CredentialStore, Credentials, TokenRefresher};
    use crate::error::{AgentError, Result};

    #[derive(Default)]
    struct MemoryStore {
        slot: Mutex<Option<Credentials>>,
    }

    impl CredentialStore for MemoryStore {
        fn load(&self) -> Result<Credentials> {
            self.slot
                .lock()
                .expect("lock store")
                .clone()
                .ok_or_else(|| AgentError::MissingCredentials("empty".to_string()))
        }

        fn save(&self, credentials: &Credentials) -> Result<()> {
            *self.slot.lock().expect("lock store") = Some(credentials.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut refreshed = credentials.clone();
            refreshed.access_token = "fresh-token".to_string();
            refreshed.expiry_date = Some((Utc::now() + Duration::hours(1)).timestamp_millis());
            Ok(refreshed)
        }
    }

    fn expiring_in(delta: Duration) -> Credentials {
        let mut credentials = Credentials::new("stale-token");
        credentials.refresh_token = Some("refresh".to_string());
        credentials.expiry_date = Some((Utc::now() + delta).timestamp_millis());
        credentials
    }

    #[test]
    fn expiry_honours_skew() {
        let now = Utc::now();
        assert!(expiring_in(Duration::seconds(30)).is_expired_at(now));
        assert!(!expiring_in(Duration::minutes(10)).is_expired_at(now));
        assert!(!Credentials::new("token").is_expired_at(now));
    }

    #[test]
    fn empty_access_token_is_rejected() {
        let result = Credentials::new("  ").validate();
        assert!(matches!(result, Err(AgentError::MissingCredentials(_))));
    }

    #[tokio::test]
    async fn valid_credentials_skip_refresh_when_fresh() {
        let store = Arc::new(MemoryStore::default());
        store
            .save(&expiring_in(Duration::hours(1)))
            .expect("seed store");
        let refresher = Arc::new(CountingRefresher::default());
        let provider = CredentialProvider::new(store, refresher.clone());

        let credentials = provider.valid_credentials().await.expect("credentials");
        assert_eq!(credentials.access_token, "stale-token");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_credentials_are_refreshed_and_persisted() {
        let store = Arc::new(MemoryStore::default());
        store
            .save(&expiring_in(Duration::minutes(-5)))
            .expect("seed store");
        let refresher = Arc::new(CountingRefresher::default());
        let provider = CredentialProvider::new(store.clone(), refresher.clone());

        let credentials = provider.valid_credentials().await.expect("credentials");
        assert_eq!(credentials.access_token, "fresh-token");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().expect("reload").access_token, "fresh-token");
    }

    #[tokio::test]
    async fn expired_credentials_without_refresh_token_are_an_auth_error() {
        let store = Arc::new(MemoryStore::default());
        let mut credentials = expiring_in(Duration::minutes(-5));
        credentials.refresh_token = None;
        store.save(&credentials).expect("seed store");
        let provider = CredentialProvider::new(store, Arc::new(CountingRefresher::default()));

        let result = provider.valid_credentials().await;
        assert!(matches!(result, Err(AgentError::Auth(_))));
    }

    #[tokio::test]
    async fn missing_credentials_surface_unchanged() {
        let provider = CredentialProvider::new(
            Arc::new(MemoryStore::default()),
            Arc::new(CountingRefresher::default()),
        );
        let result = provider.valid_credentials().await;
        assert!(matches!(result, Err(AgentError::MissingCredentials(_))));
    }
}
