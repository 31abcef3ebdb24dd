use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::credentials::{Credentials, TokenRefresher};
use crate::error::{redact_response_body, AgentError, Result};

pub mod server;

pub use server::{router, AuthState};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const GMAIL_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.labels",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
];

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Google OAuth 2.0 client: consent URL, code exchange, and token refresh.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client: Client,
    settings: OAuthSettings,
    auth_url: String,
    token_url: String,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings, request_timeout: StdDuration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| AgentError::Provider(format!("build oauth http client: {error}")))?;
        Ok(Self {
            client,
            settings,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        })
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Consent screen URL requesting offline access to the Gmail scopes.
    pub fn authorization_url(&self) -> Result<Url> {
        let scope = GMAIL_SCOPES.join(" ");
        Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|error| AgentError::Provider(format!("build authorization url: {error}")))
    }

    /// Trade an authorization code for a fresh token bundle.
    pub async fn exchange_code(&self, code: &str) -> Result<Credentials> {
        let grant = self
            .request_token(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        Ok(grant.into_credentials())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self.client.post(&self.token_url).form(form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let detail = format!(
                "oauth token request failed: status={} body={}",
                status,
                redact_response_body(&body)
            );
            return Err(if status.is_server_error() {
                AgentError::TransientProvider(detail)
            } else {
                AgentError::Auth(detail)
            });
        }

        serde_json::from_str(&body).map_err(|error| {
            AgentError::Provider(format!("decode oauth token response: {error}"))
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let refresh_token = credentials.refresh_token.as_deref().ok_or_else(|| {
            AgentError::Auth("cannot refresh without a refresh token".to_string())
        })?;

        let grant = self
            .request_token(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        Ok(grant.merge_into(credentials.clone()))
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    token_type: Option<String>,
    id_token: Option<String>,
}

impl TokenGrant {
    fn expiry_date(&self) -> Option<i64> {
        self.expires_in
            .map(|seconds| (Utc::now() + Duration::seconds(seconds)).timestamp_millis())
    }

    fn into_credentials(self) -> Credentials {
        let mut extra = Map::new();
        if let Some(id_token) = &self.id_token {
            extra.insert("id_token".to_string(), Value::String(id_token.clone()));
        }
        Credentials {
            expiry_date: self.expiry_date(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            token_type: self.token_type,
            extra,
        }
    }

    /// Google omits the refresh token on refresh responses; keep the stored one.
    fn merge_into(self, mut credentials: Credentials) -> Credentials {
        credentials.expiry_date = self.expiry_date();
        credentials.access_token = self.access_token;
        if let Some(refresh_token) = self.refresh_token {
            credentials.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = self.scope {
            credentials.scope = Some(scope);
        }
        if let Some(token_type) = self.token_type {
            credentials.token_type = Some(token_type);
        }
        if let Some(id_token) = self.id_token {
            credentials
                .extra
                .insert("id_token".to_string(), Value::String(id_token));
        }
        credentials
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{OAuthClient, OAuthSettings, TokenGrant, GMAIL_SCOPES};
    use crate::credentials::Credentials;

    fn client() -> OAuthClient {
        OAuthClient::new(
            OAuthSettings {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                redirect_uri: "http://localhost:3000/auth/callback".to_string(),
            },
            Duration::from_secs(5),
        )
        .expect("build oauth client")
    }

    #[test]
    fn authorization_url_requests_offline_gmail_scopes() {
        let url = client().authorization_url().expect("authorization url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(get("client_id"), Some("client-id"));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(
            get("redirect_uri"),
            Some("http://localhost:3000/auth/callback")
        );
        let scopes: Vec<&str> = get("scope").expect("scope").split(' ').collect();
        assert_eq!(scopes, GMAIL_SCOPES);
    }

    #[test]
    fn grant_becomes_google_style_token_bundle() {
        let grant: TokenGrant = serde_json::from_value(json!({
            "access_token": "ya29.new",
            "refresh_token": "1//refresh",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/gmail.send",
            "token_type": "Bearer"
        }))
        .expect("decode grant");
        let credentials = grant.into_credentials();

        assert_eq!(credentials.access_token, "ya29.new");
        assert_eq!(credentials.refresh_token.as_deref(), Some("1//refresh"));
        assert!(!credentials.is_expired());
        assert!(credentials.extra.is_empty());
    }

    #[test]
    fn refresh_merge_keeps_stored_refresh_token() {
        let mut stored = Credentials::new("ya29.old");
        stored.refresh_token = Some("1//keep".to_string());
        stored
            .extra
            .insert("custom".to_string(), json!("kept"));

        let grant: TokenGrant = serde_json::from_value(json!({
            "access_token": "ya29.fresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        }))
        .expect("decode grant");
        let merged = grant.merge_into(stored);

        assert_eq!(merged.access_token, "ya29.fresh");
        assert_eq!(merged.refresh_token.as_deref(), Some("1//keep"));
        assert_eq!(merged.extra.get("custom"), Some(&json!("kept")));
        assert!(merged.expiry_date.is_some());
    }
}
