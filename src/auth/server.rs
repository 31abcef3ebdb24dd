use std::future::Future;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::OAuthClient;
use crate::credentials::CredentialStore;

#[derive(Clone)]
pub struct AuthState {
    pub oauth: Arc<OAuthClient>,
    pub store: Arc<dyn CredentialStore>,
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/start", get(auth_start))
        .route("/auth/google", get(auth_start))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/google/callback", get(auth_callback))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: AuthState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "ok"
}

/// GET /auth/start
async fn auth_start(State(state): State<AuthState>) -> Response {
    match state.oauth.authorization_url() {
        Ok(url) => Redirect::temporary(url.as_str()).into_response(),
        Err(err) => {
            error!("cannot build authorization url: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

/// GET /auth/callback?code=...
async fn auth_callback(
    State(state): State<AuthState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(reason) = params.error {
        return (
            StatusCode::BAD_REQUEST,
            format!("Authorization was not granted: {reason}"),
        )
            .into_response();
    }

    let Some(code) = params.code.filter(|code| !code.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code").into_response();
    };

    let credentials = match state.oauth.exchange_code(&code).await {
        Ok(credentials) => credentials,
        Err(err) => {
            error!("error exchanging code for tokens: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }
    };

    if let Err(err) = state.store.save(&credentials) {
        error!("error writing token bundle: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authorization succeeded but the credentials could not be stored.",
        )
            .into_response();
    }

    info!("token bundle stored");
    (
        StatusCode::OK,
        "Authentication successful! You can now start using the app.",
    )
        .into_response()
}
