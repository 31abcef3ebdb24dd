use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use autoreply::auth::server::{self, AuthState};
use autoreply::auth::OAuthClient;
use autoreply::config::Config;
use autoreply::credentials::{CredentialProvider, CredentialStore, TokenFile};
use autoreply::mailbox::{GmailDirectory, MailDirectory};
use autoreply::reconcile::{stop_channel, ReconciliationLoop, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // .env may set RUST_LOG.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate().context("invalid configuration")?;

    let token_file = TokenFile::new(&config.token_path);
    info!(path = %token_file.path().display(), "using token file");
    let store: Arc<dyn CredentialStore> = Arc::new(token_file);
    let oauth = Arc::new(
        OAuthClient::new(config.oauth_settings(), config.request_timeout())
            .context("build oauth client")?,
    );

    let mut gmail =
        GmailDirectory::new(config.request_timeout()).context("build gmail directory")?;
    if config.skip_labeled {
        gmail = gmail.excluding_label(&config.label);
    }
    let directory: Arc<dyn MailDirectory> = Arc::new(gmail);

    let reconciler = ReconciliationLoop::new(
        CredentialProvider::new(store.clone(), oauth.clone()),
        directory,
    )
    .with_label(&config.label)
    .with_reply(config.reply_template());
    let scheduler = Scheduler::new(
        Arc::new(reconciler),
        config.poll_interval().context("poll interval")?,
    );

    let (stop_handle, stop_signal) = stop_channel();
    let polling = tokio::spawn(async move { scheduler.run(stop_signal).await });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("server is running on http://localhost:{}", config.port);
    info!("authorize at http://localhost:{}/auth/start", config.port);

    server::serve(listener, AuthState { oauth, store }, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    })
    .await
    .context("serve authorization endpoints")?;

    stop_handle.stop();
    polling.await.context("join polling task")?;
    Ok(())
}
