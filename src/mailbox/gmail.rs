use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Header, Label, MailDirectory, Message, Thread, ThreadMessage};
use crate::credentials::Credentials;
use crate::error::{redact_response_body, AgentError, Result};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const UNREAD_PRIMARY_QUERY: &str = "in:inbox is:unread category:primary";
const DEFAULT_PAGE_SIZE: usize = 100;
const THREAD_METADATA_HEADERS: &[&str] = &["From", "Subject", "Message-ID"];
/// 403 reasons Gmail uses for throttling rather than for denied access.
const USAGE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "quotaExceeded",
];

/// Gmail REST v1 adapter. The only place that knows Gmail's wire shapes.
#[derive(Debug, Clone)]
pub struct GmailDirectory {
    client: Client,
    base_url: String,
    excluded_label: Option<String>,
}

impl GmailDirectory {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| AgentError::Provider(format!("build gmail http client: {error}")))?;
        Ok(Self {
            client,
            base_url: GMAIL_API_BASE.to_string(),
            excluded_label: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Leave messages already carrying `label` out of the unread listing.
    pub fn excluding_label(mut self, label: impl Into<String>) -> Self {
        self.excluded_label = Some(label.into());
        self
    }

    fn unread_query(&self) -> String {
        match &self.excluded_label {
            Some(label) if label.contains(char::is_whitespace) => {
                format!("{UNREAD_PRIMARY_QUERY} -label:\"{label}\"")
            }
            Some(label) => format!("{UNREAD_PRIMARY_QUERY} -label:{label}"),
            None => UNREAD_PRIMARY_QUERY.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{path}", self.base_url)
    }

    async fn execute(&self, request: RequestBuilder, credentials: &Credentials) -> Result<String> {
        let response = request
            .bearer_auth(&credentials.access_token)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }
        Ok(body)
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        credentials: &Credentials,
        what: &str,
    ) -> Result<T> {
        let body = self.execute(request, credentials).await?;
        serde_json::from_str(&body).map_err(|error| {
            AgentError::Provider(format!(
                "decode gmail {what}: {error} body={}",
                redact_response_body(&body)
            ))
        })
    }
}

fn classify_failure(status: StatusCode, body: &str) -> AgentError {
    let detail = format!(
        "gmail api request failed: status={} body={}",
        status,
        redact_response_body(body)
    );
    match status {
        StatusCode::FORBIDDEN if is_usage_limited(body) => AgentError::TransientProvider(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            AgentError::TransientProvider(detail)
        }
        status if status.is_server_error() => AgentError::TransientProvider(detail),
        _ => AgentError::Provider(detail),
    }
}

fn is_usage_limited(body: &str) -> bool {
    serde_json::from_str::<GmailErrorEnvelope>(body)
        .map(|envelope| {
            envelope
                .error
                .errors
                .iter()
                .any(|detail| USAGE_LIMIT_REASONS.contains(&detail.reason.as_str()))
        })
        .unwrap_or(false)
}

#[async_trait]
impl MailDirectory for GmailDirectory {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn list_unread_primary(&self, credentials: &Credentials) -> Result<Vec<Message>> {
        let query = self.unread_query();
        let page_size = DEFAULT_PAGE_SIZE.to_string();
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query.as_str()), ("maxResults", page_size.as_str())];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let request = self.client.get(self.url("messages")).query(&params);
            let page: GmailMessageList = self
                .execute_json(request, credentials, "message list")
                .await?;

            messages.extend(page.messages.unwrap_or_default().into_iter().map(|stub| {
                Message {
                    id: stub.id,
                    thread_id: stub.thread_id,
                }
            }));

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!(count = messages.len(), "listed unread primary messages");
        Ok(messages)
    }

    async fn get_thread(&self, credentials: &Credentials, thread_id: &str) -> Result<Thread> {
        let mut params = vec![("format", "metadata")];
        params.extend(
            THREAD_METADATA_HEADERS
                .iter()
                .map(|header| ("metadataHeaders", *header)),
        );
        let request = self
            .client
            .get(self.url(&format!("threads/{thread_id}")))
            .query(&params);
        let thread: GmailThread = self.execute_json(request, credentials, "thread").await?;

        Ok(Thread {
            id: thread.id,
            messages: thread
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|message| ThreadMessage {
                    id: message.id,
                    headers: message
                        .payload
                        .and_then(|payload| payload.headers)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|header| Header {
                            name: header.name,
                            value: header.value,
                        })
                        .collect(),
                })
                .collect(),
        })
    }

    async fn list_labels(&self, credentials: &Credentials) -> Result<Vec<Label>> {
        let request = self.client.get(self.url("labels"));
        let list: GmailLabelList = self.execute_json(request, credentials, "label list").await?;
        Ok(list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(GmailLabel::into_label)
            .collect())
    }

    async fn create_label(&self, credentials: &Credentials, name: &str) -> Result<Label> {
        let request = self.client.post(self.url("labels")).json(&CreateLabelRequest {
            name,
            label_list_visibility: "labelShow",
            message_list_visibility: "show",
        });
        let label: GmailLabel = self
            .execute_json(request, credentials, "created label")
            .await?;
        Ok(label.into_label())
    }

    async fn send_message(
        &self,
        credentials: &Credentials,
        raw: &str,
        thread_id: &str,
    ) -> Result<()> {
        let request = self
            .client
            .post(self.url("messages/send"))
            .json(&SendMessageRequest { raw, thread_id });
        self.execute(request, credentials).await?;
        Ok(())
    }

    async fn apply_label(
        &self,
        credentials: &Credentials,
        message_id: &str,
        label_id: &str,
    ) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("messages/{message_id}/modify")))
            .json(&ModifyMessageRequest {
                add_label_ids: [label_id],
            });
        self.execute(request, credentials).await?;
        Ok(())
    }
}

// --- Gmail API request types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelRequest<'a> {
    name: &'a str,
    label_list_visibility: &'a str,
    message_list_visibility: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    raw: &'a str,
    thread_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyMessageRequest<'a> {
    add_label_ids: [&'a str; 1],
}

// --- Gmail API response types ---

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageList {
    messages: Option<Vec<GmailMessageStub>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailMessageStub {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailThread {
    id: String,
    messages: Option<Vec<GmailThreadMessage>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailThreadMessage {
    id: String,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailPayload {
    headers: Option<Vec<GmailHeader>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailLabelList {
    labels: Option<Vec<GmailLabel>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

impl GmailLabel {
    fn into_label(self) -> Label {
        Label {
            id: self.id,
            name: self.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GmailErrorEnvelope {
    error: GmailErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailErrorBody {
    #[serde(default)]
    errors: Vec<GmailErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmailErrorDetail {
    #[serde(default)]
    reason: String,
}
