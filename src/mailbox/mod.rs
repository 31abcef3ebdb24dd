use async_trait::async_trait;

use crate::credentials::Credentials;
use crate::error::Result;

pub mod compose;
pub mod gmail;
pub mod labels;

pub use compose::{compose, EmailContent};
pub use gmail::GmailDirectory;
pub use labels::LabelResolver;

/// A listed message; identifies one unit of work for a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: String,
    pub headers: Vec<Header>,
}

impl ThreadMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: String,
    pub messages: Vec<ThreadMessage>,
}

impl Thread {
    pub fn depth(&self) -> usize {
        self.messages.len()
    }

    pub fn first_message(&self) -> Option<&ThreadMessage> {
        self.messages.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Capability surface over the remote mailbox. Every call carries the
/// credentials it runs under; implementations hold no token state.
#[async_trait]
pub trait MailDirectory: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &str;

    /// Unread messages in the primary inbox category, in provider order.
    async fn list_unread_primary(&self, credentials: &Credentials) -> Result<Vec<Message>>;

    async fn get_thread(&self, credentials: &Credentials, thread_id: &str) -> Result<Thread>;

    async fn list_labels(&self, credentials: &Credentials) -> Result<Vec<Label>>;

    async fn create_label(&self, credentials: &Credentials, name: &str) -> Result<Label>;

    /// Sends `raw` (already transport-encoded) as a reply inside `thread_id`.
    async fn send_message(
        &self,
        credentials: &Credentials,
        raw: &str,
        thread_id: &str,
    ) -> Result<()>;

    async fn apply_label(
        &self,
        credentials: &Credentials,
        message_id: &str,
        label_id: &str,
    ) -> Result<()>;
}
