use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::credentials::{CredentialProvider, Credentials};
use crate::error::{AgentError, Result};
use crate::mailbox::{compose, EmailContent, LabelResolver, MailDirectory, Message, Thread};

pub mod scheduler;

pub use scheduler::{stop_channel, PollInterval, Scheduler, StopHandle, StopSignal};

pub const DEFAULT_LABEL: &str = "AutoReplied";
pub const DEFAULT_REPLY_SUBJECT: &str = "Re: AutoGenerated Reply";
pub const DEFAULT_REPLY_BODY: &str =
    "Thank you for your email. I am currently out of the office and will respond as soon as possible.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTemplate {
    pub subject: String,
    pub body: String,
}

impl Default for ReplyTemplate {
    fn default() -> Self {
        Self {
            subject: DEFAULT_REPLY_SUBJECT.to_string(),
            body: DEFAULT_REPLY_BODY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Nobody has answered yet.
    Eligible,
    Ineligible { depth: usize },
}

/// A thread holding exactly one message has no reply from anyone yet.
pub fn classify(thread: &Thread) -> Classification {
    match thread.depth() {
        1 => Classification::Eligible,
        depth => Classification::Ineligible { depth },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    pub replied: usize,
    pub labeled: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    /// Stopped early by the stop signal.
    pub stopped: bool,
    /// Stopped early because credentials stopped working mid-cycle.
    pub aborted: bool,
}

enum Outcome {
    Skipped,
    Labeled,
    /// The reply went out but the marker label could not be applied.
    Unlabeled(AgentError),
}

/// One poll-and-respond pass over the inbox. Holds no state between cycles;
/// the mailbox (unread flag, thread depth, label) is the source of truth.
pub struct ReconciliationLoop {
    credentials: CredentialProvider,
    directory: Arc<dyn MailDirectory>,
    labels: LabelResolver,
    label_name: String,
    reply: ReplyTemplate,
}

impl ReconciliationLoop {
    pub fn new(credentials: CredentialProvider, directory: Arc<dyn MailDirectory>) -> Self {
        Self {
            credentials,
            labels: LabelResolver::new(directory.clone()),
            directory,
            label_name: DEFAULT_LABEL.to_string(),
            reply: ReplyTemplate::default(),
        }
    }

    pub fn with_label(mut self, label_name: impl Into<String>) -> Self {
        self.label_name = label_name.into();
        self
    }

    pub fn with_reply(mut self, reply: ReplyTemplate) -> Self {
        self.reply = reply;
        self
    }

    pub async fn run_cycle(&self, stop: &StopSignal) -> Result<CycleReport> {
        let credentials = self.credentials.valid_credentials().await?;
        let candidates = self.directory.list_unread_primary(&credentials).await?;

        let mut report = CycleReport {
            candidates: candidates.len(),
            ..CycleReport::default()
        };
        debug!(
            provider = self.directory.name(),
            candidates = report.candidates,
            label = %self.label_name,
            "starting reconciliation pass"
        );

        for message in &candidates {
            if stop.is_stopped() {
                report.stopped = true;
                break;
            }

            let failure = match self.process_message(&credentials, message).await {
                Ok(Outcome::Skipped) => {
                    report.skipped += 1;
                    None
                }
                Ok(Outcome::Labeled) => {
                    report.replied += 1;
                    report.labeled += 1;
                    None
                }
                Ok(Outcome::Unlabeled(error)) => {
                    report.replied += 1;
                    warn!(
                        message_id = %message.id,
                        "replied but could not apply label {}: {error}", self.label_name
                    );
                    report
                        .errors
                        .push(format!("id={}: label: {error}", message.id));
                    Some(error)
                }
                Err(error) => {
                    warn!(message_id = %message.id, "skipping message: {error}");
                    report.errors.push(format!("id={}: {error}", message.id));
                    Some(error)
                }
            };

            if failure.is_some_and(|error| error.aborts_cycle()) {
                report.aborted = true;
                break;
            }
        }

        Ok(report)
    }

    async fn process_message(&self, credentials: &Credentials, message: &Message) -> Result<Outcome> {
        let thread = self
            .directory
            .get_thread(credentials, &message.thread_id)
            .await?;

        if let Classification::Ineligible { depth } = classify(&thread) {
            info!(
                message_id = %message.id,
                thread_id = %message.thread_id,
                depth,
                "thread already has a reply, leaving it alone"
            );
            return Ok(Outcome::Skipped);
        }

        let sender = thread
            .first_message()
            .and_then(|first| first.header("From"))
            .map(str::trim)
            .filter(|sender| !sender.is_empty())
            .ok_or_else(|| {
                AgentError::Encoding(format!("thread {} has no From header", thread.id))
            })?;

        let raw = compose(&EmailContent {
            to: sender.to_string(),
            subject: self.reply.subject.clone(),
            text: self.reply.body.clone(),
        })?;

        self.directory
            .send_message(credentials, &raw, &message.thread_id)
            .await?;
        info!(message_id = %message.id, thread_id = %message.thread_id, "sent auto-reply");

        match self.apply_marker(credentials, &message.id).await {
            Ok(()) => Ok(Outcome::Labeled),
            Err(error) => Ok(Outcome::Unlabeled(error)),
        }
    }

    async fn apply_marker(&self, credentials: &Credentials, message_id: &str) -> Result<()> {
        let label_id = self.labels.resolve(credentials, &self.label_name).await?;
        self.directory
            .apply_label(credentials, message_id, &label_id)
            .await
    }
}
