use std::sync::Arc;

use tracing::info;

use super::MailDirectory;
use crate::credentials::Credentials;
use crate::error::Result;

/// Resolves a label name to its provider id, creating the label when the
/// mailbox has none by that name.
///
/// Every call re-lists labels; nothing is cached between calls. The
/// list-then-create step is not atomic at the provider, so an external client
/// creating the same name concurrently can leave two labels with one name.
#[derive(Clone)]
pub struct LabelResolver {
    directory: Arc<dyn MailDirectory>,
}

impl LabelResolver {
    pub fn new(directory: Arc<dyn MailDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, credentials: &Credentials, name: &str) -> Result<String> {
        let labels = self.directory.list_labels(credentials).await?;
        if let Some(existing) = labels.into_iter().find(|label| label.name == name) {
            return Ok(existing.id);
        }

        let created = self.directory.create_label(credentials, name).await?;
        info!(label = name, id = %created.id, "created label");
        Ok(created.id)
    }
}
