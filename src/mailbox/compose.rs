use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Build a minimal plain-text MIME message and encode it base64url without
/// padding, the transport encoding Gmail's `raw` field expects.
pub fn compose(content: &EmailContent) -> Result<String> {
    let to = content.to.trim();
    if to.is_empty() {
        return Err(AgentError::Encoding("recipient is empty".to_string()));
    }
    reject_line_breaks("to", to)?;
    reject_line_breaks("subject", &content.subject)?;

    let raw = format!(
        "Content-Type: text/plain; charset=\"UTF-8\"\n\
         MIME-Version: 1.0\n\
         Content-Transfer-Encoding: 7bit\n\
         to: {to}\n\
         subject: {subject}\n\
         \n\
         {text}",
        subject = content.subject,
        text = content.text,
    );

    Ok(URL_SAFE_NO_PAD.encode(raw.as_bytes()))
}

fn reject_line_breaks(field: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(AgentError::Encoding(format!(
            "{field} header contains a line break"
        )));
    }
    Ok(())
}
