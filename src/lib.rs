pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mailbox;
pub mod reconcile;

pub use error::{AgentError, Result};
