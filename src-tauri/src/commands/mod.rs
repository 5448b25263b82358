//! Request/response boundary.
//!
//! Each handler takes a typed request, runs the operation in its own
//! transaction (reads run outside one) and answers with a [`CommandResponse`].
//! The desktop shell forwards its IPC commands straight to these.

pub mod batches;
pub mod catalog;
pub mod inventory;
pub mod sales;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, LedgerError, LedgerResult};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommandResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set on failure so the caller can tell retryable rejections from faults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        CommandResponse {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn failure(err: &LedgerError) -> Self {
        CommandResponse {
            success: false,
            data: None,
            message: Some(err.to_string()),
            error: Some(err.kind()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

pub(crate) fn respond<T>(operation: &'static str, result: LedgerResult<T>) -> CommandResponse<T> {
    match result {
        Ok(data) => CommandResponse::ok(data),
        Err(err) => {
            if err.kind().is_user_correctable() {
                tracing::warn!(operation, error = %err, "command rejected");
            } else {
                tracing::error!(operation, error = %err, "command failed");
            }
            CommandResponse::failure(&err)
        }
    }
}
