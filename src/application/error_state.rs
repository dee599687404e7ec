use parking_lot::RwLock;

use crate::ports::{ApiError, ErrorDetail};

pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// Build the user-facing message for a failed operation.
///
/// Server detail is appended to `default_message` when the response carried
/// any; otherwise the status code is reported.
pub fn describe_failure(default_message: &str, error: &ApiError) -> String {
    match error {
        ApiError::Http { status, detail } => match detail.as_ref().and_then(ErrorDetail::text) {
            Some(text) => format!("{default_message}: {text}"),
            None => format!("{default_message} (Server Error {status})"),
        },
        ApiError::Network(message) | ApiError::Serialization(message) => {
            if message.contains(default_message) {
                message.clone()
            } else {
                format!("{default_message}: {message}")
            }
        }
    }
}

/// Render a collection fetch error for the banner.
pub fn describe_fetch_error(error: &ApiError) -> String {
    match error {
        ApiError::Http { status, .. } => format!("API Error: {status}"),
        ApiError::Network(message) | ApiError::Serialization(message) if !message.trim().is_empty() => {
            message.clone()
        }
        _ => UNEXPECTED_ERROR.to_string(),
    }
}

#[derive(Debug, Default)]
struct Slot {
    message: Option<String>,
    revision: u64,
}

/// The single user-facing error message. Most recent write wins.
#[derive(Debug, Default)]
pub struct ErrorState {
    slot: RwLock<Slot>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        let mut slot = self.slot.write();
        slot.message = Some(message);
        slot.revision += 1;
    }

    /// Returns true if a message was cleared.
    pub fn clear(&self) -> bool {
        let mut slot = self.slot.write();
        if slot.message.take().is_some() {
            slot.revision += 1;
            true
        } else {
            false
        }
    }

    /// Revision and message read together.
    pub fn snapshot(&self) -> (u64, Option<String>) {
        let slot = self.slot.read();
        (slot.revision, slot.message.clone())
    }
}
