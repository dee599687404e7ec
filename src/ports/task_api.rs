use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{QueryKind, Task, TaskId};

/// Detail carried in a non-2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetail {
    /// `{"message": "..."}`
    Message(String),
    /// A bare JSON string or plain-text body.
    Text(String),
    /// A body that was present but had no usable detail.
    Opaque,
}

impl ErrorDetail {
    pub fn text(&self) -> Option<&str> {
        match self {
            ErrorDetail::Message(text) | ErrorDetail::Text(text) => Some(text),
            ErrorDetail::Opaque => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Http {
        status: u16,
        detail: Option<ErrorDetail>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Remote task API. Every method is a single request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list_all(&self) -> ApiResult<Vec<Task>>;
    async fn list_completed(&self) -> ApiResult<Vec<Task>>;
    async fn create(&self, text: &str) -> ApiResult<Task>;
    async fn update_text(&self, id: &TaskId, text: &str) -> ApiResult<Task>;
    async fn delete(&self, id: &TaskId) -> ApiResult<()>;
    async fn complete(&self, id: &TaskId) -> ApiResult<Task>;
    async fn incomplete(&self, id: &TaskId) -> ApiResult<Task>;
}

/// Dispatch a collection read to the matching endpoint.
pub async fn list(api: &dyn TaskApi, kind: QueryKind) -> ApiResult<Vec<Task>> {
    match kind {
        QueryKind::All => api.list_all().await,
        QueryKind::Completed => api.list_completed().await,
    }
}
