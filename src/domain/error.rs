use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Task text must not be empty")]
    EmptyText,

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
