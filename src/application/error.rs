use crate::domain::DomainError;
use crate::ports::{ApiError, ConfigError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Domain(#[from] DomainError),
}

pub type AppResult<T> = Result<T, AppError>;
