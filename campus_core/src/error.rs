use sea_orm::{DbErr, SqlErr};
use thiserror::Error;
use zel_core::prelude::ResourceError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("fatal database error")]
    Db(#[from] DbErr),

    #[error("media storage error")]
    Storage(#[from] std::io::Error),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("account is waiting for admin approval")]
    Unapproved,

    #[error("not logged in")]
    Unauthenticated,

    #[error("conflict: {0}")]
    Conflict(&'static str),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    /// Map a unique-constraint violation onto `Conflict`, passing every other
    /// database error through untouched.
    pub fn conflict_on_unique(err: DbErr, what: &'static str) -> Self {
        if is_unique_violation(&err) {
            ServiceError::Conflict(what)
        } else {
            ServiceError::Db(err)
        }
    }

    /// Like [`ServiceError::conflict_on_unique`] but for unique user input,
    /// which is reported back as a validation failure.
    pub fn invalid_on_unique(err: DbErr, message: &str) -> Self {
        if is_unique_violation(&err) {
            ServiceError::validation(message)
        } else {
            ServiceError::Db(err)
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => true,
        // sqlite reports composite primary keys with its own extended code
        _ => err.to_string().contains("UNIQUE constraint failed"),
    }
}

impl From<ServiceError> for ResourceError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Db(error) => ResourceError::infra(error),
            ServiceError::Storage(error) => ResourceError::infra(error),
            error => ResourceError::app(error),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
