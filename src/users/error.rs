use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{auth::password::PasswordError, validation::ValidationError};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0}")]
    Validation(String),

    #[error("Content-Type must be application/json")]
    ContentType,

    #[error("Invalid user ID format")]
    InvalidId,

    #[error("Email already exists")]
    EmailExists,

    #[error("Name already exists")]
    NameExists,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or missing token")]
    Unauthorized,

    #[error("User not found")]
    NotFound,

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type UserResult<T> = Result<T, UserError>;

impl UserError {
    /// Duplicates keep the historical 500 status on HTTP.
    pub fn status(&self) -> StatusCode {
        match self {
            UserError::Validation(_) | UserError::ContentType | UserError::InvalidId => {
                StatusCode::BAD_REQUEST
            }
            UserError::InvalidCredentials | UserError::Unauthorized => StatusCode::UNAUTHORIZED,
            UserError::NotFound => StatusCode::NOT_FOUND,
            UserError::EmailExists
            | UserError::NameExists
            | UserError::PasswordHash(_)
            | UserError::Token(_)
            | UserError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            UserError::PasswordHash(_) | UserError::Token(_) | UserError::Storage(_)
        )
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<ValidationError> for UserError {
    fn from(e: ValidationError) -> Self {
        UserError::Validation(e.to_string())
    }
}

impl From<PasswordError> for UserError {
    fn from(e: PasswordError) -> Self {
        UserError::PasswordHash(e.to_string())
    }
}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        UserError::Storage(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for UserError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        UserError::Token(e.to_string())
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, "internal error");
        }
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl From<UserError> for tonic::Status {
    fn from(e: UserError) -> Self {
        let message = e.public_message();
        match &e {
            UserError::Validation(_) | UserError::ContentType | UserError::InvalidId => {
                tonic::Status::invalid_argument(message)
            }
            UserError::EmailExists | UserError::NameExists => {
                tonic::Status::already_exists(message)
            }
            UserError::InvalidCredentials | UserError::Unauthorized => {
                tonic::Status::unauthenticated(message)
            }
            UserError::NotFound => tonic::Status::not_found(message),
            UserError::PasswordHash(_) | UserError::Token(_) | UserError::Storage(_) => {
                tracing::error!(error = %e, "internal error");
                tonic::Status::internal(message)
            }
        }
    }
}
