use crate::services::ActivationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(BTreeMap<&'static str, String>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Activation token not found")]
    TokenNotFound,

    #[error("Activation token has expired")]
    TokenExpired,

    #[error("User is already activated")]
    AlreadyActivated,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ActivationError> for AppError {
    fn from(err: ActivationError) -> Self {
        match err {
            ActivationError::EmailAlreadyExists => AppError::EmailAlreadyExists,
            ActivationError::UserNotFound => AppError::UserNotFound,
            ActivationError::TokenNotFound => AppError::TokenNotFound,
            ActivationError::TokenExpired => AppError::TokenExpired,
            ActivationError::AlreadyActivated => AppError::AlreadyActivated,
            ActivationError::MalformedToken(e) => AppError::BadRequest(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(fields) => (StatusCode::BAD_REQUEST, json!({ "error": fields })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::EmailAlreadyExists => (
                StatusCode::CONFLICT,
                json!({ "error": "a user with this email address already exists" }),
            ),
            AppError::UserNotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "user not found" }),
            ),
            AppError::TokenNotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "activation token not found" }),
            ),
            AppError::TokenExpired => (
                StatusCode::GONE,
                json!({ "error": "activation token has expired" }),
            ),
            AppError::AlreadyActivated => (
                StatusCode::CONFLICT,
                json!({ "error": "user is already activated" }),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "the server encountered a problem and could not process your request" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
