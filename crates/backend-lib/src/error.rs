// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("No credential presented")]
    Unauthenticated,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Credential expired")]
    Expired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Chat not found: {0}")]
    RoomNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Too many failed authentication attempts")]
    RateLimited,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredential(_) | AppError::Expired => {
                StatusCode::UNAUTHORIZED
            },
            AppError::Forbidden(_) | AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::InvalidId(_) => StatusCode::BAD_REQUEST,
            AppError::RoomNotFound(_) | AppError::MessageNotFound(_) | AppError::UserNotFound(_) => {
                StatusCode::NOT_FOUND
            },
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Io(_) | AppError::Json(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "AUTH_001",
            AppError::InvalidCredential(_) => "AUTH_002",
            AppError::Expired => "AUTH_003",
            AppError::Forbidden(_) => "AUTH_004",
            AppError::RateLimited => "AUTH_005",
            AppError::Unauthorized(_) => "PERM_001",
            AppError::Validation(_) => "VAL_001",
            AppError::InvalidId(_) => "VAL_002",
            AppError::RoomNotFound(_) => "NF_001",
            AppError::MessageNotFound(_) => "NF_002",
            AppError::UserNotFound(_) => "NF_003",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// True for backend failures whose detail must stay in the logs
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "No token provided, authorization denied".to_string(),
            AppError::InvalidCredential(_) => "Invalid token".to_string(),
            AppError::Expired => "Token expired".to_string(),
            AppError::Forbidden(_) => "Insufficient position permissions".to_string(),
            AppError::RateLimited => {
                "Too many authentication attempts, please try again later".to_string()
            },
            AppError::Io(_) | AppError::Json(_) | AppError::Internal(_) => {
                "An unexpected server error occurred".to_string()
            },
            _ => self.client_message(),
        }
    }

    /// Reason sent back to a connection in an `errorMessage` event.
    ///
    /// Rejections carry their detail; server errors never do.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Unauthorized(reason)
            | AppError::Validation(reason)
            | AppError::InvalidId(reason) => reason.clone(),
            AppError::RoomNotFound(_) => "Chat not found".to_string(),
            AppError::MessageNotFound(_) => "Message not found in this chat".to_string(),
            AppError::UserNotFound(_) => "User not found or has invalid role".to_string(),
            AppError::Io(_) | AppError::Json(_) | AppError::Internal(_) => {
                "An unexpected server error occurred".to_string()
            },
            other => other.sanitized_message(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) && !self.is_server_error() {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
