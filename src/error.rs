//! Comprehensive error handling for the ingestion core.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Error response structure for consistent API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Core error type. Variants follow the error-kind taxonomy from the fetch/scrape
/// pipeline: transient vs terminal vs fatal, so callers can match instead of
/// inspecting strings.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("conflict: {resource}")]
    Conflict { resource: String },

    #[error("forbidden: {resource}")]
    Forbidden { resource: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("banned: {resource}")]
    Banned { resource: String },

    #[error("suspended: {resource}")]
    Suspended { resource: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database connection failed")]
    DatabaseConnection,

    #[error("database schema error: {0}")]
    DatabaseSchema(String),

    #[error("database authentication failed")]
    DatabaseAuth,

    #[error("database query failed")]
    DatabaseQuery(#[from] sqlx::Error),

    #[error("proxy pool exhausted")]
    ProxyExhausted,

    #[error("internal error")]
    Internal { message: Option<String> },
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation { .. } => StatusCode::BAD_REQUEST,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Conflict { .. } => StatusCode::CONFLICT,
            CoreError::Forbidden { .. } | CoreError::Banned { .. } | CoreError::Suspended { .. } => {
                StatusCode::FORBIDDEN
            }
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Transient(_) => StatusCode::BAD_GATEWAY,
            CoreError::ProxyExhausted
            | CoreError::DatabaseConnection
            | CoreError::DatabaseAuth => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Config(_) | CoreError::DatabaseSchema(_) | CoreError::DatabaseQuery(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CoreError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Transient(_) => "TRANSIENT",
            CoreError::RateLimited { .. } => "RATE_LIMITED",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Conflict { .. } => "CONFLICT",
            CoreError::Forbidden { .. } => "FORBIDDEN",
            CoreError::Unauthorized => "UNAUTHORIZED",
            CoreError::Banned { .. } => "BANNED",
            CoreError::Suspended { .. } => "SUSPENDED",
            CoreError::Timeout(_) => "TIMEOUT",
            CoreError::Validation { .. } => "VALIDATION_FAILED",
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::DatabaseConnection => "DATABASE_CONNECTION_FAILED",
            CoreError::DatabaseSchema(_) => "DATABASE_SCHEMA_ERROR",
            CoreError::DatabaseAuth => "DATABASE_AUTH_FAILED",
            CoreError::DatabaseQuery(_) => "DATABASE_QUERY_FAILED",
            CoreError::ProxyExhausted => "PROXY_EXHAUSTED",
            CoreError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            CoreError::NotFound { resource } => format!("{} not found", resource),
            CoreError::Conflict { resource } => format!("{} already exists", resource),
            CoreError::Forbidden { resource } => format!("{} is private or suspended", resource),
            CoreError::Banned { resource } => format!("{} is banned", resource),
            CoreError::Suspended { resource } => format!("{} is suspended", resource),
            CoreError::RateLimited { .. } => "Too many requests, please try again later".to_string(),
            CoreError::Unauthorized => "Missing or invalid credentials".to_string(),
            CoreError::Validation { field, message } => format!("Invalid {}: {}", field, message),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    pub fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::RateLimited { retry_after_secs } => {
                Some(json!({ "retry_after_seconds": retry_after_secs }))
            }
            CoreError::DatabaseQuery(e) => Some(json!({ "database_error": e.to_string() })),
            _ => None,
        }
    }

    /// Whether this error kind is retryable within the same cycle (§7 propagation policy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_) | CoreError::Timeout(_))
    }

    /// Whether this error kind is terminal for the item (no retry this cycle).
    pub fn is_terminal_for_item(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound { .. }
                | CoreError::Forbidden { .. }
                | CoreError::Banned { .. }
                | CoreError::Suspended { .. }
        )
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();
        let user_message = self.user_message();
        let details = self.error_details();

        match &self {
            CoreError::Internal { .. }
            | CoreError::DatabaseConnection
            | CoreError::DatabaseAuth
            | CoreError::DatabaseSchema(_)
            | CoreError::DatabaseQuery(_)
            | CoreError::Config(_) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "server error"
                );
            }
            CoreError::Transient(_) | CoreError::ProxyExhausted | CoreError::Timeout(_) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "upstream error"
                );
            }
            _ => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "client error"
                );
            }
        }

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: user_message,
            details,
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CoreError::Timeout(err.to_string())
        } else {
            CoreError::Transient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal {
            message: Some(format!("JSON error: {}", err)),
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal {
            message: Some(err.to_string()),
        }
    }
}

impl From<crate::config::ConfigError> for CoreError {
    fn from(err: crate::config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
