//! Error types for KeyRouter
//!
//! The routing hot path never fails; these errors cover configuration and
//! catalog loading, management-operation validation and state persistence.
//! All errors implement `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Failed to read provider catalog {path}: {source}")]
    CatalogRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse provider catalog {path}: {source}")]
    CatalogParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Failed to persist router state to {path}: {source}")]
    StateWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read host file {path}: {source}")]
    HostFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse host file {path}: {source}")]
    HostFileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write host file {path}: {source}")]
    HostFileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::CatalogRead { .. }
            | Self::CatalogParseFailed { .. }
            | Self::StateWrite { .. }
            | Self::HostFileRead { .. }
            | Self::HostFileParse { .. }
            | Self::HostFileWrite { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            Self::Validation(msg) | Self::Config(msg) | Self::Internal(msg) => msg.clone(),
            _ => self.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creates() {
        let err = AppError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_validation_error_names_value() {
        let err = AppError::Validation("Invalid remaining value: abc".to_string());
        assert_eq!(err.to_string(), "Invalid request: Invalid remaining value: abc");
    }

    #[test]
    fn test_state_write_error_mentions_path() {
        let err = AppError::StateWrite {
            path: "/tmp/state.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/state.json"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_validation_error_response_status() {
        let err = AppError::Validation("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_config_error_response_status() {
        let err = AppError::Config("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_error_response_status() {
        let err = AppError::Internal("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
