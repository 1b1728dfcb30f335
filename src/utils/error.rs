// src/utils/error.rs

use crate::services::core::infrastructure::kv::KvOperationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Custom error details for additional context
pub type ErrorDetails = HashMap<String, serde_json::Value>;

/// Main error type for the analytics core
/// Optimized for size by boxing large fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsError {
    pub message: String,
    pub details: Option<Box<ErrorDetails>>, // Boxed to reduce enum size
    pub status: Option<u16>,
    pub error_code: Option<String>,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[default]
    UnknownError,
    ValidationError,
    GenerationConflict,
    NotFoundError,
    ComputationError,
    SerializationError,
    StorageError,
    ExportError,
    ConfigurationError,
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AnalyticsError {}

impl AnalyticsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            status: None,
            error_code: None,
            kind,
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(Box::new(details));
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    /// Attach a list of human-readable error lines under `details["errors"]`.
    pub fn with_errors(self, errors: Vec<String>) -> Self {
        let mut details = self.details.as_deref().cloned().unwrap_or_default();
        details.insert("errors".to_string(), serde_json::json!(errors));
        self.with_details(details)
    }

    /// The structured error detail list, empty when none was attached.
    pub fn error_list(&self) -> Vec<String> {
        self.details
            .as_ref()
            .and_then(|d| d.get("errors"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    // Convenience constructors for common error types
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
            .with_status(400)
            .with_code("VALIDATION_ERROR")
    }

    /// Validation failure carrying every field error that was found.
    pub fn validation_failed(errors: Vec<String>) -> Self {
        let message = match errors.as_slice() {
            [single] => single.clone(),
            _ => format!("Invalid report parameters ({} errors)", errors.len()),
        };
        Self::validation_error(message).with_errors(errors)
    }

    pub fn generation_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GenerationConflict, message)
            .with_status(409)
            .with_code("GENERATION_IN_PROGRESS")
    }

    pub fn not_found<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::NotFoundError, message)
            .with_status(404)
            .with_code("NOT_FOUND")
    }

    pub fn computation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ComputationError, message)
            .with_status(500)
            .with_code("COMPUTATION_ERROR")
    }

    pub fn serialization_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::SerializationError, message)
            .with_status(500)
            .with_code("SERIALIZATION_ERROR")
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageError, message)
            .with_status(500)
            .with_code("STORAGE_ERROR")
    }

    pub fn export_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExportError, message)
            .with_status(500)
            .with_code("EXPORT_ERROR")
    }

    pub fn configuration_error<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::ConfigurationError, message)
            .with_status(500)
            .with_code("CONFIG_ERROR")
    }

    /// Status to report to a request-driven caller.
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(500)
    }
}

// Implement From conversions for common error types
impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::serialization_error(format!("JSON error: {}", err))
    }
}

impl From<KvOperationError> for AnalyticsError {
    fn from(err: KvOperationError) -> Self {
        match err {
            KvOperationError::Serialization(e) => AnalyticsError::serialization_error(format!(
                "KV serialization/deserialization error: {}",
                e
            )),
            KvOperationError::Storage(msg) => {
                AnalyticsError::storage_error(format!("KV storage error: {}", msg))
            }
        }
    }
}
