use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `{status, message, data | errors, timestamp}` envelope returned to request-driven callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub timestamp: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
            errors: None,
            timestamp: now_millis(),
        }
    }

    pub fn error(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            data: None,
            errors: if errors.is_empty() { None } else { Some(errors) },
            timestamp: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    // Clamp pre-epoch clocks to zero
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
