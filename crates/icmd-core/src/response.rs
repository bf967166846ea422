use serde::{Deserialize, Serialize};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;

/// Envelope for every business operation. Failures are reported here with
/// `is_succeeded: false` and a status-like code, never as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub is_succeeded: bool,
    pub message: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            is_succeeded: true,
            message: message.into(),
            status_code: STATUS_OK,
            data: Some(data),
        }
    }

    /// Success without a payload.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            is_succeeded: true,
            message: message.into(),
            status_code: STATUS_OK,
            data: None,
        }
    }

    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            is_succeeded: false,
            message: message.into(),
            status_code,
            data: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::failure(STATUS_BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failure(STATUS_NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::failure(STATUS_CONFLICT, message)
    }
}
