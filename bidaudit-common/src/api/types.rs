//! Response envelope shared by every endpoint
//!
//! `{ "code": 0, "data": ..., "message": "..." }` on success; on failure
//! `code` carries the HTTP status number and `message` the reason.
//!
//! # Examples
//!
//! ```
//! use bidaudit_common::api::ApiResponse;
//!
//! let ok = ApiResponse::ok(vec![1, 2, 3]);
//! assert_eq!(ok.code, 0);
//!
//! let err = ApiResponse::<()>::error(404, "Project not found");
//! assert_eq!(serde_json::to_value(&err).unwrap()["message"], "Project not found");
//! ```

use serde::{Deserialize, Serialize};

/// `code` value for successful responses
pub const SUCCESS_CODE: i32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            code: SUCCESS_CODE,
            data: Some(data),
            message: Some(message.into()),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_omits_message() {
        let value = serde_json::to_value(ApiResponse::ok(json!({"id": "p1"}))).unwrap();
        assert_eq!(value, json!({"code": 0, "data": {"id": "p1"}}));
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let value = serde_json::to_value(ApiResponse::<()>::error(400, "name is required")).unwrap();
        assert_eq!(value, json!({"code": 400, "message": "name is required"}));
    }

    #[test]
    fn test_envelope_deserializes_without_optional_fields() {
        let parsed: ApiResponse<Vec<u32>> = serde_json::from_value(json!({"code": 0})).unwrap();
        assert!(parsed.is_success());
        assert!(parsed.data.is_none());
    }
}
