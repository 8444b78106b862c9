use serde::{Deserialize, Serialize};

use crate::domain::StoredArtifact;

/// Raw submit form as posted by the front-end. Every field is optional
/// at the wire level; validation decides what is actually required.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SubmitRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub signature_data_url: String,
    #[serde(default)]
    pub sign_item: Option<String>,
    #[serde(default)]
    pub consent: bool,
    #[serde(default, rename = "userEmail")]
    pub user_email: Option<String>,
}

/// Outcome discriminator carried in every response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Ok,
    ValidationError,
    AuthRequired,
    Duplicate,
    ToolError,
    TotalUnknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "fileId", skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<StoredArtifact>,
}

/// Uniform response envelope. The transport status is always 200; this
/// envelope is the actual outcome channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub code: ResponseCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>, data: ResponseData) -> Self {
        Self {
            code: ResponseCode::Ok,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: ResponseData) -> Self {
        self.data = Some(data);
        self
    }
}
