// Operation response envelope
//
// Every operation returns the same envelope: success flag, response mode,
// optional structured error with recovery hints, optional detail handle,
// and the operation-specific data payload. Tagged data, no trait objects;
// dispatch downstream is a match on the variant.

use crate::error::EngineError;
use crate::shaper::ResponseMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery: Vec<String>,
    /// Tiers that still contributed partial results, when any did
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_tiers: Vec<String>,
}

impl ErrorBody {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            recovery: error
                .recovery_hints()
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
            partial_tiers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    pub success: bool,
    pub mode: ResponseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_handle: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_switched: Option<bool>,
    pub data: serde_json::Value,
}

impl OperationResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            mode: ResponseMode::Full,
            error: None,
            detail_handle: None,
            auto_switched: None,
            data,
        }
    }

    pub fn with_mode(mut self, mode: ResponseMode, auto_switched: bool) -> Self {
        self.mode = mode;
        if auto_switched {
            self.auto_switched = Some(true);
        }
        self
    }

    pub fn with_detail_handle(mut self, handle: Option<u64>) -> Self {
        self.detail_handle = handle;
        self
    }

    pub fn from_error(error: &EngineError) -> Self {
        Self {
            success: false,
            mode: ResponseMode::Full,
            error: Some(ErrorBody::from_error(error)),
            detail_handle: None,
            auto_switched: None,
            data: serde_json::Value::Null,
        }
    }
}
