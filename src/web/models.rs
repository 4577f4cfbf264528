//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};

/// An ordered batch of commands to run in one control session.
#[derive(Debug, Deserialize, Serialize)]
pub struct GcodeBatchRequest {
    pub commands: Vec<String>,
    /// Overrides the configured per-step timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Body of every non-success response that is not a session result.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
