/**
 * Routes Module
 * API route handlers and shared response envelopes
 */
use serde::{Deserialize, Serialize};

pub mod admin_blog;
pub mod admin_case_studies;
pub mod admin_comments;
pub mod auth;
pub mod blog;
pub mod case_studies;
pub mod health;

/// Success envelope: `{ "success": true, "data": ..., "count": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            count: None,
        }
    }

    pub fn with_count(data: T, count: usize) -> Self {
        Self {
            success: true,
            data,
            count: Some(count),
        }
    }
}

/// Error envelope: `{ "success": false, "error": "..." }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Message envelope for deletes and fire-and-forget operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
