//! Error types for pageview_core.

use thiserror::Error;

use crate::session::SessionState;
use crate::slot::SlotState;

/// Error types for viewer operations.
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Failed to open document: {0}")]
    DocumentOpenError(String),

    #[error("Page index out of range: index={index}, page_count={page_count}")]
    OutOfRange { index: u32, page_count: u32 },

    #[error("Invalid slot transition for page {index}: {current:?} -> {target:?}")]
    InvalidTransition {
        index: u32,
        current: SlotState,
        target: SlotState,
    },

    #[error("Session cannot be opened from state {0:?}")]
    SessionState(SessionState),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to build render pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Rasterization failure for a single page.
///
/// Never propagated out of the render pipeline: the failed slot keeps it for display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to render page {page}: {reason}")]
pub struct RenderError {
    pub page: u32,
    pub reason: String,
}

impl RenderError {
    pub fn new(page: u32, reason: impl Into<String>) -> Self {
        Self {
            page,
            reason: reason.into(),
        }
    }
}

/// Result type alias for viewer operations.
pub type ViewerResult<T> = Result<T, ViewerError>;
