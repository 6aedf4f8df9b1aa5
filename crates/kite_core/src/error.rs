//! Render error types

use std::sync::Arc;
use thiserror::Error;

/// A consumer callback failure, shared between every waiter of one render
pub type SharedError = Arc<anyhow::Error>;

/// Errors delivered through a [`RenderCompletion`](crate::RenderCompletion)
#[derive(Error, Debug, Clone)]
pub enum RenderError {
    /// A render-phase callback failed; later callbacks of the batch were skipped
    #[error("render phase failed: {0}")]
    Render(SharedError),

    /// A rendered-phase callback failed; later callbacks of the batch were skipped
    #[error("rendered phase failed: {0}")]
    Rendered(SharedError),

    /// The component instance was dropped before its scheduled render ran
    #[error("component instance dropped before its render ran")]
    Dropped,
}

impl RenderError {
    /// The underlying callback error, if any
    pub fn callback_error(&self) -> Option<&anyhow::Error> {
        match self {
            RenderError::Render(err) | RenderError::Rendered(err) => Some(&**err),
            RenderError::Dropped => None,
        }
    }
}

/// Result type for render lifecycle operations
pub type Result<T> = std::result::Result<T, RenderError>;
