use thiserror::Error;

/// Per-frame normalization failure. Recoverable: the frame is skipped.
///
/// # Examples
/// ```
/// use pcapflow_core::FrameError;
///
/// let err = FrameError::Slice("unexpected end of slice".to_string());
/// assert!(err.to_string().contains("malformed frame"));
/// ```
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Slice(String),
}
