use thiserror::Error;

/// Everything that can go wrong while editing.
///
/// Drawing primitives never produce errors: out-of-bounds pixels are simply
/// not touched. Errors only come from structural layer operations and from
/// the image boundary (import, snapshot restore, export, local store).
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local store error: {0}")]
    Store(#[from] bincode::Error),
}

impl EditorError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EditorError::InvalidOperation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        EditorError::DecodeFailure(msg.into())
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, EditorError::InvalidOperation(_))
    }
}
