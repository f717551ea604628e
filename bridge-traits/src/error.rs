use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error reported by a bridge operation (listing, uploading or deleting a
/// remote file).
///
/// Values are cloned onto file records and into events, so every variant
/// carries owned, comparable data instead of wrapping a source error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Transfer aborted")]
    Aborted,
}

impl BridgeError {
    /// Whether this error is the acknowledgement of a cancellation request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, BridgeError::Aborted)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.txt");
        let err: BridgeError = io.into();
        assert!(matches!(err, BridgeError::Io(ref msg) if msg.contains("missing.txt")));
    }

    #[test]
    fn test_display() {
        let err = BridgeError::Rejected {
            status: 413,
            message: "payload too large".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Remote rejected request (413): payload too large"
        );
        assert!(BridgeError::Aborted.is_aborted());
        assert!(!err.is_aborted());
    }
}
