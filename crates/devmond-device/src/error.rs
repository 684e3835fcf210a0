//! Error type for device identity and resolution.

use thiserror::Error;

/// Errors produced while parsing device ids or resolving them to devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The textual id does not follow any known device id format.
    #[error("Malformed device id: {id}")]
    MalformedId {
        /// The offending id text.
        id: String,
    },

    /// The id is well-formed but no such device exists on the system.
    #[error("No device found for id: {id}")]
    NotFound {
        /// The id that failed to resolve.
        id: String,
    },

    /// An underlying filesystem read failed while resolving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the device crate.
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages_non_empty() {
        let errors = [
            DeviceError::MalformedId {
                id: "???".to_string(),
            },
            DeviceError::NotFound {
                id: "b8:99".to_string(),
            },
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = DeviceError::from(io_err);
        assert!(matches!(err, DeviceError::Io(_)));
    }
}
