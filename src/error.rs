//! Error types for devolve.

use thiserror::Error;

/// Main error type for devolve.
#[derive(Error, Debug)]
pub enum DevolveError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Listener error: {0}")]
    Listener(String),

    #[error("Application callback failed: {0}")]
    Application(String),
}

/// Result type alias for devolve operations.
pub type Result<T> = std::result::Result<T, DevolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "boom");
        let err: DevolveError = io.into();
        assert!(matches!(err, DevolveError::Io(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_error_messages() {
        let err = DevolveError::Config("port 80 is below 1024".into());
        assert!(err.to_string().contains("Invalid configuration"));

        let err = DevolveError::Protocol("expected ack".into());
        assert!(err.to_string().contains("Protocol violation"));
    }
}
