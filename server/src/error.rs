//! Error kinds for failures that are visible outside the engine.
//!
//! Rule evaluation is total over valid world state and never produces one of
//! these; they all originate at the connection boundary.

use std::fmt;

#[derive(Debug)]
pub enum ServerError {
    /// Join rejected because the server is at its player cap. Reported to the
    /// rejected client only; no session is created.
    CapacityExceeded,
    /// Malformed or unframeable message. The offending connection is
    /// terminated; other players are unaffected.
    ProtocolViolation(String),
    /// Read or write error on a connection. Treated like a graceful leave.
    TransportFailure(std::io::Error),
    /// The TLS handshake did not complete and policy does not permit a
    /// plaintext fallback.
    TlsHandshakeFailure(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::CapacityExceeded => write!(f, "server is full"),
            ServerError::ProtocolViolation(detail) => {
                write!(f, "protocol violation: {}", detail)
            }
            ServerError::TransportFailure(e) => write!(f, "transport failure: {}", e),
            ServerError::TlsHandshakeFailure(e) => write!(f, "TLS handshake failed: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::TransportFailure(e) | ServerError::TlsHandshakeFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::TransportFailure(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ServerError::CapacityExceeded.to_string(), "server is full");

        let violation = ServerError::ProtocolViolation("unknown tag".to_string());
        assert_eq!(violation.to_string(), "protocol violation: unknown tag");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ServerError = io.into();
        assert!(matches!(err, ServerError::TransportFailure(_)));
    }
}
