//! Error types for socket-mux.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use socket_mux::{Error, Result};
//!
//! fn negotiate(params: &[(String, String)]) -> Result<()> {
//!     let accepted = ExtensionParameters::negotiate(params)?;
//!     println!("{}", accepted.to_header_value());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Negotiation`], [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Base64`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use base64::DecodeError;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::close_code;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Errors are always local to one connection; nothing here is shared
/// between sockets.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when dispatcher configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed by the host.
    ///
    /// Returned when operation arguments cannot be decoded.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Invalid WebSocket URL.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The URL as supplied by the host.
        url: String,
        /// Why the URL was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the socket factory cannot establish a connection.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt exceeded `maxConnectTime`.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed.
    ///
    /// Returned when writing to a socket whose event loop has ended.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Extension negotiation failed.
    ///
    /// The extension is disabled and the connection proceeds uncompressed.
    #[error("Extension negotiation failed: {message}")]
    Negotiation {
        /// Description of the rejected parameter.
        message: String,
    },

    /// Protocol violation that terminates the connection.
    ///
    /// Carries the close code and reason sent to the peer.
    #[error("Protocol error ({code}): {reason}")]
    Protocol {
        /// Close code sent to the peer.
        code: u16,
        /// Close reason sent to the peer.
        reason: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Base64 decoding error for binary-encoded payloads.
    #[error("Base64 error: {0}")]
    Base64(#[from] DecodeError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a negotiation error.
    #[inline]
    pub fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation {
            message: message.into(),
        }
    }

    /// Creates a protocol error carrying a close code.
    #[inline]
    pub fn protocol(code: u16, reason: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            reason: reason.into(),
        }
    }

    /// Protocol error for malformed compressed data (1003).
    #[inline]
    pub fn bad_data() -> Self {
        Self::protocol(close_code::BAD_DATA, "Bad data")
    }

    /// Protocol error for a message exceeding its size ceiling (1009).
    #[inline]
    pub fn message_too_big(reason: impl Into<String>) -> Self {
        Self::protocol(close_code::MESSAGE_TOO_BIG, reason)
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::InvalidUrl { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error must terminate the connection.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns the close code to send for this error.
    ///
    /// Protocol errors carry their own code; anything else that ends a
    /// connection maps to 1006 (abnormal closure).
    #[must_use]
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Protocol { code, .. } => *code,
            _ => close_code::ABNORMAL,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = Error::bad_data();
        assert_eq!(err.to_string(), "Protocol error (1003): Bad data");
        assert_eq!(err.close_code(), 1003);
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::connection_timeout(5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::invalid_url("http://x", "bad scheme").is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_close_code_for_non_protocol_error() {
        assert_eq!(Error::ConnectionClosed.close_code(), 1006);
        assert_eq!(Error::message_too_big("too big").close_code(), 1009);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
