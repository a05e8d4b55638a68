//! Engine configuration.
//!
//! [`MuxConfig`] holds every tunable of the engine. It is passed to the
//! dispatcher at build time; codecs and connections receive the parts they
//! need through [`CodecConfig`] and [`ConnectionSettings`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use socket_mux::MuxConfig;
//!
//! let config = MuxConfig::new()
//!     .with_connect_timeout(Duration::from_secs(10))
//!     .with_fragment_size(4096);
//!
//! assert!(config.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::codec::CodecConfig;
use crate::error::{Error, Result};
use crate::transport::ConnectionSettings;
use crate::transport::connection::DEFAULT_CLOSE_TIMEOUT;

// ============================================================================
// Constants
// ============================================================================

/// Default connect timeout when `create` does not set `maxConnectTime`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(75);

/// Highest DEFLATE level.
const MAX_COMPRESSION_LEVEL: u32 = 9;

// ============================================================================
// MuxConfig
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxConfig {
    /// Initial capacity of each connection's reassembly buffer.
    pub message_buffer_capacity: usize,

    /// Initial capacity of each connection's compression scratch buffer.
    pub compression_buffer_capacity: usize,

    /// DEFLATE level for outbound messages, 0..=9.
    pub compression_level: u32,

    /// Connect timeout used when `create` has no `maxConnectTime`.
    pub connect_timeout: Duration,

    /// Wait for the peer's close frame after sending ours.
    pub close_timeout: Duration,

    /// Maximum payload per outbound frame; `None` sends unfragmented.
    pub fragment_size: Option<usize>,
}

// ============================================================================
// Constructors
// ============================================================================

impl Default for MuxConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MuxConfig {
    /// Creates the default configuration.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            message_buffer_capacity: 8192,
            compression_buffer_capacity: 16384,
            compression_level: 6,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            fragment_size: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl MuxConfig {
    /// Sets the initial reassembly buffer capacity.
    #[inline]
    #[must_use]
    pub fn with_message_buffer_capacity(mut self, capacity: usize) -> Self {
        self.message_buffer_capacity = capacity;
        self
    }

    /// Sets the initial compression scratch capacity.
    #[inline]
    #[must_use]
    pub fn with_compression_buffer_capacity(mut self, capacity: usize) -> Self {
        self.compression_buffer_capacity = capacity;
        self
    }

    /// Sets the DEFLATE level.
    #[inline]
    #[must_use]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets the default connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the close handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Splits outbound messages into frames of at most `size` bytes.
    #[inline]
    #[must_use]
    pub fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = Some(size);
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl MuxConfig {
    /// Checks the configuration for unusable values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a compression level above 9, a zero
    /// timeout or a zero fragment size.
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(Error::config(format!(
                "Compression level must be 0..={MAX_COMPRESSION_LEVEL}, got {}",
                self.compression_level
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }
        if self.close_timeout.is_zero() {
            return Err(Error::config("Close timeout must be greater than zero"));
        }
        if self.fragment_size == Some(0) {
            return Err(Error::config("Fragment size must be greater than zero"));
        }
        Ok(())
    }

    /// Codec sizing for one connection.
    #[inline]
    #[must_use]
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            message_buffer_capacity: self.message_buffer_capacity,
            compression_buffer_capacity: self.compression_buffer_capacity,
            compression_level: self.compression_level,
        }
    }

    /// Event-loop settings for one connection.
    #[inline]
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            close_timeout: self.close_timeout,
            fragment_size: self.fragment_size,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
