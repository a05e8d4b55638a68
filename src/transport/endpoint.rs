//! WebSocket endpoint normalization.
//!
//! `create` accepts any `ws://` or `wss://` URL. Normalization lowercases
//! the scheme and host, resolves the port (80 for `ws`, 443 for `wss` when
//! omitted) and drops the fragment, which RFC 6455 forbids.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Endpoint
// ============================================================================

/// A normalized `ws://` or `wss://` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parses and normalizes `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `raw` does not parse, has a scheme
    /// other than `ws`/`wss`, or has no host.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut url = Url::parse(raw.trim()).map_err(|e| Error::invalid_url(raw, e.to_string()))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::invalid_url(
                raw,
                format!("Unsupported scheme '{}'", url.scheme()),
            ));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::invalid_url(raw, "Missing host"))?
            .to_string();

        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::invalid_url(raw, "Missing port"))?;

        url.set_fragment(None);

        Ok(Self { url, host, port })
    }

    /// Normalized URL (default ports are omitted from the string form).
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Normalized URL as a string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host name or address.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, explicit or defaulted from the scheme.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` for `wss://`.
    #[inline]
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    /// `host:port` with the port always present.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `Host` header value; the port appears only when not the default.
    #[must_use]
    pub fn host_header(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    /// Path and query sent in the request line.
    #[must_use]
    pub fn request_target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{query}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
