//! Events reported to the host.
//!
//! Every socket reports its lifecycle through the event sink as a sequence
//! of [`Event`]s: one `open`, any number of `message`s, then exactly one
//! `close`. A failed `create` reports a single `error` instead.
//!
//! # Format
//!
//! Events serialize to the JSON shape the host bridge expects:
//!
//! | Event | JSON |
//! |-------|------|
//! | `Open` | `{"event":"onopen","protocol":"chat"}` |
//! | `Message` (text) | `{"event":"onmessage","data":"hello"}` |
//! | `Message` (binary) | `{"event":"onmessage","data":"AQID","binary":true}` |
//! | `Close` | `{"event":"onclose","code":1000,"reason":"","wasClean":true}` |
//! | `Error` | `{"event":"onerror","message":"..."}` |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};

use crate::error::Result;

use super::frame::close_code;
use super::message::Message;

// ============================================================================
// Event
// ============================================================================

/// A normalized socket event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The socket is open; `protocol` is the negotiated subprotocol or empty.
    Open {
        /// Negotiated subprotocol.
        protocol: String,
    },

    /// A complete message arrived.
    Message(Message),

    /// The socket closed. Always the last event for a connection.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
        /// `true` iff `code` is 1000.
        was_clean: bool,
    },

    /// The socket could not be opened, or an operation failed.
    Error {
        /// Description of the failure.
        message: String,
    },
}

impl Event {
    /// Creates an open event.
    #[inline]
    #[must_use]
    pub fn open(protocol: impl Into<String>) -> Self {
        Self::Open {
            protocol: protocol.into(),
        }
    }

    /// Creates a close event; `was_clean` is derived from the code.
    #[inline]
    #[must_use]
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
            was_clean: code == close_code::NORMAL,
        }
    }

    /// Creates an error event.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns the host-side event name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "onopen",
            Self::Message(_) => "onmessage",
            Self::Close { .. } => "onclose",
            Self::Error { .. } => "onerror",
        }
    }

    /// Serializes the event into the host JSON format.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Serialization
// ============================================================================

/// Wire shape of an [`Event`].
#[derive(Serialize)]
#[serde(tag = "event")]
enum HostEvent<'a> {
    #[serde(rename = "onopen")]
    Open { protocol: &'a str },

    #[serde(rename = "onmessage")]
    Message {
        data: Cow<'a, str>,
        #[serde(skip_serializing_if = "is_false")]
        binary: bool,
    },

    #[serde(rename = "onclose")]
    Close {
        code: u16,
        reason: &'a str,
        #[serde(rename = "wasClean")]
        was_clean: bool,
    },

    #[serde(rename = "onerror")]
    Error { message: &'a str },
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let host = match self {
            Self::Open { protocol } => HostEvent::Open {
                protocol: protocol.as_str(),
            },
            Self::Message(Message::Text(text)) => HostEvent::Message {
                data: Cow::Borrowed(text.as_str()),
                binary: false,
            },
            Self::Message(Message::Binary(data)) => HostEvent::Message {
                data: Cow::Owned(STANDARD.encode(data)),
                binary: true,
            },
            Self::Close {
                code,
                reason,
                was_clean,
            } => HostEvent::Close {
                code: *code,
                reason: reason.as_str(),
                was_clean: *was_clean,
            },
            Self::Error { message } => HostEvent::Error {
                message: message.as_str(),
            },
        };
        host.serialize(serializer)
    }
}

// ============================================================================
// Tests
// ============================================================================
