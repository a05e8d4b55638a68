//! Operations submitted by the host.
//!
//! The host drives sockets with three operations, each addressed by a
//! [`ConnectionId`]:
//!
//! | Action | Arguments |
//! |--------|-----------|
//! | `create` | `[id, url, protocol, options]` |
//! | `send` | `[id, data, isBinaryEncoded]` |
//! | `close` | `[id, code, reason]` |
//!
//! Arguments arrive as a JSON array; [`Operation::from_raw`] decodes them.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::codec::MessageLimits;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;

// ============================================================================
// Constants
// ============================================================================

/// Default ceiling for text and binary messages (bytes).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 32768;

// ============================================================================
// CreateOptions
// ============================================================================

/// Options recognized by `create`.
///
/// # Format
///
/// ```json
/// {
///   "origin": "https://app.example",
///   "maxConnectTime": 20000,
///   "maxTextMessageSize": 32768,
///   "maxBinaryMessageSize": -1
/// }
/// ```
///
/// A negative size means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOptions {
    /// `Origin` header; empty means omitted.
    pub origin: String,

    /// Connect timeout in milliseconds; `None` uses the dispatcher default.
    pub max_connect_time: Option<u64>,

    /// Text message ceiling in bytes; `None` means unlimited.
    #[serde(deserialize_with = "deserialize_limit")]
    pub max_text_message_size: Option<usize>,

    /// Binary message ceiling in bytes; `None` means unlimited.
    #[serde(deserialize_with = "deserialize_limit")]
    pub max_binary_message_size: Option<usize>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            origin: String::new(),
            max_connect_time: None,
            max_text_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            max_binary_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }
}

impl CreateOptions {
    /// Sets the origin.
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the connect timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_max_connect_time(mut self, millis: u64) -> Self {
        self.max_connect_time = Some(millis);
        self
    }

    /// Sets both message ceilings; `None` means unlimited.
    #[inline]
    #[must_use]
    pub fn with_message_limits(mut self, text: Option<usize>, binary: Option<usize>) -> Self {
        self.max_text_message_size = text;
        self.max_binary_message_size = binary;
        self
    }

    /// Returns the message ceilings for the reassembler.
    #[inline]
    #[must_use]
    pub fn limits(&self) -> MessageLimits {
        MessageLimits {
            max_text: self.max_text_message_size,
            max_binary: self.max_binary_message_size,
        }
    }
}

/// Negative or null sizes mean unlimited.
fn deserialize_limit<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<i64>::deserialize(deserializer)?;
    Ok(value.and_then(|size| usize::try_from(size).ok()))
}

// ============================================================================
// Operation
// ============================================================================

/// A host operation bound for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Open a socket.
    Create {
        /// Connection id chosen by the host.
        id: ConnectionId,
        /// `ws://` or `wss://` URL.
        url: String,
        /// Requested subprotocol; empty for none.
        protocol: String,
        /// Connection options.
        options: CreateOptions,
    },

    /// Send a message.
    Send {
        /// Target connection.
        id: ConnectionId,
        /// Text, or base64 when `binary` is set.
        data: String,
        /// `data` is base64-encoded binary.
        binary: bool,
    },

    /// Close a socket.
    Close {
        /// Target connection.
        id: ConnectionId,
        /// Close code; 0 means a normal close without reason.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl Operation {
    /// Returns the target connection.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Create { id, .. } | Self::Send { id, .. } | Self::Close { id, .. } => *id,
        }
    }

    /// Returns the action name.
    #[inline]
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Send { .. } => "send",
            Self::Close { .. } => "close",
        }
    }

    /// Decodes an operation from an action name and JSON argument array.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `raw_args` is not a JSON array
    /// - [`Error::InvalidArgument`] for unknown actions or bad arguments
    pub fn from_raw(action: &str, raw_args: &str) -> Result<Self> {
        let args: Vec<Value> = serde_json::from_str(raw_args)?;
        let id = arg_id(&args)?;

        match action {
            "create" => {
                let options = match args.get(3) {
                    None | Some(Value::Null) => CreateOptions::default(),
                    Some(value) => CreateOptions::deserialize(value)?,
                };
                Ok(Self::Create {
                    id,
                    url: arg_string(&args, 1, "url")?,
                    protocol: arg_string_or_default(&args, 2),
                    options,
                })
            }
            "send" => Ok(Self::Send {
                id,
                data: arg_string(&args, 1, "data")?,
                binary: args.get(2).and_then(Value::as_bool).unwrap_or(false),
            }),
            "close" => {
                let code = args.get(1).and_then(Value::as_i64).unwrap_or(0);
                let code = u16::try_from(code)
                    .map_err(|_| Error::invalid_argument(format!("Invalid close code: {code}")))?;
                Ok(Self::Close {
                    id,
                    code,
                    reason: arg_string_or_default(&args, 2),
                })
            }
            other => Err(Error::invalid_argument(format!("Unknown action: {other}"))),
        }
    }
}

// ============================================================================
// Argument Helpers
// ============================================================================

fn arg_id(args: &[Value]) -> Result<ConnectionId> {
    args.first()
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .map(ConnectionId::new)
        .ok_or_else(|| Error::invalid_argument("Missing or invalid connection id"))
}

fn arg_string(args: &[Value], index: usize, name: &str) -> Result<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::invalid_argument(format!("Missing argument: {name}")))
}

fn arg_string_or_default(args: &[Value], index: usize) -> String {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
