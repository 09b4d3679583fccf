//! ipmsg protocol model: the message carried on the wire and the outcome
//! reported back over the same connection.

/// Magic line opening every request frame and every response.
pub const MAGIC: &str = "ipmsg";

/// Default TCP port peers listen on.
pub const DEFAULT_PORT: u16 = 6767;

/// One plain-text message as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender IPv4 address, dotted quad.
    pub from: String,
    /// Sender display name; empty when the sender did not announce one.
    pub alias: String,
    /// Sender-declared body length in bytes. Not re-verified on receive.
    pub len: u64,
    /// Sender wall clock at send time, unix seconds.
    pub date: i64,
    /// Message text. May contain newlines; must not contain NUL.
    pub body: String,
}

/// Outcome the receiver reports to the sender. Not NUL-terminated on the
/// wire; closing the connection marks the end of the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub success: bool,
    /// Human-readable failure detail; present only on failure.
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn err(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(detail.into()),
        }
    }
}
