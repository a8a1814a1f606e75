//! Error types for the protocol layer.
//!
//! Every decode failure is a malformed message: the reliability layer drops
//! the datagram and carries on. Encode failures mean the caller tried to put
//! something on the wire that the line format cannot represent.

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is structurally broken (bad UTF-8, a line without `:`,
    /// a repeated key, trailing data after the terminator).
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A key required for this message kind is absent.
    #[error("malformed message: missing field `{0}`")]
    MissingField(&'static str),

    /// A numeric field did not parse.
    #[error("malformed message: field `{field}` has invalid value {value:?}")]
    InvalidNumber {
        /// The offending key.
        field: &'static str,
        /// The raw value (truncated for logging).
        value: String,
    },

    /// The frame is larger than the configured bound. Checked before any
    /// parsing so oversized input never costs more than its length check.
    #[error("malformed message: frame of {size} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Size of the offending frame.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// A value cannot be represented on the wire.
    #[error("cannot encode field `{field}`: {reason}")]
    InvalidField {
        /// The offending key.
        field: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}
