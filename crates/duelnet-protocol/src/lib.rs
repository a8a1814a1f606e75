//! Wire protocol for Duelnet.
//!
//! This crate defines what the two peers say to each other:
//!
//! - **Types** ([`Message`], [`Body`], [`Kind`]): one variant per message
//!   kind, each with its required fields typed.
//! - **Codec** ([`LineCodec`]): the plain-text `key: value` frame format,
//!   with a hard size bound on decode.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the datagram transport and the
//! reliability layer. It knows nothing about sequencing policy or turns.
//!
//! ```text
//! Transport (datagrams) → Protocol (Message) → Link (reliable delivery)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{DEFAULT_MAX_FRAME_BYTES, LineCodec};
pub use error::ProtocolError;
pub use types::{Body, Kind, Message, SeqNum};
