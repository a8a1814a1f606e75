//! Reliability layer for Duelnet.
//!
//! Turns an unreliable [`DatagramChannel`](duelnet_transport::DatagramChannel)
//! into at-least-once, duplicate-suppressed delivery:
//!
//! - every reliable message carries a strictly increasing sequence number
//!   and stays in the [`PendingTable`] until acknowledged;
//! - a periodic sweep resends overdue messages byte for byte and raises
//!   [`LinkFailure`] once a message runs out of retries;
//! - inbound messages are acknowledged on every copy but dispatched only
//!   once per `(sender, seq)`, tracked in the [`SeenSet`].
//!
//! Each shared structure has its own lock; nothing waits on a timeout
//! while holding one.

mod config;
mod error;
mod link;
mod pending;
mod seen;

pub use config::LinkConfig;
pub use error::{LinkError, LinkFailure};
pub use link::{Inbound, LinkEvent, LinkEvents, ReliableLink};
pub use pending::{PendingEntry, PendingTable, Retransmit, SweepOutcome};
pub use seen::SeenSet;
