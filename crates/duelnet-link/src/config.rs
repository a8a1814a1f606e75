//! Link configuration.

use std::time::Duration;

use duelnet_protocol::DEFAULT_MAX_FRAME_BYTES;
use duelnet_transport::MAX_DATAGRAM;
use serde::{Deserialize, Serialize};

/// Tuning for a [`ReliableLink`](crate::ReliableLink).
///
/// With the defaults a silent peer is declared lost after six
/// transmissions of one message, about three seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// How long a message may go unacknowledged before it is sent again.
    pub retransmit_timeout: Duration,

    /// Retransmissions allowed per message before the destination is
    /// declared lost.
    pub max_retries: u32,

    /// How often the pending table is re-examined.
    pub sweep_interval: Duration,

    /// Largest frame accepted on decode or produced on encode.
    pub max_frame_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout: Duration::from_millis(500),
            max_retries: 5,
            sweep_interval: Duration::from_millis(50),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl LinkConfig {
    const MIN_INTERVAL: Duration = Duration::from_millis(1);
    const MIN_FRAME_BYTES: usize = 64;

    /// Clamps out-of-range values. Called by [`ReliableLink::new`](crate::ReliableLink::new).
    pub fn validated(mut self) -> Self {
        self.retransmit_timeout = self.retransmit_timeout.max(Self::MIN_INTERVAL);
        self.sweep_interval = self.sweep_interval.max(Self::MIN_INTERVAL);
        self.max_frame_bytes = self
            .max_frame_bytes
            .clamp(Self::MIN_FRAME_BYTES, MAX_DATAGRAM);
        self
    }
}
