//! The reliable link: sequencing, acknowledgment, retransmission and
//! duplicate suppression over a [`DatagramChannel`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use duelnet_protocol::{Body, LineCodec, Message, SeqNum};
use duelnet_tick::{TickConfig, TickScheduler};
use duelnet_transport::{DatagramChannel, TransportError};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::pending::{PendingTable, SweepOutcome};
use crate::seen::SeenSet;
use crate::{LinkConfig, LinkError, LinkFailure};

// ---------------------------------------------------------------------------
// Events and outcomes
// ---------------------------------------------------------------------------

/// What the link reports upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A new reliable message, delivered exactly once.
    Delivered { from: SocketAddr, message: Message },
    /// A destination exhausted its retries.
    Failed(LinkFailure),
}

/// The receiver side of a link's event stream.
pub type LinkEvents = mpsc::UnboundedReceiver<LinkEvent>;

/// What [`ReliableLink::on_datagram_received`] did with a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// First copy of a reliable message: acknowledged and dispatched.
    Dispatched(SeqNum),
    /// Already seen: acknowledged again, not dispatched.
    Duplicate(SeqNum),
    /// An ACK. Known or not, the pending table is now clear of it.
    Acked(SeqNum),
    /// Undecodable. Nothing was sent or dispatched.
    Dropped,
}

// ---------------------------------------------------------------------------
// ReliableLink
// ---------------------------------------------------------------------------

struct Inner<C> {
    channel: C,
    codec: LineCodec,
    config: LinkConfig,
    next_seq: AtomicU64,
    pending: Mutex<PendingTable>,
    seen: Mutex<SeenSet>,
    events: mpsc::UnboundedSender<LinkEvent>,
    cancel: CancellationToken,
}

/// At-least-once transmission, at-most-once dispatch.
///
/// Every reliable message gets the next sequence number and stays in the
/// pending table until its ACK arrives. A periodic sweep resends the exact
/// original bytes of anything unacknowledged past the timeout, and gives
/// up on a destination once a message runs out of retries. Inbound
/// messages are acknowledged every time and dispatched only the first
/// time their `(sender, seq)` is seen.
///
/// Cheap to clone; clones share the same state.
///
/// ```text
///  send_reliable ──→ [pending] ──sweep──→ retransmit / LinkFailure
///                        ↑
///  recv ──→ decode ──→ ACK? ── remove
///                   └─ data ──→ [seen] ──→ ACK back ──→ LinkEvent::Delivered
/// ```
pub struct ReliableLink<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ReliableLink<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: DatagramChannel> ReliableLink<C> {
    /// Wraps `channel`. No background work runs until [`start`](Self::start).
    pub fn new(channel: C, config: LinkConfig) -> (Self, LinkEvents) {
        let config = config.validated();
        let (events, rx) = mpsc::unbounded_channel();
        let link = Self {
            inner: Arc::new(Inner {
                channel,
                codec: LineCodec::new(config.max_frame_bytes),
                config,
                next_seq: AtomicU64::new(1),
                pending: Mutex::new(PendingTable::new()),
                seen: Mutex::new(SeenSet::new()),
                events,
                cancel: CancellationToken::new(),
            }),
        };
        (link, rx)
    }

    /// Spawns the receive loop and the retransmission sweep loop. Both
    /// run until [`shutdown`](Self::shutdown).
    pub fn start(&self) {
        let receiver = self.clone();
        tokio::spawn(async move { receiver.receive_loop().await });

        let sweeper = self.clone();
        tokio::spawn(async move { sweeper.sweep_loop().await });

        debug!(addr = %self.local_addr(), "link started");
    }

    /// Stops both loops and discards every pending message without a
    /// final flush.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let dropped = {
            let mut pending = self.inner.pending.lock().await;
            let n = pending.len();
            pending.clear();
            n
        };
        debug!(addr = %self.local_addr(), dropped, "link shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.channel.local_addr()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.inner.channel
    }

    /// Reliable messages still awaiting an ACK.
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Assigns the next sequence number, records the message as pending
    /// and transmits once. Returns without waiting for the ACK.
    ///
    /// A failed first transmission is not an error: the message stays
    /// pending, so the sweep resends it or eventually reports a
    /// [`LinkFailure`].
    ///
    /// # Errors
    /// - [`LinkError::AckNotReliable`] for an ACK body.
    /// - [`LinkError::Protocol`] if the body cannot be encoded.
    /// - [`LinkError::Shutdown`] after [`shutdown`](Self::shutdown).
    pub async fn send_reliable(
        &self,
        dest: SocketAddr,
        body: Body,
    ) -> Result<SeqNum, LinkError> {
        if self.is_shut_down() {
            return Err(LinkError::Shutdown);
        }
        if !body.kind().is_reliable() {
            return Err(LinkError::AckNotReliable);
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let message = Message::sequenced(seq, body);
        let bytes = self.inner.codec.encode(&message)?;

        // Track before sending so an instant ACK always finds its entry.
        self.inner
            .pending
            .lock()
            .await
            .insert(seq, dest, bytes.clone(), Instant::now());

        match self.inner.channel.send_to(dest, &bytes).await {
            Ok(()) => debug!(seq, peer = %dest, kind = %message.kind(), "sent reliable"),
            Err(e) => warn!(
                seq,
                peer = %dest,
                error = %e,
                "first transmission failed, left for retransmission"
            ),
        }
        Ok(seq)
    }

    /// Encodes and transmits once. No sequence number, no tracking.
    pub async fn send_unreliable(
        &self,
        dest: SocketAddr,
        message: &Message,
    ) -> Result<(), LinkError> {
        let bytes = self.inner.codec.encode(message)?;
        self.inner.channel.send_to(dest, &bytes).await?;
        Ok(())
    }

    async fn send_ack(&self, to: SocketAddr, seq: SeqNum) {
        if let Err(e) = self.send_unreliable(to, &Message::ack(seq)).await {
            warn!(seq, peer = %to, error = %e, "ACK send failed");
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Handles one raw datagram from `from`.
    ///
    /// Never fails: malformed input is dropped, ACKs for unknown sequence
    /// numbers are ignored, duplicates are re-acknowledged only.
    pub async fn on_datagram_received(
        &self,
        bytes: &[u8],
        from: SocketAddr,
    ) -> Inbound {
        let message = match self.inner.codec.decode(bytes) {
            Ok(m) => m,
            Err(e) => {
                debug!(peer = %from, len = bytes.len(), error = %e, "dropping malformed datagram");
                return Inbound::Dropped;
            }
        };

        if let Body::Ack { ack_seq } = message.body {
            let known = self.inner.pending.lock().await.ack(ack_seq);
            trace!(seq = ack_seq, peer = %from, known, "ACK received");
            return Inbound::Acked(ack_seq);
        }

        let Some(seq) = message.seq else {
            return Inbound::Dropped;
        };

        let fresh = self.inner.seen.lock().await.insert(from, seq);
        // Always acknowledge: the earlier ACK may be what got lost.
        self.send_ack(from, seq).await;

        if !fresh {
            debug!(seq, peer = %from, kind = %message.kind(), "duplicate suppressed");
            return Inbound::Duplicate(seq);
        }

        trace!(seq, peer = %from, kind = %message.kind(), "dispatching");
        if self
            .inner
            .events
            .send(LinkEvent::Delivered { from, message })
            .is_err()
        {
            debug!(seq, "event receiver gone, message discarded");
        }
        Inbound::Dispatched(seq)
    }

    // -----------------------------------------------------------------------
    // Retransmission
    // -----------------------------------------------------------------------

    /// Runs one retransmission pass at the current time.
    ///
    /// Resends everything overdue and reports exhausted destinations as
    /// [`LinkEvent::Failed`]. The background loop calls this every
    /// `sweep_interval`; tests may call it directly.
    pub async fn sweep(&self) -> SweepOutcome {
        let outcome = self.inner.pending.lock().await.sweep(
            Instant::now(),
            self.inner.config.retransmit_timeout,
            self.inner.config.max_retries,
        );

        for r in &outcome.retransmits {
            debug!(seq = r.seq, peer = %r.dest, "retransmitting");
            if let Err(e) = self.inner.channel.send_to(r.dest, &r.bytes).await {
                warn!(seq = r.seq, peer = %r.dest, error = %e, "retransmission failed");
            }
        }

        for failure in &outcome.failures {
            warn!(
                peer = %failure.peer,
                seq = failure.seq,
                retries = failure.retries,
                "link failure"
            );
            let _ = self.inner.events.send(LinkEvent::Failed(failure.clone()));
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Background loops
    // -----------------------------------------------------------------------

    async fn receive_loop(self) {
        loop {
            let received = tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                r = self.inner.channel.recv_from() => r,
            };
            match received {
                Ok((bytes, from)) => {
                    self.on_datagram_received(&bytes, from).await;
                }
                Err(TransportError::Closed) => {
                    debug!("channel closed, receive loop exiting");
                    break;
                }
                Err(e) => warn!(error = %e, "receive failed"),
            }
        }
        trace!("receive loop stopped");
    }

    async fn sweep_loop(self) {
        let mut ticks = TickScheduler::new(TickConfig::every(
            self.inner.config.sweep_interval,
        ));
        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = ticks.wait_for_tick() => {
                    self.sweep().await;
                }
            }
        }
        trace!("sweep loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use duelnet_transport::{FaultConfig, MemoryChannel, MemoryNetwork};

    use super::*;

    async fn pair() -> (
        (ReliableLink<MemoryChannel>, LinkEvents),
        (ReliableLink<MemoryChannel>, LinkEvents),
    ) {
        let net = MemoryNetwork::new();
        let a = net.bind(FaultConfig::none()).await;
        let b = net.bind(FaultConfig::none()).await;
        (
            ReliableLink::new(a, LinkConfig::default()),
            ReliableLink::new(b, LinkConfig::default()),
        )
    }

    fn status(text: &str) -> Body {
        Body::Status { text: text.into() }
    }

    #[tokio::test]
    async fn test_sequence_numbers_start_at_one_and_increase() {
        let ((a, _), (b, _)) = pair().await;
        let to = b.local_addr();
        assert_eq!(a.send_reliable(to, status("x")).await.unwrap(), 1);
        assert_eq!(a.send_reliable(to, status("y")).await.unwrap(), 2);
        assert_eq!(a.send_reliable(to, status("z")).await.unwrap(), 3);
        assert_eq!(a.pending_count().await, 3);
    }

    #[tokio::test]
    async fn test_send_reliable_rejects_ack_body() {
        let ((a, _), (b, _)) = pair().await;
        let err = a
            .send_reliable(b.local_addr(), Body::Ack { ack_seq: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::AckNotReliable));
        assert_eq!(a.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_send_reliable_unencodable_body_is_not_tracked() {
        let ((a, _), (b, _)) = pair().await;
        let err = a
            .send_reliable(b.local_addr(), status("two\nlines"))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Protocol(_)));
        assert_eq!(a.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_inbound_data_is_acked_and_dispatched_once() {
        let ((a, _), (b, mut b_events)) = pair().await;
        a.send_reliable(b.local_addr(), status("hello")).await.unwrap();
        let (bytes, from) = b.channel().recv_from().await.unwrap();

        assert_eq!(b.on_datagram_received(&bytes, from).await, Inbound::Dispatched(1));
        assert_eq!(b.on_datagram_received(&bytes, from).await, Inbound::Duplicate(1));

        let event = b_events.try_recv().unwrap();
        assert_eq!(
            event,
            LinkEvent::Delivered {
                from: a.local_addr(),
                message: Message::sequenced(1, status("hello")),
            }
        );
        assert!(b_events.try_recv().is_err(), "duplicate must not dispatch");

        // Both copies were acknowledged.
        for _ in 0..2 {
            let (ack, _) = a.channel().recv_from().await.unwrap();
            assert_eq!(a.on_datagram_received(&ack, b.local_addr()).await, Inbound::Acked(1));
        }
        assert_eq!(a.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_dropped_silently() {
        let ((a, _), (b, mut b_events)) = pair().await;
        let outcome = b
            .on_datagram_received(b"\xff\xfe garbage", a.local_addr())
            .await;
        assert_eq!(outcome, Inbound::Dropped);
        assert!(b_events.try_recv().is_err());
        assert_eq!(b.channel().stats().sent, 0, "no ACK for garbage");
    }

    #[tokio::test]
    async fn test_shutdown_clears_pending_and_refuses_sends() {
        let ((a, _), (b, _)) = pair().await;
        a.send_reliable(b.local_addr(), status("in flight")).await.unwrap();

        a.shutdown().await;

        assert!(a.is_shut_down());
        assert_eq!(a.pending_count().await, 0);
        assert!(matches!(
            a.send_reliable(b.local_addr(), status("late")).await,
            Err(LinkError::Shutdown)
        ));
    }
}
