//! Protocol types: every message that travels between the two peers.
//!
//! A [`Message`] is a [`Body`] plus an optional sequence number. The body is
//! a closed tagged union, one variant per message kind, so required fields
//! are checked once at decode time and never looked up by string afterwards.

use std::collections::BTreeMap;
use std::fmt;

/// A per-sender sequence number. Strictly increasing, never reused within
/// a session.
pub type SeqNum = u64;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// The `type` tag of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    HandshakeRequest,
    HandshakeResponse,
    Setup,
    AttackAnnounce,
    DefenseAnnounce,
    CalculationReport,
    CalculationConfirm,
    ResolutionRequest,
    GameOver,
    Ack,
    Chat,
    Sticker,
    Status,
    /// Any tag this build does not recognise.
    Unknown,
}

impl Kind {
    /// Every recognised kind, in wire-tag order.
    pub const KNOWN: [Kind; 13] = [
        Kind::HandshakeRequest,
        Kind::HandshakeResponse,
        Kind::Setup,
        Kind::AttackAnnounce,
        Kind::DefenseAnnounce,
        Kind::CalculationReport,
        Kind::CalculationConfirm,
        Kind::ResolutionRequest,
        Kind::GameOver,
        Kind::Ack,
        Kind::Chat,
        Kind::Sticker,
        Kind::Status,
    ];

    /// The wire tag, e.g. `"ATTACK_ANNOUNCE"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandshakeRequest => "HANDSHAKE_REQUEST",
            Self::HandshakeResponse => "HANDSHAKE_RESPONSE",
            Self::Setup => "SETUP",
            Self::AttackAnnounce => "ATTACK_ANNOUNCE",
            Self::DefenseAnnounce => "DEFENSE_ANNOUNCE",
            Self::CalculationReport => "CALCULATION_REPORT",
            Self::CalculationConfirm => "CALCULATION_CONFIRM",
            Self::ResolutionRequest => "RESOLUTION_REQUEST",
            Self::GameOver => "GAME_OVER",
            Self::Ack => "ACK",
            Self::Chat => "CHAT",
            Self::Sticker => "STICKER",
            Self::Status => "STATUS",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Looks up a wire tag. Unrecognised tags map to [`Kind::Unknown`].
    pub fn from_tag(tag: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|k| k.as_str() == tag)
            .unwrap_or(Self::Unknown)
    }

    /// ACKs travel unreliably; everything else is sequenced and acknowledged.
    pub fn is_reliable(self) -> bool {
        !matches!(self, Self::Ack)
    }

    /// Kinds consumed by the turn state machine.
    pub fn is_turn_message(self) -> bool {
        matches!(
            self,
            Self::AttackAnnounce
                | Self::DefenseAnnounce
                | Self::CalculationReport
                | Self::CalculationConfirm
                | Self::ResolutionRequest
                | Self::GameOver
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// The content of a message, one variant per [`Kind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Joiner → host: "let's play".
    HandshakeRequest,

    /// Host → joiner: accepted. `seed` is shared randomness both sides can
    /// reproduce from.
    HandshakeResponse { seed: u64 },

    /// Announces the sender's trainer name, Pokémon, and moveset.
    Setup {
        trainer: String,
        pokemon: String,
        moves: Vec<String>,
    },

    /// Turn holder → opponent: "I am using this move".
    AttackAnnounce { move_name: String },

    /// Defender → attacker: ready for the calculation.
    DefenseAnnounce,

    /// Attacker → defender: the damage the attacker computed.
    CalculationReport { damage: u32, move_name: String },

    /// Agreement on the damage for this turn.
    CalculationConfirm { damage: u32 },

    /// Defender → attacker: local computation disagrees with the report.
    ResolutionRequest { expected: u32, received: u32 },

    /// Advisory end-of-match notice.
    GameOver { winner: String, loser: String },

    /// Acknowledges one sequence number. Carries nothing else.
    Ack { ack_seq: SeqNum },

    /// Free text chat.
    Chat { sender: String, text: String },

    /// A base64-encoded image blob.
    Sticker { sender: String, data: String },

    /// Free-form status line.
    Status { text: String },

    /// A message with a tag this build does not recognise. Kept so the
    /// reliability layer can still acknowledge it.
    Unknown {
        tag: String,
        fields: BTreeMap<String, String>,
    },
}

impl Body {
    /// The kind tag for this body.
    pub fn kind(&self) -> Kind {
        match self {
            Self::HandshakeRequest => Kind::HandshakeRequest,
            Self::HandshakeResponse { .. } => Kind::HandshakeResponse,
            Self::Setup { .. } => Kind::Setup,
            Self::AttackAnnounce { .. } => Kind::AttackAnnounce,
            Self::DefenseAnnounce => Kind::DefenseAnnounce,
            Self::CalculationReport { .. } => Kind::CalculationReport,
            Self::CalculationConfirm { .. } => Kind::CalculationConfirm,
            Self::ResolutionRequest { .. } => Kind::ResolutionRequest,
            Self::GameOver { .. } => Kind::GameOver,
            Self::Ack { .. } => Kind::Ack,
            Self::Chat { .. } => Kind::Chat,
            Self::Sticker { .. } => Kind::Sticker,
            Self::Status { .. } => Kind::Status,
            Self::Unknown { .. } => Kind::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One frame on the wire.
///
/// `seq` is `None` until the reliability layer assigns one, and always
/// `None` for ACKs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub seq: Option<SeqNum>,
    pub body: Body,
}

impl Message {
    /// An unsequenced message, ready for the reliability layer.
    pub fn new(body: Body) -> Self {
        Self { seq: None, body }
    }

    /// A message carrying an already-assigned sequence number.
    pub fn sequenced(seq: SeqNum, body: Body) -> Self {
        Self {
            seq: Some(seq),
            body,
        }
    }

    /// An acknowledgment for `seq`.
    pub fn ack(seq: SeqNum) -> Self {
        Self::new(Body::Ack { ack_seq: seq })
    }

    /// Shorthand for `self.body.kind()`.
    pub fn kind(&self) -> Kind {
        self.body.kind()
    }
}

impl From<Body> for Message {
    fn from(body: Body) -> Self {
        Self::new(body)
    }
}
