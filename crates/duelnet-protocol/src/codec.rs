//! The line codec: converts [`Message`]s to and from wire frames.
//!
//! A frame is a run of `key: value` lines closed by a blank line:
//!
//! ```text
//! type: CALCULATION_REPORT
//! seq: 7
//! damage: 34
//! move: thunderbolt
//!
//! ```
//!
//! Encoding is deterministic. `type` comes first, then `seq` (or `ack_seq`
//! for an ACK), then the kind's own fields in a fixed order. A
//! retransmission therefore reproduces the original bytes exactly.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Body, Kind, Message, ProtocolError, SeqNum};

/// Default frame bound. Fits in a single UDP datagram.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 60_000;

/// Upper bound on keys per frame.
const MAX_FIELDS: usize = 32;

/// Longest raw value echoed back inside an error.
const ERROR_VALUE_PREVIEW: usize = 32;

/// Encodes and decodes `key: value` frames with a size bound.
#[derive(Debug, Clone, Copy)]
pub struct LineCodec {
    max_frame_bytes: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl LineCodec {
    /// A codec that rejects frames larger than `max_frame_bytes`.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    /// The configured frame bound.
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Serializes a message into a frame.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidField`] if a value contains a line break,
    ///   a SETUP move contains a comma, or sticker data is not base64.
    /// - [`ProtocolError::TooLarge`] if the frame exceeds the bound.
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError> {
        let mut out = String::new();
        push_line(&mut out, "type", tag_of(&msg.body))?;

        match &msg.body {
            Body::Ack { ack_seq } => {
                push_line(&mut out, "ack_seq", &ack_seq.to_string())?;
            }
            body => {
                if let Some(seq) = msg.seq {
                    push_line(&mut out, "seq", &seq.to_string())?;
                }
                encode_fields(&mut out, body)?;
            }
        }
        out.push('\n');

        if out.len() > self.max_frame_bytes {
            return Err(ProtocolError::TooLarge {
                size: out.len(),
                limit: self.max_frame_bytes,
            });
        }
        Ok(out.into_bytes())
    }

    /// Parses a frame.
    ///
    /// Whitespace around the frame, around keys, and around numeric or
    /// name values is ignored. Free text (CHAT and STATUS `text`, unknown
    /// fields) loses only the single space after the `:`, so it decodes to
    /// exactly what was encoded. The size bound is checked before anything
    /// else.
    ///
    /// # Errors
    /// Any [`ProtocolError`] other than `InvalidField`; all of them mean
    /// the frame is malformed and should be dropped.
    pub fn decode(&self, data: &[u8]) -> Result<Message, ProtocolError> {
        if data.len() > self.max_frame_bytes {
            return Err(ProtocolError::TooLarge {
                size: data.len(),
                limit: self.max_frame_bytes,
            });
        }
        let text = std::str::from_utf8(data)
            .map_err(|_| ProtocolError::Malformed("frame is not UTF-8".into()))?;

        let mut fields = Fields::parse(text.trim_start())?;
        let tag = fields.take("type")?;
        let kind = Kind::from_tag(tag);

        if kind == Kind::Ack {
            let ack_seq = fields.take_u64("ack_seq")?;
            if !fields.is_empty() {
                return Err(ProtocolError::Malformed(
                    "ACK carries only ack_seq".into(),
                ));
            }
            return Ok(Message::ack(ack_seq));
        }

        let seq: SeqNum = fields.take_u64("seq")?;
        let body = decode_body(kind, tag, &mut fields)?;
        Ok(Message::sequenced(seq, body))
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn tag_of(body: &Body) -> &str {
    match body {
        Body::Unknown { tag, .. } => tag,
        other => other.kind().as_str(),
    }
}

fn push_line(
    out: &mut String,
    key: &str,
    value: &str,
) -> Result<(), ProtocolError> {
    if value.contains(['\n', '\r']) {
        return Err(ProtocolError::InvalidField {
            field: key.to_string(),
            reason: "value contains a line break",
        });
    }
    if key.is_empty() || key.contains([':', '\n', '\r']) {
        return Err(ProtocolError::InvalidField {
            field: key.to_string(),
            reason: "key must be non-empty and free of ':' and line breaks",
        });
    }
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
    Ok(())
}

fn encode_fields(out: &mut String, body: &Body) -> Result<(), ProtocolError> {
    match body {
        Body::HandshakeRequest | Body::DefenseAnnounce | Body::Ack { .. } => {}
        Body::HandshakeResponse { seed } => {
            push_line(out, "seed", &seed.to_string())?;
        }
        Body::Setup {
            trainer,
            pokemon,
            moves,
        } => {
            if moves.iter().any(|m| m.contains(',')) {
                return Err(ProtocolError::InvalidField {
                    field: "moves".into(),
                    reason: "move names cannot contain ','",
                });
            }
            push_line(out, "trainer", trainer)?;
            push_line(out, "pokemon", pokemon)?;
            push_line(out, "moves", &moves.join(","))?;
        }
        Body::AttackAnnounce { move_name } => {
            push_line(out, "move", move_name)?;
        }
        Body::CalculationReport { damage, move_name } => {
            push_line(out, "damage", &damage.to_string())?;
            push_line(out, "move", move_name)?;
        }
        Body::CalculationConfirm { damage } => {
            push_line(out, "damage", &damage.to_string())?;
        }
        Body::ResolutionRequest { expected, received } => {
            push_line(out, "expected", &expected.to_string())?;
            push_line(out, "received", &received.to_string())?;
        }
        Body::GameOver { winner, loser } => {
            push_line(out, "winner", winner)?;
            push_line(out, "loser", loser)?;
        }
        Body::Chat { sender, text } => {
            push_line(out, "sender", sender)?;
            push_line(out, "text", text)?;
        }
        Body::Sticker { sender, data } => {
            if STANDARD.decode(data).is_err() {
                return Err(ProtocolError::InvalidField {
                    field: "data".into(),
                    reason: "sticker data must be standard base64",
                });
            }
            push_line(out, "sender", sender)?;
            push_line(out, "data", data)?;
        }
        Body::Status { text } => {
            push_line(out, "text", text)?;
        }
        Body::Unknown { fields, .. } => {
            // BTreeMap iteration order keeps this deterministic.
            for (key, value) in fields {
                if key == "type" || key == "seq" {
                    continue;
                }
                push_line(out, key, value)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

/// The parsed `key: value` pairs of one frame, borrowed from the input.
///
/// Values are stored as written, minus the one space after the `:`.
struct Fields<'a> {
    map: HashMap<&'a str, &'a str>,
}

impl<'a> Fields<'a> {
    fn parse(text: &'a str) -> Result<Self, ProtocolError> {
        let mut map = HashMap::new();
        let mut lines = text.lines();

        for line in lines.by_ref() {
            let line = line.trim_start();
            if line.trim_end().is_empty() {
                break;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                ProtocolError::Malformed(format!(
                    "line without ':' ({})",
                    preview(line)
                ))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ProtocolError::Malformed("empty key".into()));
            }
            if map.len() >= MAX_FIELDS {
                return Err(ProtocolError::Malformed(format!(
                    "more than {MAX_FIELDS} fields"
                )));
            }
            let value = value.strip_prefix(' ').unwrap_or(value);
            if map.insert(key, value).is_some() {
                return Err(ProtocolError::Malformed(format!(
                    "repeated key `{}`",
                    preview(key)
                )));
            }
        }

        if lines.any(|l| !l.trim().is_empty()) {
            return Err(ProtocolError::Malformed(
                "data after frame terminator".into(),
            ));
        }
        Ok(Self { map })
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The value with surrounding whitespace removed.
    fn take(&mut self, key: &'static str) -> Result<&'a str, ProtocolError> {
        self.take_verbatim(key).map(str::trim)
    }

    fn take_verbatim(&mut self, key: &'static str) -> Result<&'a str, ProtocolError> {
        self.map
            .remove(key)
            .ok_or(ProtocolError::MissingField(key))
    }

    fn take_string(&mut self, key: &'static str) -> Result<String, ProtocolError> {
        self.take(key).map(str::to_string)
    }

    fn take_text(&mut self, key: &'static str) -> Result<String, ProtocolError> {
        self.take_verbatim(key).map(str::to_string)
    }

    fn take_u64(&mut self, key: &'static str) -> Result<u64, ProtocolError> {
        let raw = self.take(key)?;
        raw.parse().map_err(|_| ProtocolError::InvalidNumber {
            field: key,
            value: preview(raw),
        })
    }

    fn take_u32(&mut self, key: &'static str) -> Result<u32, ProtocolError> {
        let raw = self.take(key)?;
        raw.parse().map_err(|_| ProtocolError::InvalidNumber {
            field: key,
            value: preview(raw),
        })
    }

    fn into_owned(self) -> BTreeMap<String, String> {
        self.map
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

fn decode_body(
    kind: Kind,
    tag: &str,
    fields: &mut Fields<'_>,
) -> Result<Body, ProtocolError> {
    let body = match kind {
        Kind::HandshakeRequest => Body::HandshakeRequest,
        Kind::HandshakeResponse => Body::HandshakeResponse {
            seed: fields.take_u64("seed")?,
        },
        Kind::Setup => Body::Setup {
            trainer: fields.take_string("trainer")?,
            pokemon: fields.take_string("pokemon")?,
            moves: split_moves(fields.take("moves")?),
        },
        Kind::AttackAnnounce => Body::AttackAnnounce {
            move_name: fields.take_string("move")?,
        },
        Kind::DefenseAnnounce => Body::DefenseAnnounce,
        Kind::CalculationReport => Body::CalculationReport {
            damage: fields.take_u32("damage")?,
            move_name: fields.take_string("move")?,
        },
        Kind::CalculationConfirm => Body::CalculationConfirm {
            damage: fields.take_u32("damage")?,
        },
        Kind::ResolutionRequest => Body::ResolutionRequest {
            expected: fields.take_u32("expected")?,
            received: fields.take_u32("received")?,
        },
        Kind::GameOver => Body::GameOver {
            winner: fields.take_string("winner")?,
            loser: fields.take_string("loser")?,
        },
        Kind::Chat => Body::Chat {
            sender: fields.take_string("sender")?,
            text: fields.take_text("text")?,
        },
        Kind::Sticker => {
            let sender = fields.take_string("sender")?;
            let data = fields.take("data")?;
            if STANDARD.decode(data).is_err() {
                return Err(ProtocolError::Malformed(
                    "sticker data is not base64".into(),
                ));
            }
            Body::Sticker {
                sender,
                data: data.to_string(),
            }
        }
        Kind::Status => Body::Status {
            text: fields.take_text("text")?,
        },
        Kind::Unknown => {
            let owned = std::mem::replace(
                fields,
                Fields {
                    map: HashMap::new(),
                },
            );
            Body::Unknown {
                tag: tag.to_string(),
                fields: owned.into_owned(),
            }
        }
        // ACK frames never reach here; `decode` handles them first.
        Kind::Ack => {
            return Err(ProtocolError::Malformed("unexpected ACK body".into()));
        }
    };
    Ok(body)
}

fn split_moves(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn preview(raw: &str) -> String {
    raw.chars().take(ERROR_VALUE_PREVIEW).collect()
}
