//! Frame types and the encode/decode pair for both directions.

use std::fmt;

use thiserror::Error;

use crate::base36;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Why a text frame failed to decode.
///
/// The session converts any of these into an `i` reply; the typed
/// detail exists for logs and tests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    /// The frame was empty.
    #[error("empty frame")]
    Empty,

    /// The leading tag byte is not one this direction accepts.
    #[error("unknown tag '{tag}'")]
    UnknownTag {
        /// The offending tag character.
        tag: char,
    },

    /// A payload followed a tag that takes none.
    #[error("unexpected payload on '{tag}' frame")]
    UnexpectedPayload {
        /// The tag that should have stood alone.
        tag: char,
    },

    /// A tag that requires an integer payload had none.
    #[error("missing payload on '{tag}' frame")]
    MissingPayload {
        /// The tag missing its payload.
        tag: char,
    },

    /// An integer payload violated the base-36 rules.
    #[error("invalid integer payload: {reason}")]
    BadInteger {
        /// Which rule the payload broke.
        reason: String,
    },

    /// A two-field payload was missing its separator or had extras.
    #[error("malformed payload on '{tag}' frame: {reason}")]
    BadShape {
        /// The tag whose payload is malformed.
        tag: char,
        /// Which shape rule the payload broke.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ClientFrame
// ---------------------------------------------------------------------------

/// Frames a client sends to the server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClientFrame {
    /// Keep-alive; the server echoes a heartbeat back.
    Heartbeat,
    /// Request one increment. The id is client-assigned and echoed in
    /// the accept or reject reply.
    Boop {
        /// Client-assigned correlation id.
        boop_id: u64,
    },
    /// Ask for the remaining cooldown without attempting a boop.
    CooldownQuery {
        /// Client-assigned correlation id.
        query_id: u64,
    },
}

impl ClientFrame {
    /// Decodes a client→server text frame.
    ///
    /// # Errors
    ///
    /// Any deviation from `h`, `b<int>`, or `d<int>` yields a
    /// [`DecodeError`]; the caller answers with an `i` frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let mut chars = text.chars();
        let tag = chars.next().ok_or(DecodeError::Empty)?;
        let payload = &text[tag.len_utf8()..];

        match tag {
            'h' => {
                if !payload.is_empty() {
                    return Err(DecodeError::UnexpectedPayload { tag });
                }
                Ok(Self::Heartbeat)
            }
            'b' => {
                if payload.is_empty() {
                    return Err(DecodeError::MissingPayload { tag });
                }
                Ok(Self::Boop {
                    boop_id: base36::decode(payload)?,
                })
            }
            'd' => {
                if payload.is_empty() {
                    return Err(DecodeError::MissingPayload { tag });
                }
                Ok(Self::CooldownQuery {
                    query_id: base36::decode(payload)?,
                })
            }
            other => Err(DecodeError::UnknownTag { tag: other }),
        }
    }

    /// Encodes the frame as its wire text.
    pub fn encode(&self) -> String {
        match self {
            Self::Heartbeat => "h".into(),
            Self::Boop { boop_id } => format!("b{}", base36::encode(*boop_id)),
            Self::CooldownQuery { query_id } => {
                format!("d{}", base36::encode(*query_id))
            }
        }
    }
}

impl fmt::Display for ClientFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

// ---------------------------------------------------------------------------
// ServerFrame
// ---------------------------------------------------------------------------

/// Frames the server sends to a client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerFrame {
    /// Heartbeat acknowledgement.
    Heartbeat,
    /// The boop with this id was admitted.
    BoopAccepted {
        /// Echo of the client-assigned id.
        boop_id: u64,
    },
    /// The boop with this id was rejected; retry after the cooldown.
    BoopRejected {
        /// Echo of the client-assigned id.
        boop_id: u64,
        /// Remaining cooldown in milliseconds.
        cooldown_ms: u64,
    },
    /// Reply to a cooldown query. A zero cooldown omits the field on
    /// the wire.
    CooldownReply {
        /// Echo of the client-assigned id.
        query_id: u64,
        /// Remaining cooldown in milliseconds; 0 means boop away.
        cooldown_ms: u64,
    },
    /// Current global count, optimistically including unsynced boops.
    Count {
        /// The displayed counter value.
        count: u64,
    },
    /// The last inbound frame was invalid and has been dropped.
    Invalid,
}

impl ServerFrame {
    /// Encodes the frame as its wire text.
    pub fn encode(&self) -> String {
        match self {
            Self::Heartbeat => "h".into(),
            Self::BoopAccepted { boop_id } => format!("b{}", base36::encode(*boop_id)),
            Self::BoopRejected { boop_id, cooldown_ms } => format!(
                "r{},{}",
                base36::encode(*boop_id),
                base36::encode(*cooldown_ms)
            ),
            Self::CooldownReply { query_id, cooldown_ms } => {
                if *cooldown_ms == 0 {
                    format!("d{}", base36::encode(*query_id))
                } else {
                    format!(
                        "d{},{}",
                        base36::encode(*query_id),
                        base36::encode(*cooldown_ms)
                    )
                }
            }
            Self::Count { count } => format!("c{}", base36::encode(*count)),
            Self::Invalid => "i".into(),
        }
    }

    /// Decodes a server→client text frame.
    ///
    /// Used by client implementations and by tests that assert on the
    /// session's output.
    ///
    /// # Errors
    ///
    /// Any deviation from the shapes in the crate docs yields a
    /// [`DecodeError`].
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let mut chars = text.chars();
        let tag = chars.next().ok_or(DecodeError::Empty)?;
        let payload = &text[tag.len_utf8()..];

        let bare = |frame: Self| {
            if payload.is_empty() {
                Ok(frame)
            } else {
                Err(DecodeError::UnexpectedPayload { tag })
            }
        };

        match tag {
            'h' => bare(Self::Heartbeat),
            'i' => bare(Self::Invalid),
            'b' => {
                if payload.is_empty() {
                    return Err(DecodeError::MissingPayload { tag });
                }
                Ok(Self::BoopAccepted {
                    boop_id: base36::decode(payload)?,
                })
            }
            'c' => {
                if payload.is_empty() {
                    return Err(DecodeError::MissingPayload { tag });
                }
                Ok(Self::Count {
                    count: base36::decode(payload)?,
                })
            }
            'r' => {
                let (id, ms) = split_pair(tag, payload)?;
                Ok(Self::BoopRejected {
                    boop_id: id,
                    cooldown_ms: ms,
                })
            }
            'd' => {
                if payload.is_empty() {
                    return Err(DecodeError::MissingPayload { tag });
                }
                match payload.split_once(',') {
                    None => Ok(Self::CooldownReply {
                        query_id: base36::decode(payload)?,
                        cooldown_ms: 0,
                    }),
                    Some((id, ms)) => Ok(Self::CooldownReply {
                        query_id: base36::decode(id)?,
                        cooldown_ms: base36::decode(ms)?,
                    }),
                }
            }
            other => Err(DecodeError::UnknownTag { tag: other }),
        }
    }
}

impl fmt::Display for ServerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Splits a mandatory `<int>,<int>` payload.
fn split_pair(tag: char, payload: &str) -> Result<(u64, u64), DecodeError> {
    let (first, second) = payload.split_once(',').ok_or_else(|| DecodeError::BadShape {
        tag,
        reason: "expected two comma-separated integers".into(),
    })?;

    if second.contains(',') {
        return Err(DecodeError::BadShape {
            tag,
            reason: "more than two fields".into(),
        });
    }

    Ok((base36::decode(first)?, base36::decode(second)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
