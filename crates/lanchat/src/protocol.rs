use serde::Serialize;
use std::fmt;

/// Separator between fields of every frame on the wire.
pub const FIELD_SEPARATOR: char = '|';

/// Read buffer for register/send/unregister replies (4 KiB).
pub const MAX_REPLY_BYTES: usize = 4 * 1024;

/// Read buffer for long-poll event payloads (8 KiB).
pub const MAX_EVENT_BYTES: usize = 8 * 1024;

/// Prefix of a successful register/unregister reply, matched case-insensitively.
pub const OK_PREFIX: &str = "OK|";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A request sent from the client to the chat server.
///
/// Every request travels on its own connection and gets exactly one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Announce presence under a username.
    Register { username: String },
    /// Long-poll for the next event addressed to `username`.
    Wait { username: String },
    /// Deliver a message.
    Send {
        from: String,
        to: String,
        body: String,
    },
    /// Remove presence.
    Unregister { username: String },
}

impl Request {
    /// The wire verb of this request.
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Register { .. } => "REGISTER",
            Request::Wait { .. } => "WAITFORMESSAGE",
            Request::Send { .. } => "SEND",
            Request::Unregister { .. } => "UNREGISTER",
        }
    }

    /// Encode to wire bytes: `<VERB>|<field>|...`, no terminator.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Size of the buffer the single reply read goes into.
    pub fn max_reply_bytes(&self) -> usize {
        match self {
            Request::Wait { .. } => MAX_EVENT_BYTES,
            _ => MAX_REPLY_BYTES,
        }
    }

    /// Parse a request frame as a server would see it.
    ///
    /// `SEND` is split into at most four segments so the body keeps any
    /// embedded separators. Returns `None` for unknown verbs or missing fields.
    pub fn parse(payload: &[u8]) -> Option<Request> {
        let text = String::from_utf8_lossy(payload);
        let text = trim_terminator(&text);
        let (verb, rest) = text.split_once(FIELD_SEPARATOR)?;
        let verb = verb.trim();

        if verb.eq_ignore_ascii_case("SEND") {
            let mut fields = rest.splitn(3, FIELD_SEPARATOR);
            let from = fields.next()?;
            let to = fields.next()?;
            let body = fields.next()?;
            return Some(Request::Send {
                from: from.to_string(),
                to: to.to_string(),
                body: body.to_string(),
            });
        }

        let username = rest.to_string();
        if verb.eq_ignore_ascii_case("REGISTER") {
            Some(Request::Register { username })
        } else if verb.eq_ignore_ascii_case("WAITFORMESSAGE") {
            Some(Request::Wait { username })
        } else if verb.eq_ignore_ascii_case("UNREGISTER") {
            Some(Request::Unregister { username })
        } else {
            None
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = FIELD_SEPARATOR;
        match self {
            Request::Register { username }
            | Request::Wait { username }
            | Request::Unregister { username } => write!(f, "{}{sep}{username}", self.verb()),
            Request::Send { from, to, body } => {
                write!(f, "{}{sep}{from}{sep}{to}{sep}{body}", self.verb())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InboundEvent
// ---------------------------------------------------------------------------

/// An event decoded from one server payload.
///
/// Decoding never fails: anything that does not match a known shape becomes
/// [`InboundEvent::Unknown`] carrying the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A chat message. `body` may contain the field separator.
    Message { from: String, body: String },
    /// A user came online.
    UserJoined { user: String },
    /// A user went offline.
    UserLeft { user: String },
    /// Server-originated notice.
    System { text: String },
    /// Explicit idle signal from servers that answer waits with a no-op.
    NoEvent,
    /// Acknowledgment. Carries the full payload.
    Ack { raw: String },
    /// Unrecognized or malformed payload, kept verbatim for display.
    Unknown { raw: String },
}

impl InboundEvent {
    /// Decode a raw payload. Invalid UTF-8 is replaced lossily.
    pub fn decode(payload: &[u8]) -> InboundEvent {
        Self::decode_str(&String::from_utf8_lossy(payload))
    }

    /// Decode a payload that is already text.
    pub fn decode_str(payload: &str) -> InboundEvent {
        let raw = trim_terminator(payload);
        let (verb, rest) = match raw.split_once(FIELD_SEPARATOR) {
            Some((verb, rest)) => (verb.trim(), Some(rest)),
            None => (raw.trim(), None),
        };
        let unknown = || InboundEvent::Unknown {
            raw: raw.to_string(),
        };

        if verb.eq_ignore_ascii_case("MESSAGE") {
            // At most three segments: verb, sender, body.
            match rest.and_then(|r| r.split_once(FIELD_SEPARATOR)) {
                Some((from, body)) if !from.is_empty() => InboundEvent::Message {
                    from: from.to_string(),
                    body: body.to_string(),
                },
                _ => unknown(),
            }
        } else if verb.eq_ignore_ascii_case("USERJOINED") {
            // Usernames never contain the separator, so anything after it is dropped.
            match non_empty(rest.map(first_field)) {
                Some(user) => InboundEvent::UserJoined { user },
                None => unknown(),
            }
        } else if verb.eq_ignore_ascii_case("USERLEFT") {
            match non_empty(rest.map(first_field)) {
                Some(user) => InboundEvent::UserLeft { user },
                None => unknown(),
            }
        } else if verb.eq_ignore_ascii_case("SYSTEM") {
            // Free text: separators after the verb stay part of it.
            match non_empty(rest) {
                Some(text) => InboundEvent::System { text },
                None => unknown(),
            }
        } else if verb.eq_ignore_ascii_case("NOEVENT") {
            InboundEvent::NoEvent
        } else if verb.eq_ignore_ascii_case("ACK") {
            InboundEvent::Ack {
                raw: raw.to_string(),
            }
        } else {
            unknown()
        }
    }
}

/// Transcript rendering of an event. [`InboundEvent::NoEvent`] renders empty.
impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundEvent::Message { from, body } => write!(f, "[MSG from {from}] {body}"),
            InboundEvent::UserJoined { user } => write!(f, "[User Joined] {user}"),
            InboundEvent::UserLeft { user } => write!(f, "[User Left] {user}"),
            InboundEvent::System { text } => write!(f, "[System] {text}"),
            InboundEvent::NoEvent => Ok(()),
            InboundEvent::Ack { raw } => write!(f, "[Ack] {raw}"),
            InboundEvent::Unknown { raw } => write!(f, "[Event] {raw}"),
        }
    }
}

/// Whether a register/unregister reply carries the success marker.
pub fn is_ok_reply(reply: &str) -> bool {
    reply
        .get(..OK_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(OK_PREFIX))
}

fn trim_terminator(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
}

fn first_field(rest: &str) -> &str {
    rest.split_once(FIELD_SEPARATOR).map_or(rest, |(field, _)| field)
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field.filter(|f| !f.is_empty()).map(str::to_string)
}
