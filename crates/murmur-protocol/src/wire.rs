//! Peer-to-peer frames.
//!
//! The sub-protocol (`"shh"`, version 2) has exactly two frame types.
//! A frame is one code byte followed by the canonical encoding of its
//! body:
//!
//! - `0x00` status: `[version]`, exchanged once per connection.
//! - `0x01` messages: a list of envelopes.

use murmur_types::{MurmurError, Result};

use crate::codec::{self, Value};
use crate::envelope::Envelope;

/// Short name of the sub-protocol.
pub const PROTOCOL_NAME: &str = "shh";

/// Version advertised in the status frame.
pub const PROTOCOL_VERSION: u64 = 2;

/// Frame code of the status frame.
pub const STATUS_CODE: u8 = 0x00;

/// Frame code of the messages frame.
pub const MESSAGES_CODE: u8 = 0x01;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One framed unit exchanged between peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Protocol version announcement, sent once after connect.
    Status {
        /// The sender's protocol version.
        version: u64,
    },
    /// A batch of envelopes the sender believes the receiver lacks.
    Messages(Vec<Envelope>),
}

impl Frame {
    /// Encodes the frame: code byte, then the canonical body.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Status { version } => {
                let mut out = vec![STATUS_CODE];
                out.extend_from_slice(&codec::encode(&Value::List(vec![Value::uint(*version)])));
                out
            }
            Frame::Messages(envelopes) => {
                let body = Value::List(envelopes.iter().map(Envelope::to_value).collect());
                let mut out = vec![MESSAGES_CODE];
                out.extend_from_slice(&codec::encode(&body));
                out
            }
        }
    }

    /// Decodes a frame received from a peer.
    ///
    /// The status body tolerates trailing list elements beyond the
    /// version, so newer peers can extend the handshake without
    /// breaking older ones.
    ///
    /// # Errors
    ///
    /// Returns [`MurmurError::MalformedEnvelope`] for an empty frame,
    /// an unknown code, or a body that does not decode.
    pub fn decode(data: &[u8]) -> Result<Frame> {
        let Some((&code, body)) = data.split_first() else {
            return Err(MurmurError::MalformedEnvelope {
                reason: "empty frame".into(),
            });
        };

        match code {
            STATUS_CODE => {
                let value = codec::decode(body)?;
                let items = value.as_list()?;
                let version = items
                    .first()
                    .ok_or_else(|| MurmurError::MalformedEnvelope {
                        reason: "status frame missing version".into(),
                    })?
                    .to_u64()?;
                Ok(Frame::Status { version })
            }
            MESSAGES_CODE => {
                let value = codec::decode(body)?;
                let envelopes = value
                    .as_list()?
                    .iter()
                    .map(Envelope::from_value)
                    .collect::<Result<Vec<Envelope>>>()?;
                Ok(Frame::Messages(envelopes))
            }
            other => Err(MurmurError::MalformedEnvelope {
                reason: format!("unknown frame code: {other:#04x}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::Topic;
    use std::time::Duration;

    #[test]
    fn status_roundtrip() {
        let frame = Frame::Status {
            version: PROTOCOL_VERSION,
        };
        let encoded = frame.encode();
        assert_eq!(encoded[0], STATUS_CODE);
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn status_tolerates_extra_elements() {
        // [version, something-from-the-future]
        let body = codec::encode(&Value::List(vec![Value::uint(9), Value::uint(42)]));
        let mut data = vec![STATUS_CODE];
        data.extend_from_slice(&body);

        assert_eq!(Frame::decode(&data).unwrap(), Frame::Status { version: 9 });
    }

    #[test]
    fn status_rejects_empty_body_list() {
        let body = codec::encode(&Value::List(vec![]));
        let mut data = vec![STATUS_CODE];
        data.extend_from_slice(&body);
        assert!(Frame::decode(&data).is_err());
    }

    #[test]
    fn messages_roundtrip() {
        let mut a = Envelope::new(
            Duration::from_secs(10),
            vec![Topic::new(b"news")],
            vec![0x00, b'a'],
        );
        a.seal(Duration::ZERO);
        let mut b = Envelope::new(Duration::from_secs(20), vec![], vec![0x00, b'b']);
        b.seal(Duration::ZERO);

        let frame = Frame::Messages(vec![a.clone(), b.clone()]);
        let decoded = Frame::decode(&frame.encode()).unwrap();

        let Frame::Messages(envelopes) = decoded else {
            panic!("expected messages frame");
        };
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0], a);
        assert_eq!(envelopes[0].hash(), a.hash());
        assert_eq!(envelopes[1], b);
    }

    #[test]
    fn empty_messages_frame_roundtrip() {
        let frame = Frame::Messages(vec![]);
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn rejects_empty_frame() {
        assert!(Frame::decode(&[]).is_err());
    }

    #[test]
    fn rejects_unknown_code() {
        assert!(Frame::decode(&[0x7f, 0xc0]).is_err());
    }

    #[test]
    fn rejects_garbage_body() {
        assert!(Frame::decode(&[MESSAGES_CODE, 0x83, b'x']).is_err());
    }
}
