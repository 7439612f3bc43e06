// Frame codec for the `[command, payload]` wire format.
//
// `encode_frame`/`decode_frame` convert between `Command` and a single JSON
// text frame. Decoding is tolerant: a malformed frame is logged and
// discarded, never answered and never fatal.
//
// `FrameCodec` adds newline-delimited framing on top, for transports that
// carry a raw byte stream instead of discrete messages. A `MAX_FRAME_BYTES`
// guard protects against unbounded buffering from a peer that never sends a
// newline.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use serde_json::Value;

use crate::core::{Error, PlayerId, Result, GAMESTATE_REQUEST};
use super::message::{Command, LatencyField};

/// Maximum allowed frame size (256 KB). Snapshot frames for very large
/// rosters are the biggest expected messages; this is generous headroom.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

/// Encodes a command as a single JSON text frame.
pub fn encode_frame(command: &Command) -> Result<String> {
    let payload = match command {
        Command::GamestateRequest => Value::String(GAMESTATE_REQUEST.into()),
        Command::Edition(update) => serde_json::to_value(update)?,
        Command::Fabled(ids) => serde_json::to_value(ids)?,
        Command::Gamestate(payload) => serde_json::to_value(payload)?,
        Command::Player(update) => serde_json::to_value(update)?,
        Command::Claim { seat, player_id } => {
            let seat = seat.map_or(-1, |s| s as i64);
            serde_json::to_value((seat, player_id))?
        }
        Command::Ping {
            is_spectator,
            player_id,
            latency,
        } => serde_json::to_value((is_spectator, player_id, latency))?,
        Command::Nomination(nomination) => serde_json::to_value(nomination)?,
        Command::VotingSpeed(seconds) => serde_json::to_value(seconds)?,
        Command::Vote {
            seat,
            value,
            from_host,
        } => serde_json::to_value((seat, value, from_host))?,
        Command::Lock { locked, vote } => serde_json::to_value((locked, vote))?,
        Command::Swap(payload) | Command::Move(payload) => payload.clone(),
        Command::Bye(player_id) => serde_json::to_value(player_id)?,
    };
    Ok(serde_json::to_string(&(command.name(), payload))?)
}

/// Decodes a JSON text frame into a command.
///
/// Returns `None` for anything malformed or unknown; the frame is logged
/// and dropped without a protocol-level reply.
pub fn decode_frame(text: &str) -> Option<Command> {
    let (name, payload): (String, Value) = match serde_json::from_str(text) {
        Ok(pair) => pair,
        Err(err) => {
            warn!("unsupported frame ({err}): {text}");
            return None;
        }
    };
    let command = match name.as_str() {
        "req" => (payload.as_str() == Some(GAMESTATE_REQUEST)).then_some(Command::GamestateRequest),
        "edition" => from_payload(payload).map(Command::Edition),
        "fabled" => from_payload(payload).map(Command::Fabled),
        "gs" => from_payload(payload).map(Command::Gamestate),
        "player" => from_payload(payload).map(Command::Player),
        "claim" => from_payload::<(i64, PlayerId)>(payload).map(|(seat, player_id)| Command::Claim {
            seat: usize::try_from(seat).ok(),
            player_id,
        }),
        "ping" => from_payload::<(bool, PlayerId, LatencyField)>(payload).map(
            |(is_spectator, player_id, latency)| Command::Ping {
                is_spectator,
                player_id,
                latency,
            },
        ),
        "nomination" => from_payload(payload).map(Command::Nomination),
        "votingSpeed" => from_payload(payload).map(Command::VotingSpeed),
        "vote" => from_payload::<(usize, Option<bool>, bool)>(payload).map(
            |(seat, value, from_host)| Command::Vote {
                seat,
                value,
                from_host,
            },
        ),
        "lock" => from_payload::<(usize, Option<bool>)>(payload)
            .map(|(locked, vote)| Command::Lock { locked, vote }),
        "swap" => Some(Command::Swap(payload)),
        "move" => Some(Command::Move(payload)),
        "bye" => from_payload(payload).map(Command::Bye),
        _ => {
            debug!("unknown command {name:?}");
            return None;
        }
    };
    if command.is_none() {
        warn!("discarding malformed {name:?} payload");
    }
    command
}

fn from_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Option<T> {
    serde_json::from_value(payload).ok()
}

/// Newline-delimited frame codec for byte-stream transports.
///
/// Yields raw frame text; JSON decoding stays with [`decode_frame`] so the
/// tolerant-discard behavior is shared by every transport.
#[derive(Clone, Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(newline) = src.iter().position(|byte| *byte == b'\n') else {
                if src.len() > MAX_FRAME_BYTES {
                    return Err(Error::protocol(format!(
                        "frame exceeds {MAX_FRAME_BYTES} bytes"
                    )));
                }
                return Ok(None);
            };
            let line = src.split_to(newline + 1);
            match std::str::from_utf8(&line[..newline]) {
                Ok(text) => {
                    let text = text.trim_end_matches('\r');
                    if !text.is_empty() {
                        return Ok(Some(text.to_string()));
                    }
                }
                Err(_) => warn!("discarding non-UTF8 frame"),
            }
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: String, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > MAX_FRAME_BYTES {
            return Err(Error::protocol(format!(
                "frame exceeds {MAX_FRAME_BYTES} bytes"
            )));
        }
        dst.reserve(frame.len() + 1);
        dst.put_slice(frame.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Nomination;

    #[test]
    fn test_frame_roundtrip() {
        let command = Command::Vote {
            seat: 3,
            value: Some(true),
            from_host: false,
        };
        let frame = encode_frame(&command).unwrap();
        assert_eq!(frame, "[\"vote\",[3,true,false]]");
        assert_eq!(decode_frame(&frame), Some(command));
    }

    #[test]
    fn test_ping_carries_latency_tag() {
        let command = Command::Ping {
            is_spectator: true,
            player_id: PlayerId::from("abc123"),
            latency: LatencyField::Tag("latency".into()),
        };
        let frame = encode_frame(&command).unwrap();
        assert_eq!(frame, "[\"ping\",[true,\"abc123\",\"latency\"]]");
    }

    #[test]
    fn test_claim_vacate_sentinel() {
        let command = Command::Claim {
            seat: None,
            player_id: PlayerId::from("abc123"),
        };
        let frame = encode_frame(&command).unwrap();
        assert_eq!(frame, "[\"claim\",[-1,\"abc123\"]]");
        assert_eq!(decode_frame(&frame), Some(command));
    }

    #[test]
    fn test_nomination_clear_is_null() {
        let frame = encode_frame(&Command::Nomination(None)).unwrap();
        assert_eq!(frame, "[\"nomination\",null]");
        let decoded = decode_frame("[\"nomination\",[1,4]]").unwrap();
        assert_eq!(decoded, Command::Nomination(Some(Nomination::new(1, 4))));
    }

    #[test]
    fn test_malformed_frames_are_discarded() {
        assert_eq!(decode_frame("not json"), None);
        assert_eq!(decode_frame("{\"command\":\"vote\"}"), None);
        assert_eq!(decode_frame("[\"vote\",\"wrong shape\"]"), None);
        assert_eq!(decode_frame("[\"no-such-command\",1]"), None);
    }

    #[test]
    fn test_stream_codec_splits_frames() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from("[\"votingSpeed\",20]\n[\"lock\",[2,true]]\npartial");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("[\"votingSpeed\",20]".to_string())
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("[\"lock\",[2,true]]".to_string())
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"partial");
    }

    #[test]
    fn test_stream_codec_rejects_oversized_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_slice(&vec![b'x'; MAX_FRAME_BYTES + 1]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_stream_codec_encodes_with_newline() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec.encode("[\"req\",\"gs\"]".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"[\"req\",\"gs\"]\n");
    }
}
