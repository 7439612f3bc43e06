//! Wire protocol: command vocabulary, frame codec and framing for
//! byte-stream transports.

pub mod codec;
pub mod message;

pub use self::codec::{decode_frame, encode_frame, FrameCodec};
pub use self::message::{
    Command, EditionUpdate, GamestatePayload, LatencyField, PlayerUpdate, SlotProperty,
    SlotSummary,
};
