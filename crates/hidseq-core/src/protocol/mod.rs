//! Device protocol: fixed-size command frames and their binary codec.

pub mod codec;

pub use codec::{decode_frame, decode_stream, encode_frame, Frame, Opcode, ProtocolError, FRAME_SIZE};
