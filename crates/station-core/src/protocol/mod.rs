//! Protocol module containing the message type and the frame codec.

pub mod frame;
pub mod message;

pub use frame::{encode_frame, encode_frame_into, FrameDecoder, FrameError, TERMINATOR};
pub use message::Message;
