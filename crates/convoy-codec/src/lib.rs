//! Convoy wire codec primitives.
//!
//! Defines the JSON frame schema exchanged with the dispatch server and
//! encode/decode helpers.

pub mod error;
pub mod frame;

pub use error::CodecError;
pub use frame::{decode_frame_json, encode_frame_json, Frame, Verb};
