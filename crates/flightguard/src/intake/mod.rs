//! Byte-stream inputs polled by the sampling loop: operator commands and GPS.
//!
//! The sampling loop never blocks on a link. Async reader tasks push raw
//! chunks into channels and each cycle drains whatever has arrived.

pub mod command;
pub mod position;
pub mod source;

pub use command::{ArmState, Command, CommandIntake};
pub use position::{parse_sentence, PositionFix, PositionIntake, Sentence, SentenceError};
pub use source::{ByteSource, ChannelSource, NullSource};
