//! Closed text protocol spoken by field devices.
//!
//! Inbound frames are comma-separated and wrapped in `*`/`#` markers; their
//! meaning is decided purely by field count and fixed-position tokens.
//! Outbound commands are single bare tokens published per device.

pub mod command;
pub mod frame;

pub use command::DeviceCommand;
pub use frame::{
    classify, clean_frame, frame_key, FrameError, GameStatus, ScoreCounters, TelemetryMessage,
};
