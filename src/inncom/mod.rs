//! Inncom room-controller wire protocol: framing, calibration and decoding.

pub mod calibration;
pub mod decoder;
pub mod frame;

pub use decoder::decode;
pub use frame::FrameSync;
