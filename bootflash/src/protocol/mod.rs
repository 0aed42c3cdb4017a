//! Bootloader download protocol.

pub mod crc;
pub mod frame;
pub mod rx_queue;

// Re-export common types
pub use {
    crc::crc32,
    frame::{FRAME_SIZE, Frame, FrameType, MAX_PAYLOAD},
    rx_queue::RxQueue,
};
