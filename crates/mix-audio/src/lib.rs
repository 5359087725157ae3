//! mix-audio: audio capture plumbing
//!
//! - `ringbuf` - lock-free SPSC ring buffer between the RT capture
//!   callback and the DSP thread
//! - `capture` - capture backend trait + null backend
//! - `cpal_capture` - cpal-based multichannel input capture
//!
//! CRITICAL: the capture callback thread must never block. Its only
//! interaction with the rest of the system is writing into the per-channel
//! ring buffers.

pub mod capture;
pub mod cpal_capture;
pub mod ringbuf;

pub use capture::{AudioCapture, CaptureConfig, DeviceInfo, NullCapture};
pub use cpal_capture::CpalCapture;
pub use ringbuf::RingBuffer;
