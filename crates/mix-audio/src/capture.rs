//! Audio capture backend trait.
//!
//! Implementations: `CpalCapture` (real devices) and `NullCapture` (no-op
//! fallback when capture is disabled or unavailable).

/// Capture device description for enumeration.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: i32,
    pub name: String,
    pub max_input_channels: u16,
    pub default_sample_rate: f64,
}

/// Capture stream configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// -1 = default device
    pub device_id: i32,
    pub channel_count: u16,
    pub sample_rate: f64,
    /// Block size handed to the FFT, in frames per channel
    pub frames_per_block: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { device_id: -1, channel_count: 32, sample_rate: 48_000.0, frames_per_block: 1024 }
    }
}

/// Abstract multichannel audio capture.
///
/// The DSP thread drains buffered audio through `consume`, which invokes
/// the supplied closure once per channel with a full block of samples.
pub trait AudioCapture: Send + Sync {
    fn open(&mut self, config: &CaptureConfig) -> bool;
    fn start(&mut self) -> bool;
    fn stop(&mut self);
    fn is_running(&self) -> bool;

    /// Drain one block per channel if every channel has `frames` buffered.
    /// Returns true when a block was consumed.
    fn consume(&self, frames: usize, sink: &mut dyn FnMut(u16, &[f32])) -> bool;

    fn list_devices(&self) -> Vec<DeviceInfo>;
    fn backend_name(&self) -> &'static str;
}

/// No-op capture used when audio capture is disabled.
#[derive(Default)]
pub struct NullCapture;

impl AudioCapture for NullCapture {
    fn open(&mut self, _config: &CaptureConfig) -> bool {
        false
    }

    fn start(&mut self) -> bool {
        false
    }

    fn stop(&mut self) {}

    fn is_running(&self) -> bool {
        false
    }

    fn consume(&self, _frames: usize, _sink: &mut dyn FnMut(u16, &[f32])) -> bool {
        false
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        Vec::new()
    }

    fn backend_name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_capture_is_inert() {
        let mut capture = NullCapture;
        assert!(!capture.open(&CaptureConfig::default()));
        assert!(!capture.start());
        assert!(!capture.is_running());
        let mut called = false;
        assert!(!capture.consume(1024, &mut |_, _| called = true));
        assert!(!called);
        assert!(capture.list_devices().is_empty());
        assert_eq!(capture.backend_name(), "null");
    }
}
