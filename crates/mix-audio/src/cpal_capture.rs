//! cpal-based multichannel input capture.
//!
//! The cpal callback deinterleaves incoming f32 frames into one SPSC ring
//! buffer per channel; that is the only work it does. The stream itself is
//! owned by a dedicated thread because cpal streams are not `Send`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use crate::capture::{AudioCapture, CaptureConfig, DeviceInfo};
use crate::ringbuf::RingBuffer;

/// Seconds of audio buffered per channel between callback and DSP thread.
const BUFFER_SECONDS: f64 = 2.0;

/// Largest per-channel block the deinterleave scratch can hold.
const MAX_CALLBACK_FRAMES: usize = 8192;

pub struct CpalCapture {
    config: CaptureConfig,
    rings: Arc<Vec<RingBuffer>>,
    running: Arc<AtomicBool>,
    stream_thread: Option<JoinHandle<()>>,
    read_bufs: Mutex<Vec<Vec<f32>>>,
    opened: bool,
}

impl Default for CpalCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalCapture {
    pub fn new() -> Self {
        Self {
            config: CaptureConfig::default(),
            rings: Arc::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            stream_thread: None,
            read_bufs: Mutex::new(Vec::new()),
            opened: false,
        }
    }

    fn find_device(device_id: i32) -> Option<cpal::Device> {
        let host = cpal::default_host();
        if device_id < 0 {
            return host.default_input_device();
        }
        host.input_devices().ok()?.nth(device_id as usize)
    }
}

impl AudioCapture for CpalCapture {
    fn open(&mut self, config: &CaptureConfig) -> bool {
        let Some(device) = Self::find_device(config.device_id) else {
            log::error!("No audio input device (id {})", config.device_id);
            return false;
        };

        let max_inputs = device
            .default_input_config()
            .map(|c| c.channels())
            .unwrap_or(0);
        if max_inputs == 0 {
            log::error!("Audio device has no input channels");
            return false;
        }

        self.config = config.clone();
        if max_inputs < config.channel_count {
            log::warn!(
                "Device has {} inputs, requested {} - clamping",
                max_inputs,
                config.channel_count
            );
            self.config.channel_count = max_inputs;
        }

        let ring_capacity = (self.config.sample_rate * BUFFER_SECONDS) as usize;
        self.rings = Arc::new(
            (0..self.config.channel_count)
                .map(|_| RingBuffer::new(ring_capacity))
                .collect(),
        );
        *self.read_bufs.lock() = (0..self.config.channel_count)
            .map(|_| vec![0.0; self.config.frames_per_block])
            .collect();

        let name = device.name().unwrap_or_else(|_| "unknown".into());
        log::info!(
            "Opened audio input '{}': {} ch, {}Hz, {} frames/block",
            name,
            self.config.channel_count,
            self.config.sample_rate,
            self.config.frames_per_block
        );
        self.opened = true;
        true
    }

    fn start(&mut self) -> bool {
        if !self.opened || self.running.load(Ordering::Relaxed) {
            return false;
        }

        let rings = Arc::clone(&self.rings);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<bool>();

        running.store(true, Ordering::Relaxed);
        let thread_running = Arc::clone(&self.running);

        self.stream_thread = Some(std::thread::spawn(move || {
            let Some(device) = Self::find_device(config.device_id) else {
                let _ = ready_tx.send(false);
                return;
            };

            let channels = config.channel_count;
            let stream_config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(config.sample_rate as u32),
                buffer_size: cpal::BufferSize::Default,
            };

            // Deinterleave scratch allocated up front; the callback itself
            // must not allocate.
            let mut scratch = vec![0.0f32; MAX_CALLBACK_FRAMES];

            let stream = device.build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let frames = (data.len() / channels as usize).min(MAX_CALLBACK_FRAMES);
                    for ch in 0..channels as usize {
                        for frame in 0..frames {
                            scratch[frame] = data[frame * channels as usize + ch];
                        }
                        rings[ch].write(&scratch[..frames]);
                    }
                },
                |err| log::warn!("Audio stream error: {}", err),
                None,
            );

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    log::error!("Failed to build input stream: {}", e);
                    let _ = ready_tx.send(false);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                log::error!("Failed to start input stream: {}", e);
                let _ = ready_tx.send(false);
                return;
            }
            let _ = ready_tx.send(true);

            // Keep the stream alive until stop() clears the flag.
            while thread_running.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(100));
            }
            drop(stream);
        }));

        let ok = ready_rx
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or(false);
        if ok {
            log::info!("Audio capture started");
        } else {
            self.running.store(false, Ordering::Relaxed);
            if let Some(handle) = self.stream_thread.take() {
                let _ = handle.join();
            }
        }
        ok
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
        log::info!("Audio capture stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn consume(&self, frames: usize, sink: &mut dyn FnMut(u16, &[f32])) -> bool {
        if self.rings.is_empty() {
            return false;
        }
        // Only consume once a full block is buffered on every channel, so
        // each FFT sees time-aligned blocks.
        if self.rings.iter().any(|r| r.available() < frames) {
            return false;
        }

        let mut bufs = self.read_bufs.lock();
        for (ch, ring) in self.rings.iter().enumerate() {
            let buf = &mut bufs[ch];
            if buf.len() < frames {
                buf.resize(frames, 0.0);
            }
            ring.read(&mut buf[..frames]);
            sink(ch as u16 + 1, &buf[..frames]);
        }
        true
    }

    fn list_devices(&self) -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        let Ok(devices) = host.input_devices() else {
            return Vec::new();
        };
        devices
            .enumerate()
            .filter_map(|(i, d)| {
                let cfg = d.default_input_config().ok()?;
                Some(DeviceInfo {
                    id: i as i32,
                    name: d.name().ok()?,
                    max_input_channels: cfg.channels(),
                    default_sample_rate: cfg.sample_rate().0 as f64,
                })
            })
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "cpal"
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
