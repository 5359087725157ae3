//! Allen & Heath Avantis adapter (binary over TCP, default port 51325).
//!
//! Framing: `[len:u16 BE][msg_type:u16 BE][payload]` where `len` covers
//! the whole frame including the 4-byte header. Parameter writes carry
//! `[ch:u16 BE][param_id:u16 BE][value_bits:u32 BE]`; meter frames
//! (msg_type 0x10) carry consecutive float32 levels per channel.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use mix_core::{
    BusParam, ChannelParam, ConsoleCapabilities, ParamValue, ParameterUpdate,
};

use crate::adapter::{ConsoleAdapter, ConsoleEvents};
use crate::osc::level_to_dbfs;

const DEFAULT_PORT: u16 = 51325;
const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const KEEPALIVE_MS: u128 = 5000;
const CHANNELS: u16 = 64;
const BUSES: u16 = 24;

const MSG_HEARTBEAT: u16 = 0x00;
const MSG_QUERY: u16 = 0x01;
const MSG_PARAM: u16 = 0x02;
const MSG_METER: u16 = 0x10;

/// Dense parameter code table. Send levels live at 0x0200 + bus offset.
fn param_to_code(param: ChannelParam) -> Option<u16> {
    Some(match param {
        ChannelParam::Fader => 0x0001,
        ChannelParam::Mute => 0x0002,
        ChannelParam::Pan => 0x0003,
        ChannelParam::Name => 0x0004,
        ChannelParam::Gain => 0x0010,
        ChannelParam::PhantomPower => 0x0011,
        ChannelParam::PhaseInvert => 0x0012,
        ChannelParam::HighPassFreq => 0x0020,
        ChannelParam::HighPassOn => 0x0021,
        ChannelParam::EqOn => 0x0030,
        ChannelParam::EqFreq(b) if (1..=4).contains(&b) => 0x0031 + (b as u16 - 1) * 3,
        ChannelParam::EqGain(b) if (1..=4).contains(&b) => 0x0032 + (b as u16 - 1) * 3,
        ChannelParam::EqQ(b) if (1..=4).contains(&b) => 0x0033 + (b as u16 - 1) * 3,
        ChannelParam::CompThreshold => 0x0040,
        ChannelParam::CompRatio => 0x0041,
        ChannelParam::CompAttack => 0x0042,
        ChannelParam::CompRelease => 0x0043,
        ChannelParam::CompMakeup => 0x0045,
        ChannelParam::CompOn => 0x0044,
        ChannelParam::GateThreshold => 0x0050,
        ChannelParam::GateRange => 0x0051,
        ChannelParam::GateAttack => 0x0052,
        ChannelParam::GateHold => 0x0053,
        ChannelParam::GateOn => 0x0054,
        _ => return None,
    })
}

fn code_to_param(code: u16) -> Option<ChannelParam> {
    Some(match code {
        0x0001 => ChannelParam::Fader,
        0x0002 => ChannelParam::Mute,
        0x0003 => ChannelParam::Pan,
        0x0004 => ChannelParam::Name,
        0x0010 => ChannelParam::Gain,
        0x0011 => ChannelParam::PhantomPower,
        0x0012 => ChannelParam::PhaseInvert,
        0x0020 => ChannelParam::HighPassFreq,
        0x0021 => ChannelParam::HighPassOn,
        0x0030 => ChannelParam::EqOn,
        0x0031..=0x003c => {
            let offset = code - 0x0031;
            let band = (offset / 3) as u8 + 1;
            match offset % 3 {
                0 => ChannelParam::EqFreq(band),
                1 => ChannelParam::EqGain(band),
                _ => ChannelParam::EqQ(band),
            }
        }
        0x0040 => ChannelParam::CompThreshold,
        0x0041 => ChannelParam::CompRatio,
        0x0042 => ChannelParam::CompAttack,
        0x0043 => ChannelParam::CompRelease,
        0x0044 => ChannelParam::CompOn,
        0x0045 => ChannelParam::CompMakeup,
        0x0050 => ChannelParam::GateThreshold,
        0x0051 => ChannelParam::GateRange,
        0x0052 => ChannelParam::GateAttack,
        0x0053 => ChannelParam::GateHold,
        0x0054 => ChannelParam::GateOn,
        code if (0x0200..0x0200 + BUSES).contains(&code) => ChannelParam::SendLevel,
        _ => return None,
    })
}

fn encode_frame(msg_type: u16, payload: &[u8]) -> Vec<u8> {
    let total = 4 + payload.len();
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&(total as u16).to_be_bytes());
    frame.extend_from_slice(&msg_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn encode_set_param(ch: u16, param_id: u16, value: f32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&ch.to_be_bytes());
    payload.extend_from_slice(&param_id.to_be_bytes());
    payload.extend_from_slice(&value.to_bits().to_be_bytes());
    payload
}

/// Decode one complete parameter frame payload.
fn decode_param_payload(payload: &[u8]) -> Option<ParameterUpdate> {
    if payload.len() < 8 {
        return None;
    }
    let ch = u16::from_be_bytes([payload[0], payload[1]]);
    let code = u16::from_be_bytes([payload[2], payload[3]]);
    let value = f32::from_bits(u32::from_be_bytes([
        payload[4], payload[5], payload[6], payload[7],
    ]));

    let param = code_to_param(code)?;
    let mut update = ParameterUpdate::channel(ch, param, ParamValue::Float(value));
    match param {
        ChannelParam::Mute
        | ChannelParam::PhantomPower
        | ChannelParam::PhaseInvert
        | ChannelParam::HighPassOn
        | ChannelParam::EqOn
        | ChannelParam::CompOn
        | ChannelParam::GateOn => {
            update.value = ParamValue::Bool(value != 0.0);
        }
        ChannelParam::SendLevel => {
            update.aux_index = code - 0x0200 + 1;
        }
        _ => {}
    }
    Some(update)
}

struct Inner {
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    running: AtomicBool,
    metering: AtomicBool,
    sink: RwLock<Option<Arc<dyn ConsoleEvents>>>,
    last_keepalive: Mutex<Instant>,
    decode_errors: AtomicU64,
}

pub struct AvantisAdapter {
    inner: Arc<Inner>,
    recv_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for AvantisAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AvantisAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stream: Mutex::new(None),
                connected: AtomicBool::new(false),
                running: AtomicBool::new(false),
                metering: AtomicBool::new(false),
                sink: RwLock::new(None),
                last_keepalive: Mutex::new(Instant::now()),
                decode_errors: AtomicU64::new(0),
            }),
            recv_thread: Mutex::new(None),
        }
    }

    fn send_command(&self, msg_type: u16, payload: &[u8]) {
        let frame = encode_frame(msg_type, payload);
        if let Some(stream) = self.inner.stream.lock().as_mut() {
            let _ = stream.write_all(&frame);
        }
    }
}

fn handle_frame(inner: &Inner, msg_type: u16, payload: &[u8]) {
    match msg_type {
        MSG_PARAM => {
            let Some(update) = decode_param_payload(payload) else {
                inner.decode_errors.fetch_add(1, Ordering::Relaxed);
                return;
            };
            if let Some(sink) = inner.sink.read().as_ref() {
                sink.on_parameter_update(&update);
            }
        }
        MSG_METER => {
            if let Some(sink) = inner.sink.read().as_ref() {
                for (i, chunk) in payload.chunks_exact(4).take(CHANNELS as usize).enumerate() {
                    let level =
                        f32::from_bits(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
                    let db = level_to_dbfs(level);
                    sink.on_meter_update(i as u16 + 1, db, db);
                }
            }
        }
        _ => {}
    }
}

fn receive_loop(inner: Arc<Inner>, mut stream: TcpStream) {
    let mut pending: Vec<u8> = Vec::with_capacity(8192);
    let mut buf = [0u8; 4096];

    while inner.running.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => {
                log::warn!("Avantis: connection closed by remote");
                inner.connected.store(false, Ordering::Relaxed);
                if let Some(sink) = inner.sink.read().as_ref() {
                    sink.on_connection_change(false);
                }
                break;
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                // Peel complete frames off the front
                loop {
                    if pending.len() < 4 {
                        break;
                    }
                    let len = u16::from_be_bytes([pending[0], pending[1]]) as usize;
                    if len < 4 {
                        // Unrecoverable framing error: resynchronise by
                        // dropping the buffer
                        inner.decode_errors.fetch_add(1, Ordering::Relaxed);
                        pending.clear();
                        break;
                    }
                    if pending.len() < len {
                        break;
                    }
                    let msg_type = u16::from_be_bytes([pending[2], pending[3]]);
                    handle_frame(&inner, msg_type, &pending[4..len]);
                    pending.drain(..len);
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::warn!("Avantis: receive error: {}", e);
                inner.connected.store(false, Ordering::Relaxed);
                if let Some(sink) = inner.sink.read().as_ref() {
                    sink.on_connection_change(false);
                }
                break;
            }
        }
    }
}

impl ConsoleAdapter for AvantisAdapter {
    fn connect(&self, ip: &str, port: u16) -> bool {
        let port = if port > 0 { port } else { DEFAULT_PORT };

        let (stream, recv_stream) = match crate::adapter::open_tcp(ip, port, RECV_TIMEOUT) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("Avantis: failed to connect to {}:{}: {}", ip, port, e);
                return false;
            }
        };

        *self.inner.stream.lock() = Some(stream);
        self.inner.connected.store(true, Ordering::Relaxed);
        self.inner.running.store(true, Ordering::Relaxed);
        *self.inner.last_keepalive.lock() = Instant::now();

        let inner = Arc::clone(&self.inner);
        *self.recv_thread.lock() =
            Some(std::thread::spawn(move || receive_loop(inner, recv_stream)));

        log::info!("Avantis: connected to {}:{}", ip, port);
        if let Some(sink) = self.inner.sink.read().as_ref() {
            sink.on_connection_change(true);
        }
        true
    }

    fn disconnect(&self) {
        self.inner.running.store(false, Ordering::Relaxed);
        let was_connected = self.inner.connected.swap(false, Ordering::Relaxed);
        if let Some(stream) = self.inner.stream.lock().take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        if let Some(handle) = self.recv_thread.lock().take() {
            let _ = handle.join();
        }
        if was_connected {
            if let Some(sink) = self.inner.sink.read().as_ref() {
                sink.on_connection_change(false);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    fn capabilities(&self) -> ConsoleCapabilities {
        ConsoleCapabilities {
            model: "Avantis".into(),
            firmware: String::new(),
            channel_count: CHANNELS,
            bus_count: BUSES,
            matrix_count: 0,
            dca_count: 24,
            fx_slots: 12,
            eq_bands: 4,
            has_motorized_faders: true,
            has_dynamic_eq: true,
            has_multiband_comp: false,
            meter_update_rate_ms: 50,
        }
    }

    fn request_full_sync(&self) {
        log::info!("Avantis: requesting full state sync");
        for ch in 1..=CHANNELS {
            for param in [ChannelParam::Name, ChannelParam::Fader, ChannelParam::Mute] {
                if let Some(code) = param_to_code(param) {
                    self.send_command(MSG_QUERY, &encode_set_param(ch, code, 0.0));
                }
            }
        }
        for bus in 1..=BUSES {
            self.send_command(MSG_QUERY, &encode_set_param(bus, 0x0100, 0.0)); // name
            self.send_command(MSG_QUERY, &encode_set_param(bus, 0x0101, 0.0)); // fader
        }
    }

    fn set_channel_param(&self, ch: u16, param: ChannelParam, value: ParamValue) {
        if param == ChannelParam::Name {
            // Name writes use a different message format on this console
            log::warn!("Avantis: name setting not supported");
            return;
        }
        let Some(code) = param_to_code(param) else {
            log::warn!("Avantis: unhandled param {:?} for ch{}", param, ch);
            return;
        };
        let float = match value {
            ParamValue::Float(f) => f,
            ParamValue::Bool(b) => b as i32 as f32,
            ParamValue::Int(i) => i as f32,
            ParamValue::Str(_) => return,
        };
        self.send_command(MSG_PARAM, &encode_set_param(ch, code, float));
    }

    fn set_send_level(&self, ch: u16, bus: u16, level: f32) {
        if bus < 1 || bus > BUSES {
            return;
        }
        let code = 0x0200 + (bus - 1);
        self.send_command(MSG_PARAM, &encode_set_param(ch, code, level));
    }

    fn set_bus_param(&self, bus: u16, param: BusParam, value: f32) {
        let code = match param {
            BusParam::Fader => 0x0101,
            BusParam::Pan => 0x0103,
            _ => return,
        };
        self.send_command(MSG_PARAM, &encode_set_param(bus, code, value));
    }

    fn subscribe_meter(&self, _refresh_ms: u32) {
        self.inner.metering.store(true, Ordering::Relaxed);
        self.send_command(MSG_METER, &[0x01]);
    }

    fn unsubscribe_meter(&self) {
        self.inner.metering.store(false, Ordering::Relaxed);
        self.send_command(MSG_METER, &[0x00]);
    }

    fn tick(&self) {
        if !self.is_connected() {
            return;
        }
        let now = Instant::now();
        let mut last = self.inner.last_keepalive.lock();
        if now.duration_since(*last).as_millis() > KEEPALIVE_MS {
            self.send_command(MSG_HEARTBEAT, &[]);
            *last = now;
        }
    }

    fn set_event_sink(&self, sink: Arc<dyn ConsoleEvents>) {
        *self.inner.sink.write() = Some(sink);
    }
}

impl Drop for AvantisAdapter {
    fn drop(&mut self) {
        self.disconnect();
    }
}
