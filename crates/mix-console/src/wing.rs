//! Behringer Wing adapter (OSC over UDP, default port 2222).
//!
//! Same wire format as the X32 but with unpadded channel numbers and a
//! different address tree. Subscription is held open with `/$remotestate`;
//! metering is toggled with `/$meters`.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use mix_core::{
    BusParam, ChannelParam, ConsoleCapabilities, ParamValue, ParameterUpdate, UpdateTarget,
};

use crate::adapter::{ConsoleAdapter, ConsoleEvents};
use crate::osc;

const DEFAULT_PORT: u16 = 2222;
const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const KEEPALIVE_MS: u128 = 8000;
const CHANNELS: u16 = 48;
const BUSES: u16 = 16;

struct Inner {
    socket: Mutex<Option<UdpSocket>>,
    connected: AtomicBool,
    running: AtomicBool,
    metering: AtomicBool,
    sink: RwLock<Option<Arc<dyn ConsoleEvents>>>,
    last_keepalive: Mutex<Instant>,
    decode_errors: AtomicU64,
}

pub struct WingAdapter {
    inner: Arc<Inner>,
    recv_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for WingAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WingAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                socket: Mutex::new(None),
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

    fn send_raw(&self, data: &[u8]) {
        if let Some(sock) = self.inner.socket.lock().as_ref() {
            let _ = sock.send(data);
        }
    }
}

fn channel_path(ch: u16, suffix: &str) -> String {
    format!("/ch/{}{}", ch, suffix)
}

fn bus_path(bus: u16, suffix: &str) -> String {
    format!("/bus/{}{}", bus, suffix)
}

fn param_path(ch: u16, param: ChannelParam) -> Option<String> {
    let suffix = match param {
        ChannelParam::Fader => "/fader".into(),
        ChannelParam::Mute => "/mute".into(),
        ChannelParam::Pan => "/pan".into(),
        ChannelParam::Name => "/name".into(),
        ChannelParam::Gain => "/preamp/gain".into(),
        ChannelParam::HighPassFreq => "/hpf/freq".into(),
        ChannelParam::HighPassOn => "/hpf/on".into(),
        ChannelParam::EqOn => "/eq/on".into(),
        ChannelParam::EqFreq(b) if (1..=6).contains(&b) => format!("/eq/{}/freq", b),
        ChannelParam::EqGain(b) if (1..=6).contains(&b) => format!("/eq/{}/gain", b),
        ChannelParam::EqQ(b) if (1..=6).contains(&b) => format!("/eq/{}/q", b),
        ChannelParam::CompThreshold => "/comp/thr".into(),
        ChannelParam::CompRatio => "/comp/ratio".into(),
        ChannelParam::CompOn => "/comp/on".into(),
        ChannelParam::GateThreshold => "/gate/thr".into(),
        ChannelParam::GateOn => "/gate/on".into(),
        _ => return None,
    };
    Some(channel_path(ch, &suffix))
}

/// Decode a Wing address into a parameter update. Addresses use unpadded
/// indices: `/ch/5/fader`, `/ch/12/send/3/level`, `/bus/2/name`.
fn update_from_message(address: &str, arg: &osc::OscArg) -> Option<ParameterUpdate> {
    let (target, rest) = if let Some(rest) = address.strip_prefix("/ch/") {
        (UpdateTarget::Channel, rest)
    } else if let Some(rest) = address.strip_prefix("/bus/") {
        (UpdateTarget::Bus, rest)
    } else {
        return None;
    };

    let slash = rest.find('/')?;
    let index: u16 = rest[..slash].parse().ok()?;
    let path = &rest[slash..];

    let float = |a: &osc::OscArg| -> Option<ParamValue> {
        match a {
            osc::OscArg::Float(f) => Some(ParamValue::Float(*f)),
            osc::OscArg::Int(i) => Some(ParamValue::Float(*i as f32)),
            _ => None,
        }
    };
    let boolean = |a: &osc::OscArg| -> Option<ParamValue> {
        match a {
            osc::OscArg::Int(i) => Some(ParamValue::Bool(*i != 0)),
            osc::OscArg::Float(f) => Some(ParamValue::Bool(*f != 0.0)),
            _ => None,
        }
    };

    // Send levels: /ch/N/send/M/level
    if target == UpdateTarget::Channel {
        if let Some(rest) = path.strip_prefix("/send/") {
            if let Some(bus_str) = rest.strip_suffix("/level") {
                let aux: u16 = bus_str.parse().ok()?;
                let mut update =
                    ParameterUpdate::channel(index, ChannelParam::SendLevel, float(arg)?);
                update.aux_index = aux;
                return Some(update);
            }
        }
    }

    // EQ bands: /eq/B/freq|gain|q
    if let Some(rest) = path.strip_prefix("/eq/") {
        if let Some((band_str, field)) = rest.split_once('/') {
            let band: u8 = band_str.parse().ok()?;
            if (1..=6).contains(&band) {
                let param = match field {
                    "freq" => ChannelParam::EqFreq(band),
                    "gain" => ChannelParam::EqGain(band),
                    "q" => ChannelParam::EqQ(band),
                    _ => return None,
                };
                return Some(ParameterUpdate { target, index, aux_index: 0, param, value: float(arg)? });
            }
        }
    }

    let (param, value) = match path {
        "/fader" => (ChannelParam::Fader, float(arg)?),
        "/mute" => (ChannelParam::Mute, boolean(arg)?),
        "/pan" => (ChannelParam::Pan, float(arg)?),
        "/name" => match arg {
            osc::OscArg::Str(s) => (ChannelParam::Name, ParamValue::Str(s.clone())),
            _ => return None,
        },
        "/preamp/gain" => (ChannelParam::Gain, float(arg)?),
        "/hpf/freq" => (ChannelParam::HighPassFreq, float(arg)?),
        "/hpf/on" => (ChannelParam::HighPassOn, boolean(arg)?),
        "/eq/on" => (ChannelParam::EqOn, boolean(arg)?),
        "/comp/thr" => (ChannelParam::CompThreshold, float(arg)?),
        "/comp/ratio" => (ChannelParam::CompRatio, float(arg)?),
        "/comp/on" => (ChannelParam::CompOn, boolean(arg)?),
        "/gate/thr" => (ChannelParam::GateThreshold, float(arg)?),
        "/gate/on" => (ChannelParam::GateOn, boolean(arg)?),
        _ => return None,
    };

    Some(ParameterUpdate { target, index, aux_index: 0, param, value })
}

fn handle_datagram(inner: &Inner, data: &[u8]) {
    if data.starts_with(b"/meters") || data.starts_with(b"/$meters") {
        let Some(pkt) = osc::decode(data) else {
            inner.decode_errors.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if let Some(osc::OscArg::Blob(blob)) = pkt.args.first() {
            let levels = osc::decode_meter_levels(blob, CHANNELS as usize);
            if let Some(sink) = inner.sink.read().as_ref() {
                for (i, level) in levels.iter().enumerate() {
                    let db = osc::level_to_dbfs(*level);
                    sink.on_meter_update(i as u16 + 1, db, db);
                }
            }
        }
        return;
    }

    let Some(pkt) = osc::decode(data) else {
        inner.decode_errors.fetch_add(1, Ordering::Relaxed);
        return;
    };
    let Some(arg) = pkt.args.first() else { return };
    if let Some(update) = update_from_message(&pkt.address, arg) {
        if let Some(sink) = inner.sink.read().as_ref() {
            sink.on_parameter_update(&update);
        }
    }
}

fn receive_loop(inner: Arc<Inner>, socket: UdpSocket) {
    let mut buf = [0u8; 4096];
    while inner.running.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(n) => handle_datagram(&inner, &buf[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::warn!("Wing: receive error: {}", e);
                inner.connected.store(false, Ordering::Relaxed);
                if let Some(sink) = inner.sink.read().as_ref() {
                    sink.on_connection_change(false);
                }
                break;
            }
        }
    }
}

impl ConsoleAdapter for WingAdapter {
    fn connect(&self, ip: &str, port: u16) -> bool {
        let port = if port > 0 { port } else { DEFAULT_PORT };

        let (socket, recv_socket) = match crate::adapter::open_udp(ip, port, RECV_TIMEOUT) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("Wing: failed to connect to {}:{}: {}", ip, port, e);
                return false;
            }
        };

        *self.inner.socket.lock() = Some(socket);
        self.inner.connected.store(true, Ordering::Relaxed);
        self.inner.running.store(true, Ordering::Relaxed);
        *self.inner.last_keepalive.lock() = Instant::now();

        let inner = Arc::clone(&self.inner);
        *self.recv_thread.lock() = Some(std::thread::spawn(move || receive_loop(inner, recv_socket)));

        self.send_raw(&osc::encode_int("/$remotestate", 1));
        log::info!("Wing: connected to {}:{}", ip, port);

        if let Some(sink) = self.inner.sink.read().as_ref() {
            sink.on_connection_change(true);
        }
        true
    }

    fn disconnect(&self) {
        self.inner.running.store(false, Ordering::Relaxed);
        let was_connected = self.inner.connected.swap(false, Ordering::Relaxed);
        if let Some(handle) = self.recv_thread.lock().take() {
            let _ = handle.join();
        }
        *self.inner.socket.lock() = None;
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
            model: "Wing".into(),
            firmware: String::new(),
            channel_count: CHANNELS,
            bus_count: BUSES,
            matrix_count: 8,
            dca_count: 8,
            fx_slots: 16,
            eq_bands: 6,
            has_motorized_faders: true,
            has_dynamic_eq: true,
            has_multiband_comp: true,
            meter_update_rate_ms: 50,
        }
    }

    fn request_full_sync(&self) {
        self.send_raw(&osc::encode_int("/$remotestate", 1));

        for ch in 1..=CHANNELS {
            self.send_raw(&osc::encode_query(&channel_path(ch, "/name")));
            self.send_raw(&osc::encode_query(&channel_path(ch, "/fader")));
            self.send_raw(&osc::encode_query(&channel_path(ch, "/mute")));
            self.send_raw(&osc::encode_query(&channel_path(ch, "/pan")));
        }

        for bus in 1..=BUSES {
            self.send_raw(&osc::encode_query(&bus_path(bus, "/name")));
            self.send_raw(&osc::encode_query(&bus_path(bus, "/fader")));
        }
    }

    fn set_channel_param(&self, ch: u16, param: ChannelParam, value: ParamValue) {
        let Some(path) = param_path(ch, param) else {
            log::warn!("Wing: unhandled param {:?} for ch{}", param, ch);
            return;
        };
        let msg = match &value {
            ParamValue::Bool(b) => osc::encode_int(&path, *b as i32),
            ParamValue::Float(f) => osc::encode_float(&path, *f),
            ParamValue::Int(i) => osc::encode_int(&path, *i),
            ParamValue::Str(s) => osc::encode_str(&path, s),
        };
        self.send_raw(&msg);
    }

    fn set_send_level(&self, ch: u16, bus: u16, level: f32) {
        let path = format!("/ch/{}/send/{}/level", ch, bus);
        self.send_raw(&osc::encode_float(&path, level));
    }

    fn set_bus_param(&self, bus: u16, param: BusParam, value: f32) {
        match param {
            BusParam::Fader => self.send_raw(&osc::encode_float(&bus_path(bus, "/fader"), value)),
            BusParam::Pan => self.send_raw(&osc::encode_float(&bus_path(bus, "/pan"), value)),
            _ => {}
        }
    }

    fn subscribe_meter(&self, _refresh_ms: u32) {
        self.inner.metering.store(true, Ordering::Relaxed);
        self.send_raw(&osc::encode_int("/$meters", 1));
    }

    fn unsubscribe_meter(&self) {
        self.inner.metering.store(false, Ordering::Relaxed);
        self.send_raw(&osc::encode_int("/$meters", 0));
    }

    fn tick(&self) {
        if !self.is_connected() {
            return;
        }
        let now = Instant::now();
        let mut last = self.inner.last_keepalive.lock();
        if now.duration_since(*last).as_millis() > KEEPALIVE_MS {
            self.send_raw(&osc::encode_int("/$remotestate", 1));
            *last = now;
        }
    }

    fn set_event_sink(&self, sink: Arc<dyn ConsoleEvents>) {
        *self.inner.sink.write() = Some(sink);
    }
}

impl Drop for WingAdapter {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpadded_paths() {
        assert_eq!(param_path(5, ChannelParam::Fader).unwrap(), "/ch/5/fader");
        assert_eq!(param_path(48, ChannelParam::EqGain(6)).unwrap(), "/ch/48/eq/6/gain");
        assert!(param_path(1, ChannelParam::EqGain(7)).is_none());
    }

    #[test]
    fn test_decode_fader_and_mute() {
        let fader = update_from_message("/ch/5/fader", &osc::OscArg::Float(0.7)).unwrap();
        assert_eq!(fader.index, 5);
        assert_eq!(fader.param, ChannelParam::Fader);

        // Wing mute is not inverted
        let mute = update_from_message("/ch/5/mute", &osc::OscArg::Int(1)).unwrap();
        assert_eq!(mute.value, ParamValue::Bool(true));
    }

    #[test]
    fn test_decode_eq_band() {
        let update = update_from_message("/ch/12/eq/4/gain", &osc::OscArg::Float(-3.0)).unwrap();
        assert_eq!(update.param, ChannelParam::EqGain(4));
        assert_eq!(update.value, ParamValue::Float(-3.0));
        assert!(update_from_message("/ch/12/eq/7/gain", &osc::OscArg::Float(0.0)).is_none());
    }

    #[test]
    fn test_decode_send_level_synthetic_frame() {
        // Synthetic wire frame exercising the send decode path end to end
        let frame = osc::encode_float("/ch/7/send/2/level", 0.45);
        let pkt = osc::decode(&frame).unwrap();
        let update = update_from_message(&pkt.address, &pkt.args[0]).unwrap();
        assert_eq!(update.param, ChannelParam::SendLevel);
        assert_eq!(update.index, 7);
        assert_eq!(update.aux_index, 2);
        assert_eq!(update.value, ParamValue::Float(0.45));
    }

    #[test]
    fn test_decode_bus_name() {
        let update =
            update_from_message("/bus/3/name", &osc::OscArg::Str("Wedges".into())).unwrap();
        assert_eq!(update.target, UpdateTarget::Bus);
        assert_eq!(update.param, ChannelParam::Name);
    }

    #[test]
    fn test_unknown_dropped() {
        assert!(update_from_message("/main/fader", &osc::OscArg::Float(0.5)).is_none());
        assert!(update_from_message("/ch/x/fader", &osc::OscArg::Float(0.5)).is_none());
    }
}
