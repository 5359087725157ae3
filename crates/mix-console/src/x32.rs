//! Behringer X32 / Midas M32 adapter (OSC over UDP, default port 10023).
//!
//! Subscription model: `/xremote` must be re-sent every 10 s to keep
//! parameter updates flowing (we renew at 8 s), and the meter subscription
//! must be re-armed every 10 s (we renew at 9 s).

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use mix_core::{
    BusParam, ChannelParam, ConsoleCapabilities, ParamValue, ParameterUpdate,
};

use crate::adapter::{ConsoleAdapter, ConsoleEvents};
use crate::osc;

const DEFAULT_PORT: u16 = 10023;
const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const KEEPALIVE_MS: u128 = 8000;
const METER_RENEW_MS: u128 = 9000;
const CHANNELS: u16 = 32;
const BUSES: u16 = 16;

struct Inner {
    socket: Mutex<Option<UdpSocket>>,
    connected: AtomicBool,
    running: AtomicBool,
    metering: AtomicBool,
    sink: RwLock<Option<Arc<dyn ConsoleEvents>>>,
    last_keepalive: Mutex<Instant>,
    last_meter_renew: Mutex<Instant>,
    decode_errors: AtomicU64,
}

pub struct X32Adapter {
    inner: Arc<Inner>,
    recv_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for X32Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl X32Adapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                socket: Mutex::new(None),
                connected: AtomicBool::new(false),
                running: AtomicBool::new(false),
                metering: AtomicBool::new(false),
                sink: RwLock::new(None),
                last_keepalive: Mutex::new(Instant::now()),
                last_meter_renew: Mutex::new(Instant::now()),
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

    fn send_query(&self, address: &str) {
        self.send_raw(&osc::encode_query(address));
    }

    fn renew_meter_subscription(&self) {
        self.send_query("/meters");
        *self.inner.last_meter_renew.lock() = Instant::now();
    }
}

fn channel_path(ch: u16, suffix: &str) -> String {
    format!("/ch/{:02}{}", ch, suffix)
}

fn bus_path(bus: u16, suffix: &str) -> String {
    format!("/bus/{:02}{}", bus, suffix)
}

/// Map a writable channel parameter to its X32 OSC path.
fn param_path(ch: u16, param: ChannelParam) -> Option<String> {
    let suffix = match param {
        ChannelParam::Fader => "/mix/fader".into(),
        ChannelParam::Pan => "/mix/pan".into(),
        ChannelParam::Mute => "/mix/on".into(),
        ChannelParam::Name => "/config/name".into(),
        ChannelParam::Gain => "/preamp/trim".into(),
        ChannelParam::HighPassFreq => "/preamp/hpf".into(),
        ChannelParam::HighPassOn => "/preamp/hpon".into(),
        ChannelParam::EqOn => "/eq/on".into(),
        ChannelParam::EqFreq(b) if (1..=4).contains(&b) => format!("/eq/{}/f", b),
        ChannelParam::EqGain(b) if (1..=4).contains(&b) => format!("/eq/{}/g", b),
        ChannelParam::EqQ(b) if (1..=4).contains(&b) => format!("/eq/{}/q", b),
        ChannelParam::CompThreshold => "/dyn/thr".into(),
        ChannelParam::CompRatio => "/dyn/ratio".into(),
        ChannelParam::CompAttack => "/dyn/attack".into(),
        ChannelParam::CompRelease => "/dyn/release".into(),
        ChannelParam::CompMakeup => "/dyn/mgain".into(),
        ChannelParam::CompOn => "/dyn/on".into(),
        ChannelParam::GateThreshold => "/gate/thr".into(),
        ChannelParam::GateRange => "/gate/range".into(),
        ChannelParam::GateOn => "/gate/on".into(),
        _ => return None,
    };
    Some(channel_path(ch, &suffix))
}

/// Map a decoded X32 message back to a parameter update.
fn update_from_message(address: &str, arg: &osc::OscArg) -> Option<ParameterUpdate> {
    let (target, index, path) = if let Some(rest) = address.strip_prefix("/ch/") {
        let index: u16 = rest.get(..2)?.parse().ok()?;
        (mix_core::UpdateTarget::Channel, index, rest.get(2..)?)
    } else if let Some(rest) = address.strip_prefix("/bus/") {
        let index: u16 = rest.get(..2)?.parse().ok()?;
        (mix_core::UpdateTarget::Bus, index, rest.get(2..)?)
    } else {
        return None;
    };

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

    // Send levels: /ch/NN/mix/MM/level
    if target == mix_core::UpdateTarget::Channel {
        if let Some(rest) = path.strip_prefix("/mix/") {
            if let Some(bus_str) = rest.strip_suffix("/level") {
                let aux: u16 = bus_str.parse().ok()?;
                let mut update =
                    ParameterUpdate::channel(index, ChannelParam::SendLevel, float(arg)?);
                update.aux_index = aux;
                return Some(update);
            }
        }
    }

    let (param, value) = match path {
        "/mix/fader" => (ChannelParam::Fader, float(arg)?),
        // mix/on is inverted: ON means unmuted
        "/mix/on" => {
            let on = match boolean(arg)? {
                ParamValue::Bool(b) => b,
                _ => return None,
            };
            (ChannelParam::Mute, ParamValue::Bool(!on))
        }
        "/mix/pan" => (ChannelParam::Pan, float(arg)?),
        "/config/name" => match arg {
            osc::OscArg::Str(s) => (ChannelParam::Name, ParamValue::Str(s.clone())),
            _ => return None,
        },
        "/preamp/trim" => (ChannelParam::Gain, float(arg)?),
        "/preamp/hpf" => (ChannelParam::HighPassFreq, float(arg)?),
        "/preamp/hpon" => (ChannelParam::HighPassOn, boolean(arg)?),
        "/eq/on" => (ChannelParam::EqOn, boolean(arg)?),
        "/eq/1/f" => (ChannelParam::EqFreq(1), float(arg)?),
        "/eq/1/g" => (ChannelParam::EqGain(1), float(arg)?),
        "/eq/1/q" => (ChannelParam::EqQ(1), float(arg)?),
        "/eq/2/f" => (ChannelParam::EqFreq(2), float(arg)?),
        "/eq/2/g" => (ChannelParam::EqGain(2), float(arg)?),
        "/eq/2/q" => (ChannelParam::EqQ(2), float(arg)?),
        "/eq/3/f" => (ChannelParam::EqFreq(3), float(arg)?),
        "/eq/3/g" => (ChannelParam::EqGain(3), float(arg)?),
        "/eq/3/q" => (ChannelParam::EqQ(3), float(arg)?),
        "/eq/4/f" => (ChannelParam::EqFreq(4), float(arg)?),
        "/eq/4/g" => (ChannelParam::EqGain(4), float(arg)?),
        "/eq/4/q" => (ChannelParam::EqQ(4), float(arg)?),
        "/dyn/thr" => (ChannelParam::CompThreshold, float(arg)?),
        "/dyn/ratio" => (ChannelParam::CompRatio, float(arg)?),
        "/dyn/attack" => (ChannelParam::CompAttack, float(arg)?),
        "/dyn/release" => (ChannelParam::CompRelease, float(arg)?),
        "/dyn/on" => (ChannelParam::CompOn, boolean(arg)?),
        "/gate/thr" => (ChannelParam::GateThreshold, float(arg)?),
        "/gate/range" => (ChannelParam::GateRange, float(arg)?),
        "/gate/on" => (ChannelParam::GateOn, boolean(arg)?),
        _ => return None,
    };

    Some(ParameterUpdate { target, index, aux_index: 0, param, value })
}

fn handle_datagram(inner: &Inner, data: &[u8]) {
    // Meter blobs arrive as a single /meters message
    if data.starts_with(b"/meters") {
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
    let Some(update) = update_from_message(&pkt.address, arg) else {
        return;
    };
    if let Some(sink) = inner.sink.read().as_ref() {
        sink.on_parameter_update(&update);
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
                log::warn!("X32: receive error: {}", e);
                inner.connected.store(false, Ordering::Relaxed);
                if let Some(sink) = inner.sink.read().as_ref() {
                    sink.on_connection_change(false);
                }
                break;
            }
        }
    }
}

impl ConsoleAdapter for X32Adapter {
    fn connect(&self, ip: &str, port: u16) -> bool {
        let port = if port > 0 { port } else { DEFAULT_PORT };

        let (socket, recv_socket) = match crate::adapter::open_udp(ip, port, RECV_TIMEOUT) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("X32: failed to connect to {}:{}: {}", ip, port, e);
                return false;
            }
        };

        *self.inner.socket.lock() = Some(socket);
        self.inner.connected.store(true, Ordering::Relaxed);
        self.inner.running.store(true, Ordering::Relaxed);
        *self.inner.last_keepalive.lock() = Instant::now();

        let inner = Arc::clone(&self.inner);
        *self.recv_thread.lock() = Some(std::thread::spawn(move || receive_loop(inner, recv_socket)));

        // Verify connection with an /xinfo query
        self.send_query("/xinfo");
        log::info!("X32: connected to {}:{}", ip, port);

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
            model: "X32".into(),
            firmware: String::new(),
            channel_count: CHANNELS,
            bus_count: BUSES,
            matrix_count: 6,
            dca_count: 8,
            fx_slots: 8,
            eq_bands: 4,
            has_motorized_faders: true,
            has_dynamic_eq: false,
            has_multiband_comp: false,
            meter_update_rate_ms: 50,
        }
    }

    fn request_full_sync(&self) {
        // Establish the subscription first, then query each parameter
        self.send_query("/xremote");

        for ch in 1..=CHANNELS {
            self.send_query(&channel_path(ch, "/config/name"));
            self.send_query(&channel_path(ch, "/mix/fader"));
            self.send_query(&channel_path(ch, "/mix/on"));
            self.send_query(&channel_path(ch, "/mix/pan"));
            self.send_query(&channel_path(ch, "/preamp/trim"));
            self.send_query(&channel_path(ch, "/preamp/hpon"));
            self.send_query(&channel_path(ch, "/preamp/hpf"));

            for band in 1..=4 {
                self.send_query(&channel_path(ch, &format!("/eq/{}/f", band)));
                self.send_query(&channel_path(ch, &format!("/eq/{}/g", band)));
                self.send_query(&channel_path(ch, &format!("/eq/{}/q", band)));
            }

            self.send_query(&channel_path(ch, "/dyn/thr"));
            self.send_query(&channel_path(ch, "/dyn/ratio"));
            self.send_query(&channel_path(ch, "/dyn/attack"));
            self.send_query(&channel_path(ch, "/dyn/release"));
            self.send_query(&channel_path(ch, "/dyn/on"));

            self.send_query(&channel_path(ch, "/gate/thr"));
            self.send_query(&channel_path(ch, "/gate/range"));
            self.send_query(&channel_path(ch, "/gate/on"));
        }

        for bus in 1..=BUSES {
            self.send_query(&bus_path(bus, "/config/name"));
            self.send_query(&bus_path(bus, "/mix/fader"));
            self.send_query(&bus_path(bus, "/mix/on"));
        }
    }

    fn set_channel_param(&self, ch: u16, param: ChannelParam, value: ParamValue) {
        let Some(path) = param_path(ch, param) else {
            log::warn!("X32: unhandled param {:?} for ch{}", param, ch);
            return;
        };
        let msg = match (param, &value) {
            // mix/on is inverted: ON means unmuted
            (ChannelParam::Mute, ParamValue::Bool(muted)) => {
                osc::encode_int(&path, if *muted { 0 } else { 1 })
            }
            (_, ParamValue::Bool(b)) => osc::encode_int(&path, *b as i32),
            (_, ParamValue::Float(f)) => osc::encode_float(&path, *f),
            (_, ParamValue::Int(i)) => osc::encode_int(&path, *i),
            (_, ParamValue::Str(s)) => osc::encode_str(&path, s),
        };
        self.send_raw(&msg);
    }

    fn set_send_level(&self, ch: u16, bus: u16, level: f32) {
        let path = format!("/ch/{:02}/mix/{:02}/level", ch, bus);
        self.send_raw(&osc::encode_float(&path, level));
    }

    fn set_bus_param(&self, bus: u16, param: BusParam, value: f32) {
        match param {
            BusParam::Fader => self.send_raw(&osc::encode_float(&bus_path(bus, "/mix/fader"), value)),
            BusParam::Pan => self.send_raw(&osc::encode_float(&bus_path(bus, "/mix/pan"), value)),
            _ => {}
        }
    }

    fn subscribe_meter(&self, _refresh_ms: u32) {
        self.inner.metering.store(true, Ordering::Relaxed);
        self.renew_meter_subscription();
    }

    fn unsubscribe_meter(&self) {
        self.inner.metering.store(false, Ordering::Relaxed);
    }

    fn tick(&self) {
        if !self.is_connected() {
            return;
        }

        let now = Instant::now();
        {
            let mut last = self.inner.last_keepalive.lock();
            if now.duration_since(*last).as_millis() > KEEPALIVE_MS {
                self.send_query("/xremote");
                *last = now;
            }
        }

        if self.inner.metering.load(Ordering::Relaxed) {
            let renew_due = {
                let last = self.inner.last_meter_renew.lock();
                now.duration_since(*last).as_millis() > METER_RENEW_MS
            };
            if renew_due {
                self.renew_meter_subscription();
            }
        }
    }

    fn set_event_sink(&self, sink: Arc<dyn ConsoleEvents>) {
        *self.inner.sink.write() = Some(sink);
    }
}

impl Drop for X32Adapter {
    fn drop(&mut self) {
        self.disconnect();
    }
}
