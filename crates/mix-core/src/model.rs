//! Console model - the single source of truth for current console state.
//!
//! Updated by the adapter receive threads, queried by the DSP/LLM/UI
//! threads. Readers get cloned snapshots; writers are serialised behind an
//! exclusive lock. Out-of-range indices are silent no-ops so a misbehaving
//! console can never crash the agent.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::params::{ChannelParam, ParamValue, ParameterUpdate, UpdateTarget};
use crate::DB_FLOOR;

/// One parametric EQ band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EqBand {
    pub freq: f32,
    pub gain: f32,
    pub q: f32,
    /// 0=bell, 1=shelf, 2=hpf, 3=lpf
    pub band_type: i32,
}

impl Default for EqBand {
    fn default() -> Self {
        Self { freq: 1000.0, gain: 0.0, q: 1.0, band_type: 0 }
    }
}

/// Channel compressor state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompressorState {
    pub threshold: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
    pub makeup: f32,
    pub on: bool,
}

impl Default for CompressorState {
    fn default() -> Self {
        Self { threshold: 0.0, ratio: 1.0, attack: 10.0, release: 100.0, makeup: 0.0, on: false }
    }
}

/// Channel gate state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateState {
    pub threshold: f32,
    pub range: f32,
    pub attack: f32,
    pub hold: f32,
    pub release: f32,
    pub on: bool,
}

impl Default for GateState {
    fn default() -> Self {
        Self { threshold: -80.0, range: -80.0, attack: 0.5, hold: 50.0, release: 200.0, on: false }
    }
}

/// Spectral summary for one channel. Only ever written from FFT results,
/// never derived back from console meters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpectralData {
    pub bass: f32,
    pub mid: f32,
    pub presence: f32,
    pub crest_factor: f32,
    pub centroid: f32,
}

impl Default for SpectralData {
    fn default() -> Self {
        Self { bass: DB_FLOOR, mid: DB_FLOOR, presence: DB_FLOOR, crest_factor: 0.0, centroid: 0.0 }
    }
}

/// Snapshot of a single channel's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// 1-based channel number
    pub index: u16,
    pub name: String,
    /// 0.0-1.0 normalised
    pub fader: f32,
    pub muted: bool,
    /// -1.0 (L) to +1.0 (R)
    pub pan: f32,
    pub gain_db: f32,
    pub phantom: bool,
    pub phase: bool,

    pub eq_on: bool,
    pub eq: [EqBand; 6],
    pub hpf_freq: f32,
    pub hpf_on: bool,

    pub comp: CompressorState,
    pub gate: GateState,

    /// Updated by the meter subscription
    pub rms_db: f32,
    pub peak_db: f32,

    /// Updated by the DSP thread from FFT results
    pub spectral: SpectralData,

    /// Send level per bus, 0.0-1.0
    pub sends: Vec<f32>,
}

impl Default for ChannelSnapshot {
    fn default() -> Self {
        Self {
            index: 0,
            name: String::new(),
            fader: 0.75,
            muted: false,
            pan: 0.0,
            gain_db: 0.0,
            phantom: false,
            phase: false,
            eq_on: true,
            eq: [EqBand::default(); 6],
            hpf_freq: 0.0,
            hpf_on: false,
            comp: CompressorState::default(),
            gate: GateState::default(),
            rms_db: DB_FLOOR,
            peak_db: DB_FLOOR,
            spectral: SpectralData::default(),
            sends: Vec::new(),
        }
    }
}

/// Snapshot of an aux/group bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSnapshot {
    pub index: u16,
    pub name: String,
    pub fader: f32,
    pub muted: bool,
    pub pan: f32,
}

impl Default for BusSnapshot {
    fn default() -> Self {
        Self { index: 0, name: String::new(), fader: 0.75, muted: false, pan: 0.0 }
    }
}

#[derive(Default)]
struct ModelState {
    channels: Vec<ChannelSnapshot>,
    buses: Vec<BusSnapshot>,
}

/// Thread-safe store of all channel and bus snapshots.
#[derive(Default)]
pub struct ConsoleModel {
    state: RwLock<ModelState>,
}

impl ConsoleModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the model from the adapter's negotiated capabilities.
    pub fn init(&self, channel_count: u16, bus_count: u16) {
        let mut state = self.state.write();
        state.channels = (1..=channel_count)
            .map(|i| ChannelSnapshot {
                index: i,
                sends: vec![0.0; bus_count as usize],
                ..ChannelSnapshot::default()
            })
            .collect();
        state.buses = (1..=bus_count)
            .map(|i| BusSnapshot { index: i, ..BusSnapshot::default() })
            .collect();
    }

    /// Cloned snapshot of one channel; `None` when out of range.
    pub fn channel(&self, ch: u16) -> Option<ChannelSnapshot> {
        let state = self.state.read();
        if ch < 1 {
            return None;
        }
        state.channels.get(ch as usize - 1).cloned()
    }

    /// Cloned snapshot of one bus; `None` when out of range.
    pub fn bus(&self, b: u16) -> Option<BusSnapshot> {
        let state = self.state.read();
        if b < 1 {
            return None;
        }
        state.buses.get(b as usize - 1).cloned()
    }

    pub fn channel_count(&self) -> u16 {
        self.state.read().channels.len() as u16
    }

    pub fn bus_count(&self) -> u16 {
        self.state.read().buses.len() as u16
    }

    /// Snapshot all channels (for context building).
    pub fn all_channels(&self) -> Vec<ChannelSnapshot> {
        self.state.read().channels.clone()
    }

    /// Apply an incoming parameter update from the console adapter.
    pub fn apply_update(&self, u: &ParameterUpdate) {
        let mut state = self.state.write();
        match u.target {
            UpdateTarget::Channel => {
                if u.index < 1 || u.index as usize > state.channels.len() {
                    return;
                }
                let ch = &mut state.channels[u.index as usize - 1];
                apply_channel_param(ch, u);
            }
            UpdateTarget::Bus => {
                if u.index < 1 || u.index as usize > state.buses.len() {
                    return;
                }
                let bus = &mut state.buses[u.index as usize - 1];
                apply_bus_param(bus, u);
            }
            // Main/DCA state is not modelled yet
            UpdateTarget::Main | UpdateTarget::Dca => {}
        }
    }

    /// Update meter values from the metering callback.
    pub fn update_meter(&self, ch: u16, rms_db: f32, peak_db: f32) {
        let mut state = self.state.write();
        if ch < 1 || ch as usize > state.channels.len() {
            return;
        }
        let snap = &mut state.channels[ch as usize - 1];
        snap.rms_db = rms_db;
        snap.peak_db = peak_db;
    }

    /// Update spectral data from the DSP analysis thread.
    pub fn update_spectral(&self, ch: u16, data: SpectralData) {
        let mut state = self.state.write();
        if ch < 1 || ch as usize > state.channels.len() {
            return;
        }
        state.channels[ch as usize - 1].spectral = data;
    }
}

fn apply_channel_param(ch: &mut ChannelSnapshot, u: &ParameterUpdate) {
    match u.param {
        ChannelParam::Fader => ch.fader = u.value.float(),
        ChannelParam::Mute => ch.muted = u.value.boolean(),
        ChannelParam::Pan => ch.pan = u.value.float(),
        ChannelParam::Name => ch.name = u.value.text().to_string(),
        ChannelParam::Gain => ch.gain_db = u.value.float(),
        ChannelParam::PhantomPower => ch.phantom = u.value.boolean(),
        ChannelParam::PhaseInvert => ch.phase = u.value.boolean(),
        ChannelParam::EqOn => ch.eq_on = u.value.boolean(),
        ChannelParam::HighPassFreq => ch.hpf_freq = u.value.float(),
        ChannelParam::HighPassOn => ch.hpf_on = u.value.boolean(),
        ChannelParam::EqFreq(b) => {
            if let Some(band) = band_mut(ch, b) {
                band.freq = u.value.float();
            }
        }
        ChannelParam::EqGain(b) => {
            if let Some(band) = band_mut(ch, b) {
                band.gain = u.value.float();
            }
        }
        ChannelParam::EqQ(b) => {
            if let Some(band) = band_mut(ch, b) {
                band.q = u.value.float();
            }
        }
        ChannelParam::EqType(b) => {
            if let Some(band) = band_mut(ch, b) {
                band.band_type = u.value.float() as i32;
            }
        }
        ChannelParam::CompThreshold => ch.comp.threshold = u.value.float(),
        ChannelParam::CompRatio => ch.comp.ratio = u.value.float(),
        ChannelParam::CompAttack => ch.comp.attack = u.value.float(),
        ChannelParam::CompRelease => ch.comp.release = u.value.float(),
        ChannelParam::CompMakeup => ch.comp.makeup = u.value.float(),
        ChannelParam::CompOn => ch.comp.on = u.value.boolean(),
        ChannelParam::GateThreshold => ch.gate.threshold = u.value.float(),
        ChannelParam::GateRange => ch.gate.range = u.value.float(),
        ChannelParam::GateAttack => ch.gate.attack = u.value.float(),
        ChannelParam::GateHold => ch.gate.hold = u.value.float(),
        ChannelParam::GateRelease => ch.gate.release = u.value.float(),
        ChannelParam::GateOn => ch.gate.on = u.value.boolean(),
        ChannelParam::SendLevel => {
            let aux = u.aux_index;
            if aux >= 1 && aux as usize <= ch.sends.len() {
                ch.sends[aux as usize - 1] = u.value.float();
            }
        }
        ChannelParam::SendPan | ChannelParam::SendOn | ChannelParam::DcaAssign => {}
    }
}

fn apply_bus_param(bus: &mut BusSnapshot, u: &ParameterUpdate) {
    // Bus updates reuse the ChannelParam discriminant for the shared subset
    match u.param {
        ChannelParam::Fader => bus.fader = u.value.float(),
        ChannelParam::Mute => bus.muted = u.value.boolean(),
        ChannelParam::Pan => bus.pan = u.value.float(),
        ChannelParam::Name => bus.name = u.value.text().to_string(),
        _ => {}
    }
}

fn band_mut(ch: &mut ChannelSnapshot, band: u8) -> Option<&mut EqBand> {
    if band >= 1 && band as usize <= ch.eq.len() {
        Some(&mut ch.eq[band as usize - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ConsoleModel {
        let m = ConsoleModel::new();
        m.init(32, 16);
        m
    }

    #[test]
    fn test_init_indices_and_sends() {
        let m = model();
        assert_eq!(m.channel_count(), 32);
        assert_eq!(m.bus_count(), 16);

        let ch = m.channel(1).unwrap();
        assert_eq!(ch.index, 1);
        assert_eq!(ch.sends.len(), 16);
        assert_eq!(ch.fader, 0.75);

        let bus = m.bus(16).unwrap();
        assert_eq!(bus.index, 16);
    }

    #[test]
    fn test_fader_write_read_back() {
        let m = model();
        m.apply_update(&ParameterUpdate::channel(5, ChannelParam::Fader, ParamValue::Float(0.42)));
        assert_eq!(m.channel(5).unwrap().fader, 0.42);
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let m = model();
        m.apply_update(&ParameterUpdate::channel(0, ChannelParam::Fader, ParamValue::Float(0.1)));
        m.apply_update(&ParameterUpdate::channel(33, ChannelParam::Fader, ParamValue::Float(0.1)));
        m.update_meter(0, -10.0, -5.0);
        m.update_meter(99, -10.0, -5.0);
        m.update_spectral(99, SpectralData::default());

        assert!(m.channel(0).is_none());
        assert!(m.channel(33).is_none());
        // No channel was touched
        for ch in m.all_channels() {
            assert_eq!(ch.fader, 0.75);
            assert_eq!(ch.rms_db, DB_FLOOR);
        }
    }

    #[test]
    fn test_eq_band_updates() {
        let m = model();
        m.apply_update(&ParameterUpdate::channel(2, ChannelParam::EqFreq(3), ParamValue::Float(2500.0)));
        m.apply_update(&ParameterUpdate::channel(2, ChannelParam::EqGain(3), ParamValue::Float(-4.0)));
        m.apply_update(&ParameterUpdate::channel(2, ChannelParam::EqQ(3), ParamValue::Float(2.0)));
        // Band 0 and band 7 are out of range
        m.apply_update(&ParameterUpdate::channel(2, ChannelParam::EqGain(0), ParamValue::Float(9.0)));
        m.apply_update(&ParameterUpdate::channel(2, ChannelParam::EqGain(7), ParamValue::Float(9.0)));

        let ch = m.channel(2).unwrap();
        assert_eq!(ch.eq[2].freq, 2500.0);
        assert_eq!(ch.eq[2].gain, -4.0);
        assert_eq!(ch.eq[2].q, 2.0);
        assert_eq!(ch.eq[0].gain, 0.0);
    }

    #[test]
    fn test_send_level_update() {
        let m = model();
        let mut u = ParameterUpdate::channel(4, ChannelParam::SendLevel, ParamValue::Float(0.6));
        u.aux_index = 3;
        m.apply_update(&u);
        assert_eq!(m.channel(4).unwrap().sends[2], 0.6);

        // Out-of-range aux ignored
        let mut bad = ParameterUpdate::channel(4, ChannelParam::SendLevel, ParamValue::Float(0.9));
        bad.aux_index = 17;
        m.apply_update(&bad);
        assert_eq!(m.channel(4).unwrap().sends[2], 0.6);
    }

    #[test]
    fn test_meter_and_spectral_updates() {
        let m = model();
        m.update_meter(7, -18.5, -6.0);
        let spectral = SpectralData { bass: -12.0, mid: -20.0, presence: -30.0, crest_factor: 9.0, centroid: 800.0 };
        m.update_spectral(7, spectral);

        let ch = m.channel(7).unwrap();
        assert_eq!(ch.rms_db, -18.5);
        assert_eq!(ch.peak_db, -6.0);
        assert_eq!(ch.spectral.bass, -12.0);
        assert_eq!(ch.spectral.centroid, 800.0);
    }

    #[test]
    fn test_bus_updates() {
        let m = model();
        m.apply_update(&ParameterUpdate::bus(3, ChannelParam::Fader, ParamValue::Float(0.5)));
        m.apply_update(&ParameterUpdate::bus(3, ChannelParam::Name, ParamValue::Str("Monitors".into())));
        let bus = m.bus(3).unwrap();
        assert_eq!(bus.fader, 0.5);
        assert_eq!(bus.name, "Monitors");
    }
}
