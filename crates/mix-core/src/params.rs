//! Parameter taxonomy shared by all console adapters.
//!
//! Every readable/writable console parameter maps to a `ChannelParam` or
//! `BusParam` discriminant; incoming changes travel as `ParameterUpdate`
//! values from the adapter receive threads into the console model.

use serde::{Deserialize, Serialize};

/// All channel parameters the system can read or write.
///
/// EQ variants carry a 1-based band number so protocol mappings stay a
/// closed arithmetic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelParam {
    /// Normalised fader position, 0.0-1.0
    Fader,
    Mute,
    /// -1.0 (L) to +1.0 (R)
    Pan,
    Name,
    /// Input gain/trim in dB
    Gain,
    /// 48V
    PhantomPower,
    PhaseInvert,
    EqOn,
    EqFreq(u8),
    EqGain(u8),
    EqQ(u8),
    EqType(u8),
    /// HPF corner frequency in Hz
    HighPassFreq,
    HighPassOn,
    CompThreshold,
    CompRatio,
    CompAttack,
    CompRelease,
    CompMakeup,
    CompOn,
    GateThreshold,
    GateRange,
    GateAttack,
    GateHold,
    GateRelease,
    GateOn,
    /// Requires the update's aux index
    SendLevel,
    SendPan,
    SendOn,
    DcaAssign,
}

/// Bus/aux parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusParam {
    Fader,
    Mute,
    Pan,
    Name,
    EqOn,
    EqFreq(u8),
    EqGain(u8),
    EqQ(u8),
    CompThreshold,
    CompRatio,
    CompAttack,
    CompRelease,
    CompOn,
}

/// A typed parameter value as carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Bool(bool),
    Int(i32),
    Str(String),
}

impl ParamValue {
    /// Float payload, or 0.0 when the value has a different type.
    pub fn float(&self) -> f32 {
        match self {
            ParamValue::Float(f) => *f,
            ParamValue::Int(i) => *i as f32,
            _ => 0.0,
        }
    }

    /// Bool payload; ints are treated as truthy non-zero.
    pub fn boolean(&self) -> bool {
        match self {
            ParamValue::Bool(b) => *b,
            ParamValue::Int(i) => *i != 0,
            _ => false,
        }
    }

    /// String payload, or "" when the value has a different type.
    pub fn text(&self) -> &str {
        match self {
            ParamValue::Str(s) => s,
            _ => "",
        }
    }
}

/// What a parameter update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTarget {
    Channel,
    Bus,
    Main,
    Dca,
}

/// One decoded parameter change from the console.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUpdate {
    pub target: UpdateTarget,
    /// 1-based channel/bus number
    pub index: u16,
    /// For sends: which aux/bus (1-based)
    pub aux_index: u16,
    pub param: ChannelParam,
    pub value: ParamValue,
}

impl ParameterUpdate {
    pub fn channel(index: u16, param: ChannelParam, value: ParamValue) -> Self {
        Self { target: UpdateTarget::Channel, index, aux_index: 0, param, value }
    }

    pub fn bus(index: u16, param: ChannelParam, value: ParamValue) -> Self {
        Self { target: UpdateTarget::Bus, index, aux_index: 0, param, value }
    }
}

/// Console capability descriptor, negotiated at connect time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleCapabilities {
    /// "X32", "Wing", "Avantis"
    pub model: String,
    pub firmware: String,
    pub channel_count: u16,
    pub bus_count: u16,
    pub matrix_count: u16,
    pub dca_count: u16,
    pub fx_slots: u16,
    /// Parametric EQ bands per channel
    pub eq_bands: u8,
    pub has_motorized_faders: bool,
    pub has_dynamic_eq: bool,
    pub has_multiband_comp: bool,
    /// How often meters refresh, in milliseconds
    pub meter_update_rate_ms: u32,
}
