//! Typed action schema. Every LLM decision maps to one of these.
//!
//! Parsing is deliberately forgiving: unknown action strings become
//! `NoAction`, missing fields default, and nothing here can panic on
//! malformed model output.

use serde_json::{json, Value};

/// Action kinds the agent can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SetFader,
    SetPan,
    SetEqBand,
    SetCompressor,
    SetGate,
    SetHighPass,
    SetSendLevel,
    MuteChannel,
    UnmuteChannel,
    /// LLM decided no change is needed
    NoAction,
    /// LLM notes something but takes no action
    Observation,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SetFader => "set_fader",
            ActionKind::SetPan => "set_pan",
            ActionKind::SetEqBand => "set_eq",
            ActionKind::SetCompressor => "set_comp",
            ActionKind::SetGate => "set_gate",
            ActionKind::SetHighPass => "set_hpf",
            ActionKind::SetSendLevel => "set_send",
            ActionKind::MuteChannel => "mute",
            ActionKind::UnmuteChannel => "unmute",
            ActionKind::NoAction => "no_action",
            ActionKind::Observation => "observation",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "set_fader" => ActionKind::SetFader,
            "set_pan" => ActionKind::SetPan,
            "set_eq" => ActionKind::SetEqBand,
            "set_comp" => ActionKind::SetCompressor,
            "set_gate" => ActionKind::SetGate,
            "set_hpf" => ActionKind::SetHighPass,
            "set_send" => ActionKind::SetSendLevel,
            "mute" => ActionKind::MuteChannel,
            "unmute" => ActionKind::UnmuteChannel,
            "observation" => ActionKind::Observation,
            _ => ActionKind::NoAction,
        }
    }
}

/// How quickly a proposed action should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Low,
    Normal,
    /// audible issue, apply within a tick
    Fast,
    /// feedback, clipping - apply NOW
    Immediate,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Immediate => "immediate",
            Urgency::Fast => "fast",
            Urgency::Normal => "normal",
            Urgency::Low => "low",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "immediate" => Urgency::Immediate,
            "fast" => Urgency::Fast,
            "low" => Urgency::Low,
            _ => Urgency::Normal,
        }
    }
}

/// One proposed mix change.
#[derive(Debug, Clone, PartialEq)]
pub struct MixAction {
    pub kind: ActionKind,
    /// 1-based
    pub channel: u16,
    /// for sends
    pub aux_index: u16,

    /// Semantics depend on kind: fader position, frequency, threshold, ...
    pub value: f32,
    /// secondary (EQ gain, comp ratio)
    pub value2: f32,
    /// tertiary (EQ Q)
    pub value3: f32,
    /// EQ band number, 1-based
    pub band_index: u8,

    pub urgency: Urgency,
    /// 0 = use the validator's global default
    pub max_delta: f32,

    pub reason: String,
    /// "LeadVocal", "Kick", ...
    pub role_name: String,
}

impl Default for MixAction {
    fn default() -> Self {
        Self {
            kind: ActionKind::NoAction,
            channel: 0,
            aux_index: 0,
            value: 0.0,
            value2: 0.0,
            value3: 1.0,
            band_index: 1,
            urgency: Urgency::Normal,
            max_delta: 0.0,
            reason: String::new(),
            role_name: String::new(),
        }
    }
}

impl MixAction {
    /// Human-readable line for the approval UI.
    pub fn describe(&self) -> String {
        match self.kind {
            ActionKind::SetFader => format!(
                "Set ch{} ({}) fader to {}%",
                self.channel,
                self.role_name,
                (self.value * 100.0) as i32
            ),
            ActionKind::SetPan => {
                format!("Set ch{} pan to {}", self.channel, (self.value * 100.0) as i32)
            }
            ActionKind::SetEqBand => format!(
                "Set ch{} EQ band {}: {}Hz @ {:.1}dB Q={:.1}",
                self.channel, self.band_index, self.value as i32, self.value2, self.value3
            ),
            ActionKind::SetCompressor => format!(
                "Set ch{} comp threshold={}dB ratio={:.1}:1",
                self.channel, self.value as i32, self.value2
            ),
            ActionKind::SetGate => {
                format!("Set ch{} gate threshold={}dB", self.channel, self.value as i32)
            }
            ActionKind::SetHighPass => {
                format!("Set ch{} HPF to {}Hz", self.channel, self.value as i32)
            }
            ActionKind::SetSendLevel => format!(
                "Set ch{} send to bus {} level={}%",
                self.channel,
                self.aux_index,
                (self.value * 100.0) as i32
            ),
            ActionKind::MuteChannel => format!("Mute ch{} ({})", self.channel, self.role_name),
            ActionKind::UnmuteChannel => format!("Unmute ch{} ({})", self.channel, self.role_name),
            ActionKind::NoAction => format!("No action needed: {}", self.reason),
            ActionKind::Observation => format!("Note: {}", self.reason),
        }
    }

    /// Serialize for logging and session memory.
    pub fn to_json(&self) -> Value {
        json!({
            "action": self.kind.as_str(),
            "channel": self.channel,
            "aux": self.aux_index,
            "value": self.value,
            "value2": self.value2,
            "value3": self.value3,
            "band": self.band_index,
            "urgency": self.urgency.as_str(),
            "reason": self.reason,
            "role": self.role_name,
            "description": self.describe(),
        })
    }

    /// Parse a single action object from an LLM response. Never fails:
    /// anything unrecognised degrades to defaults.
    pub fn from_json(j: &Value) -> Self {
        let kind = ActionKind::from_str(j.get("action").and_then(Value::as_str).unwrap_or("no_action"));

        let get_f32 = |key: &str, default: f32| -> f32 {
            j.get(key).and_then(Value::as_f64).map(|v| v as f32).unwrap_or(default)
        };
        let get_u16 = |key: &str| -> u16 {
            j.get(key).and_then(Value::as_i64).and_then(|v| u16::try_from(v).ok()).unwrap_or(0)
        };

        Self {
            kind,
            channel: get_u16("channel"),
            aux_index: get_u16("aux"),
            value: get_f32("value", 0.0),
            value2: get_f32("value2", 0.0),
            value3: get_f32("value3", 1.0),
            band_index: j
                .get("band")
                .and_then(Value::as_i64)
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(1),
            urgency: Urgency::from_str(j.get("urgency").and_then(Value::as_str).unwrap_or("normal")),
            max_delta: get_f32("max_delta", 0.0),
            reason: j.get("reason").and_then(Value::as_str).unwrap_or("").to_string(),
            role_name: j.get("role").and_then(Value::as_str).unwrap_or("").to_string(),
        }
    }
}
