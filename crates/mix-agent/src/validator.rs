//! Action validation and safety clamping.
//!
//! This is the safety layer - no action reaches the console without
//! passing through here. Values outside the limits are clamped (with a
//! human-readable warning); only an invalid channel makes an action
//! outright invalid.

use mix_core::ConsoleModel;
use mix_llm::{ActionKind, MixAction};

/// Hard limits on what a single action may change.
#[derive(Debug, Clone)]
pub struct SafetyLimits {
    /// ~6dB max fader move per step, normalised
    pub max_fader_delta: f32,
    pub max_eq_boost_db: f32,
    pub max_eq_cut_db: f32,
    pub max_comp_threshold_db: f32,
    pub min_comp_ratio: f32,
    pub max_comp_ratio: f32,
    pub max_hpf_hz: f32,
    pub min_hpf_hz: f32,
    pub max_send_delta: f32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_fader_delta: 0.15,
            max_eq_boost_db: 3.0,
            max_eq_cut_db: -12.0,
            max_comp_threshold_db: -50.0,
            min_comp_ratio: 1.0,
            max_comp_ratio: 20.0,
            max_hpf_hz: 400.0,
            min_hpf_hz: 20.0,
            max_send_delta: 0.2,
        }
    }
}

/// Outcome of validating one action.
#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    /// the action after safety clamping
    pub clamped: MixAction,
    /// non-empty whenever something was clamped
    pub warning: String,
}

#[derive(Debug, Default)]
pub struct ActionValidator {
    limits: SafetyLimits,
}

impl ActionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SafetyLimits) -> Self {
        Self { limits }
    }

    pub fn validate(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        match action.kind {
            ActionKind::SetFader => self.validate_fader(action, model),
            ActionKind::SetEqBand => self.validate_eq(action, model),
            ActionKind::SetCompressor => self.validate_comp(action, model),
            ActionKind::SetHighPass => self.validate_hpf(action, model),
            ActionKind::SetSendLevel => self.validate_send(action, model),
            ActionKind::SetPan => self.validate_pan(action, model),
            ActionKind::SetGate => self.check_channel(action, model),
            ActionKind::MuteChannel | ActionKind::UnmuteChannel => {
                log::info!(
                    "Validator: {} ch{}",
                    if action.kind == ActionKind::MuteChannel { "mute" } else { "unmute" },
                    action.channel
                );
                self.check_channel(action, model)
            }
            ActionKind::NoAction | ActionKind::Observation => {
                Validation { valid: true, clamped: action.clone(), warning: String::new() }
            }
        }
    }

    fn check_channel(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        if action.channel < 1 || action.channel > model.channel_count() {
            return Validation {
                valid: false,
                clamped: action.clone(),
                warning: format!("Invalid channel {}", action.channel),
            };
        }
        Validation { valid: true, clamped: action.clone(), warning: String::new() }
    }

    fn validate_fader(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        let mut result = self.check_channel(action, model);
        if !result.valid {
            return result;
        }

        let current = model.channel(action.channel).map(|c| c.fader).unwrap_or(0.75);
        let mut target = action.value.clamp(0.0, 1.0);

        let max_delta = if action.max_delta > 0.0 {
            action.max_delta.min(self.limits.max_fader_delta)
        } else {
            self.limits.max_fader_delta
        };

        let delta = target - current;
        if delta.abs() > max_delta {
            target = current + max_delta.copysign(delta);
            result.warning =
                format!("Fader clamped: requested {:.2} -> clamped to {:.2}", action.value, target);
            log::warn!("Validator: {}", result.warning);
        }

        result.clamped.value = target;
        result
    }

    fn validate_eq(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        let mut result = self.check_channel(action, model);
        if !result.valid {
            return result;
        }

        let mut gain = action.value2;
        if gain > self.limits.max_eq_boost_db {
            gain = self.limits.max_eq_boost_db;
            result.warning = format!("EQ boost clamped to {}dB", self.limits.max_eq_boost_db);
            log::warn!("Validator: {}", result.warning);
        }
        if gain < self.limits.max_eq_cut_db {
            gain = self.limits.max_eq_cut_db;
            result.warning = format!("EQ cut clamped to {}dB", self.limits.max_eq_cut_db);
        }

        result.clamped.value = action.value.clamp(20.0, 20_000.0);
        result.clamped.value2 = gain;
        result.clamped.value3 = action.value3.clamp(0.1, 20.0);
        result
    }

    fn validate_comp(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        let mut result = self.check_channel(action, model);
        if !result.valid {
            return result;
        }

        let threshold = action.value.clamp(self.limits.max_comp_threshold_db, 0.0);
        let ratio = action.value2.clamp(self.limits.min_comp_ratio, self.limits.max_comp_ratio);
        if threshold != action.value || ratio != action.value2 {
            result.warning = format!(
                "Compressor clamped: threshold {:.1}dB ratio {:.1}:1",
                threshold, ratio
            );
        }

        result.clamped.value = threshold;
        result.clamped.value2 = ratio;
        result
    }

    fn validate_hpf(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        let mut result = self.check_channel(action, model);
        if !result.valid {
            return result;
        }

        let freq = action.value.clamp(self.limits.min_hpf_hz, self.limits.max_hpf_hz);
        if freq != action.value {
            result.warning =
                format!("HPF clamped: {}Hz -> {}Hz", action.value as i32, freq as i32);
            log::warn!("Validator: {}", result.warning);
        }

        result.clamped.value = freq;
        result
    }

    fn validate_send(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        let mut result = self.check_channel(action, model);
        if !result.valid {
            return result;
        }
        let level = action.value.clamp(0.0, 1.0);
        if level != action.value {
            result.warning = format!("Send level clamped to {:.2}", level);
        }
        result.clamped.value = level;
        result
    }

    fn validate_pan(&self, action: &MixAction, model: &ConsoleModel) -> Validation {
        let mut result = self.check_channel(action, model);
        if !result.valid {
            return result;
        }
        let pan = action.value.clamp(-1.0, 1.0);
        if pan != action.value {
            result.warning = format!("Pan clamped to {:.2}", pan);
        }
        result.clamped.value = pan;
        result
    }
}
