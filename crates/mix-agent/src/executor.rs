//! Action execution against the console.
//!
//! Fader moves above a small delta are ramped in 10 equal 20 ms steps
//! (about 200 ms total) to avoid audible jumps; the final step writes the
//! exact target. The model supplies the ramp baseline - it is the single
//! source of truth for current values.

use std::sync::Arc;
use std::time::Duration;

use mix_console::ConsoleAdapter;
use mix_core::{ChannelParam, ConsoleModel, ParamValue};
use mix_llm::{ActionKind, MixAction};

/// Fader deltas at or below this are written directly.
const RAMP_THRESHOLD: f32 = 0.02;
const RAMP_STEPS: u32 = 10;
const RAMP_STEP_SLEEP: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    /// what was actually set after ramping
    pub actual_value: f32,
    pub error: String,
}

impl ExecutionResult {
    fn ok(actual_value: f32) -> Self {
        Self { success: true, actual_value, error: String::new() }
    }

    fn fail(error: String) -> Self {
        Self { success: false, actual_value: 0.0, error }
    }
}

pub struct ActionExecutor {
    adapter: Arc<dyn ConsoleAdapter>,
    model: Arc<ConsoleModel>,
}

impl ActionExecutor {
    pub fn new(adapter: Arc<dyn ConsoleAdapter>, model: Arc<ConsoleModel>) -> Self {
        Self { adapter, model }
    }

    pub fn execute(&self, action: &MixAction) -> ExecutionResult {
        match action.kind {
            ActionKind::SetFader => self.execute_fader(action),
            ActionKind::SetPan => {
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::Pan,
                    ParamValue::Float(action.value),
                );
                log::info!("Executed: ch{} pan -> {:.2}", action.channel, action.value);
                ExecutionResult::ok(action.value)
            }
            ActionKind::SetEqBand => self.execute_eq(action),
            ActionKind::SetCompressor => {
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::CompThreshold,
                    ParamValue::Float(action.value),
                );
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::CompRatio,
                    ParamValue::Float(action.value2),
                );
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::CompOn,
                    ParamValue::Bool(true),
                );
                log::info!(
                    "Executed: ch{} comp thresh={:.1}dB ratio={:.1}:1",
                    action.channel,
                    action.value,
                    action.value2
                );
                ExecutionResult::ok(action.value)
            }
            ActionKind::SetGate => {
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::GateThreshold,
                    ParamValue::Float(action.value),
                );
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::GateOn,
                    ParamValue::Bool(true),
                );
                log::info!("Executed: ch{} gate thresh={:.1}dB", action.channel, action.value);
                ExecutionResult::ok(action.value)
            }
            ActionKind::SetHighPass => {
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::HighPassFreq,
                    ParamValue::Float(action.value),
                );
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::HighPassOn,
                    ParamValue::Bool(true),
                );
                log::info!("Executed: ch{} HPF -> {}Hz", action.channel, action.value as i32);
                ExecutionResult::ok(action.value)
            }
            ActionKind::SetSendLevel => {
                self.adapter.set_send_level(action.channel, action.aux_index, action.value);
                log::info!(
                    "Executed: ch{} send to bus{} -> {:.2}",
                    action.channel,
                    action.aux_index,
                    action.value
                );
                ExecutionResult::ok(action.value)
            }
            ActionKind::MuteChannel => {
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::Mute,
                    ParamValue::Bool(true),
                );
                log::info!("Executed: mute ch{}", action.channel);
                ExecutionResult::ok(1.0)
            }
            ActionKind::UnmuteChannel => {
                self.adapter.set_channel_param(
                    action.channel,
                    ChannelParam::Mute,
                    ParamValue::Bool(false),
                );
                log::info!("Executed: unmute ch{}", action.channel);
                ExecutionResult::ok(0.0)
            }
            ActionKind::NoAction | ActionKind::Observation => ExecutionResult::ok(0.0),
        }
    }

    fn execute_fader(&self, action: &MixAction) -> ExecutionResult {
        let Some(snap) = self.model.channel(action.channel) else {
            return ExecutionResult::fail(format!("unknown channel {}", action.channel));
        };
        let current = snap.fader;
        let target = action.value;
        let delta = target - current;

        if delta.abs() < RAMP_THRESHOLD {
            self.adapter.set_channel_param(
                action.channel,
                ChannelParam::Fader,
                ParamValue::Float(target),
            );
            log::info!("Executed: ch{} fader {:.2} -> {:.2}", action.channel, current, target);
            return ExecutionResult::ok(target);
        }

        let step = delta / RAMP_STEPS as f32;
        let mut value = current;
        for _ in 0..RAMP_STEPS {
            value += step;
            self.adapter.set_channel_param(
                action.channel,
                ChannelParam::Fader,
                ParamValue::Float(value),
            );
            std::thread::sleep(RAMP_STEP_SLEEP);
        }
        // Final write lands on the exact target
        self.adapter.set_channel_param(
            action.channel,
            ChannelParam::Fader,
            ParamValue::Float(target),
        );

        log::info!("Executed: ch{} fader {:.2} -> {:.2} (ramped)", action.channel, current, target);
        ExecutionResult::ok(target)
    }

    fn execute_eq(&self, action: &MixAction) -> ExecutionResult {
        let band = action.band_index;
        if !(1..=6).contains(&band) {
            return ExecutionResult::fail(format!("invalid EQ band {}", band));
        }

        self.adapter.set_channel_param(
            action.channel,
            ChannelParam::EqFreq(band),
            ParamValue::Float(action.value),
        );
        self.adapter.set_channel_param(
            action.channel,
            ChannelParam::EqGain(band),
            ParamValue::Float(action.value2),
        );
        self.adapter.set_channel_param(
            action.channel,
            ChannelParam::EqQ(band),
            ParamValue::Float(action.value3),
        );

        log::info!(
            "Executed: ch{} EQ band{} {}Hz {:.1}dB Q={:.1}",
            action.channel,
            band,
            action.value as i32,
            action.value2,
            action.value3
        );
        ExecutionResult::ok(action.value2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mix_core::{BusParam, ConsoleCapabilities, ParameterUpdate};
    use parking_lot::Mutex;
    use std::time::Instant;

    /// Adapter double that records every write it receives.
    #[derive(Default)]
    struct RecordingAdapter {
        writes: Mutex<Vec<(u16, ChannelParam, ParamValue)>>,
        sends: Mutex<Vec<(u16, u16, f32)>>,
    }

    impl ConsoleAdapter for RecordingAdapter {
        fn connect(&self, _ip: &str, _port: u16) -> bool {
            true
        }
        fn disconnect(&self) {}
        fn is_connected(&self) -> bool {
            true
        }
        fn capabilities(&self) -> ConsoleCapabilities {
            ConsoleCapabilities {
                model: "Test".into(),
                firmware: String::new(),
                channel_count: 32,
                bus_count: 16,
                matrix_count: 0,
                dca_count: 0,
                fx_slots: 0,
                eq_bands: 4,
                has_motorized_faders: false,
                has_dynamic_eq: false,
                has_multiband_comp: false,
                meter_update_rate_ms: 50,
            }
        }
        fn request_full_sync(&self) {}
        fn set_channel_param(&self, ch: u16, param: ChannelParam, value: ParamValue) {
            self.writes.lock().push((ch, param, value));
        }
        fn set_send_level(&self, ch: u16, bus: u16, level: f32) {
            self.sends.lock().push((ch, bus, level));
        }
        fn set_bus_param(&self, _bus: u16, _param: BusParam, _value: f32) {}
        fn subscribe_meter(&self, _refresh_ms: u32) {}
        fn unsubscribe_meter(&self) {}
        fn tick(&self) {}
        fn set_event_sink(&self, _sink: std::sync::Arc<dyn mix_console::ConsoleEvents>) {}
    }

    fn setup() -> (Arc<RecordingAdapter>, Arc<ConsoleModel>, ActionExecutor) {
        let adapter = Arc::new(RecordingAdapter::default());
        let model = Arc::new(ConsoleModel::new());
        model.init(32, 16);
        let executor = ActionExecutor::new(adapter.clone(), model.clone());
        (adapter, model, executor)
    }

    #[test]
    fn test_small_fader_move_is_direct() {
        let (adapter, model, executor) = setup();
        model.apply_update(&ParameterUpdate::channel(
            2,
            ChannelParam::Fader,
            ParamValue::Float(0.5),
        ));

        let action = MixAction {
            kind: ActionKind::SetFader,
            channel: 2,
            value: 0.51,
            ..MixAction::default()
        };
        let result = executor.execute(&action);
        assert!(result.success);
        assert_eq!(result.actual_value, 0.51);
        assert_eq!(adapter.writes.lock().len(), 1);
    }

    #[test]
    fn test_large_fader_move_is_ramped() {
        let (adapter, model, executor) = setup();
        model.apply_update(&ParameterUpdate::channel(
            2,
            ChannelParam::Fader,
            ParamValue::Float(0.4),
        ));

        let action = MixAction {
            kind: ActionKind::SetFader,
            channel: 2,
            value: 0.6,
            ..MixAction::default()
        };
        let start = Instant::now();
        let result = executor.execute(&action);
        let elapsed = start.elapsed();

        assert!(result.success);
        // 10 ramp steps plus the final exact write
        let writes = adapter.writes.lock();
        assert_eq!(writes.len(), 11);
        assert_eq!(writes.last().unwrap().2, ParamValue::Float(0.6));
        // Steps are monotonically increasing toward the target
        let values: Vec<f32> = writes
            .iter()
            .map(|(_, _, v)| match v {
                ParamValue::Float(f) => *f,
                _ => panic!("expected float"),
            })
            .collect();
        for pair in values.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6);
        }
        // 10 sleeps of 20ms
        assert!(elapsed >= Duration::from_millis(190));
    }

    #[test]
    fn test_eq_writes_three_params() {
        let (adapter, _model, executor) = setup();
        let action = MixAction {
            kind: ActionKind::SetEqBand,
            channel: 4,
            value: 2500.0,
            value2: -3.0,
            value3: 1.4,
            band_index: 2,
            ..MixAction::default()
        };
        assert!(executor.execute(&action).success);

        let writes = adapter.writes.lock();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].1, ChannelParam::EqFreq(2));
        assert_eq!(writes[1].1, ChannelParam::EqGain(2));
        assert_eq!(writes[2].1, ChannelParam::EqQ(2));
    }

    #[test]
    fn test_invalid_eq_band_fails() {
        let (_adapter, _model, executor) = setup();
        let action = MixAction {
            kind: ActionKind::SetEqBand,
            channel: 4,
            band_index: 9,
            ..MixAction::default()
        };
        let result = executor.execute(&action);
        assert!(!result.success);
        assert!(!result.error.is_empty());
    }

    #[test]
    fn test_comp_enables_and_writes() {
        let (adapter, _model, executor) = setup();
        let action = MixAction {
            kind: ActionKind::SetCompressor,
            channel: 6,
            value: -18.0,
            value2: 4.0,
            ..MixAction::default()
        };
        assert!(executor.execute(&action).success);

        let writes = adapter.writes.lock();
        assert_eq!(writes[0].1, ChannelParam::CompThreshold);
        assert_eq!(writes[1].1, ChannelParam::CompRatio);
        assert_eq!(writes[2], (6, ChannelParam::CompOn, ParamValue::Bool(true)));
    }

    #[test]
    fn test_hpf_enables_and_writes() {
        let (adapter, _model, executor) = setup();
        let action = MixAction {
            kind: ActionKind::SetHighPass,
            channel: 1,
            value: 120.0,
            ..MixAction::default()
        };
        assert!(executor.execute(&action).success);

        let writes = adapter.writes.lock();
        assert_eq!(writes[0], (1, ChannelParam::HighPassFreq, ParamValue::Float(120.0)));
        assert_eq!(writes[1], (1, ChannelParam::HighPassOn, ParamValue::Bool(true)));
    }

    #[test]
    fn test_mute_unmute() {
        let (adapter, _model, executor) = setup();
        executor.execute(&MixAction { kind: ActionKind::MuteChannel, channel: 3, ..MixAction::default() });
        executor.execute(&MixAction { kind: ActionKind::UnmuteChannel, channel: 3, ..MixAction::default() });

        let writes = adapter.writes.lock();
        assert_eq!(writes[0], (3, ChannelParam::Mute, ParamValue::Bool(true)));
        assert_eq!(writes[1], (3, ChannelParam::Mute, ParamValue::Bool(false)));
    }

    #[test]
    fn test_send_level() {
        let (adapter, _model, executor) = setup();
        let action = MixAction {
            kind: ActionKind::SetSendLevel,
            channel: 2,
            aux_index: 5,
            value: 0.7,
            ..MixAction::default()
        };
        assert!(executor.execute(&action).success);
        assert_eq!(adapter.sends.lock()[0], (2, 5, 0.7));
    }

    #[test]
    fn test_noop_actions_succeed_without_writes() {
        let (adapter, _model, executor) = setup();
        assert!(executor.execute(&MixAction::default()).success);
        assert!(adapter.writes.lock().is_empty());
    }
}
