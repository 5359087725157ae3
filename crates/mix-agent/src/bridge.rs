//! Meter bridge - mix state serialisation for the LLM.
//!
//! The LLM never sees raw spectral data. The DSP runs locally and only
//! the conclusions (issues) travel, together with a token-economical view
//! of channel state: silent unnamed channels are omitted, EQ bands only
//! appear when they actually do something, dynamics only when engaged.

use serde_json::{json, Map, Value};

use mix_core::{ConsoleModel, SIGNAL_THRESHOLD_DB};
use mix_dsp::MixIssue;

use crate::discovery::ChannelMap;

pub struct MeterBridge<'a> {
    model: &'a ConsoleModel,
    channel_map: &'a ChannelMap,
}

impl<'a> MeterBridge<'a> {
    pub fn new(model: &'a ConsoleModel, channel_map: &'a ChannelMap) -> Self {
        Self { model, channel_map }
    }

    /// Full mix state document for the LLM decision engine.
    pub fn build_mix_state(&self, issues: &[MixIssue]) -> Value {
        let mut channels = Vec::new();

        for profile in self.channel_map.all() {
            if !profile.fingerprint.has_signal && profile.console_name.is_empty() {
                continue;
            }
            let Some(snap) = self.model.channel(profile.index) else { continue };

            let mut ch = Map::new();
            ch.insert("index".into(), json!(profile.index));
            ch.insert("name".into(), json!(profile.console_name));
            ch.insert("role".into(), json!(profile.role.as_str()));
            ch.insert("group".into(), json!(profile.group));
            ch.insert("fader".into(), json!(round_to(snap.fader, 2)));
            ch.insert("muted".into(), json!(snap.muted));
            ch.insert("pan".into(), json!(round_to(snap.pan, 2)));
            ch.insert("rms_db".into(), json!(round_to(snap.rms_db, 1)));
            ch.insert("peak_db".into(), json!(round_to(snap.peak_db, 1)));
            ch.insert("has_signal".into(), json!(snap.rms_db > SIGNAL_THRESHOLD_DB));

            if let Some(peer) = profile.stereo_pair {
                ch.insert("stereo_pair".into(), json!(peer));
            }

            // EQ bands only when they do something
            if snap.eq_on {
                let eq: Vec<Value> = snap
                    .eq
                    .iter()
                    .enumerate()
                    .filter(|(_, band)| band.gain.abs() > 0.1)
                    .map(|(i, band)| {
                        json!({
                            "band": i + 1,
                            "freq": band.freq,
                            "gain": round_to(band.gain, 1),
                            "q": round_to(band.q, 2),
                        })
                    })
                    .collect();
                if !eq.is_empty() {
                    ch.insert("eq".into(), Value::Array(eq));
                }
            }

            if snap.hpf_on && snap.hpf_freq > 20.0 {
                ch.insert("hpf_hz".into(), json!(snap.hpf_freq.round()));
            }

            if snap.comp.on {
                ch.insert(
                    "comp".into(),
                    json!({
                        "threshold": round_to(snap.comp.threshold, 1),
                        "ratio": round_to(snap.comp.ratio, 1),
                        "attack": round_to(snap.comp.attack, 1),
                        "release": snap.comp.release.round(),
                    }),
                );
            }

            if snap.gate.on {
                ch.insert(
                    "gate".into(),
                    json!({
                        "threshold": round_to(snap.gate.threshold, 1),
                        "range": round_to(snap.gate.range, 1),
                    }),
                );
            }

            channels.push(Value::Object(ch));
        }

        let mut state = Map::new();
        state.insert("channels".into(), Value::Array(channels));

        if !issues.is_empty() {
            let issue_docs: Vec<Value> = issues
                .iter()
                .map(|issue| {
                    let mut ij = Map::new();
                    ij.insert("type".into(), json!(issue.kind.as_str()));
                    ij.insert("channel".into(), json!(issue.channel));
                    if issue.channel2 > 0 {
                        ij.insert("channel2".into(), json!(issue.channel2));
                    }
                    if issue.freq_hz > 0.0 {
                        ij.insert("freq_hz".into(), json!(issue.freq_hz as i32));
                    }
                    ij.insert("severity".into(), json!(round_to(issue.severity, 2)));
                    ij.insert("description".into(), json!(issue.description));
                    Value::Object(ij)
                })
                .collect();
            state.insert("issues".into(), Value::Array(issue_docs));
        }

        Value::Object(state)
    }

    /// Compact summary for session memory snapshots.
    pub fn build_compact_state(&self) -> Value {
        let channels: Vec<Value> = self
            .channel_map
            .active()
            .iter()
            .filter_map(|profile| {
                let snap = self.model.channel(profile.index)?;
                Some(json!({
                    "i": profile.index,
                    "r": profile.role.as_str(),
                    "f": round_to(snap.fader, 2),
                    "db": snap.rms_db.round(),
                    "pk": snap.peak_db.round(),
                }))
            })
            .collect();

        json!({ "ch": channels })
    }
}

fn round_to(value: f32, decimals: i32) -> f32 {
    let mult = 10f32.powi(decimals);
    (value * mult).round() / mult
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ChannelProfile;
    use mix_core::{ChannelParam, InstrumentRole, ParamValue, ParameterUpdate};
    use mix_dsp::IssueKind;

    fn setup() -> (ConsoleModel, ChannelMap) {
        let model = ConsoleModel::new();
        model.init(8, 4);
        let map = ChannelMap::new();
        map.resize(8);
        (model, map)
    }

    fn named_profile(map: &ChannelMap, ch: u16, name: &str, role: InstrumentRole) {
        let mut p = ChannelProfile::new(ch);
        p.console_name = name.into();
        p.role = role;
        p.group = "drums".into();
        p.fingerprint.has_signal = true;
        map.update_profile(p);
    }

    #[test]
    fn test_silent_unnamed_channels_omitted() {
        let (model, map) = setup();
        named_profile(&map, 1, "Kick", InstrumentRole::Kick);

        let bridge = MeterBridge::new(&model, &map);
        let state = bridge.build_mix_state(&[]);
        let channels = state["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0]["index"], 1);
        assert_eq!(channels[0]["role"], "Kick");
    }

    #[test]
    fn test_issues_array_omitted_when_empty() {
        let (model, map) = setup();
        let bridge = MeterBridge::new(&model, &map);
        let state = bridge.build_mix_state(&[]);
        assert!(state.get("issues").is_none());
    }

    #[test]
    fn test_issue_serialisation() {
        let (model, map) = setup();
        named_profile(&map, 2, "Snare", InstrumentRole::Snare);

        let issues = vec![MixIssue {
            kind: IssueKind::Masking,
            channel: 2,
            channel2: 3,
            freq_hz: 400.0,
            severity: 0.66,
            description: "ch2 & ch3 masking @400Hz".into(),
        }];

        let bridge = MeterBridge::new(&model, &map);
        let state = bridge.build_mix_state(&issues);
        let issue = &state["issues"][0];
        assert_eq!(issue["type"], "masking");
        assert_eq!(issue["channel"], 2);
        assert_eq!(issue["channel2"], 3);
        assert_eq!(issue["freq_hz"], 400);
        assert_eq!(issue["severity"], 0.66);
    }

    #[test]
    fn test_eq_included_only_when_active() {
        let (model, map) = setup();
        named_profile(&map, 1, "Vox", InstrumentRole::LeadVocal);

        let bridge = MeterBridge::new(&model, &map);
        // All bands at 0dB gain: no eq key
        let state = bridge.build_mix_state(&[]);
        assert!(state["channels"][0].get("eq").is_none());

        model.apply_update(&ParameterUpdate::channel(1, ChannelParam::EqGain(2), ParamValue::Float(-3.5)));
        let state = bridge.build_mix_state(&[]);
        let eq = state["channels"][0]["eq"].as_array().unwrap();
        assert_eq!(eq.len(), 1);
        assert_eq!(eq[0]["band"], 2);
        assert_eq!(eq[0]["gain"], -3.5);
    }

    #[test]
    fn test_comp_gate_hpf_gating() {
        let (model, map) = setup();
        named_profile(&map, 1, "Bass", InstrumentRole::BassGuitar);
        let bridge = MeterBridge::new(&model, &map);

        let state = bridge.build_mix_state(&[]);
        let ch = &state["channels"][0];
        assert!(ch.get("comp").is_none());
        assert!(ch.get("gate").is_none());
        assert!(ch.get("hpf_hz").is_none());

        model.apply_update(&ParameterUpdate::channel(1, ChannelParam::CompOn, ParamValue::Bool(true)));
        model.apply_update(&ParameterUpdate::channel(1, ChannelParam::GateOn, ParamValue::Bool(true)));
        model.apply_update(&ParameterUpdate::channel(1, ChannelParam::HighPassOn, ParamValue::Bool(true)));
        model.apply_update(&ParameterUpdate::channel(1, ChannelParam::HighPassFreq, ParamValue::Float(80.0)));

        let state = bridge.build_mix_state(&[]);
        let ch = &state["channels"][0];
        assert!(ch.get("comp").is_some());
        assert!(ch.get("gate").is_some());
        assert_eq!(ch["hpf_hz"], 80.0);
    }

    #[test]
    fn test_hpf_at_20hz_omitted() {
        let (model, map) = setup();
        named_profile(&map, 1, "Bass", InstrumentRole::BassGuitar);
        model.apply_update(&ParameterUpdate::channel(1, ChannelParam::HighPassOn, ParamValue::Bool(true)));
        model.apply_update(&ParameterUpdate::channel(1, ChannelParam::HighPassFreq, ParamValue::Float(20.0)));

        let bridge = MeterBridge::new(&model, &map);
        let state = bridge.build_mix_state(&[]);
        assert!(state["channels"][0].get("hpf_hz").is_none());
    }

    #[test]
    fn test_stereo_pair_included() {
        let (model, map) = setup();
        let mut p = ChannelProfile::new(3);
        p.console_name = "OH L".into();
        p.stereo_pair = Some(4);
        map.update_profile(p);

        let bridge = MeterBridge::new(&model, &map);
        let state = bridge.build_mix_state(&[]);
        assert_eq!(state["channels"][0]["stereo_pair"], 4);
    }

    #[test]
    fn test_compact_state_shape() {
        let (model, map) = setup();
        named_profile(&map, 1, "Kick", InstrumentRole::Kick);
        model.update_meter(1, -18.4, -6.2);

        let bridge = MeterBridge::new(&model, &map);
        let compact = bridge.build_compact_state();
        let ch = &compact["ch"][0];
        assert_eq!(ch["i"], 1);
        assert_eq!(ch["r"], "Kick");
        assert_eq!(ch["db"], -18.0);
        assert_eq!(ch["pk"], -6.0);
        // Compact form has no name/eq/comp keys
        assert!(ch.get("name").is_none());
    }
}
