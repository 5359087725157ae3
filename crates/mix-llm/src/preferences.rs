//! Engineer preference learning.
//!
//! Tracks approve/reject decisions per instrument role and distils them
//! into an `engineer_preferences` document for the LLM context: overall
//! approval rate, EQ cut-vs-boost tendency, and per-role fader/comp/HPF
//! targets. Persisted to JSON across sessions with a dirty bit.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::action::{ActionKind, MixAction};

const MAX_INSTRUCTIONS: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleStats {
    #[serde(rename = "approved")]
    pub total_approved: u32,
    #[serde(rename = "rejected")]
    pub total_rejected: u32,

    #[serde(rename = "eq_boost_approved")]
    pub eq_boost_approvals: u32,
    #[serde(rename = "eq_cut_approved")]
    pub eq_cut_approvals: u32,
    #[serde(rename = "eq_boost_rejected")]
    pub eq_boost_rejections: u32,
    #[serde(rename = "eq_cut_rejected")]
    pub eq_cut_rejections: u32,

    #[serde(rename = "comp_approved")]
    pub comp_approvals: u32,
    #[serde(rename = "comp_rejected")]
    pub comp_rejections: u32,
    #[serde(rename = "comp_ratio_sum")]
    pub comp_ratio_sum: f32,

    #[serde(rename = "fader_approvals")]
    pub fader_approvals: Vec<f32>,
    #[serde(rename = "fader_rejections")]
    pub fader_rejections: Vec<f32>,
    /// positive = engineer tends to push faders up
    #[serde(rename = "fader_direction")]
    pub fader_adjust_direction: i32,

    #[serde(rename = "hpf_approvals")]
    pub hpf_approvals: Vec<f32>,
}

#[derive(Default)]
struct LearnerState {
    role_stats: HashMap<String, RoleStats>,
    standing_instructions: Vec<String>,
    dirty: bool,
}

#[derive(Serialize, Deserialize)]
struct PersistedPreferences {
    instructions: Vec<String>,
    role_stats: HashMap<String, RoleStats>,
}

#[derive(Default)]
pub struct PreferenceLearner {
    state: Mutex<LearnerState>,
}

impl PreferenceLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engineer agreed with the LLM.
    pub fn record_approval(&self, action: &MixAction, role: &str) {
        let mut state = self.state.lock();
        let stats = state.role_stats.entry(role.to_string()).or_default();
        stats.total_approved += 1;

        match action.kind {
            ActionKind::SetFader => {
                stats.fader_approvals.push(action.value);
                stats.fader_adjust_direction += if action.value > 0.5 { 1 } else { -1 };
            }
            ActionKind::SetEqBand => {
                if action.value2 > 0.0 {
                    stats.eq_boost_approvals += 1;
                } else {
                    stats.eq_cut_approvals += 1;
                }
            }
            ActionKind::SetCompressor => {
                stats.comp_approvals += 1;
                stats.comp_ratio_sum += action.value2;
            }
            ActionKind::SetHighPass => {
                stats.hpf_approvals.push(action.value);
            }
            _ => {}
        }
        state.dirty = true;
    }

    /// The engineer disagreed with the LLM.
    pub fn record_rejection(&self, action: &MixAction, role: &str) {
        let mut state = self.state.lock();
        let stats = state.role_stats.entry(role.to_string()).or_default();
        stats.total_rejected += 1;

        match action.kind {
            ActionKind::SetFader => stats.fader_rejections.push(action.value),
            ActionKind::SetEqBand => {
                if action.value2 > 0.0 {
                    stats.eq_boost_rejections += 1;
                } else {
                    stats.eq_cut_rejections += 1;
                }
            }
            ActionKind::SetCompressor => stats.comp_rejections += 1,
            _ => {}
        }
        state.dirty = true;
    }

    pub fn record_instruction(&self, instruction: &str) {
        let mut state = self.state.lock();
        state.standing_instructions.push(instruction.to_string());
        if state.standing_instructions.len() > MAX_INSTRUCTIONS {
            state.standing_instructions.remove(0);
        }
        state.dirty = true;
    }

    /// Build the preferences document, or `Value::Null` when there is not
    /// enough data to say anything useful.
    pub fn build_preferences(&self) -> Value {
        let state = self.state.lock();
        if state.role_stats.is_empty() && state.standing_instructions.is_empty() {
            return Value::Null;
        }

        let mut prefs = Map::new();

        let mut total_approved = 0u32;
        let mut total_rejected = 0u32;
        let mut eq_boost_approved = 0u32;
        let mut eq_cut_approved = 0u32;
        let mut eq_boost_rejected = 0u32;
        let mut eq_cut_rejected = 0u32;

        for stats in state.role_stats.values() {
            total_approved += stats.total_approved;
            total_rejected += stats.total_rejected;
            eq_boost_approved += stats.eq_boost_approvals;
            eq_cut_approved += stats.eq_cut_approvals;
            eq_boost_rejected += stats.eq_boost_rejections;
            eq_cut_rejected += stats.eq_cut_rejections;
        }

        if total_approved + total_rejected > 5 {
            let rate = total_approved as f32 / (total_approved + total_rejected) as f32;
            prefs.insert("overall_approval_rate".into(), json!(round_to(rate, 2)));
            if rate < 0.4 {
                prefs.insert(
                    "note".into(),
                    json!("Engineer rejects many suggestions - be more conservative"),
                );
            } else if rate > 0.8 {
                prefs.insert(
                    "note".into(),
                    json!("Engineer trusts AI suggestions - confidence is appropriate"),
                );
            }
        }

        let eq_approved = eq_boost_approved + eq_cut_approved;
        let eq_rejected = eq_boost_rejected + eq_cut_rejected;
        if eq_approved + eq_rejected > 3 {
            if eq_boost_rejected > eq_boost_approved * 2 {
                prefs.insert(
                    "eq_tendency".into(),
                    json!("Engineer prefers cuts over boosts - use subtractive EQ"),
                );
            } else if eq_boost_approved > eq_cut_approved {
                prefs.insert("eq_tendency".into(), json!("Engineer is comfortable with EQ boosts"));
            }
        }

        let mut role_prefs = Map::new();
        for (role, stats) in &state.role_stats {
            let decisions = stats.total_approved + stats.total_rejected;
            if decisions < 3 {
                continue;
            }

            let mut rp = Map::new();
            let rate = stats.total_approved as f32 / decisions as f32;
            rp.insert("approval_rate".into(), json!(round_to(rate, 2)));

            if !stats.fader_approvals.is_empty() {
                rp.insert(
                    "preferred_fader_range".into(),
                    json!(round_to(average(&stats.fader_approvals), 2)),
                );
            }

            if stats.comp_approvals + stats.comp_rejections > 2 {
                if stats.comp_rejections > stats.comp_approvals {
                    rp.insert("dynamics".into(), json!("engineer prefers less compression on this"));
                } else if stats.comp_approvals > 0 {
                    let avg_ratio = stats.comp_ratio_sum / stats.comp_approvals as f32;
                    rp.insert("preferred_comp_ratio".into(), json!(round_to(avg_ratio, 1)));
                }
            }

            if !stats.hpf_approvals.is_empty() {
                rp.insert("preferred_hpf_hz".into(), json!(average(&stats.hpf_approvals) as i32));
            }

            if rate < 0.3 {
                rp.insert(
                    "warning".into(),
                    json!("engineer frequently rejects changes to this - leave it alone unless asked"),
                );
            }

            role_prefs.insert(role.clone(), Value::Object(rp));
        }

        if !role_prefs.is_empty() {
            prefs.insert("role_preferences".into(), Value::Object(role_prefs));
        }

        Value::Object(prefs)
    }

    /// Persist to disk. Failures are the caller's to log; shutdown must
    /// never block on this.
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let mut state = self.state.lock();
        let persisted = PersistedPreferences {
            instructions: state.standing_instructions.clone(),
            role_stats: state.role_stats.clone(),
        };
        let body = serde_json::to_string_pretty(&persisted)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, body)?;
        state.dirty = false;
        Ok(())
    }

    pub fn load_from_file(&self, path: &Path) -> bool {
        let Ok(body) = std::fs::read_to_string(path) else {
            return false;
        };
        let Ok(persisted) = serde_json::from_str::<PersistedPreferences>(&body) else {
            return false;
        };
        let mut state = self.state.lock();
        state.standing_instructions = persisted.instructions;
        state.role_stats = persisted.role_stats;
        state.dirty = false;
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn total_decisions(&self) -> u32 {
        let state = self.state.lock();
        state
            .role_stats
            .values()
            .map(|s| s.total_approved + s.total_rejected)
            .sum()
    }
}

fn average(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn round_to(value: f32, decimals: i32) -> f32 {
    let mult = 10f32.powi(decimals);
    (value * mult).round() / mult
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fader_action(value: f32) -> MixAction {
        MixAction { kind: ActionKind::SetFader, channel: 1, value, ..MixAction::default() }
    }

    fn comp_action(ratio: f32) -> MixAction {
        MixAction { kind: ActionKind::SetCompressor, channel: 1, value: -18.0, value2: ratio, ..MixAction::default() }
    }

    #[test]
    fn test_no_data_yields_null() {
        let learner = PreferenceLearner::new();
        assert_eq!(learner.build_preferences(), Value::Null);
    }

    #[test]
    fn test_overall_rate_needs_six_decisions() {
        let learner = PreferenceLearner::new();
        for _ in 0..5 {
            learner.record_approval(&fader_action(0.7), "Kick");
        }
        assert!(learner.build_preferences().get("overall_approval_rate").is_none());

        learner.record_approval(&fader_action(0.7), "Kick");
        let prefs = learner.build_preferences();
        assert_eq!(prefs["overall_approval_rate"], json!(1.0));
        assert!(prefs["note"].as_str().unwrap().contains("trusts"));
    }

    #[test]
    fn test_low_rate_note() {
        let learner = PreferenceLearner::new();
        learner.record_approval(&fader_action(0.7), "Kick");
        for _ in 0..6 {
            learner.record_rejection(&fader_action(0.9), "Kick");
        }
        let prefs = learner.build_preferences();
        assert!(prefs["note"].as_str().unwrap().contains("conservative"));
    }

    #[test]
    fn test_role_prefs_need_three_decisions() {
        let learner = PreferenceLearner::new();
        learner.record_approval(&fader_action(0.6), "Snare");
        learner.record_approval(&fader_action(0.7), "Snare");
        assert!(learner.build_preferences().get("role_preferences").is_none());

        learner.record_approval(&fader_action(0.8), "Snare");
        let prefs = learner.build_preferences();
        let snare = &prefs["role_preferences"]["Snare"];
        assert_eq!(snare["approval_rate"], json!(1.0));
        assert_eq!(snare["preferred_fader_range"], json!(0.7));
    }

    #[test]
    fn test_leave_alone_warning() {
        let learner = PreferenceLearner::new();
        learner.record_approval(&fader_action(0.5), "Tom");
        for _ in 0..5 {
            learner.record_rejection(&fader_action(0.8), "Tom");
        }
        let prefs = learner.build_preferences();
        let warning = prefs["role_preferences"]["Tom"]["warning"].as_str().unwrap();
        assert!(warning.contains("leave it alone"));
    }

    #[test]
    fn test_comp_ratio_mean() {
        let learner = PreferenceLearner::new();
        learner.record_approval(&comp_action(3.0), "LeadVocal");
        learner.record_approval(&comp_action(5.0), "LeadVocal");
        learner.record_approval(&comp_action(4.0), "LeadVocal");
        let prefs = learner.build_preferences();
        assert_eq!(prefs["role_preferences"]["LeadVocal"]["preferred_comp_ratio"], json!(4.0));
    }

    #[test]
    fn test_eq_tendency_subtractive() {
        let learner = PreferenceLearner::new();
        let boost = MixAction { kind: ActionKind::SetEqBand, value2: 2.0, ..MixAction::default() };
        let cut = MixAction { kind: ActionKind::SetEqBand, value2: -3.0, ..MixAction::default() };
        learner.record_rejection(&boost, "Keys");
        learner.record_rejection(&boost, "Keys");
        learner.record_rejection(&boost, "Keys");
        learner.record_approval(&cut, "Keys");
        let prefs = learner.build_preferences();
        assert!(prefs["eq_tendency"].as_str().unwrap().contains("subtractive"));
    }

    #[test]
    fn test_instruction_cap() {
        let learner = PreferenceLearner::new();
        for i in 0..30 {
            learner.record_instruction(&format!("instruction {}", i));
        }
        let state = learner.state.lock();
        assert_eq!(state.standing_instructions.len(), MAX_INSTRUCTIONS);
        assert_eq!(state.standing_instructions[0], "instruction 10");
    }

    #[test]
    fn test_save_load_round_trip() {
        let learner = PreferenceLearner::new();
        for _ in 0..4 {
            learner.record_approval(&fader_action(0.6), "Kick");
        }
        for _ in 0..3 {
            learner.record_rejection(&fader_action(0.9), "Kick");
        }
        learner.record_instruction("keep kick punchy");
        assert!(learner.is_dirty());

        let path = std::env::temp_dir().join("mixagent_prefs_test.json");
        learner.save_to_file(&path).unwrap();
        assert!(!learner.is_dirty());

        let restored = PreferenceLearner::new();
        assert!(restored.load_from_file(&path));
        assert_eq!(restored.total_decisions(), 7);

        let before = learner.build_preferences();
        let after = restored.build_preferences();
        assert_eq!(before["role_preferences"]["Kick"]["approval_rate"],
                   after["role_preferences"]["Kick"]["approval_rate"]);
        assert_eq!(before["role_preferences"]["Kick"]["preferred_fader_range"],
                   after["role_preferences"]["Kick"]["preferred_fader_range"]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let learner = PreferenceLearner::new();
        assert!(!learner.load_from_file(Path::new("/nonexistent/prefs.json")));
    }
}
