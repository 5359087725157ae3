//! LLM review of the locally-built channel map.
//!
//! The review pass may correct roles, add stereo pairs the local detector
//! missed, and flag suspicious settings (phantom power on a dynamic mic).
//! Corrections never touch manually-overridden profiles; a parse failure
//! leaves the map unchanged.

use serde_json::{json, Value};

use mix_core::{Confidence, InstrumentRole};
use mix_llm::LlmEngine;

use crate::discovery::profile::ChannelProfile;

pub struct LlmDiscoveryReview<'a> {
    llm: &'a LlmEngine,
}

impl<'a> LlmDiscoveryReview<'a> {
    pub fn new(llm: &'a LlmEngine) -> Self {
        Self { llm }
    }

    /// Run the review and return the (possibly corrected) profiles.
    pub fn review(&self, mut profiles: Vec<ChannelProfile>) -> Vec<ChannelProfile> {
        let prompt = build_discovery_prompt(&profiles);
        match self.llm.call_raw(REVIEW_SYSTEM_PROMPT, &prompt.to_string()) {
            Ok(response) => {
                apply_review_response(&response, &mut profiles);
                profiles
            }
            Err(e) => {
                log::warn!("LLM discovery review failed: {} - keeping local classification", e);
                profiles
            }
        }
    }
}

fn build_discovery_prompt(profiles: &[ChannelProfile]) -> Value {
    let channels: Vec<Value> = profiles
        .iter()
        .filter(|p| p.fingerprint.has_signal || !p.console_name.is_empty())
        .map(|p| {
            json!({
                "channel": p.index,
                "name": p.console_name,
                "inferred_role": p.role.as_str(),
                "confidence": p.confidence.as_str(),
                "has_signal": p.fingerprint.has_signal,
                "fader_norm": p.fader_norm,
                "muted": p.muted,
                "phantom_48v": p.phantom_power,
                "phase_invert": p.phase_invert,
                "hpf_hz": p.high_pass_hz,
                "spectral": {
                    "dominant_hz": p.fingerprint.dominant_freq_hz,
                    "bass_energy": p.fingerprint.bass_energy,
                    "mid_energy": p.fingerprint.mid_energy,
                    "high_energy": p.fingerprint.presence_energy,
                    "crest_factor": p.fingerprint.crest_factor,
                    "is_percussive": p.fingerprint.is_percussive,
                },
            })
        })
        .collect();
    json!({ "channels": channels })
}

/// Apply a review response to the profiles in place.
pub fn apply_review_response(response: &str, profiles: &mut [ChannelProfile]) {
    let Ok(j) = serde_json::from_str::<Value>(response) else {
        log::error!("Failed to parse LLM discovery response");
        return;
    };

    if let Some(show_type) = j.get("show_type").and_then(Value::as_str) {
        log::info!(
            "LLM identified show type: {} (confidence: {:.2})",
            show_type,
            j.get("show_confidence").and_then(Value::as_f64).unwrap_or(0.0)
        );
    }
    if let Some(obs) = j.get("observations").and_then(Value::as_str) {
        log::info!("LLM observations: {}", obs);
    }

    if let Some(corrections) = j.get("corrections").and_then(Value::as_array) {
        for correction in corrections {
            let Some(ch) = correction.get("channel").and_then(Value::as_u64) else { continue };
            if ch < 1 || ch as usize > profiles.len() {
                continue;
            }
            let profile = &mut profiles[ch as usize - 1];
            if profile.manually_overridden {
                continue;
            }
            let Some(role) = correction.get("suggested_role").and_then(Value::as_str) else {
                continue;
            };
            profile.role = InstrumentRole::from_str(role);
            profile.confidence = Confidence::Medium;
            profile.llm_notes = correction
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            log::info!("LLM corrected ch{} ({}) -> {}", ch, profile.console_name, role);
        }
    }

    if let Some(pairs) = j.get("stereo_pairs").and_then(Value::as_array) {
        for pair in pairs {
            let (Some(l), Some(r)) = (
                pair.get("left").and_then(Value::as_u64),
                pair.get("right").and_then(Value::as_u64),
            ) else {
                continue;
            };
            if l < 1 || l as usize > profiles.len() || r < 1 || r as usize > profiles.len() {
                continue;
            }
            profiles[l as usize - 1].stereo_pair = Some(r as u16);
            profiles[r as usize - 1].stereo_pair = Some(l as u16);
            log::info!("LLM detected stereo pair: ch{} / ch{}", l, r);
        }
    }

    if let Some(concerns) = j.get("concerns").and_then(Value::as_array) {
        for concern in concerns {
            log::warn!(
                "Discovery concern on ch{}: {}",
                concern.get("channel").and_then(Value::as_u64).unwrap_or(0),
                concern.get("detail").and_then(Value::as_str).unwrap_or("unknown issue")
            );
        }
    }
}

const REVIEW_SYSTEM_PROMPT: &str = r#"You are an experienced live sound engineer reviewing a channel map
that was automatically detected from a mixing console.

Your job is to:
1. Identify any channels that are probably misclassified
2. Spot likely stereo pairs that weren't detected
3. Identify the overall band/show type from the channel layout
4. Flag any channels with suspicious settings (e.g. phantom on a dynamic mic)

Respond ONLY with valid JSON:
{
  "show_type": "rock_band|jazz_quartet|musical_theatre|conference|dj_set|...",
  "show_confidence": 0.85,
  "observations": "brief overall assessment",
  "corrections": [
    {
      "channel": 5,
      "current_role": "Unknown",
      "suggested_role": "ElectricGuitar",
      "reason": "named 'GTR1', spectral profile matches guitar",
      "confidence": 0.9
    }
  ],
  "stereo_pairs": [
    { "left": 15, "right": 16, "reason": "named GTR L/R, same role" }
  ],
  "concerns": [
    {
      "channel": 3,
      "issue": "phantom_48v_on_dynamic",
      "detail": "channel named 'Snare' has 48V phantom - likely a mistake"
    }
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles(n: u16) -> Vec<ChannelProfile> {
        (1..=n).map(ChannelProfile::new).collect()
    }

    #[test]
    fn test_corrections_applied() {
        let mut profs = profiles(8);
        profs[4].console_name = "GTR1".into();

        let response = r#"{
            "show_type": "rock_band",
            "corrections": [
                {"channel": 5, "suggested_role": "ElectricGuitar", "reason": "named GTR1"}
            ]
        }"#;
        apply_review_response(response, &mut profs);

        assert_eq!(profs[4].role, InstrumentRole::ElectricGuitar);
        assert_eq!(profs[4].confidence, Confidence::Medium);
        assert_eq!(profs[4].llm_notes, "named GTR1");
    }

    #[test]
    fn test_manual_override_respected() {
        let mut profs = profiles(4);
        profs[1].role = InstrumentRole::Snare;
        profs[1].manually_overridden = true;

        let response = r#"{"corrections": [{"channel": 2, "suggested_role": "Kick"}]}"#;
        apply_review_response(response, &mut profs);
        assert_eq!(profs[1].role, InstrumentRole::Snare);
    }

    #[test]
    fn test_stereo_pairs_applied() {
        let mut profs = profiles(16);
        let response = r#"{"stereo_pairs": [{"left": 15, "right": 16}]}"#;
        apply_review_response(response, &mut profs);
        assert_eq!(profs[14].stereo_pair, Some(16));
        assert_eq!(profs[15].stereo_pair, Some(15));
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut profs = profiles(4);
        let response = r#"{
            "corrections": [{"channel": 99, "suggested_role": "Kick"}],
            "stereo_pairs": [{"left": 0, "right": 1}, {"left": 3, "right": 44}]
        }"#;
        apply_review_response(response, &mut profs);
        for p in &profs {
            assert_eq!(p.role, InstrumentRole::Unknown);
            assert!(p.stereo_pair.is_none());
        }
    }

    #[test]
    fn test_malformed_response_leaves_profiles() {
        let mut profs = profiles(4);
        profs[0].role = InstrumentRole::Kick;
        apply_review_response("sorry, I can't do that", &mut profs);
        assert_eq!(profs[0].role, InstrumentRole::Kick);
    }

    #[test]
    fn test_prompt_skips_silent_unnamed() {
        let mut profs = profiles(3);
        profs[0].console_name = "Kick".into();
        profs[2].fingerprint.has_signal = true;

        let prompt = build_discovery_prompt(&profs);
        let channels = prompt["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0]["channel"], 1);
        assert_eq!(channels[1]["channel"], 3);
    }
}
