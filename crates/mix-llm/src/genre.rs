//! Genre-specific mix targets that guide the LLM's decisions.
//!
//! Each preset defines target RMS levels relative to the mix bus, pan and
//! EQ character hints, and dynamics guidance per instrument role. The
//! active preset is injected into the LLM context as `genre_preset` - a
//! target to mix toward, not a hard rule.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{json, Map, Value};

use mix_core::InstrumentRole;

#[derive(Debug, Clone)]
pub struct RoleMixTarget {
    pub role: InstrumentRole,
    /// dB relative to the mix bus (0 = same as bus)
    pub target_rms_relative: f32,
    /// -1.0 to 1.0, 0 = center
    pub pan_target: f32,
    /// e.g. "warm", "bright", "punchy"
    pub eq_character: String,
    /// e.g. "moderate compression 4:1"
    pub dynamics_hint: String,
    pub notes: String,
}

impl RoleMixTarget {
    fn new(
        role: InstrumentRole,
        target_rms_relative: f32,
        pan_target: f32,
        eq_character: &str,
        dynamics_hint: &str,
        notes: &str,
    ) -> Self {
        Self {
            role,
            target_rms_relative,
            pan_target,
            eq_character: eq_character.into(),
            dynamics_hint: dynamics_hint.into(),
            notes: notes.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenrePreset {
    pub name: String,
    pub description: String,
    pub targets: Vec<RoleMixTarget>,
}

impl GenrePreset {
    pub fn to_json(&self) -> Value {
        let targets: Vec<Value> = self
            .targets
            .iter()
            .map(|t| {
                let mut tj = Map::new();
                tj.insert("role".into(), json!(t.role.as_str()));
                tj.insert("target_db_relative".into(), json!(t.target_rms_relative));
                if t.pan_target != 0.0 {
                    tj.insert("pan".into(), json!(t.pan_target));
                }
                if !t.eq_character.is_empty() {
                    tj.insert("eq_character".into(), json!(t.eq_character));
                }
                if !t.dynamics_hint.is_empty() {
                    tj.insert("dynamics".into(), json!(t.dynamics_hint));
                }
                if !t.notes.is_empty() {
                    tj.insert("notes".into(), json!(t.notes));
                }
                Value::Object(tj)
            })
            .collect();

        json!({
            "genre": self.name,
            "description": self.description,
            "targets": targets,
        })
    }

    pub fn target_for_role(&self, role: InstrumentRole) -> Option<&RoleMixTarget> {
        self.targets.iter().find(|t| t.role == role)
    }
}

/// Built-in presets plus any file-loaded custom ones.
pub struct GenrePresetLibrary {
    presets: HashMap<String, GenrePreset>,
}

impl Default for GenrePresetLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl GenrePresetLibrary {
    pub fn new() -> Self {
        let mut lib = Self { presets: HashMap::new() };
        lib.build_defaults();
        lib
    }

    pub fn get(&self, name: &str) -> Option<&GenrePreset> {
        self.presets.get(name)
    }

    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.presets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Load a custom preset from a JSON file (same shape as `to_json`).
    pub fn load_from_file(&mut self, path: &Path) -> bool {
        let Ok(body) = std::fs::read_to_string(path) else {
            return false;
        };
        let Ok(j) = serde_json::from_str::<Value>(&body) else {
            return false;
        };

        let name = j.get("genre").and_then(Value::as_str).unwrap_or("custom").to_string();
        let description = j.get("description").and_then(Value::as_str).unwrap_or("").to_string();
        let mut targets = Vec::new();
        if let Some(list) = j.get("targets").and_then(Value::as_array) {
            for tj in list {
                targets.push(RoleMixTarget {
                    role: InstrumentRole::from_str(
                        tj.get("role").and_then(Value::as_str).unwrap_or("Unknown"),
                    ),
                    target_rms_relative: tj
                        .get("target_db_relative")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0) as f32,
                    pan_target: tj.get("pan").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                    eq_character: tj.get("eq_character").and_then(Value::as_str).unwrap_or("").into(),
                    dynamics_hint: tj.get("dynamics").and_then(Value::as_str).unwrap_or("").into(),
                    notes: tj.get("notes").and_then(Value::as_str).unwrap_or("").into(),
                });
            }
        }

        self.presets.insert(name.clone(), GenrePreset { name, description, targets });
        true
    }

    fn build_defaults(&mut self) {
        use InstrumentRole::*;

        self.insert(GenrePreset {
            name: "rock".into(),
            description: "Punchy drums, driving guitars, vocals above the band".into(),
            targets: vec![
                RoleMixTarget::new(Kick, -6.0, 0.0, "punchy, tight low-end", "moderate compression 4:1, fast attack", "HPF around 50Hz, cut boxiness at 300-400Hz"),
                RoleMixTarget::new(Snare, -4.0, 0.0, "crack with body", "medium compression 3:1", "boost attack at 2-5kHz, body at 200Hz"),
                RoleMixTarget::new(HiHat, -14.0, 0.3, "crisp not harsh", "", "HPF at 300Hz, tame harshness at 3-4kHz"),
                RoleMixTarget::new(Tom, -8.0, 0.0, "full, round attack", "light compression", "cut mud at 300-500Hz"),
                RoleMixTarget::new(Overhead, -10.0, 0.0, "natural cymbals, room", "", "HPF at 200Hz"),
                RoleMixTarget::new(BassGuitar, -6.0, 0.0, "warm and defined", "moderate compression 4:1", "separate from kick in low-mid, DI+amp blend"),
                RoleMixTarget::new(ElectricGuitar, -8.0, -0.3, "mid-forward, biting", "light compression", "don't compete with vocal 2-4kHz range"),
                RoleMixTarget::new(AcousticGuitar, -10.0, 0.3, "open, strummy", "", "HPF at 100Hz, presence boost"),
                RoleMixTarget::new(LeadVocal, 0.0, 0.0, "clear, upfront, present", "moderate compression 3:1", "this is the star - sits above everything, de-ess if sibilant"),
                RoleMixTarget::new(BackingVocal, -6.0, 0.0, "supportive, blended", "medium compression", "4-6dB below lead vocal"),
                RoleMixTarget::new(Keys, -10.0, 0.2, "pad underneath", "", "stay out of vocal range"),
            ],
        });

        self.insert(GenrePreset {
            name: "jazz".into(),
            description: "Natural, dynamic, piano/bass/drums trio feel, minimal processing".into(),
            targets: vec![
                RoleMixTarget::new(Kick, -10.0, 0.0, "warm, natural", "very light or none", "let dynamics breathe, no heavy gating"),
                RoleMixTarget::new(Snare, -8.0, 0.0, "warm brush or stick", "very light", "no harsh processing"),
                RoleMixTarget::new(HiHat, -14.0, 0.3, "natural sizzle", "", ""),
                RoleMixTarget::new(Overhead, -6.0, 0.0, "primary drum image", "", "these carry the kit sound in jazz"),
                RoleMixTarget::new(BassGuitar, -4.0, 0.0, "warm, full, walking", "very light", "upright bass needs body, HPF only at 30Hz"),
                RoleMixTarget::new(Piano, 0.0, 0.0, "full, dynamic, rich", "none or very light", "often the lead - let it breathe"),
                RoleMixTarget::new(Keys, -4.0, 0.0, "natural, dynamic", "", ""),
                RoleMixTarget::new(ElectricGuitar, -6.0, 0.3, "clean, warm", "", "jazz guitar sits behind piano"),
                RoleMixTarget::new(LeadVocal, -2.0, 0.0, "intimate, warm", "very light 2:1", "jazz vocals are conversational, not arena"),
                RoleMixTarget::new(Saxophone, -2.0, 0.0, "rich, honky character", "", "don't over-EQ, natural is better"),
                RoleMixTarget::new(Trumpet, -4.0, 0.0, "bright but not harsh", "", "watch for harshness in upper register"),
            ],
        });

        self.insert(GenrePreset {
            name: "worship".into(),
            description: "Big pads, clear vocals, emotional dynamics, atmospheric".into(),
            targets: vec![
                RoleMixTarget::new(Kick, -8.0, 0.0, "modern click + sub", "moderate 4:1", "tight, controlled low-end, sub emphasis"),
                RoleMixTarget::new(Snare, -6.0, 0.0, "fat, reverbed", "moderate 3:1", "generous reverb, big snare sound"),
                RoleMixTarget::new(BassGuitar, -6.0, 0.0, "sub-heavy, smooth", "moderate compression", "stay below 200Hz primarily"),
                RoleMixTarget::new(ElectricGuitar, -10.0, 0.4, "ambient, washed", "", "lots of delay/reverb, textural not rhythmic"),
                RoleMixTarget::new(AcousticGuitar, -8.0, 0.3, "bright, rhythmic", "", "drives the rhythm in quieter sections"),
                RoleMixTarget::new(Keys, -6.0, 0.0, "big pads, atmospheric", "", "synth pads are foundational - warm and wide"),
                RoleMixTarget::new(Piano, -6.0, 0.0, "emotional, dynamic", "light", "let it lead in quiet moments"),
                RoleMixTarget::new(LeadVocal, 0.0, 0.0, "clear, emotional, present", "moderate 3:1", "the most important element - always intelligible"),
                RoleMixTarget::new(BackingVocal, -6.0, 0.0, "blended, lush", "moderate", "tight harmonies, cohesive with lead"),
                RoleMixTarget::new(Choir, -8.0, 0.0, "full, blended wash", "", "congregation feel, not individual voices"),
            ],
        });

        self.insert(GenrePreset {
            name: "edm".into(),
            description: "Loud, punchy, bass-heavy, everything compressed and controlled".into(),
            targets: vec![
                RoleMixTarget::new(Kick, -2.0, 0.0, "huge sub + transient click", "heavy compression 8:1", "sidechain everything to this"),
                RoleMixTarget::new(Snare, -4.0, 0.0, "layered, big clap/snare", "heavy compression", "reverb tail adds size"),
                RoleMixTarget::new(HiHat, -12.0, 0.3, "crisp, cutting", "", "precise, mechanical feel"),
                RoleMixTarget::new(BassGuitar, -2.0, 0.0, "massive sub, distorted mid", "heavy compression", "sidechain to kick, dominate the low-end"),
                RoleMixTarget::new(Synth, -6.0, 0.0, "leads bright, pads wide", "moderate", "automate filter sweeps"),
                RoleMixTarget::new(Keys, -8.0, 0.4, "pads: warm stereo, stabs: mono punch", "", ""),
                RoleMixTarget::new(LeadVocal, -2.0, 0.0, "processed, effected, upfront", "heavy compression 6:1", "autotune/vocoder acceptable, always audible"),
                RoleMixTarget::new(Playback, -4.0, 0.0, "full, matched to live elements", "", "blend seamlessly with live instruments"),
            ],
        });

        self.insert(GenrePreset {
            name: "acoustic".into(),
            description: "Intimate, natural, vocal-forward with minimal instrumentation".into(),
            targets: vec![
                RoleMixTarget::new(AcousticGuitar, -4.0, 0.0, "natural, warm, body", "light compression 2:1", "primary instrument - full range"),
                RoleMixTarget::new(LeadVocal, 0.0, 0.0, "intimate, clear, present", "light compression 2:1", "the whole show - above everything else"),
                RoleMixTarget::new(Piano, -4.0, 0.0, "natural, unprocessed", "none or very light", "pair with voice naturally"),
                RoleMixTarget::new(BassGuitar, -8.0, 0.0, "warm support", "light", "subtle foundation"),
                RoleMixTarget::new(Violin, -6.0, 0.2, "singing, expressive", "", "complement the vocal"),
                RoleMixTarget::new(BackingVocal, -8.0, 0.0, "gentle harmony", "light", "well behind the lead"),
            ],
        });
    }

    fn insert(&mut self, preset: GenrePreset) {
        self.presets.insert(preset.name.clone(), preset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_presets_present() {
        let lib = GenrePresetLibrary::new();
        for name in ["rock", "jazz", "worship", "edm", "acoustic"] {
            assert!(lib.get(name).is_some(), "missing preset {}", name);
        }
        assert!(lib.get("polka").is_none());
    }

    #[test]
    fn test_rock_lead_vocal_on_top() {
        let lib = GenrePresetLibrary::new();
        let rock = lib.get("rock").unwrap();
        let vocal = rock.target_for_role(InstrumentRole::LeadVocal).unwrap();
        let kick = rock.target_for_role(InstrumentRole::Kick).unwrap();
        assert!(vocal.target_rms_relative > kick.target_rms_relative);
    }

    #[test]
    fn test_to_json_omits_empty_fields() {
        let lib = GenrePresetLibrary::new();
        let jazz = lib.get("jazz").unwrap().to_json();
        assert_eq!(jazz["genre"], "jazz");

        let targets = jazz["targets"].as_array().unwrap();
        // HiHat in jazz has an empty notes field; it must be absent
        let hihat = targets.iter().find(|t| t["role"] == "HiHat").unwrap();
        assert!(hihat.get("notes").is_none());
        assert!(hihat.get("pan").is_some());
    }

    #[test]
    fn test_load_custom_preset_file() {
        let path = std::env::temp_dir().join("mixagent_genre_test.json");
        std::fs::write(
            &path,
            r#"{
                "genre": "surf",
                "description": "Reverb everywhere",
                "targets": [
                    {"role": "ElectricGuitar", "target_db_relative": -2.0, "eq_character": "drippy"}
                ]
            }"#,
        )
        .unwrap();

        let mut lib = GenrePresetLibrary::new();
        assert!(lib.load_from_file(&path));
        let surf = lib.get("surf").unwrap();
        assert_eq!(surf.targets.len(), 1);
        assert_eq!(surf.targets[0].role, InstrumentRole::ElectricGuitar);
        assert_eq!(surf.targets[0].eq_character, "drippy");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_or_invalid_file() {
        let mut lib = GenrePresetLibrary::new();
        assert!(!lib.load_from_file(Path::new("/nonexistent.json")));

        let path = std::env::temp_dir().join("mixagent_genre_bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(!lib.load_from_file(&path));
        std::fs::remove_file(&path).unwrap();
    }
}
