//! Name-based channel classification.
//!
//! An ordered, case-insensitive regex rule table maps console channel
//! names to instrument roles. First match wins; generic names ("CH 01")
//! deliberately land on a low-confidence Unknown so the spectral
//! classifier gets a chance.

use once_cell::sync::Lazy;
use regex::RegexBuilder;

use mix_core::{Confidence, InstrumentRole};

struct Rule {
    pattern: regex::Regex,
    role: InstrumentRole,
    group: &'static str,
    confidence: Confidence,
}

fn rule(pattern: &str, role: InstrumentRole, group: &'static str, confidence: Confidence) -> Rule {
    Rule {
        pattern: RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("invalid classifier rule"),
        role,
        group,
        confidence,
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    use Confidence::*;
    use InstrumentRole::*;

    vec![
        // Drums
        rule(r"^k(ic)?k$|bd|bass.?drum", Kick, "drums", High),
        rule(r"^sn(are)?$|snr", Snare, "drums", High),
        rule(r"h\.?h|hi.?hat|hihat|hh", HiHat, "drums", High),
        rule(r"^tom\s*[1-4]?$|^t[1-4]$|rack.?tom|floor.?tom", Tom, "drums", High),
        rule(r"^oh$|over.?head|cym(bal)?", Overhead, "drums", High),
        rule(r"room|amb(ience)?|kit.?mic", RoomMic, "drums", High),
        // Bass
        rule(r"^bass?\s*(d\.?i\.?|direct)?$|b\.d\.i\.?|bgtr", BassGuitar, "bass", High),
        rule(r"bass.?amp|b\.?amp", BassAmp, "bass", High),
        // Guitars
        rule(r"^e\.?gtr|elec.?git|e\.?guitar|gtr\s*[lr12]?$", ElectricGuitar, "guitars", High),
        rule(r"ac.?git|acoustic|a\.?gtr", AcousticGuitar, "guitars", High),
        // Keys
        rule(r"^pno$|piano|grand", Piano, "keys", High),
        rule(r"^keys?\s*[lr12]?$|keyboard", Keys, "keys", High),
        rule(r"organ|b3|hammond", Organ, "keys", High),
        rule(r"synth|moog|arp|poly|pad|seq", Synth, "keys", High),
        // Vocals
        rule(
            r"^(lead\s*)?vox\s*(l|r|lr|1|2)?$|^(lead\s*)?vocal|^lv$|^ld\.?vx",
            LeadVocal,
            "vocals",
            High,
        ),
        rule(r"bv\s*[1-4lr]?|b\.?v\.|back.?voc|backing|harmony|bg\.?voc", BackingVocal, "vocals", High),
        rule(r"choir|chorus", Choir, "vocals", High),
        rule(r"presenter|speaker|announce|mc$|host", Presenter, "vocals", High),
        rule(r"talk.?back|tb$|comm", Talkback, "talkback", High),
        // Brass / strings
        rule(r"tpt|trumpet|trp", Trumpet, "brass", High),
        rule(r"sax|alto|tenor|bari", Saxophone, "brass", High),
        rule(r"vln|violin|fiddle", Violin, "strings", High),
        // Playback / FX
        rule(r"playback|track[s]?|click|backing.?track|bt$", Playback, "playback", High),
        rule(r"^fx\s*ret|return|rev.?return|delay.?ret", FxReturn, "fx", High),
        rule(r"^d\.?i\.?$|direct", Di, "misc", Medium),
        // Low-confidence fallbacks for generic names
        rule(r"^ch\s*\d+$|^input\s*\d+$|^mic\s*\d+$|^\d+$", InstrumentRole::Unknown, "unknown", Low),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub role: InstrumentRole,
    pub group: String,
    pub confidence: Confidence,
}

#[derive(Debug, Default)]
pub struct NameClassifier;

impl NameClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, name: &str) -> Classification {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Classification {
                role: InstrumentRole::Unknown,
                group: "unknown".into(),
                confidence: Confidence::Unknown,
            };
        }

        for rule in RULES.iter() {
            if rule.pattern.is_match(trimmed) {
                return Classification {
                    role: rule.role,
                    group: rule.group.into(),
                    confidence: rule.confidence,
                };
            }
        }

        // No match: unknown but the channel has a custom name
        Classification {
            role: InstrumentRole::Unknown,
            group: "unknown".into(),
            confidence: Confidence::Low,
        }
    }
}
