//! Stereo pair detection on adjacent channels.
//!
//! Score = name root match (0.6) + shared known role (0.2) +
//! dominant-frequency similarity (0.2); pairs above 0.5 are linked.

use crate::discovery::profile::{ChannelProfile, Fingerprint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoPair {
    pub left: u16,
    pub right: u16,
    pub confidence: f32,
}

#[derive(Debug, Default)]
pub struct StereoPairDetector;

impl StereoPairDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, channels: &[ChannelProfile]) -> Vec<StereoPair> {
        let mut pairs = Vec::new();

        for window in channels.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            // Only adjacent physical channels pair
            if b.index != a.index + 1 {
                continue;
            }

            let mut score = 0.0f32;
            if name_implies_pair(&a.console_name, &b.console_name) {
                score += 0.6;
            }
            if a.role == b.role && a.role != mix_core::InstrumentRole::Unknown {
                score += 0.2;
            }
            score += spectral_similarity(&a.fingerprint, &b.fingerprint) * 0.2;

            if score > 0.5 {
                pairs.push(StereoPair { left: a.index, right: b.index, confidence: score });
            }
        }
        pairs
    }
}

fn name_implies_pair(a: &str, b: &str) -> bool {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let root_a = strip_suffix(&a);
    let root_b = strip_suffix(&b);
    !root_a.is_empty() && root_a == root_b
}

/// Strip a trailing L/R/1/2 plus any separators around it.
fn strip_suffix(s: &str) -> String {
    let mut s: Vec<char> = s.chars().collect();
    let is_sep = |c: char| c == ' ' || c == '-' || c == '/' || c == '_';

    while s.last().is_some_and(|&c| is_sep(c)) {
        s.pop();
    }
    if s.last().is_some_and(|&c| matches!(c, 'l' | 'r' | '1' | '2')) {
        s.pop();
        while s.last().is_some_and(|&c| is_sep(c)) {
            s.pop();
        }
    }
    s.into_iter().collect()
}

fn spectral_similarity(a: &Fingerprint, b: &Fingerprint) -> f32 {
    if !a.has_signal || !b.has_signal {
        return 0.0;
    }
    let max_freq = a.dominant_freq_hz.max(b.dominant_freq_hz);
    if max_freq < 1.0 {
        return 0.0;
    }
    let diff = (a.dominant_freq_hz - b.dominant_freq_hz).abs() / max_freq;
    (1.0 - diff).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mix_core::{Confidence, InstrumentRole};

    fn profile(index: u16, name: &str, role: InstrumentRole) -> ChannelProfile {
        let mut p = ChannelProfile::new(index);
        p.console_name = name.into();
        p.role = role;
        p.confidence = Confidence::High;
        p
    }

    #[test]
    fn test_lr_suffix_pair() {
        let channels = vec![
            profile(15, "GTR L", InstrumentRole::ElectricGuitar),
            profile(16, "GTR R", InstrumentRole::ElectricGuitar),
        ];
        let pairs = StereoPairDetector::new().detect(&channels);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].left, 15);
        assert_eq!(pairs[0].right, 16);
        assert!(pairs[0].confidence > 0.5);
    }

    #[test]
    fn test_numeric_suffix_pair() {
        let channels = vec![
            profile(7, "OH 1", InstrumentRole::Overhead),
            profile(8, "OH 2", InstrumentRole::Overhead),
        ];
        let pairs = StereoPairDetector::new().detect(&channels);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_non_adjacent_not_paired() {
        let channels = vec![
            profile(1, "Keys L", InstrumentRole::Keys),
            profile(5, "Keys R", InstrumentRole::Keys),
        ];
        assert!(StereoPairDetector::new().detect(&channels).is_empty());
    }

    #[test]
    fn test_unrelated_names_not_paired() {
        let channels = vec![
            profile(1, "Kick", InstrumentRole::Kick),
            profile(2, "Snare", InstrumentRole::Snare),
        ];
        assert!(StereoPairDetector::new().detect(&channels).is_empty());
    }

    #[test]
    fn test_same_role_alone_is_not_enough() {
        // Two adjacent vocals with different names: role (0.2) + some
        // spectral similarity cannot pass 0.5 without a shared name root
        let channels = vec![
            profile(3, "Vox Anna", InstrumentRole::LeadVocal),
            profile(4, "Vox Ben", InstrumentRole::LeadVocal),
        ];
        let pairs = StereoPairDetector::new().detect(&channels);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_suffix_stripping() {
        assert_eq!(strip_suffix("gtr l"), "gtr");
        assert_eq!(strip_suffix("gtr-r"), "gtr");
        assert_eq!(strip_suffix("keys_1"), "keys");
        assert_eq!(strip_suffix("oh 2"), "oh");
        assert_eq!(strip_suffix("kick"), "kick");
        // A bare trailing "l" is stripped even without a separator
        assert_eq!(strip_suffix("vocal"), "voca");
    }

    #[test]
    fn test_empty_names_not_paired() {
        let channels = vec![
            profile(1, "", InstrumentRole::Unknown),
            profile(2, "", InstrumentRole::Unknown),
        ];
        assert!(StereoPairDetector::new().detect(&channels).is_empty());
    }
}
