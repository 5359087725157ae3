//! Spectral channel classification.
//!
//! Matches a channel's spectral fingerprint against built-in instrument
//! templates. Each template scores four band windows plus a crest factor
//! window; scores fall off linearly outside a window (12 dB to zero).
//! Used when the name classifier comes back Low or Unknown.

use mix_core::InstrumentRole;

use crate::discovery::profile::Fingerprint;

/// Minimum score for any classification at all.
const ACCEPT_THRESHOLD: f32 = 0.4;
/// Score at which a match is considered strong.
pub const STRONG_MATCH: f32 = 0.6;

#[derive(Debug, Clone, Copy)]
struct BandExpectation {
    min_db: f32,
    max_db: f32,
    weight: f32,
}

struct SpectralProfile {
    role: InstrumentRole,
    group: &'static str,
    /// 20-80 Hz
    sub: BandExpectation,
    /// 80-250 Hz
    bass: BandExpectation,
    /// 500 Hz-2 kHz
    mid: BandExpectation,
    /// 6-10 kHz
    presence: BandExpectation,
    min_crest: f32,
    max_crest: f32,
}

#[derive(Debug, Clone)]
pub struct SpectralMatch {
    pub role: InstrumentRole,
    pub group: String,
    /// 0.0-1.0
    pub match_score: f32,
}

pub struct SpectralClassifier {
    profiles: Vec<SpectralProfile>,
}

impl Default for SpectralClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn band(min_db: f32, max_db: f32, weight: f32) -> BandExpectation {
    BandExpectation { min_db, max_db, weight }
}

impl SpectralClassifier {
    pub fn new() -> Self {
        use InstrumentRole::*;
        let profiles = vec![
            // Kick: strong sub/bass, percussive, minimal high end
            SpectralProfile {
                role: Kick,
                group: "drums",
                sub: band(-10.0, 0.0, 2.0),
                bass: band(-10.0, 0.0, 2.0),
                mid: band(-30.0, -10.0, 1.0),
                presence: band(-40.0, -15.0, 0.5),
                min_crest: 8.0,
                max_crest: 30.0,
            },
            // Snare: strong mid, percussive
            SpectralProfile {
                role: Snare,
                group: "drums",
                sub: band(-40.0, -20.0, 1.0),
                bass: band(-20.0, -5.0, 1.0),
                mid: band(-10.0, 2.0, 2.0),
                presence: band(-20.0, -5.0, 1.5),
                min_crest: 10.0,
                max_crest: 35.0,
            },
            // Hi-hat: mostly high frequency energy
            SpectralProfile {
                role: HiHat,
                group: "drums",
                sub: band(-70.0, -40.0, 1.0),
                bass: band(-60.0, -30.0, 1.0),
                mid: band(-30.0, -10.0, 1.0),
                presence: band(-5.0, 5.0, 2.5),
                min_crest: 15.0,
                max_crest: 40.0,
            },
            // Bass guitar: strong bass/low-mid, sustained
            SpectralProfile {
                role: BassGuitar,
                group: "bass",
                sub: band(-5.0, 5.0, 1.5),
                bass: band(-5.0, 5.0, 2.0),
                mid: band(-20.0, -5.0, 1.0),
                presence: band(-45.0, -20.0, 0.5),
                min_crest: 2.0,
                max_crest: 8.0,
            },
            // Lead vocal: concentrated mid/upper-mid
            SpectralProfile {
                role: LeadVocal,
                group: "vocals",
                sub: band(-50.0, -25.0, 0.5),
                bass: band(-25.0, -5.0, 1.0),
                mid: band(-10.0, 3.0, 2.0),
                presence: band(-20.0, -5.0, 1.5),
                min_crest: 4.0,
                max_crest: 12.0,
            },
            // Electric guitar: mid-heavy
            SpectralProfile {
                role: ElectricGuitar,
                group: "guitars",
                sub: band(-60.0, -30.0, 1.0),
                bass: band(-30.0, -10.0, 1.0),
                mid: band(-5.0, 5.0, 2.0),
                presence: band(-20.0, -5.0, 1.0),
                min_crest: 3.0,
                max_crest: 10.0,
            },
            // Acoustic guitar: broad midrange
            SpectralProfile {
                role: AcousticGuitar,
                group: "guitars",
                sub: band(-50.0, -30.0, 1.0),
                bass: band(-20.0, -5.0, 1.5),
                mid: band(-10.0, 3.0, 2.0),
                presence: band(-15.0, 0.0, 1.5),
                min_crest: 4.0,
                max_crest: 12.0,
            },
            // Piano: broad, full range
            SpectralProfile {
                role: Piano,
                group: "keys",
                sub: band(-30.0, -10.0, 1.0),
                bass: band(-15.0, -5.0, 1.5),
                mid: band(-10.0, 0.0, 2.0),
                presence: band(-15.0, -5.0, 1.5),
                min_crest: 5.0,
                max_crest: 15.0,
            },
            // Overheads: broadband, lots of high end
            SpectralProfile {
                role: Overhead,
                group: "drums",
                sub: band(-30.0, -10.0, 1.0),
                bass: band(-25.0, -10.0, 1.0),
                mid: band(-15.0, -5.0, 1.5),
                presence: band(-5.0, 5.0, 2.0),
                min_crest: 6.0,
                max_crest: 20.0,
            },
            // Tom: similar to kick but more mid
            SpectralProfile {
                role: Tom,
                group: "drums",
                sub: band(-15.0, -5.0, 1.5),
                bass: band(-10.0, 0.0, 2.0),
                mid: band(-15.0, 0.0, 1.5),
                presence: band(-30.0, -10.0, 0.5),
                min_crest: 8.0,
                max_crest: 25.0,
            },
        ];
        Self { profiles }
    }

    pub fn classify(&self, fp: &Fingerprint) -> SpectralMatch {
        if !fp.has_signal {
            return SpectralMatch {
                role: InstrumentRole::NoSignal,
                group: "inactive".into(),
                match_score: 0.0,
            };
        }

        let mut best_score = 0.0f32;
        let mut best: Option<&SpectralProfile> = None;
        for profile in &self.profiles {
            let score = match_score(fp, profile);
            if score > best_score {
                best_score = score;
                best = Some(profile);
            }
        }

        match best {
            Some(profile) if best_score >= ACCEPT_THRESHOLD => SpectralMatch {
                role: profile.role,
                group: profile.group.into(),
                match_score: best_score,
            },
            _ => SpectralMatch {
                role: InstrumentRole::Unknown,
                group: "unknown".into(),
                match_score: best_score,
            },
        }
    }
}

fn match_score(fp: &Fingerprint, profile: &SpectralProfile) -> f32 {
    let mut total_weight = 0.0f32;
    let mut weighted_score = 0.0f32;

    let mut score_band = |energy: f32, exp: &BandExpectation| {
        if exp.weight == 0.0 {
            return;
        }
        let score = if energy >= exp.min_db && energy <= exp.max_db {
            1.0
        } else {
            let dist = (energy - exp.min_db).abs().min((energy - exp.max_db).abs());
            (1.0 - dist / 12.0).max(0.0)
        };
        weighted_score += score * exp.weight;
        total_weight += exp.weight;
    };

    score_band(fp.sub_bass_energy, &profile.sub);
    score_band(fp.bass_energy, &profile.bass);
    score_band(fp.mid_energy, &profile.mid);
    score_band(fp.presence_energy, &profile.presence);

    // Crest factor window counts double
    if fp.crest_factor >= profile.min_crest && fp.crest_factor <= profile.max_crest {
        weighted_score += 2.0;
    }
    total_weight += 2.0;

    if total_weight > 0.0 {
        weighted_score / total_weight
    } else {
        0.0
    }
}
