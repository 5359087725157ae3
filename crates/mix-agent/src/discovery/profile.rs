//! Channel profile: everything discovery knows about one channel.

use std::time::Instant;

use mix_core::{Confidence, InstrumentRole, DB_FLOOR};

/// Spectral fingerprint captured at discovery time.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint {
    pub dominant_freq_hz: f32,
    pub spectral_centroid: f32,
    /// 20-80 Hz
    pub sub_bass_energy: f32,
    /// 80-250 Hz
    pub bass_energy: f32,
    /// 250-500 Hz
    pub low_mid_energy: f32,
    /// 500-2k Hz
    pub mid_energy: f32,
    /// 2k-6k Hz
    pub upper_mid_energy: f32,
    /// 6k-10k Hz
    pub presence_energy: f32,
    /// 10k-20k Hz
    pub air_energy: f32,
    pub crest_factor: f32,
    pub average_rms: f32,
    pub has_signal: bool,
    /// high crest factor
    pub is_percussive: bool,
    /// energy across all bands
    pub is_broadband: bool,
    /// energy concentrated in one region
    pub is_narrowband: bool,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            dominant_freq_hz: 0.0,
            spectral_centroid: 0.0,
            sub_bass_energy: DB_FLOOR,
            bass_energy: DB_FLOOR,
            low_mid_energy: DB_FLOOR,
            mid_energy: DB_FLOOR,
            upper_mid_energy: DB_FLOOR,
            presence_energy: DB_FLOOR,
            air_energy: DB_FLOOR,
            crest_factor: 0.0,
            average_rms: DB_FLOOR,
            has_signal: false,
            is_percussive: false,
            is_broadband: false,
            is_narrowband: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelProfile {
    /// 1-based physical channel number
    pub index: u16,
    /// raw name from the console ("Kick", "CH 01", "")
    pub console_name: String,
    /// cleaned up ("kick", "ch01", "")
    pub normalised_name: String,

    pub role: InstrumentRole,
    pub group: String,
    pub confidence: Confidence,

    pub fingerprint: Fingerprint,

    // Console state at discovery
    pub fader_norm: f32,
    pub muted: bool,
    pub gain_db: f32,
    pub phantom_power: bool,
    pub phase_invert: bool,
    /// current HPF setting, 0 = off
    pub high_pass_hz: f32,

    pub stereo_pair: Option<u16>,

    pub discovered_at: Instant,
    pub last_updated: Instant,
    /// LLM's free-text observations
    pub llm_notes: String,
    /// engineer corrected the inferred role
    pub manually_overridden: bool,
}

impl ChannelProfile {
    pub fn new(index: u16) -> Self {
        let now = Instant::now();
        Self {
            index,
            console_name: String::new(),
            normalised_name: String::new(),
            role: InstrumentRole::Unknown,
            group: "unknown".into(),
            confidence: Confidence::Unknown,
            fingerprint: Fingerprint::default(),
            fader_norm: 0.75,
            muted: false,
            gain_db: 0.0,
            phantom_power: false,
            phase_invert: false,
            high_pass_hz: 0.0,
            stereo_pair: None,
            discovered_at: now,
            last_updated: now,
            llm_notes: String::new(),
            manually_overridden: false,
        }
    }
}
