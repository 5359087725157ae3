//! Per-channel analysis and mix issue detection.
//!
//! Runs every DSP tick. Merges console meters with the latest FFT results
//! (FFT wins when present; the reverse direction is not permitted) and
//! reduces the result to a compact list of typed issues for the LLM.

use parking_lot::Mutex;

use mix_core::{ConsoleModel, DB_FLOOR, SIGNAL_THRESHOLD_DB};

use crate::fft::FftResult;

/// Analysis of a single channel for one tick.
#[derive(Debug, Clone)]
pub struct ChannelAnalysis {
    pub channel: u16,
    pub rms_db: f32,
    pub peak_db: f32,
    pub crest_factor: f32,
    /// peak > -0.5 dBFS
    pub is_clipping: bool,
    /// sustained narrowband tone
    pub is_feedback_risk: bool,
    pub dominant_freq_hz: f32,
    pub spectral_centroid: f32,

    pub sub_bass: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub upper_mid: f32,
    pub presence: f32,
    pub air: f32,

    /// true when the band fields above came from a real FFT
    pub has_fft_data: bool,
}

/// Whole-mix analysis for one tick.
#[derive(Debug, Clone, Default)]
pub struct MixAnalysis {
    pub channels: Vec<ChannelAnalysis>,
    pub warnings: Vec<String>,
    pub has_feedback_risk: bool,
    pub has_clipping: bool,
    pub clipping_channel: u16,
}

/// Issue categories surfaced to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Clipping,
    FeedbackRisk,
    Masking,
    /// excess low-mid energy
    Boomy,
    /// excess upper-mid energy
    Harsh,
    /// lacking presence relative to bass
    Thin,
    /// excess bass buildup across the mix
    Muddy,
    /// main bus close to clipping
    NoHeadroom,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Clipping => "clipping",
            IssueKind::FeedbackRisk => "feedback_risk",
            IssueKind::Masking => "masking",
            IssueKind::Boomy => "boomy",
            IssueKind::Harsh => "harsh",
            IssueKind::Thin => "thin",
            IssueKind::Muddy => "muddy",
            IssueKind::NoHeadroom => "no_headroom",
        }
    }
}

/// One concise, actionable issue.
#[derive(Debug, Clone)]
pub struct MixIssue {
    pub kind: IssueKind,
    pub channel: u16,
    /// second channel for masking pairs
    pub channel2: u16,
    pub freq_hz: f32,
    /// 0.0-1.0
    pub severity: f32,
    pub description: String,
}

struct MaskingResult {
    is_masking: bool,
    overlap_db: f32,
    suggested_cut_hz: f32,
}

/// Merges meter and FFT data and derives issues.
#[derive(Default)]
pub struct AudioAnalyser {
    fft_results: Mutex<Vec<Option<FftResult>>>,
}

impl AudioAnalyser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a fresh FFT result for a channel (DSP thread, after the FFT).
    pub fn update_fft(&self, channel: u16, result: FftResult) {
        if channel < 1 {
            return;
        }
        let mut cache = self.fft_results.lock();
        if cache.len() < channel as usize {
            cache.resize(channel as usize, None);
        }
        cache[channel as usize - 1] = Some(result);
    }

    pub fn has_fft_data(&self) -> bool {
        self.fft_results.lock().iter().any(|r| r.is_some())
    }

    /// Analyse the current model state for the given channel range.
    pub fn analyse(&self, model: &ConsoleModel, channel_count: u16) -> MixAnalysis {
        let mut result = MixAnalysis::default();

        for ch in 1..=channel_count {
            let Some(snap) = model.channel(ch) else { continue };

            let mut ca = ChannelAnalysis {
                channel: ch,
                rms_db: snap.rms_db,
                peak_db: snap.peak_db,
                crest_factor: snap.peak_db - snap.rms_db,
                is_clipping: snap.peak_db > -0.5,
                is_feedback_risk: false,
                dominant_freq_hz: snap.spectral.centroid,
                spectral_centroid: snap.spectral.centroid,
                sub_bass: DB_FLOOR,
                bass: snap.spectral.bass,
                low_mid: DB_FLOOR,
                mid: snap.spectral.mid,
                upper_mid: DB_FLOOR,
                presence: snap.spectral.presence,
                air: DB_FLOOR,
                has_fft_data: false,
            };

            let fft = {
                let cache = self.fft_results.lock();
                cache
                    .get(ch as usize - 1)
                    .and_then(|r| *r)
                    .filter(|r| r.has_signal)
            };

            if let Some(fft) = fft {
                ca.has_fft_data = true;
                ca.dominant_freq_hz = fft.dominant_freq_hz;
                ca.spectral_centroid = fft.spectral_centroid;
                ca.sub_bass = fft.bands.sub_bass;
                ca.bass = fft.bands.bass;
                ca.low_mid = fft.bands.low_mid;
                ca.mid = fft.bands.mid;
                ca.upper_mid = fft.bands.upper_mid;
                ca.presence = fft.bands.presence;
                ca.air = fft.bands.air;
                if fft.rms_db > -95.0 {
                    ca.rms_db = fft.rms_db;
                    ca.peak_db = fft.peak_db;
                    ca.crest_factor = fft.crest_factor;
                    ca.is_clipping = fft.peak_db > -0.5;
                }
            }

            if ca.rms_db > -12.0 && ca.crest_factor < 3.0 {
                ca.is_feedback_risk = true;
                result.has_feedback_risk = true;
                result.warnings.push(format!(
                    "Feedback risk ch{} @{}Hz (crest={}dB)",
                    ch, ca.dominant_freq_hz as i32, ca.crest_factor as i32
                ));
            }

            if ca.is_clipping {
                result.has_clipping = true;
                result.clipping_channel = ch;
                result
                    .warnings
                    .push(format!("Clipping ch{} (peak={:.1}dBFS)", ch, ca.peak_db));
            }

            result.channels.push(ca);
        }

        result
    }

    /// Reduce an analysis to typed issues for LLM consumption.
    pub fn detect_issues(&self, analysis: &MixAnalysis) -> Vec<MixIssue> {
        let mut issues = Vec::new();

        for ch in &analysis.channels {
            if ch.rms_db < SIGNAL_THRESHOLD_DB {
                continue;
            }

            if ch.is_clipping {
                issues.push(MixIssue {
                    kind: IssueKind::Clipping,
                    channel: ch.channel,
                    channel2: 0,
                    freq_hz: 0.0,
                    severity: ((ch.peak_db + 3.0) / 3.0).clamp(0.0, 1.0),
                    description: format!("ch{} clipping (peak {:.1}dB)", ch.channel, ch.peak_db),
                });
            }

            if ch.is_feedback_risk {
                issues.push(MixIssue {
                    kind: IssueKind::FeedbackRisk,
                    channel: ch.channel,
                    channel2: 0,
                    freq_hz: ch.dominant_freq_hz,
                    severity: ((-ch.crest_factor + 6.0) / 6.0).clamp(0.0, 1.0),
                    description: format!(
                        "ch{} feedback risk @{}Hz",
                        ch.channel, ch.dominant_freq_hz as i32
                    ),
                });
            }

            // Spectral categories need real FFT data
            if !ch.has_fft_data {
                continue;
            }

            if ch.low_mid > -12.0 && ch.low_mid > ch.mid + 6.0 {
                issues.push(MixIssue {
                    kind: IssueKind::Boomy,
                    channel: ch.channel,
                    channel2: 0,
                    freq_hz: 350.0,
                    severity: ((ch.low_mid + 6.0) / 12.0).clamp(0.0, 1.0),
                    description: format!("ch{} boomy (low-mid {:.1}dB)", ch.channel, ch.low_mid),
                });
            }

            if ch.upper_mid > -10.0 && ch.upper_mid > ch.mid + 4.0 {
                issues.push(MixIssue {
                    kind: IssueKind::Harsh,
                    channel: ch.channel,
                    channel2: 0,
                    freq_hz: 3500.0,
                    severity: ((ch.upper_mid + 6.0) / 12.0).clamp(0.0, 1.0),
                    description: format!("ch{} harsh (upper-mid {:.1}dB)", ch.channel, ch.upper_mid),
                });
            }

            if ch.presence < -30.0 && ch.bass > -15.0 && ch.bass - ch.presence > 15.0 {
                issues.push(MixIssue {
                    kind: IssueKind::Thin,
                    channel: ch.channel,
                    channel2: 0,
                    freq_hz: 5000.0,
                    severity: ((ch.bass - ch.presence) / 20.0).clamp(0.0, 1.0),
                    description: format!("ch{} thin (presence {:.1}dB)", ch.channel, ch.presence),
                });
            }
        }

        // Masking: pairwise comparison of active channels with FFT data
        for i in 0..analysis.channels.len() {
            let a = &analysis.channels[i];
            if a.rms_db < -40.0 || !a.has_fft_data {
                continue;
            }
            for b in &analysis.channels[i + 1..] {
                if b.rms_db < -40.0 || !b.has_fft_data {
                    continue;
                }
                let masking = check_masking(a, b);
                if masking.is_masking {
                    issues.push(MixIssue {
                        kind: IssueKind::Masking,
                        channel: a.channel,
                        channel2: b.channel,
                        freq_hz: masking.suggested_cut_hz,
                        severity: ((masking.overlap_db + 12.0) / 12.0).clamp(0.0, 1.0),
                        description: format!(
                            "ch{} & ch{} masking @{}Hz",
                            a.channel, b.channel, masking.suggested_cut_hz as i32
                        ),
                    });
                }
            }
        }

        issues
    }
}

fn check_masking(a: &ChannelAnalysis, b: &ChannelAnalysis) -> MaskingResult {
    let mut r = MaskingResult { is_masking: false, overlap_db: 0.0, suggested_cut_hz: 0.0 };

    // Bass overlap (kick vs bass guitar)
    let bass_overlap = a.bass.min(b.bass);
    if bass_overlap > -15.0 && (a.bass - b.bass).abs() < 6.0 {
        r.is_masking = true;
        r.overlap_db = bass_overlap;
        r.suggested_cut_hz = 200.0;
    }

    // Low-mid overlap (guitar vs keys)
    let low_mid_overlap = a.low_mid.min(b.low_mid);
    if low_mid_overlap > -12.0 && (a.low_mid - b.low_mid).abs() < 5.0 {
        r.is_masking = true;
        r.overlap_db = low_mid_overlap;
        r.suggested_cut_hz = 400.0;
    }

    // Mid overlap (guitar vs vocal)
    let mid_overlap = a.mid.min(b.mid);
    if mid_overlap > -12.0 && (a.mid - b.mid).abs() < 4.0 {
        r.is_masking = true;
        r.overlap_db = mid_overlap;
        r.suggested_cut_hz = 2000.0;
    }

    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::{BandEnergy, FftResult};

    fn fft_result(bands: BandEnergy, rms: f32, peak: f32) -> FftResult {
        FftResult {
            bands,
            spectral_centroid: 500.0,
            dominant_freq_hz: 500.0,
            rms_db: rms,
            peak_db: peak,
            crest_factor: peak - rms,
            has_signal: true,
        }
    }

    fn quiet_bands() -> BandEnergy {
        BandEnergy::default()
    }

    fn model_with_channels(n: u16) -> ConsoleModel {
        let m = ConsoleModel::new();
        m.init(n, 4);
        m
    }

    #[test]
    fn test_clipping_detection() {
        let model = model_with_channels(2);
        model.update_meter(1, -6.0, -0.2);
        model.update_meter(2, -20.0, -12.0);

        let analyser = AudioAnalyser::new();
        let analysis = analyser.analyse(&model, 2);
        assert!(analysis.has_clipping);
        assert_eq!(analysis.clipping_channel, 1);

        let issues = analyser.detect_issues(&analysis);
        assert!(issues.iter().any(|i| i.kind == IssueKind::Clipping && i.channel == 1));
        assert!(!issues.iter().any(|i| i.channel == 2));
    }

    #[test]
    fn test_feedback_risk_low_crest() {
        let model = model_with_channels(1);
        let analyser = AudioAnalyser::new();

        // Sustained loud tone: RMS -8, peak -6 -> crest 2dB
        let mut bands = quiet_bands();
        bands.mid = -8.0;
        analyser.update_fft(1, fft_result(bands, -8.0, -6.0));

        let analysis = analyser.analyse(&model, 1);
        assert!(analysis.has_feedback_risk);
        let issues = analyser.detect_issues(&analysis);
        assert!(issues.iter().any(|i| i.kind == IssueKind::FeedbackRisk));
    }

    #[test]
    fn test_boomy_and_harsh_thresholds() {
        let model = model_with_channels(2);
        let analyser = AudioAnalyser::new();

        let mut boomy = quiet_bands();
        boomy.low_mid = -8.0;
        boomy.mid = -20.0;
        analyser.update_fft(1, fft_result(boomy, -18.0, -6.0));

        let mut harsh = quiet_bands();
        harsh.upper_mid = -8.0;
        harsh.mid = -16.0;
        analyser.update_fft(2, fft_result(harsh, -18.0, -6.0));

        let analysis = analyser.analyse(&model, 2);
        let issues = analyser.detect_issues(&analysis);
        assert!(issues.iter().any(|i| i.kind == IssueKind::Boomy && i.channel == 1));
        assert!(issues.iter().any(|i| i.kind == IssueKind::Harsh && i.channel == 2));
    }

    #[test]
    fn test_thin_detection() {
        let model = model_with_channels(1);
        let analyser = AudioAnalyser::new();

        let mut thin = quiet_bands();
        thin.bass = -10.0;
        thin.presence = -35.0;
        analyser.update_fft(1, fft_result(thin, -20.0, -8.0));

        let analysis = analyser.analyse(&model, 1);
        let issues = analyser.detect_issues(&analysis);
        assert!(issues.iter().any(|i| i.kind == IssueKind::Thin));
    }

    #[test]
    fn test_masking_pair() {
        let model = model_with_channels(2);
        let analyser = AudioAnalyser::new();

        let mut a = quiet_bands();
        a.bass = -10.0;
        let mut b = quiet_bands();
        b.bass = -12.0;
        analyser.update_fft(1, fft_result(a, -15.0, -5.0));
        analyser.update_fft(2, fft_result(b, -15.0, -5.0));

        let analysis = analyser.analyse(&model, 2);
        let issues = analyser.detect_issues(&analysis);
        let masking = issues.iter().find(|i| i.kind == IssueKind::Masking).unwrap();
        assert_eq!(masking.channel, 1);
        assert_eq!(masking.channel2, 2);
        assert_eq!(masking.freq_hz, 200.0);
    }

    #[test]
    fn test_spectral_issues_suppressed_without_fft() {
        let model = model_with_channels(1);
        // Loud meters but no FFT data: no boomy/harsh/thin possible
        model.update_meter(1, -10.0, -4.0);

        let analyser = AudioAnalyser::new();
        let analysis = analyser.analyse(&model, 1);
        let issues = analyser.detect_issues(&analysis);
        assert!(!issues.iter().any(|i| matches!(
            i.kind,
            IssueKind::Boomy | IssueKind::Harsh | IssueKind::Thin | IssueKind::Masking
        )));
    }

    #[test]
    fn test_silent_channels_skipped() {
        let model = model_with_channels(1);
        let analyser = AudioAnalyser::new();
        // Silent: RMS stays at floor
        let analysis = analyser.analyse(&model, 1);
        assert!(analyser.detect_issues(&analysis).is_empty());
    }

    #[test]
    fn test_fft_overrides_meter_levels() {
        let model = model_with_channels(1);
        model.update_meter(1, -40.0, -30.0);

        let analyser = AudioAnalyser::new();
        let mut bands = quiet_bands();
        bands.mid = -10.0;
        analyser.update_fft(1, fft_result(bands, -12.0, -2.0));

        let analysis = analyser.analyse(&model, 1);
        assert_eq!(analysis.channels[0].rms_db, -12.0);
        assert!(analysis.channels[0].has_fft_data);
    }

    #[test]
    fn test_severity_normalised() {
        let model = model_with_channels(1);
        model.update_meter(1, -4.0, 2.5);
        let analyser = AudioAnalyser::new();
        let issues = analyser.detect_issues(&analyser.analyse(&model, 1));
        for issue in issues {
            assert!(issue.severity >= 0.0 && issue.severity <= 1.0);
        }
    }
}
