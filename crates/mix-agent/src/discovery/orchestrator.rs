//! Discovery orchestration.
//!
//! Startup sequence: full console sync -> settle -> fingerprint capture
//! from the model -> name classification -> spectral fallback for
//! low-confidence names -> stereo pair detection -> map update -> async
//! LLM review that re-applies corrected profiles when it lands.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mix_console::ConsoleAdapter;
use mix_core::{Confidence, ConsoleModel, SIGNAL_THRESHOLD_DB};
use mix_llm::LlmEngine;

use crate::discovery::map::ChannelMap;
use crate::discovery::name_classifier::NameClassifier;
use crate::discovery::profile::{ChannelProfile, Fingerprint};
use crate::discovery::review::LlmDiscoveryReview;
use crate::discovery::spectral_classifier::{SpectralClassifier, STRONG_MATCH};
use crate::discovery::stereo::StereoPairDetector;

const SYNC_TIMEOUT: Duration = Duration::from_secs(10);
const SYNC_POLL: Duration = Duration::from_millis(100);
const SETTLE_DELAY: Duration = Duration::from_millis(500);

pub struct DiscoveryOrchestrator {
    name_classifier: NameClassifier,
    spectral_classifier: SpectralClassifier,
    pair_detector: StereoPairDetector,
}

impl Default for DiscoveryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryOrchestrator {
    pub fn new() -> Self {
        Self {
            name_classifier: NameClassifier::new(),
            spectral_classifier: SpectralClassifier::new(),
            pair_detector: StereoPairDetector::new(),
        }
    }

    /// Run discovery. Blocks through the sync and local classification;
    /// the LLM review continues on its own thread.
    ///
    /// `name_updates` is the agent's counter of Name parameter updates
    /// seen so far; sync completion is judged against it.
    pub fn run(
        &self,
        adapter: &Arc<dyn ConsoleAdapter>,
        model: &Arc<ConsoleModel>,
        map: &Arc<ChannelMap>,
        llm: &Arc<LlmEngine>,
        name_updates: &Arc<AtomicUsize>,
    ) {
        let caps = adapter.capabilities();
        log::info!("=== Starting Channel Discovery ===");
        log::info!(
            "Console: {} ({} channels, {} buses)",
            caps.model,
            caps.channel_count,
            caps.bus_count
        );

        // 1. Full state sync, judged by Name updates received
        let expected = (caps.channel_count + caps.bus_count) as usize;
        let baseline = name_updates.load(Ordering::Relaxed);
        adapter.request_full_sync();

        let deadline = Instant::now() + SYNC_TIMEOUT;
        loop {
            let received = name_updates.load(Ordering::Relaxed) - baseline;
            if received >= expected {
                log::info!("Full sync complete - {} names received", received);
                break;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Full sync timed out - proceeding with partial state ({}/{})",
                    received,
                    expected
                );
                break;
            }
            std::thread::sleep(SYNC_POLL);
        }

        // 2. Let meters/FFT settle before fingerprinting
        std::thread::sleep(SETTLE_DELAY);

        // 3+4. Capture fingerprints and build initial profiles
        let mut profiles = Vec::with_capacity(caps.channel_count as usize);
        for ch in 1..=caps.channel_count {
            let Some(snap) = model.channel(ch) else { continue };

            let mut profile = ChannelProfile::new(ch);
            profile.console_name = snap.name.clone();
            profile.normalised_name = snap.name.trim().to_lowercase();
            profile.fader_norm = snap.fader;
            profile.muted = snap.muted;
            profile.gain_db = snap.gain_db;
            profile.phantom_power = snap.phantom;
            profile.phase_invert = snap.phase;
            profile.high_pass_hz = snap.hpf_freq;
            profile.fingerprint = capture_fingerprint(&snap);

            // 5. Name classification (fast, local)
            let named = self.name_classifier.classify(&snap.name);
            profile.role = named.role;
            profile.group = named.group;
            profile.confidence = named.confidence;

            // 6. Spectral override when the name was generic or missing
            if profile.confidence <= Confidence::Low && profile.fingerprint.has_signal {
                let spectral = self.spectral_classifier.classify(&profile.fingerprint);
                if spectral.match_score >= STRONG_MATCH {
                    log::debug!(
                        "ch{} '{}': spectral -> {} ({:.0}%)",
                        ch,
                        snap.name,
                        spectral.role.as_str(),
                        spectral.match_score * 100.0
                    );
                    profile.role = spectral.role;
                    profile.group = spectral.group;
                    profile.confidence = Confidence::Medium;
                }
            }

            profiles.push(profile);
        }

        // 7. Stereo pairs on adjacent channels
        for pair in self.pair_detector.detect(&profiles) {
            if let Some(p) = profiles.iter_mut().find(|p| p.index == pair.left) {
                p.stereo_pair = Some(pair.right);
            }
            if let Some(p) = profiles.iter_mut().find(|p| p.index == pair.right) {
                p.stereo_pair = Some(pair.left);
            }
            log::info!(
                "Detected stereo pair: ch{} / ch{} ({:.0}%)",
                pair.left,
                pair.right,
                pair.confidence * 100.0
            );
        }

        // 8. Apply local classifications immediately
        for profile in &profiles {
            map.update_profile(profile.clone());
        }
        log::info!("=== Discovery Complete (local) ===");
        log_channel_map(map);

        // 9. LLM review pass - async, don't block the show
        let llm = Arc::clone(llm);
        let map = Arc::clone(map);
        std::thread::spawn(move || {
            log::info!("Starting LLM discovery review...");
            let reviewed = LlmDiscoveryReview::new(&llm).review(profiles);
            for profile in reviewed {
                map.update_profile(profile);
            }
            log::info!("LLM discovery review complete");
            log_channel_map(&map);
        });
    }
}

fn capture_fingerprint(snap: &mix_core::ChannelSnapshot) -> Fingerprint {
    let mut fp = Fingerprint {
        average_rms: snap.rms_db,
        has_signal: snap.rms_db > SIGNAL_THRESHOLD_DB,
        bass_energy: snap.spectral.bass,
        mid_energy: snap.spectral.mid,
        presence_energy: snap.spectral.presence,
        crest_factor: snap.spectral.crest_factor,
        dominant_freq_hz: snap.spectral.centroid,
        spectral_centroid: snap.spectral.centroid,
        ..Fingerprint::default()
    };
    fp.is_percussive = fp.crest_factor > 10.0;

    let bands = [fp.bass_energy, fp.mid_energy, fp.presence_energy];
    let loud = bands.iter().filter(|&&b| b > -30.0).count();
    fp.is_broadband = loud == bands.len();
    fp.is_narrowband = loud == 1;
    fp
}

fn log_channel_map(map: &ChannelMap) {
    log::info!("Channel Map:");
    for p in map.all() {
        if p.console_name.is_empty() && !p.fingerprint.has_signal {
            continue;
        }
        let pair = p
            .stereo_pair
            .map(|peer| format!(" -> pair ch{}", peer))
            .unwrap_or_default();
        log::info!(
            "  ch{:02}  {:<12}  {:<20}  {}{}",
            p.index,
            if p.console_name.is_empty() { "(unnamed)" } else { &p.console_name },
            p.role.as_str(),
            p.confidence.as_str(),
            pair
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mix_core::SpectralData;

    #[test]
    fn test_capture_fingerprint_flags() {
        let mut snap = mix_core::ChannelSnapshot::default();
        snap.rms_db = -20.0;
        snap.spectral = SpectralData {
            bass: -10.0,
            mid: -12.0,
            presence: -15.0,
            crest_factor: 14.0,
            centroid: 300.0,
        };

        let fp = capture_fingerprint(&snap);
        assert!(fp.has_signal);
        assert!(fp.is_percussive);
        assert!(fp.is_broadband);
        assert!(!fp.is_narrowband);
        assert_eq!(fp.dominant_freq_hz, 300.0);
    }

    #[test]
    fn test_capture_fingerprint_silent() {
        let snap = mix_core::ChannelSnapshot::default();
        let fp = capture_fingerprint(&snap);
        assert!(!fp.has_signal);
        assert!(!fp.is_percussive);
    }

    #[test]
    fn test_narrowband_detection() {
        let mut snap = mix_core::ChannelSnapshot::default();
        snap.rms_db = -25.0;
        snap.spectral = SpectralData {
            bass: -12.0,
            mid: -50.0,
            presence: -60.0,
            crest_factor: 4.0,
            centroid: 120.0,
        };
        let fp = capture_fingerprint(&snap);
        assert!(fp.is_narrowband);
        assert!(!fp.is_broadband);
    }
}
