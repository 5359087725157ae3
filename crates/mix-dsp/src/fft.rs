//! Windowed FFT analysis.
//!
//! Built once for a fixed power-of-two size; precomputes a Hann window and
//! a forward real-FFT plan. `analyse` extracts the seven mix bands, the
//! spectral centroid, the dominant frequency and crest factor from one
//! block of samples.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use mix_core::{DB_FLOOR, SIGNAL_THRESHOLD_DB};

/// Per-band energies in dBFS, floored at -96.
#[derive(Debug, Clone, Copy)]
pub struct BandEnergy {
    /// 20-80 Hz
    pub sub_bass: f32,
    /// 80-250 Hz
    pub bass: f32,
    /// 250-500 Hz
    pub low_mid: f32,
    /// 500-2k Hz
    pub mid: f32,
    /// 2k-6k Hz
    pub upper_mid: f32,
    /// 6k-10k Hz
    pub presence: f32,
    /// 10k-Nyquist
    pub air: f32,
}

impl Default for BandEnergy {
    fn default() -> Self {
        Self {
            sub_bass: DB_FLOOR,
            bass: DB_FLOOR,
            low_mid: DB_FLOOR,
            mid: DB_FLOOR,
            upper_mid: DB_FLOOR,
            presence: DB_FLOOR,
            air: DB_FLOOR,
        }
    }
}

/// Result of analysing one block.
#[derive(Debug, Clone, Copy)]
pub struct FftResult {
    pub bands: BandEnergy,
    pub spectral_centroid: f32,
    pub dominant_freq_hz: f32,
    pub rms_db: f32,
    pub peak_db: f32,
    /// peak - rms, in dB
    pub crest_factor: f32,
    pub has_signal: bool,
}

impl Default for FftResult {
    fn default() -> Self {
        Self {
            bands: BandEnergy::default(),
            spectral_centroid: 0.0,
            dominant_freq_hz: 0.0,
            rms_db: DB_FLOOR,
            peak_db: DB_FLOOR,
            crest_factor: 0.0,
            has_signal: false,
        }
    }
}

pub struct FftAnalyser {
    size: usize,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
    time_buf: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
}

impl FftAnalyser {
    /// `size` must be a power of two.
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);

        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
            .collect();

        Self {
            size,
            window,
            spectrum: vec![Complex::new(0.0, 0.0); size / 2 + 1],
            magnitude: vec![0.0; size / 2],
            time_buf: vec![0.0; size],
            fft,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Analyse one block. Fewer samples than the FFT size, or a block below
    /// the signal threshold, yields the default result.
    pub fn analyse(&mut self, samples: &[f32], sample_rate: f32) -> FftResult {
        let mut result = FftResult::default();
        if samples.len() < self.size || sample_rate <= 0.0 {
            return result;
        }

        // Time-domain RMS and peak over the whole block
        let mut sum_sq = 0.0f32;
        let mut peak = 0.0f32;
        for &s in samples {
            sum_sq += s * s;
            peak = peak.max(s.abs());
        }
        let rms = (sum_sq / samples.len() as f32).sqrt();
        result.rms_db = to_dbfs(rms);
        result.peak_db = to_dbfs(peak);
        result.crest_factor = result.peak_db - result.rms_db;
        result.has_signal = result.rms_db > SIGNAL_THRESHOLD_DB;

        if !result.has_signal {
            return result;
        }

        for i in 0..self.size {
            self.time_buf[i] = samples[i] * self.window[i];
        }
        if self.fft.process(&mut self.time_buf, &mut self.spectrum).is_err() {
            return result;
        }

        let half_n = self.size / 2;
        let bin_width = sample_rate / self.size as f32;
        for i in 0..half_n {
            self.magnitude[i] = self.spectrum[i].norm() / half_n as f32;
        }
        let magnitude = &self.magnitude[..half_n];

        result.bands.sub_bass = band_energy_db(magnitude, bin_width, 20.0, 80.0);
        result.bands.bass = band_energy_db(magnitude, bin_width, 80.0, 250.0);
        result.bands.low_mid = band_energy_db(magnitude, bin_width, 250.0, 500.0);
        result.bands.mid = band_energy_db(magnitude, bin_width, 500.0, 2000.0);
        result.bands.upper_mid = band_energy_db(magnitude, bin_width, 2000.0, 6000.0);
        result.bands.presence = band_energy_db(magnitude, bin_width, 6000.0, 10_000.0);
        result.bands.air = band_energy_db(magnitude, bin_width, 10_000.0, sample_rate / 2.0);

        // Spectral centroid over all non-DC bins
        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        for (i, &mag) in magnitude.iter().enumerate().skip(1) {
            weighted += i as f32 * bin_width * mag;
            total += mag;
        }
        result.spectral_centroid = if total > 1e-12 { weighted / total } else { 0.0 };

        // Dominant frequency: loudest non-DC bin
        let peak_bin = magnitude
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        result.dominant_freq_hz = peak_bin as f32 * bin_width;

        result
    }
}

fn to_dbfs(linear: f32) -> f32 {
    if linear < 1e-10 {
        DB_FLOOR
    } else {
        (20.0 * linear.log10()).max(DB_FLOOR)
    }
}

fn band_energy_db(magnitude: &[f32], bin_width: f32, lo_hz: f32, hi_hz: f32) -> f32 {
    let lo_bin = ((lo_hz / bin_width) as usize).max(1);
    let hi_bin = ((hi_hz / bin_width) as usize).min(magnitude.len().saturating_sub(1));
    if lo_bin > hi_bin {
        return DB_FLOOR;
    }

    let sum_sq: f32 = magnitude[lo_bin..=hi_bin].iter().map(|m| m * m).sum();
    let rms = (sum_sq / (hi_bin - lo_bin + 1) as f32).sqrt();
    to_dbfs(rms)
}
