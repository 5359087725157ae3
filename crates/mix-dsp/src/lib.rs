//! mix-dsp: spectral analysis for the agent's DSP loop
//!
//! - `fft` - windowed real-FFT analysis (band energies, centroid,
//!   dominant frequency, crest factor)
//! - `analysis` - per-channel analysis and mix issue detection

pub mod analysis;
pub mod fft;

pub use analysis::{AudioAnalyser, ChannelAnalysis, IssueKind, MixAnalysis, MixIssue};
pub use fft::{BandEnergy, FftAnalyser, FftResult};
