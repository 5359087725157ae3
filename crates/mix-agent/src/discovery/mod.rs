//! Channel discovery: who is on which channel.
//!
//! On startup the orchestrator syncs console state, captures spectral
//! fingerprints, classifies channels by name (regex rules) and by
//! spectral shape (template match), detects stereo pairs, and finally
//! asks the LLM to review the map asynchronously.

pub mod map;
pub mod name_classifier;
pub mod orchestrator;
pub mod profile;
pub mod review;
pub mod spectral_classifier;
pub mod stereo;

pub use map::ChannelMap;
pub use name_classifier::NameClassifier;
pub use orchestrator::DiscoveryOrchestrator;
pub use profile::{ChannelProfile, Fingerprint};
pub use review::LlmDiscoveryReview;
pub use spectral_classifier::SpectralClassifier;
pub use stereo::StereoPairDetector;
