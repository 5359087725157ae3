//! Instrument roles and discovery confidence levels.

use serde::{Deserialize, Serialize};

/// Inferred instrument identity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentRole {
    Unknown,
    // Drums
    Kick,
    Snare,
    HiHat,
    Tom,
    Overhead,
    RoomMic,
    // Bass
    BassGuitar,
    BassAmp,
    // Guitars
    ElectricGuitar,
    AcousticGuitar,
    // Keys
    Piano,
    Keys,
    Organ,
    Synth,
    // Vocals
    LeadVocal,
    BackingVocal,
    Choir,
    Presenter,
    Announcer,
    // Brass / strings
    Trumpet,
    Saxophone,
    Violin,
    Cello,
    // Other
    Di,
    Playback,
    Talkback,
    FxReturn,
    // Special
    Muted,
    NoSignal,
}

impl InstrumentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentRole::Unknown => "Unknown",
            InstrumentRole::Kick => "Kick",
            InstrumentRole::Snare => "Snare",
            InstrumentRole::HiHat => "HiHat",
            InstrumentRole::Tom => "Tom",
            InstrumentRole::Overhead => "Overhead",
            InstrumentRole::RoomMic => "RoomMic",
            InstrumentRole::BassGuitar => "BassGuitar",
            InstrumentRole::BassAmp => "BassAmp",
            InstrumentRole::ElectricGuitar => "ElectricGuitar",
            InstrumentRole::AcousticGuitar => "AcousticGuitar",
            InstrumentRole::Piano => "Piano",
            InstrumentRole::Keys => "Keys",
            InstrumentRole::Organ => "Organ",
            InstrumentRole::Synth => "Synth",
            InstrumentRole::LeadVocal => "LeadVocal",
            InstrumentRole::BackingVocal => "BackingVocal",
            InstrumentRole::Choir => "Choir",
            InstrumentRole::Presenter => "Presenter",
            InstrumentRole::Announcer => "Announcer",
            InstrumentRole::Trumpet => "Trumpet",
            InstrumentRole::Saxophone => "Saxophone",
            InstrumentRole::Violin => "Violin",
            InstrumentRole::Cello => "Cello",
            InstrumentRole::Di => "DI",
            InstrumentRole::Playback => "Playback",
            InstrumentRole::Talkback => "Talkback",
            InstrumentRole::FxReturn => "FXReturn",
            InstrumentRole::Muted => "Muted",
            InstrumentRole::NoSignal => "NoSignal",
        }
    }

    /// Parse a role name as it appears in LLM responses and persisted
    /// preference files. Unknown strings map to `Unknown`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "Kick" => InstrumentRole::Kick,
            "Snare" => InstrumentRole::Snare,
            "HiHat" => InstrumentRole::HiHat,
            "Tom" => InstrumentRole::Tom,
            "Overhead" => InstrumentRole::Overhead,
            "RoomMic" => InstrumentRole::RoomMic,
            "BassGuitar" => InstrumentRole::BassGuitar,
            "BassAmp" => InstrumentRole::BassAmp,
            "ElectricGuitar" => InstrumentRole::ElectricGuitar,
            "AcousticGuitar" => InstrumentRole::AcousticGuitar,
            "Piano" => InstrumentRole::Piano,
            "Keys" => InstrumentRole::Keys,
            "Organ" => InstrumentRole::Organ,
            "Synth" => InstrumentRole::Synth,
            "LeadVocal" => InstrumentRole::LeadVocal,
            "BackingVocal" => InstrumentRole::BackingVocal,
            "Choir" => InstrumentRole::Choir,
            "Presenter" => InstrumentRole::Presenter,
            "Announcer" => InstrumentRole::Announcer,
            "Trumpet" => InstrumentRole::Trumpet,
            "Saxophone" => InstrumentRole::Saxophone,
            "Violin" => InstrumentRole::Violin,
            "Cello" => InstrumentRole::Cello,
            "DI" => InstrumentRole::Di,
            "Playback" => InstrumentRole::Playback,
            "Talkback" => InstrumentRole::Talkback,
            "FXReturn" => InstrumentRole::FxReturn,
            "Muted" => InstrumentRole::Muted,
            "NoSignal" => InstrumentRole::NoSignal,
            _ => InstrumentRole::Unknown,
        }
    }
}

/// How sure discovery is about a channel's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Unknown,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
            Confidence::Unknown => "Unknown",
        }
    }
}
