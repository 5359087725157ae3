//! mix-llm: the reasoning side of the agent
//!
//! - `action` - typed action schema and tolerant JSON parsing
//! - `engine` - LLM transport (Anthropic primary, Ollama fallback) and
//!   the mix decision call
//! - `memory` - bounded rolling session memory
//! - `preferences` - per-role approval statistics and persistence
//! - `genre` - genre-specific mix targets injected into the LLM context

pub mod action;
pub mod engine;
pub mod genre;
pub mod memory;
pub mod preferences;

pub use action::{ActionKind, MixAction, Urgency};
pub use engine::{LlmConfig, LlmEngine, LlmError};
pub use genre::{GenrePreset, GenrePresetLibrary, RoleMixTarget};
pub use memory::{MemoryEntry, MemoryKind, SessionMemory};
pub use preferences::PreferenceLearner;
