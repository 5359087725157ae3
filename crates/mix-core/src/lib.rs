//! mix-core: shared vocabulary for the mixagent workspace
//!
//! - `params` - parameter taxonomy and update/capability types shared by
//!   every console adapter
//! - `model` - the thread-safe console model (single source of truth for
//!   current channel/bus state)
//! - `role` - instrument role and discovery confidence enums

pub mod model;
pub mod params;
pub mod role;

pub use model::{BusSnapshot, ChannelSnapshot, CompressorState, ConsoleModel, EqBand, GateState, SpectralData};
pub use params::{BusParam, ChannelParam, ConsoleCapabilities, ParamValue, ParameterUpdate, UpdateTarget};
pub use role::{Confidence, InstrumentRole};

/// Meter floor used everywhere a level can be "silent", in dBFS.
pub const DB_FLOOR: f32 = -96.0;

/// RMS threshold below which a channel is treated as carrying no signal.
pub const SIGNAL_THRESHOLD_DB: f32 = -60.0;
