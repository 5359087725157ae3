//! mix-console: console protocol adapters
//!
//! - `adapter` - the `ConsoleAdapter` trait and `ConsoleEvents` sink
//! - `osc` - OSC wire codec shared by the X32 and Wing adapters
//! - `x32` - Behringer X32/Midas M32 (OSC over UDP, port 10023)
//! - `wing` - Behringer Wing (OSC over UDP, port 2222)
//! - `avantis` - Allen & Heath Avantis (binary over TCP, port 51325)
//!
//! Every adapter owns a dedicated receive thread that decodes incoming
//! traffic into `ParameterUpdate`s or meter values and fires the injected
//! event sink from that thread.

pub mod adapter;
pub mod avantis;
pub mod osc;
pub mod wing;
pub mod x32;

pub use adapter::{ConsoleAdapter, ConsoleError, ConsoleEvents};
pub use avantis::AvantisAdapter;
pub use wing::WingAdapter;
pub use x32::X32Adapter;
