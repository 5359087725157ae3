//! mix-agent: the agent runtime
//!
//! Ties the console model, DSP analysis, LLM reasoning and human approval
//! together into four cooperating loops:
//!
//! - DSP loop: keepalive, ring buffer drain, FFT, issue detection
//! - LLM loop: context assembly, decision call, queue submission
//! - Execution loop: approved-action drain, validate, execute, learn
//! - UI loop (optional): approval queue, activity log, chat
//!
//! Also home to discovery (who is on which channel), the safety
//! validator/executor pair, the meter bridge and the terminal UI.

pub mod agent;
pub mod approval;
pub mod bridge;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod ui;
pub mod validator;

pub use agent::{Agent, AgentConfig};
pub use approval::{ApprovalMode, ApprovalQueue, QueuedAction};
pub use config::ShowConfig;
pub use executor::{ActionExecutor, ExecutionResult};
pub use validator::{ActionValidator, SafetyLimits, Validation};
