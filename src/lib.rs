//! EcoMind: autonomous environmental intelligence.
//!
//! Four cooperative agents run on their own cycles and coordinate through
//! a shared memory store: monitoring collects environmental data,
//! prediction turns it into forecasts and preventive actions, community
//! coordination mobilizes people, and the coach personalizes it all.

pub mod agent;
pub mod memory;
pub mod orchestrator;
pub mod server;

pub use agent::{Agent, AlertResponder, CycleOutcome};
pub use memory::SharedMemory;
pub use orchestrator::{Orchestrator, OrchestratorError};
