//! Shared Memory Module
//!
//! The in-memory store through which agents publish their cycle results
//! for consumption by other agents and the coordination loop.

pub mod store;

pub use store::{AgentSlot, Envelope, SharedMemory, SYSTEM_KEY};
