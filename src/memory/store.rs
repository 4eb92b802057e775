//! Shared memory store
//!
//! Maps agent names to their most recently published result. Writes go
//! through key-scoped handles: each agent task holds an [`AgentSlot`] that
//! can only replace the entry under its own name, and the coordination
//! loop alone writes the reserved `"system"` key. Readers get cloned
//! snapshots, so no guard is ever held across an await point.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// Reserved key for the aggregate system state maintained by the
/// coordination loop.
pub const SYSTEM_KEY: &str = "system";

/// Wrapper placed around every published result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub last_update: DateTime<Utc>,
    pub data: Value,
}

impl Envelope {
    fn now(data: Value) -> Self {
        Self {
            last_update: Utc::now(),
            data,
        }
    }
}

/// The shared store. Cloning is cheap and all clones observe the same
/// entries. Entries are only ever replaced whole, never mutated in place
/// and never deleted during normal operation.
#[derive(Clone, Default)]
pub struct SharedMemory {
    entries: Arc<RwLock<HashMap<String, Envelope>>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the write handle for one agent's key. The orchestrator hands
    /// exactly one of these to each agent task.
    pub fn slot(&self, name: &str) -> AgentSlot {
        AgentSlot {
            name: name.to_string(),
            store: self.clone(),
        }
    }

    /// Full envelope for a key, if one has been published.
    pub async fn get(&self, name: &str) -> Option<Envelope> {
        self.entries.read().await.get(name).cloned()
    }

    /// Just the `data` payload for a key.
    pub async fn data(&self, name: &str) -> Option<Value> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|envelope| envelope.data.clone())
    }

    /// Best-effort snapshot of every entry. Not transactionally consistent
    /// across keys; callers must tolerate staleness.
    pub async fn snapshot(&self) -> HashMap<String, Envelope> {
        self.entries.read().await.clone()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Overwrite the reserved `"system"` aggregate entry. Only the
    /// coordination loop calls this.
    pub(crate) async fn publish_system(&self, data: Value) {
        self.entries
            .write()
            .await
            .insert(SYSTEM_KEY.to_string(), Envelope::now(data));
    }
}

/// Write handle scoped to a single agent's key. Holding one of these is
/// the only way to publish a non-system entry, which makes cross-key
/// writes unrepresentable.
#[derive(Clone)]
pub struct AgentSlot {
    name: String,
    store: SharedMemory,
}

impl AgentSlot {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read access to the whole store.
    pub fn store(&self) -> &SharedMemory {
        &self.store
    }

    /// Replace this agent's entry with a fresh envelope around `data`.
    pub async fn publish(&self, data: Value) {
        self.store
            .entries
            .write()
            .await
            .insert(self.name.clone(), Envelope::now(data));
    }
}
