//! Agent Module
//!
//! Provides the agent contract every EcoMind agent implements, plus the
//! concrete environmental agents.

pub mod coach;
pub mod community;
pub mod monitoring;
pub mod predictive;

pub use coach::PersonalSustainabilityCoach;
pub use community::CommunityCoordinationAgent;
pub use monitoring::EnvironmentalMonitoringAgent;
pub use predictive::PredictiveActionAgent;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Outcome of one autonomous cycle.
///
/// `Failed` is the agent-reported error channel: the agent caught its own
/// problem and handed back a description instead of a result. An `Err`
/// from [`Agent::execute_cycle`] is the escaped-fault channel and triggers
/// the scheduler's short retry backoff instead of the normal sleep.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(Value),
    Failed(String),
}

/// Contract for all agents in the system.
///
/// Implementors embed an [`AgentCore`] for the bookkeeping state the
/// orchestrator reads (identity, interval, activity, action counters,
/// private memory) and add their own domain state on top.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Shared per-agent bookkeeping state.
    fn core(&self) -> &AgentCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// One-time setup before any cycle runs. Failure is fatal to
    /// orchestrator startup.
    async fn initialize(&self) -> Result<()>;

    /// Best-effort release of resources. Safe to call even after a
    /// partially failed `initialize`.
    async fn shutdown(&self) -> Result<()>;

    /// One unit of autonomous work. Side effects are confined to the
    /// agent's own private memory; the scheduler publishes the returned
    /// payload under the agent's shared-memory key.
    async fn execute_cycle(&self, shared: &crate::memory::SharedMemory) -> Result<CycleOutcome>;

    /// Point-to-point / broadcast entry point. Unknown message shapes get
    /// a well-defined "unknown type" response rather than an error.
    async fn handle_message(&self, message: Value) -> Result<Value>;

    /// Detailed status for external reporting.
    async fn status(&self) -> Value {
        self.core().status().await
    }

    /// Urgent direct-call capability, if this agent has one. Coordination
    /// rules query this instead of inspecting concrete types.
    fn alert_responder(&self) -> Option<&dyn AlertResponder> {
        None
    }
}

/// Optional extension point invoked by coordination rules outside the
/// normal message/cycle path.
#[async_trait]
pub trait AlertResponder: Send + Sync {
    async fn handle_pollution_alert(&self, alert: Value) -> Result<Value>;
}

/// A private memory entry: value plus the moment it was stored.
#[derive(Debug, Clone)]
struct MemorySlot {
    value: Value,
    stored_at: DateTime<Utc>,
}

struct IntervalState {
    current: Duration,
    /// When set, `current` reverts to the base interval once this instant
    /// passes. Read by the cycle loop each iteration.
    restore_at: Option<tokio::time::Instant>,
}

/// Bookkeeping state shared by every agent.
pub struct AgentCore {
    name: String,
    base_interval: Duration,
    interval: Mutex<IntervalState>,
    active: AtomicBool,
    action_count: AtomicU64,
    last_action: Mutex<Option<DateTime<Utc>>>,
    memory: RwLock<HashMap<String, MemorySlot>>,
}

impl AgentCore {
    pub fn new(name: impl Into<String>, cycle_interval: Duration) -> Self {
        Self {
            name: name.into(),
            base_interval: cycle_interval,
            interval: Mutex::new(IntervalState {
                current: cycle_interval,
                restore_at: None,
            }),
            active: AtomicBool::new(false),
            action_count: AtomicU64::new(0),
            last_action: Mutex::new(None),
            memory: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
        info!(agent = %self.name, "agent initialized");
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        info!(agent = %self.name, "agent shut down");
    }

    pub fn action_count(&self) -> u64 {
        self.action_count.load(Ordering::SeqCst)
    }

    pub async fn last_action_time(&self) -> Option<DateTime<Utc>> {
        *self.last_action.lock().await
    }

    /// Current interval between cycles. If a temporary acceleration has
    /// expired, this reverts to the base interval first.
    pub async fn cycle_interval(&self) -> Duration {
        let mut state = self.interval.lock().await;
        if let Some(restore_at) = state.restore_at {
            if tokio::time::Instant::now() >= restore_at {
                state.current = self.base_interval;
                state.restore_at = None;
                info!(agent = %self.name, "cycle interval restored to normal");
            }
        }
        state.current
    }

    /// Temporarily shorten the interval to `interval`, reverting to the
    /// base interval after `duration`.
    pub async fn accelerate(&self, interval: Duration, duration: Duration) {
        let mut state = self.interval.lock().await;
        state.current = interval;
        state.restore_at = Some(tokio::time::Instant::now() + duration);
        info!(
            agent = %self.name,
            interval_secs = interval.as_secs(),
            restore_after_secs = duration.as_secs(),
            "cycle interval accelerated"
        );
    }

    /// Record a completed action: bump the counter and stamp the time.
    pub async fn record_action(&self, action_type: &str, details: Value) {
        self.action_count.fetch_add(1, Ordering::SeqCst);
        *self.last_action.lock().await = Some(Utc::now());
        debug!(agent = %self.name, action = action_type, %details, "action recorded");
    }

    pub async fn store_memory(&self, key: &str, value: Value) {
        self.memory.write().await.insert(
            key.to_string(),
            MemorySlot {
                value,
                stored_at: Utc::now(),
            },
        );
    }

    pub async fn get_memory(&self, key: &str) -> Option<Value> {
        self.memory
            .read()
            .await
            .get(key)
            .map(|slot| slot.value.clone())
    }

    pub async fn memory_keys(&self) -> Vec<String> {
        self.memory.read().await.keys().cloned().collect()
    }

    pub async fn status(&self) -> Value {
        json!({
            "name": self.name,
            "active": self.is_active(),
            "action_count": self.action_count(),
            "last_action": self.last_action_time().await,
            "cycle_interval_secs": self.cycle_interval().await.as_secs(),
            "memory_keys": self.memory_keys().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_action_bumps_counter_and_timestamp() {
        let core = AgentCore::new("TestAgent", Duration::from_secs(60));
        assert_eq!(core.action_count(), 0);
        assert!(core.last_action_time().await.is_none());

        core.record_action("test", json!({})).await;
        core.record_action("test", json!({})).await;

        assert_eq!(core.action_count(), 2);
        assert!(core.last_action_time().await.is_some());
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let core = AgentCore::new("TestAgent", Duration::from_secs(60));
        core.store_memory("recent_alerts", json!(["smog"])).await;

        assert_eq!(core.get_memory("recent_alerts").await, Some(json!(["smog"])));
        assert_eq!(core.get_memory("missing").await, None);
        assert_eq!(core.memory_keys().await, vec!["recent_alerts".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accelerate_then_restore() {
        let core = AgentCore::new("TestAgent", Duration::from_secs(300));
        assert_eq!(core.cycle_interval().await, Duration::from_secs(300));

        core.accelerate(Duration::from_secs(60), Duration::from_secs(1800))
            .await;
        assert_eq!(core.cycle_interval().await, Duration::from_secs(60));

        // Still accelerated just before the deadline
        tokio::time::advance(Duration::from_secs(1799)).await;
        assert_eq!(core.cycle_interval().await, Duration::from_secs(60));

        // Restored once the deadline has passed
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(core.cycle_interval().await, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_activation_flag() {
        let core = AgentCore::new("TestAgent", Duration::from_secs(60));
        assert!(!core.is_active());
        core.activate();
        assert!(core.is_active());
        core.deactivate();
        assert!(!core.is_active());
    }
}
