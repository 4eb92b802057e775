//! Agent orchestration: owns the agent set, drives each agent's cycle
//! loop on its own task, and runs a periodic coordination pass that wires
//! agents together through shared memory.

pub mod coordination;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::agent::{Agent, CycleOutcome};
use crate::memory::SharedMemory;

/// How long a cycle task waits before retrying after an escaped fault.
/// Agent-reported failures wait the agent's normal interval instead.
const CYCLE_RETRY_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("agent {0} not found")]
    AgentNotFound(String),
    #[error("orchestrator is already running")]
    AlreadyRunning,
    #[error("failed to initialize agent {agent}")]
    Initialization {
        agent: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("agent {agent} failed to handle message")]
    Handler {
        agent: String,
        #[source]
        source: anyhow::Error,
    },
}

pub struct Orchestrator {
    agents: Vec<Arc<dyn Agent>>,
    memory: SharedMemory,
    /// Re-entry guard for `start`; held true until `stop` completes.
    starting: AtomicBool,
    /// True only once every agent initialized and the tasks are spawned.
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl Orchestrator {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            agents,
            memory: SharedMemory::new(),
            starting: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
            started_at: Mutex::new(None),
        }
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn agent(&self, name: &str) -> Result<&Arc<dyn Agent>, OrchestratorError> {
        self.agents
            .iter()
            .find(|agent| agent.name() == name)
            .ok_or_else(|| OrchestratorError::AgentNotFound(name.to_string()))
    }

    /// Initialize every agent in registration order, then spawn one cycle
    /// task per agent plus the coordination task. A failed initialization
    /// aborts the start: already-initialized agents are shut down again
    /// and no task is spawned. `is_running` stays false until startup has
    /// fully succeeded.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        if self.starting.swap(true, Ordering::SeqCst) {
            return Err(OrchestratorError::AlreadyRunning);
        }

        for (index, agent) in self.agents.iter().enumerate() {
            if let Err(source) = agent.initialize().await {
                let failed = agent.name().to_string();
                for initialized in &self.agents[..index] {
                    if let Err(e) = initialized.shutdown().await {
                        warn!(agent = initialized.name(), error = %format!("{e:#}"), "shutdown after failed start");
                    }
                }
                self.starting.store(false, Ordering::SeqCst);
                return Err(OrchestratorError::Initialization { agent: failed, source });
            }
        }

        let started_at = Utc::now();
        *self.started_at.lock().await = Some(started_at);
        self.running.store(true, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;
        for agent in &self.agents {
            tasks.push(tokio::spawn(run_agent(
                agent.clone(),
                self.memory.clone(),
                self.running.clone(),
            )));
        }
        tasks.push(tokio::spawn(coordination::run(
            self.agents.clone(),
            self.memory.clone(),
            self.running.clone(),
            started_at,
        )));

        info!(agents = self.agents.len(), "all agents started");
        Ok(())
    }

    /// Stop all tasks and shut agents down. Safe to call more than once;
    /// only the first call does the work.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        join_all(tasks).await;

        for agent in &self.agents {
            if let Err(e) = agent.shutdown().await {
                warn!(agent = agent.name(), error = %format!("{e:#}"), "agent shutdown failed");
            }
        }

        self.starting.store(false, Ordering::SeqCst);
        info!("all agents stopped");
    }

    pub async fn get_status(&self) -> Value {
        let mut agents = serde_json::Map::new();
        for agent in &self.agents {
            let core = agent.core();
            agents.insert(
                agent.name().to_string(),
                json!({
                    "active": core.is_active(),
                    "action_count": core.action_count(),
                    "last_action": core.last_action_time().await,
                    "status": agent.status().await,
                }),
            );
        }

        json!({
            "orchestrator_running": self.is_running(),
            "agents": agents,
            "shared_memory_keys": self.memory.keys().await,
            "system_info": self.memory.data(crate::memory::SYSTEM_KEY).await.unwrap_or(json!({})),
        })
    }

    pub async fn send_message_to_agent(
        &self,
        agent_name: &str,
        message: Value,
    ) -> Result<Value, OrchestratorError> {
        let agent = self.agent(agent_name)?;
        agent
            .handle_message(message)
            .await
            .map_err(|source| OrchestratorError::Handler {
                agent: agent_name.to_string(),
                source,
            })
    }

    /// Deliver a message to every agent. A failing handler contributes an
    /// error string to the result map instead of failing the broadcast.
    pub async fn broadcast_message(&self, message: Value) -> Value {
        let mut results = serde_json::Map::new();
        for agent in &self.agents {
            let entry = match agent.handle_message(message.clone()).await {
                Ok(response) => response,
                Err(e) => json!(format!("Error: {e:#}")),
            };
            results.insert(agent.name().to_string(), entry);
        }
        Value::Object(results)
    }
}

/// Per-agent cycle loop. Publishes each completed cycle under the agent's
/// own key, honors the agent's (possibly accelerated) interval, and backs
/// off briefly on escaped faults so a broken agent cannot spin.
async fn run_agent(agent: Arc<dyn Agent>, memory: SharedMemory, running: Arc<AtomicBool>) {
    let slot = memory.slot(agent.name());

    while running.load(Ordering::SeqCst) {
        match agent.execute_cycle(&memory).await {
            Ok(CycleOutcome::Completed(data)) => {
                slot.publish(data).await;
                tokio::time::sleep(agent.core().cycle_interval().await).await;
            }
            Ok(CycleOutcome::Failed(reason)) => {
                warn!(agent = agent.name(), reason, "agent cycle reported failure");
                tokio::time::sleep(agent.core().cycle_interval().await).await;
            }
            Err(e) => {
                error!(agent = agent.name(), error = %format!("{e:#}"), "agent cycle fault");
                tokio::time::sleep(CYCLE_RETRY_BACKOFF).await;
            }
        }
    }
}
