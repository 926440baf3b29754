//! Application services for the aiswarm coordination system.

pub mod agent_monitor;
pub mod agent_registry;
pub mod config;
pub mod event_bus;
pub mod event_logger;
pub mod memory_store;
pub mod task_coordinator;

pub use agent_monitor::{AgentMonitor, MonitorConfig};
pub use agent_registry::AgentRegistry;
pub use config::{Config, ConfigError, DispatchConfig, LogFormat, LoggingConfig};
pub use event_bus::{EventBus, EventFilter, Subscription};
pub use event_logger::EventLogger;
pub use memory_store::{MemoryStore, WaitMode, WaitOutcome};
pub use task_coordinator::{
    DispatchedTask, GetNextOutcome, NewTaskRequest, TaskCoordinator, REQUERY_PREFIX,
};

use std::sync::Arc;

use crate::domain::events::{AgentEvent, MemoryEvent, TaskEvent};

/// The three per-family buses, created together and disposed together.
pub struct EventBuses {
    pub task: Arc<EventBus<TaskEvent>>,
    pub agent: Arc<EventBus<AgentEvent>>,
    pub memory: Arc<EventBus<MemoryEvent>>,
}

impl Default for EventBuses {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBuses {
    pub fn new() -> Self {
        Self {
            task: Arc::new(EventBus::new()),
            agent: Arc::new(EventBus::new()),
            memory: Arc::new(EventBus::new()),
        }
    }

    /// Dispose every bus, closing all outstanding subscriber queues.
    pub fn dispose_all(&self) {
        self.task.dispose();
        self.agent.dispose();
        self.memory.dispose();
    }
}
