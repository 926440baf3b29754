//! Domain models for the aiswarm coordination system.

pub mod agent;
pub mod event_log;
pub mod memory;
pub mod task;

pub use agent::{Agent, AgentStatus, RegisterAgentRequest};
pub use event_log::{EventLogEntry, EventSeverity};
pub use memory::{MemoryEntry, COMPRESSION_THRESHOLD_BYTES};
pub use task::{Task, TaskPriority, TaskStatus};
