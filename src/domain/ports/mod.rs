//! Ports (trait seams) between the coordination core and its adapters.

pub mod agent_repository;
pub mod clock;
pub mod event_log_repository;
pub mod launcher;
pub mod memory_repository;
pub mod persona_loader;
pub mod process_terminator;
pub mod task_repository;

pub use agent_repository::{AgentRepository, TransitionOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_log_repository::EventLogRepository;
pub use launcher::{LaunchRequest, LaunchedProcess, Launcher};
pub use memory_repository::{MemoryRepository, UpsertOutcome};
pub use persona_loader::PersonaLoader;
pub use process_terminator::ProcessTerminator;
pub use task_repository::{FinalizeOutcome, TaskRepository};
