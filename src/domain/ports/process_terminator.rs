//! Process termination port.

use async_trait::async_trait;

/// Best-effort forced termination of an agent's OS process. Failures are
/// reported via the return value and never raised; the registry proceeds
/// with the status transition regardless.
#[async_trait]
pub trait ProcessTerminator: Send + Sync {
    /// Returns true when the signal was delivered.
    async fn kill(&self, process_id: u32) -> bool;
}
