//! Persona prompt loader port.
//!
//! Resolves a persona routing tag to its prompt markdown. Consumed by the
//! launcher when preparing an agent's context file; the coordination core
//! itself only ever handles the short tag.

use crate::domain::errors::DomainResult;

pub trait PersonaLoader: Send + Sync {
    /// Prompt markdown for a persona tag, or `InvalidArgument` for an
    /// unknown persona.
    fn load(&self, persona_id: &str) -> DomainResult<String>;

    /// Known persona tags, sorted.
    fn available(&self) -> Vec<String>;
}
