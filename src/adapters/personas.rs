//! Persona prompt catalog.
//!
//! Default persona prompts ship embedded in the binary; a
//! `.aiswarm/personas/<tag>.md` file overrides or extends them per project.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::PersonaLoader;

const BUILTIN_PERSONAS: &[(&str, &str)] = &[
    ("implementer", include_str!("../../personas/implementer.md")),
    ("reviewer", include_str!("../../personas/reviewer.md")),
    ("planner", include_str!("../../personas/planner.md")),
];

pub struct PersonaCatalog {
    overrides_dir: Option<PathBuf>,
}

impl PersonaCatalog {
    /// Embedded personas only.
    pub fn builtin() -> Self {
        Self { overrides_dir: None }
    }

    /// Embedded personas plus `.md` overrides from a directory.
    pub fn with_overrides(overrides_dir: PathBuf) -> Self {
        Self { overrides_dir: Some(overrides_dir) }
    }
}

impl PersonaLoader for PersonaCatalog {
    fn load(&self, persona_id: &str) -> DomainResult<String> {
        if let Some(dir) = &self.overrides_dir {
            let path = dir.join(format!("{persona_id}.md"));
            if path.is_file() {
                return std::fs::read_to_string(&path)
                    .map_err(|e| DomainError::InvalidArgument(format!("unreadable persona file: {e}")));
            }
        }

        BUILTIN_PERSONAS
            .iter()
            .find(|(tag, _)| *tag == persona_id)
            .map(|(_, prompt)| (*prompt).to_string())
            .ok_or_else(|| DomainError::InvalidArgument(format!("unknown persona: {persona_id}")))
    }

    fn available(&self) -> Vec<String> {
        let mut tags: BTreeSet<String> =
            BUILTIN_PERSONAS.iter().map(|(tag, _)| (*tag).to_string()).collect();

        if let Some(dir) = &self.overrides_dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "md") {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            tags.insert(stem.to_string());
                        }
                    }
                }
            }
        }

        tags.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_personas_resolve() {
        let catalog = PersonaCatalog::builtin();
        assert!(catalog.load("implementer").unwrap().contains("get_next_task"));
        assert!(catalog.load("bogus").is_err());
        assert_eq!(catalog.available(), ["implementer", "planner", "reviewer"]);
    }

    #[test]
    fn override_file_wins_and_extends_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("implementer.md"), "custom prompt").unwrap();
        std::fs::write(dir.path().join("tester.md"), "test prompt").unwrap();

        let catalog = PersonaCatalog::with_overrides(dir.path().to_path_buf());
        assert_eq!(catalog.load("implementer").unwrap(), "custom prompt");
        assert_eq!(catalog.load("tester").unwrap(), "test prompt");
        assert!(catalog.available().contains(&"tester".to_string()));
    }
}
