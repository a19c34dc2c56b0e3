//! Where plans live between commands.
//!
//! [`FilePlanStore`] binds a plan to a YAML file a human edits;
//! [`BufferPlanStore`] keeps the plan as JSON bytes in memory for tests and
//! non-interactive callers.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::PlanError;
use crate::plan::{Plan, normalize, read_plan, render_plan};

/// Read, write and existence checks for one plan.
pub trait PlanStore {
    /// Load the plan, migrated and defaulted.
    fn read(&self) -> Result<Plan, PlanError>;

    /// Persist the plan, replacing whatever was stored.
    fn write(&mut self, plan: &Plan) -> Result<(), PlanError>;

    /// Whether a plan has been stored. Says nothing about its contents.
    fn exists(&self) -> bool;

    /// Where the plan lives, for error messages.
    fn location(&self) -> &Path;
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// A plan stored as annotated YAML at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlanStore {
    path: PathBuf,
}

impl FilePlanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PlanStore for FilePlanStore {
    fn read(&self) -> Result<Plan, PlanError> {
        let bytes = fs::read(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                PlanError::MissingPlan {
                    path: self.path.clone(),
                }
            } else {
                PlanError::Io {
                    action: "read plan file",
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        let plan = read_plan(&bytes)?;
        info!(path = %self.path.display(), cluster = %plan.cluster.name, "read plan");
        Ok(plan)
    }

    fn write(&mut self, plan: &Plan) -> Result<(), PlanError> {
        // Render first so an encoding failure never truncates the file.
        let text = render_plan(plan)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PlanError::Io {
                action: "create plan directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, text).map_err(|source| PlanError::Io {
            action: "write plan file",
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "wrote plan");
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Buffer store
// ---------------------------------------------------------------------------

/// A plan held in memory as JSON bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferPlanStore {
    bytes: Vec<u8>,
}

impl BufferPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap bytes that already hold a JSON-encoded plan.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PlanStore for BufferPlanStore {
    fn read(&self) -> Result<Plan, PlanError> {
        if self.bytes.is_empty() {
            return Err(PlanError::MissingPlan {
                path: self.location().to_path_buf(),
            });
        }
        let raw: Plan = serde_json::from_slice(&self.bytes).map_err(PlanError::parse)?;
        Ok(normalize(raw))
    }

    fn write(&mut self, plan: &Plan) -> Result<(), PlanError> {
        self.bytes = serde_json::to_vec(plan).map_err(PlanError::encode)?;
        Ok(())
    }

    fn exists(&self) -> bool {
        !self.bytes.is_empty()
    }

    fn location(&self) -> &Path {
        Path::new("<memory>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Node;

    fn plan() -> Plan {
        let mut plan = crate::plan::apply_defaults(Plan::default());
        plan.cluster.name = "store-test".into();
        plan.worker.nodes.push(Node::new("w1", "10.0.0.1"));
        plan.worker.expected_count = 1;
        plan
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FilePlanStore::new(dir.path().join("nested/kismatic-cluster.yaml"));
        assert!(!store.exists());

        store.write(&plan()).unwrap();
        assert!(store.exists());
        assert_eq!(store.read().unwrap(), plan());
    }

    #[test]
    fn file_store_writes_annotated_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FilePlanStore::new(dir.path().join("plan.yaml"));
        store.write(&plan()).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("# Worker nodes are the ones"));
    }

    #[test]
    fn missing_file_is_missing_plan() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePlanStore::new(dir.path().join("absent.yaml"));
        let err = store.read().unwrap_err();
        assert!(
            matches!(err, PlanError::MissingPlan { ref path } if path.ends_with("absent.yaml"))
        );
    }

    #[test]
    fn exists_does_not_check_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        fs::write(&path, "cluster: [").unwrap();

        let store = FilePlanStore::new(&path);
        assert!(store.exists());
        assert!(matches!(store.read(), Err(PlanError::Parse { .. })));
    }

    #[test]
    fn buffer_store_uses_json() {
        let mut store = BufferPlanStore::new();
        assert!(!store.exists());
        assert!(matches!(store.read(), Err(PlanError::MissingPlan { .. })));

        store.write(&plan()).unwrap();
        assert!(store.exists());
        assert_eq!(store.as_bytes()[0], b'{');
        assert_eq!(store.read().unwrap(), plan());
    }

    #[test]
    fn buffer_store_rejects_garbage() {
        let store = BufferPlanStore::from_bytes(b"cluster: yaml".to_vec());
        assert!(matches!(store.read(), Err(PlanError::Parse { .. })));
    }
}
