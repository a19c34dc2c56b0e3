//! Resolution of a cluster identity to its plan file and generated-assets
//! directory.
//!
//! Every command that targets a cluster goes through [`resolve`] so the
//! same flags always land on the same pair of paths.

use std::path::{Component, Path, PathBuf};

use crate::error::PlanError;
use crate::store::FilePlanStore;

/// Directory holding one subdirectory per named cluster.
pub const CLUSTERS_DIR: &str = "clusters";
/// Cluster used when no name or path is given.
pub const DEFAULT_CLUSTER_NAME: &str = "kubernetes";
pub const PLAN_FILE_NAME: &str = "kismatic-cluster.yaml";
pub const GENERATED_DIR_NAME: &str = "generated";

/// Plan file and generated-assets directory of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPaths {
    pub plan_file: PathBuf,
    pub generated_dir: PathBuf,
}

impl ClusterPaths {
    /// `clusters/<name>/kismatic-cluster.yaml` and `clusters/<name>/generated`.
    pub fn for_cluster(name: &str) -> Self {
        let dir = Path::new(CLUSTERS_DIR).join(name);
        Self {
            plan_file: dir.join(PLAN_FILE_NAME),
            generated_dir: dir.join(GENERATED_DIR_NAME),
        }
    }

    /// The plan file colocated with a generated-assets directory.
    pub fn from_generated_dir(generated_dir: impl Into<PathBuf>) -> Self {
        let generated_dir = generated_dir.into();
        let plan_file = sibling_of(&generated_dir, PLAN_FILE_NAME);
        Self {
            plan_file,
            generated_dir,
        }
    }

    /// The generated-assets directory colocated with a plan file.
    pub fn from_plan_file(plan_file: impl Into<PathBuf>) -> Self {
        let plan_file = plan_file.into();
        let generated_dir = sibling_of(&plan_file, GENERATED_DIR_NAME);
        Self {
            plan_file,
            generated_dir,
        }
    }

    pub fn store(&self) -> FilePlanStore {
        FilePlanStore::new(&self.plan_file)
    }

    /// Whether a plan file exists at the resolved location.
    pub fn exists(&self) -> bool {
        self.plan_file.exists()
    }
}

impl Default for ClusterPaths {
    fn default() -> Self {
        Self::for_cluster(DEFAULT_CLUSTER_NAME)
    }
}

fn sibling_of(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// The `--plan-file` and `--generated-assets-dir` values as given. Fields
/// equal to [`PathFlags::default`] count as not given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFlags {
    pub plan_file: PathBuf,
    pub generated_dir: PathBuf,
}

impl Default for PathFlags {
    fn default() -> Self {
        let ClusterPaths {
            plan_file,
            generated_dir,
        } = ClusterPaths::default();
        Self {
            plan_file,
            generated_dir,
        }
    }
}

impl PathFlags {
    fn customized(&self) -> (bool, bool) {
        let defaults = Self::default();
        (
            self.plan_file != defaults.plan_file,
            self.generated_dir != defaults.generated_dir,
        )
    }
}

/// Resolve the paths of a single cluster.
pub fn resolve(name: Option<&str>, flags: &PathFlags) -> Result<ClusterPaths, PlanError> {
    let (plan_custom, generated_custom) = flags.customized();

    if let Some(name) = name {
        if plan_custom || generated_custom {
            return Err(PlanError::ConflictingArguments);
        }
        check_cluster_name(name)?;
        return Ok(ClusterPaths::for_cluster(name));
    }

    Ok(match (plan_custom, generated_custom) {
        (false, false) => ClusterPaths::default(),
        (true, false) => ClusterPaths::from_plan_file(&flags.plan_file),
        (false, true) => ClusterPaths::from_generated_dir(&flags.generated_dir),
        (true, true) => ClusterPaths {
            plan_file: flags.plan_file.clone(),
            generated_dir: flags.generated_dir.clone(),
        },
    })
}

/// Resolve the paths of every named cluster, or of the single cluster the
/// flags describe when no names are given.
pub fn resolve_all(names: &[String], flags: &PathFlags) -> Result<Vec<ClusterPaths>, PlanError> {
    if names.is_empty() {
        return resolve(None, flags).map(|paths| vec![paths]);
    }
    names
        .iter()
        .map(|name| resolve(Some(name), flags))
        .collect()
}

/// Reject names that would escape the clusters directory.
fn check_cluster_name(name: &str) -> Result<(), PlanError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PlanError::InvalidClusterName(name.to_owned())),
    }
}
