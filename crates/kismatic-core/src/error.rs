use std::fmt;
use std::path::PathBuf;

use crate::plan::NodeRole;
use crate::validate::ValidationErrors;

/// Boxed error reported by an external engine or a codec.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by plan handling and the workflows built on it.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("could not parse plan: {source}")]
    Parse {
        #[source]
        source: BoxError,
    },

    #[error("could not encode plan: {source}")]
    Encode {
        #[source]
        source: BoxError,
    },

    #[error(
        "plan file not found at {path:?}. If you don't have a plan file, you may generate one with 'kismatic install plan'"
    )]
    MissingPlan { path: PathBuf },

    #[error("a plan file already exists at {path:?}")]
    PlanExists { path: PathBuf },

    #[error("cannot use cluster names together with the plan file or generated assets dir flags")]
    ConflictingArguments,

    #[error("invalid cluster name {0:?}")]
    InvalidClusterName(String),

    #[error(
        "according to the plan file, the {field} {value:?} of the new node is already used by another {pool} node"
    )]
    DuplicateNode {
        field: NodeField,
        value: String,
        pool: NodeRole,
    },

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("{operation} failed: {source}")]
    Engine {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("failed to {action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PlanError {
    pub(crate) fn parse(source: impl Into<BoxError>) -> Self {
        Self::Parse {
            source: source.into(),
        }
    }

    pub(crate) fn encode(source: impl Into<BoxError>) -> Self {
        Self::Encode {
            source: source.into(),
        }
    }

    pub(crate) fn engine(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Engine {
            operation,
            source: source.into(),
        }
    }
}

/// Identity field that collided during node admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeField {
    Host,
    Ip,
    InternalIp,
}

impl fmt::Display for NodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Host => "hostname",
            Self::Ip => "IP",
            Self::InternalIp => "internal IP",
        };
        f.write_str(s)
    }
}
