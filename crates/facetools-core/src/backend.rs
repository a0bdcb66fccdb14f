//! Backend roots that hold their own copy of model assets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle status reported by the host for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Running,
    Idle,
    Loading,
    Disabled,
    Errored,
}

impl BackendStatus {
    /// Only running and idle backends take part in provisioning.
    pub fn is_usable(&self) -> bool {
        matches!(self, BackendStatus::Running | BackendStatus::Idle)
    }
}

/// A filesystem location where one engine instance stores its models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRoot {
    pub path: PathBuf,
    pub status: BackendStatus,
}

impl BackendRoot {
    pub fn new(path: impl Into<PathBuf>, status: BackendStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }

    /// Absolute location of a model inside this backend.
    pub fn resolve(&self, logical_id: &str) -> PathBuf {
        self.path.join(logical_id)
    }
}

/// Source of the backends currently known to the host.
pub trait BackendRegistry: Send + Sync {
    fn backends(&self) -> Vec<BackendRoot>;

    /// Distinct roots of usable backends, in registration order.
    fn usable_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for backend in self.backends() {
            if backend.status.is_usable() && !roots.iter().any(|r| r == &backend.path) {
                roots.push(backend.path);
            }
        }
        roots
    }
}

/// A fixed list of backends, as configured at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticBackends {
    backends: Vec<BackendRoot>,
}

impl StaticBackends {
    pub fn new(backends: Vec<BackendRoot>) -> Self {
        Self { backends }
    }

    /// Every path is treated as a running backend.
    pub fn running(paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Self {
        Self::new(
            paths
                .into_iter()
                .map(|p| BackendRoot::new(p.as_ref(), BackendStatus::Running))
                .collect(),
        )
    }
}

impl BackendRegistry for StaticBackends {
    fn backends(&self) -> Vec<BackendRoot> {
        self.backends.clone()
    }
}
