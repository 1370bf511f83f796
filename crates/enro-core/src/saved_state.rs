//! Saved navigation state.
//!
//! A [`NavigationSnapshot`] captures the backstack of every container, with
//! instance ids and metadata intact, so a host can rebuild its containers and
//! call [`NavigationRuntime::restore`](crate::runtime::NavigationRuntime::restore)
//! after a restart.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use enro_types::{ContainerKey, NavigationKeyInstance, Result};

const SNAPSHOT_FILE: &str = "navigation.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub key: ContainerKey,
    pub backstack: Vec<NavigationKeyInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationSnapshot {
    /// Containers in tree pre-order, so parents restore before their children.
    pub containers: Vec<ContainerSnapshot>,
    /// RFC 3339 timestamp of when the snapshot was taken.
    pub timestamp: String,
}

impl NavigationSnapshot {
    pub fn new(containers: Vec<ContainerSnapshot>) -> Self {
        Self {
            containers,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn container(&self, key: &ContainerKey) -> Option<&ContainerSnapshot> {
        self.containers.iter().find(|c| &c.key == key)
    }
}

/// Write `snapshot` to `<dir>/navigation.json`, creating `dir` if needed.
pub async fn save_snapshot(snapshot: &NavigationSnapshot, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(SNAPSHOT_FILE);
    let json = serde_json::to_string_pretty(snapshot)?;
    tokio::fs::write(&path, json).await?;
    tracing::debug!(
        path = %path.display(),
        containers = snapshot.containers.len(),
        "Snapshot saved"
    );
    Ok(path)
}

/// Returns `Ok(None)` when no snapshot has been saved in `dir`.
pub async fn load_snapshot(dir: &Path) -> Result<Option<NavigationSnapshot>> {
    let path = dir.join(SNAPSHOT_FILE);
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(&path).await?;
    Ok(Some(serde_json::from_str(&json)?))
}

pub async fn clear_snapshot(dir: &Path) -> Result<()> {
    let path = dir.join(SNAPSHOT_FILE);
    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
