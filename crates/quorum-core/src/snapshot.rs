// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Thin interface to the external workspace store (§4.8). The core owns the
/// semantics (when to snapshot, how reference directories are named); the
/// implementation owns storage.
#[async_trait::async_trait]
pub trait SnapshotBridge: Send + Sync {
    /// Copy `agent_id`'s working directory into snapshot storage, replacing
    /// any prior snapshot. Called after every accepted answer.
    async fn save_snapshot(&self, agent_id: &str, working_dir: &Path) -> anyhow::Result<()>;

    /// Clear `target_agent_id`'s reference workspace, then copy every
    /// snapshot in `anonymous_snapshots` (anonymous id -> real id) into a
    /// sub-directory named by that anonymous id. Returns the reference
    /// root's absolute path.
    async fn materialize_reference(
        &self,
        target_agent_id: &str,
        anonymous_snapshots: &[(String, String)],
    ) -> anyhow::Result<PathBuf>;
}

/// Filesystem-backed default implementation: snapshots live under
/// `<snapshot_root>/<real_agent_id>/…`; reference workspaces are
/// materialized under `<workspace_root>/<target_agent_id>/<anonymous_id>/…`
/// (§6).
pub struct FilesystemSnapshotBridge {
    snapshot_root: PathBuf,
    workspace_root: PathBuf,
}

impl FilesystemSnapshotBridge {
    pub fn new(snapshot_root: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        Self { snapshot_root: snapshot_root.into(), workspace_root: workspace_root.into() }
    }

    fn snapshot_dir(&self, agent_id: &str) -> PathBuf {
        self.snapshot_root.join(agent_id)
    }
}

#[async_trait::async_trait]
impl SnapshotBridge for FilesystemSnapshotBridge {
    async fn save_snapshot(&self, agent_id: &str, working_dir: &Path) -> anyhow::Result<()> {
        let dest = self.snapshot_dir(agent_id);
        let working_dir = working_dir.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree_replacing(&working_dir, &dest)).await??;
        Ok(())
    }

    async fn materialize_reference(
        &self,
        target_agent_id: &str,
        anonymous_snapshots: &[(String, String)],
    ) -> anyhow::Result<PathBuf> {
        let root = self.workspace_root.join(target_agent_id);
        let snapshot_root = self.snapshot_root.clone();
        let pairs: Vec<(String, String)> = anonymous_snapshots.to_vec();
        let root_clone = root.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if root_clone.exists() {
                std::fs::remove_dir_all(&root_clone)?;
            }
            std::fs::create_dir_all(&root_clone)?;
            for (anon_id, real_id) in &pairs {
                let src = snapshot_root.join(real_id);
                if !src.exists() {
                    continue;
                }
                let dst = root_clone.join(anon_id);
                copy_tree_replacing(&src, &dst)?;
            }
            Ok(())
        })
        .await??;
        Ok(root)
    }
}

/// Copy every file under `src` into `dst`, clearing `dst` first. Idempotent:
/// re-invoking with unchanged `src` leaves `dst` identical.
fn copy_tree_replacing(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if dst.exists() {
        std::fs::remove_dir_all(dst)?;
    }
    std::fs::create_dir_all(dst)?;
    if !src.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(src).into_iter().filter_map(Result::ok) {
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn save_snapshot_copies_working_dir_contents() {
        let workdir = tempdir().unwrap();
        fs::write(workdir.path().join("notes.txt"), b"hello").unwrap();
        let snapshot_root = tempdir().unwrap();
        let workspace_root = tempdir().unwrap();
        let bridge = FilesystemSnapshotBridge::new(snapshot_root.path(), workspace_root.path());

        bridge.save_snapshot("agent-real-a", workdir.path()).await.unwrap();

        let copied = snapshot_root.path().join("agent-real-a").join("notes.txt");
        assert_eq!(fs::read_to_string(copied).unwrap(), "hello");
    }

    #[tokio::test]
    async fn materialize_reference_uses_anonymous_names() {
        let snapshot_root = tempdir().unwrap();
        let workspace_root = tempdir().unwrap();
        fs::create_dir_all(snapshot_root.path().join("real-a")).unwrap();
        fs::write(snapshot_root.path().join("real-a").join("f.txt"), b"a-content").unwrap();
        fs::create_dir_all(snapshot_root.path().join("real-b")).unwrap();
        fs::write(snapshot_root.path().join("real-b").join("f.txt"), b"b-content").unwrap();

        let bridge = FilesystemSnapshotBridge::new(snapshot_root.path(), workspace_root.path());
        let pairs = vec![("agent1".to_string(), "real-a".to_string()), ("agent2".to_string(), "real-b".to_string())];
        let reference_root = bridge.materialize_reference("real-a", &pairs).await.unwrap();

        assert_eq!(fs::read_to_string(reference_root.join("agent1").join("f.txt")).unwrap(), "a-content");
        assert_eq!(fs::read_to_string(reference_root.join("agent2").join("f.txt")).unwrap(), "b-content");
    }

    #[tokio::test]
    async fn materialize_reference_clears_stale_contents_first() {
        let snapshot_root = tempdir().unwrap();
        let workspace_root = tempdir().unwrap();
        let bridge = FilesystemSnapshotBridge::new(snapshot_root.path(), workspace_root.path());

        let stale = workspace_root.path().join("real-a").join("stale.txt");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();

        let reference_root = bridge.materialize_reference("real-a", &[]).await.unwrap();
        assert!(!reference_root.join("stale.txt").exists());
    }
}
