//! Per-request scratch storage (spec §4.B step 5, §5 "Scratch file directory
//! is partitioned by `request_id`; cleanup is the broker's responsibility on
//! all exit paths").

use std::path::{Path, PathBuf};

use crate::error::BrokerError;

/// A scratch directory scoped to a single `request_id`. Dropping this value
/// does not remove the directory — callers must invoke [`ScratchDir::cleanup`]
/// explicitly on every exit path (success, failure, timeout, cancellation)
/// so the unconditional-cleanup invariant (spec §8 invariant 7) holds even
/// when cleanup itself needs to be awaited.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create (or reuse) `root/<request_id>` and copy each of `include_files`
    /// into it, preserving file basenames and caller order. Returns the
    /// directory handle and the materialized paths in the same order as
    /// `include_files`.
    pub async fn materialize(
        root: &Path,
        request_id: &str,
        include_files: &[String],
    ) -> Result<(Self, Vec<String>), BrokerError> {
        let dir = root.join(request_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BrokerError::Scratch(dir.display().to_string(), e.to_string()))?;

        let mut materialized = Vec::with_capacity(include_files.len());
        for source in include_files {
            let source_path = Path::new(source);
            let file_name = source_path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| source_path.as_os_str().to_os_string());
            let dest = dir.join(&file_name);
            tokio::fs::copy(source_path, &dest)
                .await
                .map_err(|e| BrokerError::Scratch(source.clone(), e.to_string()))?;
            materialized.push(dest.display().to_string());
        }

        Ok((Self { path: dir }, materialized))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the scratch directory and everything under it. Safe to call
    /// more than once; a missing directory is not an error.
    pub async fn cleanup(self) {
        if let Err(err) = tokio::fs::remove_dir_all(&self.path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "scratch cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn materialize_copies_files_preserving_order_then_cleanup_removes_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let source_dir = tmp.path().join("sources");
        tokio::fs::create_dir_all(&source_dir).await.unwrap();
        let a = source_dir.join("a.txt");
        let b = source_dir.join("b.txt");
        tokio::fs::write(&a, b"alpha").await.unwrap();
        tokio::fs::write(&b, b"beta").await.unwrap();

        let root = tmp.path().join("scratch");
        let (scratch, materialized) = ScratchDir::materialize(
            &root,
            "req-1",
            &[a.display().to_string(), b.display().to_string()],
        )
        .await
        .unwrap();

        assert_eq!(materialized.len(), 2);
        assert!(materialized[0].ends_with("a.txt"));
        assert!(materialized[1].ends_with("b.txt"));
        assert!(scratch.path().exists());

        let scratch_path = scratch.path().to_path_buf();
        scratch.cleanup().await;
        assert!(!scratch_path.exists());
    }

    #[tokio::test]
    async fn cleanup_on_missing_directory_does_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let (scratch, _) = ScratchDir::materialize(tmp.path(), "req-empty", &[]).await.unwrap();
        tokio::fs::remove_dir_all(scratch.path()).await.unwrap();
        scratch.cleanup().await;
    }
}
