//! Workspace janitor: sweeps stray certificate, key, and archive artifacts
//! out of the output directory.
//!
//! The sweep runs before each session and, via [`Janitor::guard`], on every
//! exit path afterwards — normal completion, operator abort, and fatal
//! errors alike. The persisted vault file is the only artifact deliberately
//! left in place.

use std::path::{Path, PathBuf};

/// File extensions treated as provisioning artifacts.
const ARTIFACT_EXTENSIONS: &[&str] = &["crt", "key", "pem", "csr", "tar", "gz", "zip"];

pub struct Janitor {
    output_dir: PathBuf,
    keep: Vec<PathBuf>,
}

impl Janitor {
    /// A janitor for `output_dir` that will never remove `vault_path`.
    pub fn new(output_dir: impl Into<PathBuf>, vault_path: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            keep: vec![vault_path.into()],
        }
    }

    /// Remove artifact files from the output directory, creating it first if
    /// needed. Returns the number of files removed.
    pub fn sweep(&self) -> std::io::Result<usize> {
        std::fs::create_dir_all(&self.output_dir)?;

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !is_artifact(&path) {
                continue;
            }
            if self.keep.iter().any(|kept| kept == &path) {
                continue;
            }
            std::fs::remove_file(&path)?;
            tracing::debug!(path = %path.display(), "removed stray artifact");
            removed += 1;
        }
        Ok(removed)
    }

    /// A guard that sweeps when dropped, so cleanup survives early returns
    /// and unwinding.
    pub fn guard(self) -> SweepGuard {
        SweepGuard { janitor: self }
    }
}

/// Runs a final sweep on drop. Failures are logged, not propagated; a drop
/// impl has nowhere to return them.
pub struct SweepGuard {
    janitor: Janitor,
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        if let Err(e) = self.janitor.sweep() {
            tracing::warn!("post-run cleanup failed: {e}");
        }
    }
}

fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ARTIFACT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_removes_artifacts_keeps_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path().join("nursery.vault");

        std::fs::write(dir.path().join("ca.crt"), b"x").unwrap();
        std::fs::write(dir.path().join("laptop.key"), b"x").unwrap();
        std::fs::write(dir.path().join("bundle.tar.gz"), b"x").unwrap();
        std::fs::write(&vault, b"encrypted").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not an artifact").unwrap();

        let janitor = Janitor::new(dir.path(), &vault);
        let removed = janitor.sweep().unwrap();
        assert_eq!(removed, 3);

        assert!(vault.exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("ca.crt").exists());
        assert!(!dir.path().join("laptop.key").exists());
        assert!(!dir.path().join("bundle.tar.gz").exists());
    }

    #[test]
    fn test_sweep_creates_missing_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let janitor = Janitor::new(&output, output.join("nursery.vault"));
        assert_eq!(janitor.sweep().unwrap(), 0);
        assert!(output.is_dir());
    }

    #[test]
    fn test_guard_sweeps_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let stray = dir.path().join("stray.crt");
        std::fs::write(&stray, b"x").unwrap();

        {
            let _guard = Janitor::new(dir.path(), dir.path().join("nursery.vault")).guard();
        }
        assert!(!stray.exists());
    }
}
