//! Workspace management.
//!
//! Each run works inside `<repo_root>/<timestamp>/`, a copy of the
//! `terraform/` and `ansible/` source trees. The checked-out sources are
//! never mutated; old workspaces are pruned down to a retention count after
//! a run completes.

use crate::errors::WorkspaceError;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Timestamp format embedded in workspace directory names. Lexicographic
/// order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub struct WorkspaceManager {
    repo_root: PathBuf,
    source_trees: Vec<PathBuf>,
}

impl WorkspaceManager {
    pub fn new(repo_root: &Path, source_trees: Vec<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            source_trees,
        }
    }

    /// Create the timestamped workspace and copy every source tree into it.
    ///
    /// Fatal on a missing source tree or a failed copy; a partially copied
    /// workspace is never returned.
    pub fn create(&self, timestamp: &str) -> Result<PathBuf, WorkspaceError> {
        for tree in &self.source_trees {
            if !tree.is_dir() {
                return Err(WorkspaceError::MissingSource { path: tree.clone() });
            }
        }

        let workspace = self.repo_root.join(timestamp);
        fs::create_dir_all(&workspace).map_err(|source| WorkspaceError::CreateFailed {
            path: workspace.clone(),
            source,
        })?;

        for tree in &self.source_trees {
            let name = tree.file_name().expect("source tree has a final path component");
            copy_tree(tree, &workspace.join(name))?;
        }

        tracing::info!(workspace = %workspace.display(), "workspace created");
        Ok(workspace)
    }

    /// Delete all but the `retain` most recent workspaces. Best effort:
    /// failures are logged and skipped. Returns the number removed.
    pub fn cleanup_old(&self, retain: usize) -> usize {
        let mut names: Vec<String> = match fs::read_dir(&self.repo_root) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| is_workspace_name(name))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list workspaces for cleanup");
                return 0;
            }
        };

        names.sort();
        if names.len() <= retain {
            return 0;
        }

        let doomed_count = names.len() - retain;
        let mut removed = 0;
        for name in names.into_iter().take(doomed_count) {
            let path = self.repo_root.join(&name);
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    tracing::info!(workspace = %path.display(), "pruned old workspace");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(workspace = %path.display(), error = %e, "failed to prune workspace");
                }
            }
        }
        removed
    }
}

/// `YYYYMMDD-HHMMSS` directory names produced by [`TIMESTAMP_FORMAT`].
fn is_workspace_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 15
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'-'
        && bytes[9..].iter().all(u8::is_ascii_digit)
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(), WorkspaceError> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| WorkspaceError::CopyFailed {
            path: src.to_path_buf(),
            source: e.into(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under its root");
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|source| WorkspaceError::CopyFailed {
                path: target.clone(),
                source,
            })?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| WorkspaceError::CopyFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::copy(entry.path(), &target).map_err(|source| WorkspaceError::CopyFailed {
                path: entry.path().to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed_sources(root: &Path) -> Vec<PathBuf> {
        let tf = root.join("terraform");
        let ansible = root.join("ansible");
        fs::create_dir_all(tf.join("modules")).unwrap();
        fs::create_dir_all(&ansible).unwrap();
        fs::write(tf.join("main.tf"), "resource {}\n").unwrap();
        fs::write(tf.join("modules/net.tf"), "module {}\n").unwrap();
        fs::write(ansible.join("deploy_jenkins.yml"), "- hosts: localhost\n").unwrap();
        vec![tf, ansible]
    }

    #[test]
    fn create_copies_both_trees() {
        let dir = tempdir().unwrap();
        let trees = seed_sources(dir.path());
        let mgr = WorkspaceManager::new(dir.path(), trees);

        let ws = mgr.create("20260101-120000").unwrap();
        assert!(ws.join("terraform/main.tf").is_file());
        assert!(ws.join("terraform/modules/net.tf").is_file());
        assert!(ws.join("ansible/deploy_jenkins.yml").is_file());
    }

    #[test]
    fn create_never_returns_the_source_tree() {
        let dir = tempdir().unwrap();
        let trees = seed_sources(dir.path());
        let mgr = WorkspaceManager::new(dir.path(), trees.clone());

        let ws = mgr.create("20260101-120000").unwrap();
        assert_ne!(ws, dir.path());
        for tree in &trees {
            assert!(!ws.starts_with(tree));
        }
        // Mutating the copy leaves the source intact.
        fs::write(ws.join("terraform/main.tf"), "changed\n").unwrap();
        let original = fs::read_to_string(dir.path().join("terraform/main.tf")).unwrap();
        assert_eq!(original, "resource {}\n");
    }

    #[test]
    fn create_fails_on_missing_source_tree() {
        let dir = tempdir().unwrap();
        let mgr = WorkspaceManager::new(
            dir.path(),
            vec![dir.path().join("terraform"), dir.path().join("ansible")],
        );
        let err = mgr.create("20260101-120000").unwrap_err();
        assert!(matches!(err, WorkspaceError::MissingSource { .. }));
    }

    #[test]
    fn cleanup_retains_most_recent() {
        let dir = tempdir().unwrap();
        let trees = seed_sources(dir.path());
        let mgr = WorkspaceManager::new(dir.path(), trees);

        for ts in [
            "20260101-120000",
            "20260102-120000",
            "20260103-120000",
            "20260104-120000",
        ] {
            mgr.create(ts).unwrap();
        }

        let removed = mgr.cleanup_old(2);
        assert_eq!(removed, 2);
        assert!(!dir.path().join("20260101-120000").exists());
        assert!(!dir.path().join("20260102-120000").exists());
        assert!(dir.path().join("20260103-120000").exists());
        assert!(dir.path().join("20260104-120000").exists());
    }

    #[test]
    fn cleanup_is_noop_when_under_retention() {
        let dir = tempdir().unwrap();
        let trees = seed_sources(dir.path());
        let mgr = WorkspaceManager::new(dir.path(), trees);

        mgr.create("20260101-120000").unwrap();
        mgr.create("20260102-120000").unwrap();
        assert_eq!(mgr.cleanup_old(5), 0);
        assert!(dir.path().join("20260101-120000").exists());
    }

    #[test]
    fn cleanup_ignores_non_workspace_directories() {
        let dir = tempdir().unwrap();
        let trees = seed_sources(dir.path());
        let mgr = WorkspaceManager::new(dir.path(), trees);

        mgr.create("20260101-120000").unwrap();
        mgr.create("20260102-120000").unwrap();

        let removed = mgr.cleanup_old(1);
        assert_eq!(removed, 1);
        // Source trees and bookkeeping directories survive.
        assert!(dir.path().join("terraform").exists());
        assert!(dir.path().join("ansible").exists());
    }

    #[test]
    fn workspace_name_pattern() {
        assert!(is_workspace_name("20260806-093015"));
        assert!(!is_workspace_name("terraform"));
        assert!(!is_workspace_name("2026-08-06"));
        assert!(!is_workspace_name("20260806093015"));
        assert!(!is_workspace_name("20260806-09301"));
    }
}
