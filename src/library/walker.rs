//! Recursive library walk.
//!
//! Yields every regular audio file under the root together with its inode.
//! Symlinks are subject to a policy: ignored (default), reported to the
//! caller without recursion, or followed.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::tags;

/// What to do when the walk meets a symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymlinkPolicy {
    /// Skip symlinks entirely.
    #[default]
    Ignore,
    /// Yield symlinks to audio files (marked), but do not recurse into
    /// symlinked directories.
    Report,
    /// Follow symlinks, recursing into directories. Loops are walkdir's
    /// problem (it detects and skips them).
    Follow,
}

/// One file produced by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub inode: u64,
    pub is_symlink: bool,
}

/// Recursive directory walker with a symlink policy.
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    policy: SymlinkPolicy,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            policy: SymlinkPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SymlinkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Walk the tree and collect every supported audio file.
    ///
    /// Files with unsupported extensions are silently skipped; entries
    /// that cannot be stat'ed are skipped with a debug log.
    pub fn files(&self) -> Vec<WalkedFile> {
        let follow = self.policy == SymlinkPolicy::Follow;
        let mut out = Vec::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(follow)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let is_symlink = entry.path_is_symlink();

            if is_symlink && self.policy == SymlinkPolicy::Ignore {
                continue;
            }

            // With Report, a symlinked file is surfaced but never resolved
            // deeper; with Follow, walkdir already resolved the target.
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(
                        target: "library::walker",
                        path = %entry.path().display(),
                        error = %e,
                        "skipping unstat-able entry"
                    );
                    continue;
                }
            };

            if !meta.is_file() && !(is_symlink && self.policy == SymlinkPolicy::Report) {
                continue;
            }

            if !tags::is_supported_path(entry.path()) {
                continue;
            }

            out.push(WalkedFile {
                path: entry.path().to_path_buf(),
                inode: meta.ino(),
                is_symlink,
            });
        }

        tracing::debug!(
            target: "library::walker",
            root = %self.root.display(),
            count = out.len(),
            "walk complete"
        );
        out
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
