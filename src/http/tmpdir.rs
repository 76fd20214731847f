//! Per-request scratch directories.
//!
//! # Responsibilities
//! - Create `<root>/<request-id>` before any body is read
//! - Remove it exactly once when the request's response is done
//!
//! # Design Decisions
//! - [`TmpDir`] is an owned guard; removal happens in `Drop`, so it runs on
//!   success, error responses, client aborts and panics alike
//! - The guard travels inside the response body and is dropped when the
//!   body has been sent or abandoned
//! - Removal failures are logged, never surfaced to the client

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Allocates scratch directories under a fixed root.
#[derive(Debug, Clone)]
pub struct TmpDirs {
    root: PathBuf,
}

impl TmpDirs {
    /// Create an allocator rooted at `root`. Relative roots are resolved
    /// against the current directory.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory path for a request id.
    pub fn path_for(&self, request_id: &Uuid) -> PathBuf {
        self.root.join(request_id.to_string())
    }

    /// Create the directory for `request_id`.
    pub fn allocate(&self, request_id: &Uuid) -> io::Result<TmpDir> {
        let path = self.path_for(request_id);
        std::fs::create_dir_all(&path)?;
        tracing::trace!(path = %path.display(), "Scratch directory created");
        Ok(TmpDir { path })
    }
}

/// Guard for one request's scratch directory.
#[derive(Debug)]
pub struct TmpDir {
    path: PathBuf,
}

impl TmpDir {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "Scratch directory removed"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove scratch directory"
            ),
        }
    }
}
