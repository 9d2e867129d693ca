//! Private scratch directories.
//!
//! Every collector and list owns one [`ScratchDir`]. The directory is removed
//! when the guard is closed or dropped. Live directories are also recorded
//! in a process-wide registry so that [`cleanup_registered`] can remove them
//! on abnormal termination (panic hook, Ctrl-C handler).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once, OnceLock, PoisonError};

use binning_common::Result;
use tempfile::TempDir;
use tracing::{debug, warn};

fn registry() -> MutexGuard<'static, HashSet<PathBuf>> {
    static REGISTRY: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// An exclusive temporary directory, deleted on close or drop.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    /// Create a scratch directory below `root`, or below the system temp
    /// directory if `root` is `None`.
    pub fn create(root: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        registry().insert(path.clone());
        debug!(path = %path.display(), "Created scratch directory");

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory, reporting I/O errors.
    pub fn close(mut self) -> Result<()> {
        registry().remove(&self.path);
        if let Some(dir) = self.dir.take() {
            dir.close()?;
        }
        Ok(())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.dir.is_some() {
            registry().remove(&self.path);
        }
    }
}

/// Paths of all live scratch directories.
#[cfg(test)]
fn registered_dirs() -> Vec<PathBuf> {
    registry().iter().cloned().collect()
}

/// Remove every live scratch directory. Returns the number removed.
pub fn cleanup_registered() -> usize {
    let paths: Vec<PathBuf> = registry().drain().collect();
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch directory"),
        }
    }
    removed
}

/// Install a panic hook that removes all scratch directories before
/// delegating to the previous hook. Installing more than once is a no-op.
pub fn install_cleanup_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            cleanup_registered();
            previous(info);
        }));
    });
}
