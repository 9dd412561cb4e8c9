//! Scratch directory management.
//!
//! Layout under the working directory:
//!
//! ```text
//! <workdir>/                 (default: <temp>/junifer)
//!   <root_tempdir>/          (created on first request)
//!     <component_tempdir>/   (one per get_tempdir call)
//!     <element_tempdir>/     (one per get_element_tempdir call)
//! ```
//!
//! The root temporary directory is removed when an element finishes
//! ([`WorkDirManager::cleanup_elementdir`]), when the working directory moves,
//! and when the manager is dropped.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::WorkDirError;

const ROOT_PREFIX: &str = "junifer";
const ELEMENT_PREFIX: &str = "element";
const ELEMENT_SUFFIX: &str = "_tmp";

#[derive(Debug)]
struct State {
    workdir: PathBuf,
    root_tempdir: Option<PathBuf>,
}

/// Single authority for scratch space used during a run.
#[derive(Debug)]
pub struct WorkDirManager {
    state: Mutex<State>,
}

fn ensure_dir(path: &Path) -> Result<(), WorkDirError> {
    fs::create_dir_all(path).map_err(|e| WorkDirError::create(path, e))
}

fn remove_dir(path: &Path) -> Result<(), WorkDirError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkDirError::remove(path, e)),
    }
}

/// `mkdtemp` equivalent: a fresh, uniquely named directory that is kept.
fn make_unique_dir(parent: &Path, prefix: &str, suffix: &str) -> Result<PathBuf, WorkDirError> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempdir_in(parent)
        .map(|dir| dir.keep())
        .map_err(|e| WorkDirError::create(parent, e))
}

impl WorkDirManager {
    /// Create a manager rooted at `workdir`, or `<temp>/junifer` when `None`.
    pub fn new(workdir: Option<PathBuf>) -> Result<Self, WorkDirError> {
        let workdir = workdir.unwrap_or_else(|| std::env::temp_dir().join("junifer"));
        ensure_dir(&workdir)?;
        debug!("Working directory set to {}", workdir.display());
        Ok(Self {
            state: Mutex::new(State {
                workdir,
                root_tempdir: None,
            }),
        })
    }

    /// A manager whose working directory is created on the first scratch
    /// request rather than now.
    pub(crate) fn deferred(workdir: PathBuf) -> Self {
        Self {
            state: Mutex::new(State {
                workdir,
                root_tempdir: None,
            }),
        }
    }

    /// The manager of the process-wide context.
    pub fn global() -> Arc<WorkDirManager> {
        crate::context::Context::global().workdir_manager()
    }

    pub fn workdir(&self) -> PathBuf {
        self.state.lock().workdir.clone()
    }

    /// Move the working directory.
    ///
    /// A root temporary directory created under the old path is removed first.
    pub fn set_workdir(&self, workdir: impl Into<PathBuf>) -> Result<(), WorkDirError> {
        let workdir = workdir.into();
        let mut state = self.state.lock();
        if state.workdir == workdir {
            return ensure_dir(&workdir);
        }
        if let Some(root) = &state.root_tempdir {
            debug!("Removing root temporary directory {}", root.display());
        }
        Self::release_root(&mut state)?;
        ensure_dir(&workdir)?;
        debug!("Working directory set to {}", workdir.display());
        state.workdir = workdir;
        Ok(())
    }

    pub fn root_tempdir(&self) -> Option<PathBuf> {
        self.state.lock().root_tempdir.clone()
    }

    /// Forget the root temporary directory once it is gone from disk.
    fn release_root(state: &mut State) -> Result<(), WorkDirError> {
        if let Some(root) = &state.root_tempdir {
            remove_dir(root)?;
        }
        state.root_tempdir = None;
        Ok(())
    }

    fn ensure_root(state: &mut State) -> Result<PathBuf, WorkDirError> {
        if let Some(root) = &state.root_tempdir {
            return Ok(root.clone());
        }
        ensure_dir(&state.workdir)?;
        let root = make_unique_dir(&state.workdir, ROOT_PREFIX, "")?;
        debug!("Created root temporary directory {}", root.display());
        state.root_tempdir = Some(root.clone());
        Ok(root)
    }

    /// A fresh directory under the root temporary directory.
    pub fn get_tempdir(
        &self,
        prefix: Option<&str>,
        suffix: Option<&str>,
    ) -> Result<PathBuf, WorkDirError> {
        let mut state = self.state.lock();
        let root = Self::ensure_root(&mut state)?;
        let dir = make_unique_dir(&root, prefix.unwrap_or("tmp"), suffix.unwrap_or(""))?;
        debug!("Created temporary directory {}", dir.display());
        Ok(dir)
    }

    /// A fresh directory for outputs that must live until the element finishes.
    pub fn get_element_tempdir(&self, prefix: Option<&str>) -> Result<PathBuf, WorkDirError> {
        let mut state = self.state.lock();
        let root = Self::ensure_root(&mut state)?;
        let prefix = prefix.map_or_else(
            || ELEMENT_PREFIX.to_string(),
            |p| format!("{ELEMENT_PREFIX}_{p}"),
        );
        let dir = make_unique_dir(&root, &prefix, ELEMENT_SUFFIX)?;
        debug!("Created element temporary directory {}", dir.display());
        Ok(dir)
    }

    /// Remove `path` recursively. Missing directories are ignored.
    ///
    /// The root temporary directory goes as well once it is empty.
    pub fn delete_tempdir(&self, path: &Path) -> Result<(), WorkDirError> {
        debug!("Deleting temporary directory {}", path.display());
        remove_dir(path)?;

        let mut state = self.state.lock();
        if let Some(root) = state.root_tempdir.clone() {
            let empty = fs::read_dir(&root)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true);
            if empty {
                debug!("Removing empty root temporary directory {}", root.display());
                remove_dir(&root)?;
                state.root_tempdir = None;
            }
        }
        Ok(())
    }

    /// Remove everything allocated since the last cleanup.
    pub fn cleanup_elementdir(&self) -> Result<(), WorkDirError> {
        let mut state = self.state.lock();
        if let Some(root) = &state.root_tempdir {
            debug!("Cleaning up element directories in {}", root.display());
        }
        Self::release_root(&mut state)
    }

    /// Remove the root temporary directory, if any.
    pub fn teardown(&self) -> Result<(), WorkDirError> {
        self.cleanup_elementdir()
    }
}

impl Drop for WorkDirManager {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!("Failed to tear down working directory: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, WorkDirManager) {
        let temp = TempDir::new().unwrap();
        let manager = WorkDirManager::new(Some(temp.path().join("work"))).unwrap();
        (temp, manager)
    }

    #[test]
    fn test_new_creates_workdir() {
        let (temp, manager) = manager();
        assert!(temp.path().join("work").is_dir());
        assert_eq!(manager.workdir(), temp.path().join("work"));
        assert!(manager.root_tempdir().is_none());
    }

    #[test]
    fn test_get_tempdir_nests_under_root() {
        let (_temp, manager) = manager();
        let first = manager.get_tempdir(Some("warp"), Some("_x")).unwrap();
        let second = manager.get_tempdir(None, None).unwrap();
        let root = manager.root_tempdir().unwrap();

        assert_ne!(first, second);
        assert_eq!(first.parent().unwrap(), root);
        assert_eq!(second.parent().unwrap(), root);
        assert_eq!(root.parent().unwrap(), manager.workdir());
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("warp") && name.ends_with("_x"));
    }

    #[test]
    fn test_element_tempdir_naming() {
        let (_temp, manager) = manager();
        let dir = manager.get_element_tempdir(Some("fc")).unwrap();
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("element_fc"));
        assert!(name.ends_with("_tmp"));
    }

    #[test]
    fn test_delete_last_tempdir_removes_root() {
        let (_temp, manager) = manager();
        let dir = manager.get_tempdir(None, None).unwrap();
        let root = manager.root_tempdir().unwrap();

        manager.delete_tempdir(&dir).unwrap();
        assert!(!dir.exists());
        assert!(!root.exists());
        assert!(manager.root_tempdir().is_none());
    }

    #[test]
    fn test_delete_tempdir_keeps_non_empty_root() {
        let (_temp, manager) = manager();
        let a = manager.get_tempdir(None, None).unwrap();
        let b = manager.get_tempdir(None, None).unwrap();

        manager.delete_tempdir(&a).unwrap();
        assert!(b.exists());
        assert!(manager.root_tempdir().is_some());
    }

    #[test]
    fn test_delete_missing_tempdir_is_idempotent() {
        let (_temp, manager) = manager();
        let dir = manager.get_tempdir(None, None).unwrap();
        manager.delete_tempdir(&dir).unwrap();
        manager.delete_tempdir(&dir).unwrap();
    }

    #[test]
    fn test_cleanup_elementdir_removes_whole_tree() {
        let (_temp, manager) = manager();
        let a = manager.get_element_tempdir(None).unwrap();
        let b = manager.get_tempdir(None, None).unwrap();
        fs::write(a.join("out.nii"), b"x").unwrap();
        let root = manager.root_tempdir().unwrap();

        manager.cleanup_elementdir().unwrap();
        assert!(!root.exists());
        assert!(!b.exists());
        assert!(manager.root_tempdir().is_none());

        // A new element gets a new root.
        let c = manager.get_element_tempdir(None).unwrap();
        assert_ne!(manager.root_tempdir().unwrap(), root);
        assert!(c.exists());
    }

    #[test]
    fn test_set_workdir_removes_old_root() {
        let (temp, manager) = manager();
        manager.get_tempdir(None, None).unwrap();
        let old_root = manager.root_tempdir().unwrap();

        manager.set_workdir(temp.path().join("other")).unwrap();
        assert!(!old_root.exists());
        assert!(manager.root_tempdir().is_none());
        assert!(temp.path().join("other").is_dir());
    }

    #[test]
    fn test_failed_removal_keeps_root_tracked() {
        let (temp, manager) = manager();
        manager.get_tempdir(None, None).unwrap();
        let root = manager.root_tempdir().unwrap();
        // A plain file where the root directory was makes removal fail.
        fs::remove_dir_all(&root).unwrap();
        fs::write(&root, b"x").unwrap();

        assert!(manager.set_workdir(temp.path().join("other")).is_err());
        assert_eq!(manager.root_tempdir(), Some(root.clone()));
        assert_eq!(manager.workdir(), temp.path().join("work"));

        fs::remove_file(&root).unwrap();
        manager.set_workdir(temp.path().join("other")).unwrap();
        assert!(manager.root_tempdir().is_none());
    }

    #[test]
    fn test_set_same_workdir_keeps_root() {
        let (_temp, manager) = manager();
        manager.get_tempdir(None, None).unwrap();
        manager.set_workdir(manager.workdir()).unwrap();
        assert!(manager.root_tempdir().is_some());
    }

    #[test]
    fn test_drop_tears_down() {
        let temp = TempDir::new().unwrap();
        let root = {
            let manager = WorkDirManager::new(Some(temp.path().to_path_buf())).unwrap();
            manager.get_tempdir(None, None).unwrap();
            manager.root_tempdir().unwrap()
        };
        assert!(!root.exists());
    }
}
