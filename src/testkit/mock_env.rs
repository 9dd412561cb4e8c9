//! Isolated test environment.
//!
//! [`JuniferTestEnv`] owns a temporary directory holding a data directory and
//! a working directory, plus a [`Context`] wired to a [`RecordingRunner`] and
//! a [`StaticFetcher`]. Nothing touches the network, runs an external binary
//! or shares registries with other tests.
//!
//! # Example
//!
//! ```rust
//! use junifer::testkit::JuniferTestEnv;
//!
//! let env = JuniferTestEnv::new()
//!     .with_data_file("masks/vickery-patil/mask.txt", b"x");
//! assert!(env.data_dir().join("masks/vickery-patil/mask.txt").is_file());
//! assert!(env.context().masks().list().contains(&"GM_prob0.2".to_string()));
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::Settings;
use crate::context::Context;
use crate::data::image::Image;
use crate::testkit::mocks::{RecordingRunner, StaticFetcher};

/// Temporary data and working directories with a context bound to them.
pub struct JuniferTestEnv {
    temp: TempDir,
    runner: RecordingRunner,
    fetcher: StaticFetcher,
    context: Context,
}

impl Default for JuniferTestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl JuniferTestEnv {
    /// # Panics
    ///
    /// Panics if the temporary directories cannot be created.
    pub fn new() -> Self {
        Self::with_fetcher(StaticFetcher::new())
    }

    /// Like [`JuniferTestEnv::new`] with a pre-routed fetcher.
    pub fn with_fetcher(fetcher: StaticFetcher) -> Self {
        let temp = TempDir::new().unwrap_or_else(|e| panic!("Failed to create temp dir: {e}"));
        fs::create_dir_all(temp.path().join("data"))
            .unwrap_or_else(|e| panic!("Failed to create data dir: {e}"));
        let runner = RecordingRunner::new();
        let context = Context::builder()
            .settings(Settings::with_data_dir(temp.path().join("data")))
            .workdir(temp.path().join("work"))
            .runner(Arc::new(runner.clone()))
            .fetcher(Arc::new(fetcher.clone()))
            .build()
            .unwrap_or_else(|e| panic!("Failed to build test context: {e}"));
        Self {
            temp,
            runner,
            fetcher,
            context,
        }
    }

    /// Write `bytes` to `relative` under the data directory.
    pub fn with_data_file(self, relative: &str, bytes: &[u8]) -> Self {
        let path = self.data_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("Failed to create {}: {e}", parent.display()));
        }
        fs::write(&path, bytes).unwrap_or_else(|e| panic!("Failed to write {}: {e}", path.display()));
        self
    }

    /// Save `image` to `relative` under the data directory.
    pub fn with_data_image(self, relative: &str, image: &Image) -> Self {
        let path = self.data_dir().join(relative);
        image
            .save(&path)
            .unwrap_or_else(|e| panic!("Failed to save {}: {e}", path.display()));
        self
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    /// A scratch path outside the data and working directories.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.temp.path().join("scratch").join(name)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn runner(&self) -> &RecordingRunner {
        &self.runner
    }

    pub fn fetcher(&self) -> &StaticFetcher {
        &self.fetcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::helpers::blob_image;

    #[test]
    fn test_env_is_isolated() {
        let a = JuniferTestEnv::new();
        let b = JuniferTestEnv::new();
        assert_ne!(a.data_dir(), b.data_dir());
        assert!(a.context().workdir_manager().workdir().starts_with(a.root()));
    }

    #[test]
    fn test_with_data_image_roundtrips() {
        let env = JuniferTestEnv::new().with_data_image("img/blob.nii.gz", &blob_image([4, 4, 4], 2.0));
        let loaded = Image::load(&env.data_dir().join("img/blob.nii.gz")).unwrap();
        assert_eq!(loaded.shape(), &[4, 4, 4]);
    }
}
