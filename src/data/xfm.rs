//! Template-to-template transform files.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::errors::DataError;
use crate::fetch::Fetcher;

/// Cache of ANTs composite transforms between template spaces.
///
/// ```text
/// <xfms_dir>/<src>_to_<dst>/<src>_to_<dst>_Composite.h5
/// ```
#[derive(Clone)]
pub struct XfmCache {
    dir: PathBuf,
    url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for XfmCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XfmCache")
            .field("dir", &self.dir)
            .field("url", &self.url)
            .finish()
    }
}

impl XfmCache {
    pub fn new(dir: impl Into<PathBuf>, url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            dir: dir.into(),
            url: url.into().trim_end_matches('/').to_string(),
            fetcher,
        }
    }

    /// Where the `src` to `dst` transform lives, whether or not it is cached.
    pub fn xfm_path(&self, src: &str, dst: &str) -> PathBuf {
        let pair = format!("{src}_to_{dst}");
        self.dir.join(&pair).join(format!("{pair}_Composite.h5"))
    }

    /// Path of the `src` to `dst` transform, downloading it on first use.
    pub fn get_xfm(&self, src: &str, dst: &str) -> Result<PathBuf, DataError> {
        let path = self.xfm_path(src, dst);
        if path.exists() {
            debug!("Using cached transform {}", path.display());
            return Ok(path);
        }
        let pair = format!("{src}_to_{dst}");
        let url = format!("{}/{pair}/{pair}_Composite.h5", self.url);
        self.fetcher.fetch(&url, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::StaticFetcher;
    use tempfile::TempDir;

    #[test]
    fn test_get_xfm_downloads_once() {
        let temp = TempDir::new().unwrap();
        let fetcher = Arc::new(StaticFetcher::new());
        let cache = XfmCache::new(temp.path(), "https://host/xfms/", fetcher.clone());

        let path = cache.get_xfm("MNI152NLin6Asym", "MNI152NLin2009cAsym").unwrap();
        assert_eq!(
            path,
            temp.path()
                .join("MNI152NLin6Asym_to_MNI152NLin2009cAsym")
                .join("MNI152NLin6Asym_to_MNI152NLin2009cAsym_Composite.h5")
        );
        assert!(path.exists());
        cache.get_xfm("MNI152NLin6Asym", "MNI152NLin2009cAsym").unwrap();

        assert_eq!(
            fetcher.requests(),
            vec!["https://host/xfms/MNI152NLin6Asym_to_MNI152NLin2009cAsym/MNI152NLin6Asym_to_MNI152NLin2009cAsym_Composite.h5".to_string()]
        );
    }
}
