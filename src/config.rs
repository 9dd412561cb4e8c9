//! Settings for data locations and the working directory.
//!
//! Settings come from a `.junifer.toml` in the current directory or one of its
//! ancestors, followed by environment overrides:
//!
//! | Variable            | Field      |
//! |---------------------|------------|
//! | `JUNIFER_WORKDIR`   | `workdir`  |
//! | `JUNIFER_DATA_DIR`  | `data_dir` |
//! | `JUNIFER_XFMS_DIR`  | `xfms_dir` |
//!
//! ```toml
//! workdir = "/scratch/junifer"
//! data_dir = "/data/junifer"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = ".junifer.toml";
pub const DEFAULT_DATA_URL: &str = "https://gin.g-node.org/juaml/junifer-data/raw/main";
pub const DEFAULT_XFMS_URL: &str = "https://gin.g-node.org/juaml/human-template-xfms/raw/main/xfms";
pub const DEFAULT_TEMPLATES_URL: &str = "https://templateflow.s3.amazonaws.com";

const MAX_TRAVERSAL_DEPTH: usize = 10;

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Locations used by the working directory manager and the spatial registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root working directory; `<temp>/junifer` when unset.
    pub workdir: Option<PathBuf>,
    pub data_dir: PathBuf,
    /// `<data_dir>/xfms` when unset.
    pub xfms_dir: Option<PathBuf>,
    /// `<data_dir>/templates` when unset.
    pub templates_dir: Option<PathBuf>,
    pub data_url: String,
    pub xfms_url: String,
    pub templates_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workdir: None,
            data_dir: default_data_dir(),
            xfms_dir: None,
            templates_dir: None,
            data_url: DEFAULT_DATA_URL.to_string(),
            xfms_url: DEFAULT_XFMS_URL.to_string(),
            templates_url: DEFAULT_TEMPLATES_URL.to_string(),
        }
    }
}

impl Settings {
    /// Settings rooted at one data directory, with everything else defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn resolved_workdir(&self) -> PathBuf {
        self.workdir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("junifer"))
    }

    pub fn resolved_xfms_dir(&self) -> PathBuf {
        self.xfms_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("xfms"))
    }

    pub fn resolved_templates_dir(&self) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("templates"))
    }

    /// Apply `JUNIFER_*` environment overrides.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(dir) = env_path("JUNIFER_WORKDIR") {
            self.workdir = Some(dir);
        }
        if let Some(dir) = env_path("JUNIFER_DATA_DIR") {
            self.data_dir = dir;
        }
        if let Some(dir) = env_path("JUNIFER_XFMS_DIR") {
            self.xfms_dir = Some(dir);
        }
        self
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("junifer")
        .join("data")
}

/// Parse settings from TOML contents.
pub fn parse_settings(contents: &str) -> Result<Settings, String> {
    toml::from_str::<Settings>(contents)
        .map_err(|e| format!("Failed to parse {CONFIG_FILE_NAME}: {e}"))
}

fn try_load_settings_from_path(path: &Path) -> Option<Settings> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
            }
            return None;
        }
    };

    match parse_settings(&contents) {
        Ok(settings) => {
            tracing::debug!("Loaded settings from {}", path.display());
            Some(settings)
        }
        Err(e) => {
            tracing::warn!("{}. Using defaults.", e);
            None
        }
    }
}

/// Directory and its ancestors, at most `max_depth` entries.
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Search `start` and its ancestors for a config file, without env overrides.
pub fn load_settings_from(start: PathBuf) -> Settings {
    directory_ancestors(start, MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_settings_from_path(&path))
        .unwrap_or_else(|| {
            tracing::debug!(
                "No {} found after checking {} directories. Using defaults.",
                CONFIG_FILE_NAME,
                MAX_TRAVERSAL_DEPTH
            );
            Settings::default()
        })
}

/// Load settings for the current directory and apply env overrides.
pub fn load_settings() -> Settings {
    let settings = match std::env::current_dir() {
        Ok(dir) => load_settings_from(dir),
        Err(e) => {
            tracing::warn!("Failed to get current directory: {}. Using defaults.", e);
            Settings::default()
        }
    };
    settings.apply_env_overrides()
}

/// Process-wide settings, loaded once.
pub fn get_settings() -> &'static Settings {
    SETTINGS.get_or_init(load_settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_derive_sub_directories() {
        let settings = Settings::with_data_dir("/data/junifer");
        assert_eq!(settings.resolved_xfms_dir(), PathBuf::from("/data/junifer/xfms"));
        assert_eq!(
            settings.resolved_templates_dir(),
            PathBuf::from("/data/junifer/templates")
        );
        assert_eq!(settings.resolved_workdir(), std::env::temp_dir().join("junifer"));
    }

    #[test]
    fn test_parse_partial_settings() {
        let settings = parse_settings("workdir = \"/scratch\"\n").unwrap();
        assert_eq!(settings.workdir, Some(PathBuf::from("/scratch")));
        assert_eq!(settings.data_url, DEFAULT_DATA_URL);
    }

    #[test]
    fn test_parse_invalid_settings() {
        let err = parse_settings("workdir = [").unwrap_err();
        assert!(err.contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_load_settings_from_ancestor() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "data_dir = \"/opt/junifer-data\"\n",
        )
        .unwrap();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let settings = load_settings_from(nested);
        assert_eq!(settings.data_dir, PathBuf::from("/opt/junifer-data"));
    }

    #[test]
    fn test_directory_ancestors_respects_depth() {
        let dirs: Vec<_> = directory_ancestors(PathBuf::from("/a/b/c/d"), 2).collect();
        assert_eq!(dirs, vec![PathBuf::from("/a/b/c/d"), PathBuf::from("/a/b/c")]);
    }
}
