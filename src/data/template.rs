//! Template images used as reference grids of template-to-template warps.

use std::path::PathBuf;
use std::sync::Arc;

use crate::data::utils::{closest_resolution, format_resolution};
use crate::errors::DataError;
use crate::fetch::Fetcher;

/// Template spaces with a T1w template and their resolutions in mm.
pub const TEMPLATE_SPACES: &[(&str, &[f64])] = &[
    ("MNI152Lin", &[1.0, 2.0]),
    ("MNI152NLin2009aAsym", &[1.0, 2.0]),
    ("MNI152NLin2009cAsym", &[1.0, 2.0]),
    ("MNI152NLin6Asym", &[1.0, 2.0]),
];

/// Templateflow-style template store.
///
/// ```text
/// <templates_dir>/<space>/tpl-<space>_res-<NN>_T1w.nii.gz
/// ```
#[derive(Clone)]
pub struct TemplateStore {
    dir: PathBuf,
    url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStore").field("dir", &self.dir).finish()
    }
}

fn resolution_tag(resolution: f64) -> String {
    if resolution.fract() == 0.0 {
        format!("{:02}", resolution as i64)
    } else {
        format_resolution(resolution)
    }
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>, url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            dir: dir.into(),
            url: url.into().trim_end_matches('/').to_string(),
            fetcher,
        }
    }

    pub fn valid_resolutions(space: &str) -> Result<&'static [f64], DataError> {
        TEMPLATE_SPACES
            .iter()
            .find(|(name, _)| *name == space)
            .map(|(_, resolutions)| *resolutions)
            .ok_or_else(|| {
                let known: Vec<&str> = TEMPLATE_SPACES.iter().map(|(name, _)| *name).collect();
                DataError::invalid_parameter("space", space, &known)
            })
    }

    /// Template path for `space` at the closest available resolution.
    pub fn get_template(&self, space: &str, resolution: Option<f64>) -> Result<PathBuf, DataError> {
        let valid = Self::valid_resolutions(space)?;
        let resolution = closest_resolution(resolution, valid).ok_or_else(|| {
            DataError::configuration(format!("No resolutions available for template {space}"))
        })?;
        let file = format!("tpl-{space}_res-{}_T1w.nii.gz", resolution_tag(resolution));
        let path = self.dir.join(space).join(&file);
        if !path.exists() {
            let url = format!("{}/tpl-{space}/{file}", self.url);
            self.fetcher.fetch(&url, &path)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::StaticFetcher;
    use tempfile::TempDir;

    #[test]
    fn test_template_path_and_resolution() {
        let temp = TempDir::new().unwrap();
        let store = TemplateStore::new(temp.path(), "https://tf", Arc::new(StaticFetcher::new()));
        let path = store.get_template("MNI152NLin6Asym", Some(3.0)).unwrap();
        assert_eq!(
            path,
            temp.path()
                .join("MNI152NLin6Asym")
                .join("tpl-MNI152NLin6Asym_res-02_T1w.nii.gz")
        );
    }

    #[test]
    fn test_unknown_space_lists_known_spaces() {
        let temp = TempDir::new().unwrap();
        let store = TemplateStore::new(temp.path(), "https://tf", Arc::new(StaticFetcher::new()));
        let err = store.get_template("Talairach", None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Talairach"));
        assert!(msg.contains("MNI152NLin6Asym"));
    }
}
