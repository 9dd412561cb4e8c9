//! Collaborators shared by the spatial registries and warpers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::data::template::TemplateStore;
use crate::data::xfm::XfmCache;
use crate::errors::DataError;
use crate::external::CommandRunner;
use crate::fetch::Fetcher;
use crate::workdir::WorkDirManager;

/// Everything a registry needs to fetch, warp and stage its data.
#[derive(Clone)]
pub struct DataEnv {
    pub workdir: Arc<WorkDirManager>,
    pub runner: Arc<dyn CommandRunner>,
    pub fetcher: Arc<dyn Fetcher>,
    pub data_dir: PathBuf,
    pub data_url: String,
    pub xfms: XfmCache,
    pub templates: TemplateStore,
}

impl std::fmt::Debug for DataEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataEnv")
            .field("data_dir", &self.data_dir)
            .field("data_url", &self.data_url)
            .field("xfms", &self.xfms)
            .field("templates", &self.templates)
            .finish()
    }
}

impl DataEnv {
    pub fn new(
        settings: &Settings,
        workdir: Arc<WorkDirManager>,
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            xfms: XfmCache::new(
                settings.resolved_xfms_dir(),
                settings.xfms_url.clone(),
                fetcher.clone(),
            ),
            templates: TemplateStore::new(
                settings.resolved_templates_dir(),
                settings.templates_url.clone(),
                fetcher.clone(),
            ),
            data_dir: settings.data_dir.clone(),
            data_url: settings.data_url.trim_end_matches('/').to_string(),
            workdir,
            runner,
            fetcher,
        }
    }

    /// Local path of a file of the curated data repository, fetched on first use.
    pub fn fetch_data(&self, relative: &str) -> Result<PathBuf, DataError> {
        let path = self.data_dir.join(relative);
        if !path.exists() {
            let url = format!("{}/{}", self.data_url, relative);
            self.fetcher.fetch(&url, &path)?;
        }
        Ok(path)
    }

    /// A scratch directory for one warper call.
    pub(crate) fn call_tempdir(&self, prefix: &str) -> Result<PathBuf, DataError> {
        Ok(self.workdir.get_tempdir(Some(prefix), None)?)
    }

    /// A directory whose contents must outlive the warper call.
    pub(crate) fn element_tempdir(&self, prefix: &str) -> Result<PathBuf, DataError> {
        Ok(self.workdir.get_element_tempdir(Some(prefix))?)
    }

    pub(crate) fn release_tempdir(&self, path: &Path) -> Result<(), DataError> {
        Ok(self.workdir.delete_tempdir(path)?)
    }
}
