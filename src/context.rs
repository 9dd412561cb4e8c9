//! Process-wide state of a run.
//!
//! A [`Context`] owns one instance each of the working directory manager, the
//! component registry and the four spatial registries, together with the
//! collaborators they share (command runner, fetcher, settings). Every
//! accessor hands out the same `Arc` on every call.
//!
//! [`Context::global`] is the lazily built process-wide context;
//! [`Context::builder`] builds isolated ones for tests and embedding.
//!
//! # Example
//!
//! ```rust,no_run
//! use junifer::config::Settings;
//! use junifer::context::Context;
//!
//! let ctx = Context::builder()
//!     .settings(Settings::with_data_dir("/data/junifer"))
//!     .workdir("/scratch/junifer")
//!     .build()
//!     .unwrap();
//! assert!(std::sync::Arc::ptr_eq(&ctx.masks(), &ctx.masks()));
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::{get_settings, Settings};
use crate::data::coordinates::CoordinatesRegistry;
use crate::data::env::DataEnv;
use crate::data::maps::MapsRegistry;
use crate::data::masks::MaskRegistry;
use crate::data::parcellations::ParcellationRegistry;
use crate::errors::WorkDirError;
use crate::external::{CommandRunner, SystemRunner};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::pipeline::registry::PipelineComponentRegistry;
use crate::workdir::WorkDirManager;

static GLOBAL: Lazy<RwLock<Option<Arc<Context>>>> = Lazy::new(|| RwLock::new(None));

/// Shared state for one run.
#[derive(Debug)]
pub struct Context {
    settings: Arc<Settings>,
    workdir: Arc<WorkDirManager>,
    components: Arc<PipelineComponentRegistry>,
    data_env: Arc<DataEnv>,
    coordinates: Arc<CoordinatesRegistry>,
    parcellations: Arc<ParcellationRegistry>,
    masks: Arc<MaskRegistry>,
    maps: Arc<MapsRegistry>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// The process-wide context, built from the loaded settings on first use.
    ///
    /// The global context lives in a static that is never dropped, so the
    /// working directory manager's drop cleanup does not run for it at exit.
    /// Call [`Context::reset_global`] before exiting to remove its scratch
    /// directories.
    pub fn global() -> Arc<Context> {
        if let Some(ctx) = GLOBAL.read().as_ref() {
            return Arc::clone(ctx);
        }
        let mut global = GLOBAL.write();
        Arc::clone(global.get_or_insert_with(|| {
            debug!("Building global context");
            Arc::new(ContextBuilder::default().build_deferred())
        }))
    }

    /// Tear down the process-wide context; the next [`Context::global`]
    /// builds a fresh one.
    pub fn reset_global() -> Result<(), WorkDirError> {
        let previous = GLOBAL.write().take();
        match previous {
            Some(ctx) => ctx.workdir.teardown(),
            None => Ok(()),
        }
    }

    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }

    pub fn workdir_manager(&self) -> Arc<WorkDirManager> {
        Arc::clone(&self.workdir)
    }

    pub fn components(&self) -> Arc<PipelineComponentRegistry> {
        Arc::clone(&self.components)
    }

    pub fn data_env(&self) -> Arc<DataEnv> {
        Arc::clone(&self.data_env)
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.data_env.runner)
    }

    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        Arc::clone(&self.data_env.fetcher)
    }

    pub fn coordinates(&self) -> Arc<CoordinatesRegistry> {
        Arc::clone(&self.coordinates)
    }

    pub fn parcellations(&self) -> Arc<ParcellationRegistry> {
        Arc::clone(&self.parcellations)
    }

    pub fn masks(&self) -> Arc<MaskRegistry> {
        Arc::clone(&self.masks)
    }

    pub fn maps(&self) -> Arc<MapsRegistry> {
        Arc::clone(&self.maps)
    }
}

/// Builder for [`Context`]; unset parts fall back to the loaded settings,
/// the system runner and HTTP downloads.
#[derive(Default)]
pub struct ContextBuilder {
    settings: Option<Settings>,
    workdir: Option<PathBuf>,
    runner: Option<Arc<dyn CommandRunner>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    components: Option<Arc<PipelineComponentRegistry>>,
}

impl ContextBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Overrides the working directory from the settings.
    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn components(mut self, components: Arc<PipelineComponentRegistry>) -> Self {
        self.components = Some(components);
        self
    }

    /// Build the context, creating the working directory now.
    pub fn build(self) -> Result<Context, WorkDirError> {
        let settings = self.resolved_settings();
        let workdir = WorkDirManager::new(Some(self.resolved_workdir(&settings)))?;
        Ok(self.assemble(settings, workdir))
    }

    fn build_deferred(self) -> Context {
        let settings = self.resolved_settings();
        let workdir = WorkDirManager::deferred(self.resolved_workdir(&settings));
        self.assemble(settings, workdir)
    }

    fn resolved_settings(&self) -> Settings {
        self.settings
            .clone()
            .unwrap_or_else(|| get_settings().clone())
    }

    fn resolved_workdir(&self, settings: &Settings) -> PathBuf {
        self.workdir
            .clone()
            .unwrap_or_else(|| settings.resolved_workdir())
    }

    fn assemble(self, settings: Settings, workdir: WorkDirManager) -> Context {
        let workdir = Arc::new(workdir);
        let runner = self.runner.unwrap_or_else(|| Arc::new(SystemRunner));
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::default()));
        if !settings.data_dir.exists() {
            warn!(
                "Data directory {} does not exist yet; files will be fetched on demand",
                settings.data_dir.display()
            );
        }
        let data_env = Arc::new(DataEnv::new(&settings, Arc::clone(&workdir), runner, fetcher));
        Context {
            coordinates: Arc::new(CoordinatesRegistry::new(Arc::clone(&data_env))),
            parcellations: Arc::new(ParcellationRegistry::new(Arc::clone(&data_env))),
            masks: Arc::new(MaskRegistry::new(Arc::clone(&data_env))),
            maps: Arc::new(MapsRegistry::new(Arc::clone(&data_env))),
            components: self
                .components
                .unwrap_or_else(|| Arc::new(PipelineComponentRegistry::new())),
            settings: Arc::new(settings),
            workdir,
            data_env,
        }
    }
}
