//! Registry of pipeline components.
//!
//! Maps a step ([`Step`]) and a component name to a [`ComponentClass`], a
//! named constructor. Entries may be registered deferred: the loader runs on
//! the first [`PipelineComponentRegistry::get_class`] and the resolved class
//! is cached for every later lookup.
//!
//! # Example
//!
//! ```rust
//! use junifer::pipeline::registry::{ComponentKind, PipelineComponentRegistry};
//!
//! let registry = PipelineComponentRegistry::new();
//! assert_eq!(registry.step_components("datareader").unwrap(), vec!["DefaultDataReader"]);
//!
//! let reader = registry
//!     .build_component_instance("datareader", "DefaultDataReader", ComponentKind::DataReader, None)
//!     .unwrap();
//! assert_eq!(reader.kind(), ComponentKind::DataReader);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::errors::RegistryError;
use crate::pipeline::datagrabber::DataGrabber;
use crate::pipeline::datareader::{DataReader, DefaultDataReader};
use crate::pipeline::marker::Marker;
use crate::pipeline::preprocessor::Preprocessor;
use crate::pipeline::storage::Storage;

/// Keyword parameters passed to a component constructor.
pub type ComponentParams = Map<String, Value>;

/// Pipeline steps components can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    DataGrabber,
    DataReader,
    Preprocessing,
    Marker,
    Storage,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Self::DataGrabber,
        Self::DataReader,
        Self::Preprocessing,
        Self::Marker,
        Self::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataGrabber => "datagrabber",
            Self::DataReader => "datareader",
            Self::Preprocessing => "preprocessing",
            Self::Marker => "marker",
            Self::Storage => "storage",
        }
    }

    /// Interface every component of this step must implement.
    pub fn base_kind(&self) -> ComponentKind {
        match self {
            Self::DataGrabber => ComponentKind::DataGrabber,
            Self::DataReader => ComponentKind::DataReader,
            Self::Preprocessing => ComponentKind::Preprocessor,
            Self::Marker => ComponentKind::Marker,
            Self::Storage => ComponentKind::Storage,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| RegistryError::InvalidStep {
                step: s.to_string(),
                valid: Self::ALL.iter().map(Step::as_str).collect(),
            })
    }
}

/// The interface a constructed component implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    DataGrabber,
    DataReader,
    Preprocessor,
    Marker,
    Storage,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataGrabber => "DataGrabber",
            Self::DataReader => "DataReader",
            Self::Preprocessor => "Preprocessor",
            Self::Marker => "Marker",
            Self::Storage => "Storage",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A constructed pipeline component.
pub enum Component {
    DataGrabber(Box<dyn DataGrabber>),
    DataReader(Box<dyn DataReader>),
    Preprocessor(Box<dyn Preprocessor>),
    Marker(Box<dyn Marker>),
    Storage(Box<dyn Storage>),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::DataGrabber(_) => ComponentKind::DataGrabber,
            Self::DataReader(_) => ComponentKind::DataReader,
            Self::Preprocessor(_) => ComponentKind::Preprocessor,
            Self::Marker(_) => ComponentKind::Marker,
            Self::Storage(_) => ComponentKind::Storage,
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Self::DataGrabber(c) => c.class_name(),
            Self::DataReader(c) => c.class_name(),
            Self::Preprocessor(c) => c.class_name(),
            Self::Marker(c) => c.class_name(),
            Self::Storage(c) => c.class_name(),
        }
    }

    pub fn into_datagrabber(self) -> Option<Box<dyn DataGrabber>> {
        match self {
            Self::DataGrabber(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_datareader(self) -> Option<Box<dyn DataReader>> {
        match self {
            Self::DataReader(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_preprocessor(self) -> Option<Box<dyn Preprocessor>> {
        match self {
            Self::Preprocessor(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_marker(self) -> Option<Box<dyn Marker>> {
        match self {
            Self::Marker(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_storage(self) -> Option<Box<dyn Storage>> {
        match self {
            Self::Storage(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.class_name())
    }
}

/// Failures raised by a component constructor.
#[derive(Debug, Error)]
pub enum ConstructError {
    /// A parameter has an invalid value.
    #[error("{0}")]
    Value(String),
    /// A parameter is unknown or has the wrong type.
    #[error("{0}")]
    Type(String),
}

type Constructor = dyn Fn(&ComponentParams) -> Result<Component, ConstructError> + Send + Sync;

/// A named component constructor.
#[derive(Clone)]
pub struct ComponentClass {
    name: String,
    constructor: Arc<Constructor>,
}

impl ComponentClass {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ComponentParams) -> Result<Component, ConstructError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            constructor: Arc::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn construct(&self, params: &ComponentParams) -> Result<Component, ConstructError> {
        (self.constructor)(params)
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Loader of a deferred entry.
pub type ClassLoader = fn() -> ComponentClass;

enum Entry {
    Deferred { path: String, loader: ClassLoader },
    Resolved(Arc<ComponentClass>),
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentRef {
    /// Not yet loaded; the path it will be loaded from.
    Deferred(String),
    /// Loaded class name.
    Resolved(String),
}

/// Step → name → component class.
pub struct PipelineComponentRegistry {
    components: RwLock<BTreeMap<Step, BTreeMap<String, Entry>>>,
}

impl fmt::Debug for PipelineComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineComponentRegistry")
            .field("components", &self.components())
            .finish()
    }
}

impl Default for PipelineComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn load_default_datareader() -> ComponentClass {
    ComponentClass::new(DefaultDataReader::NAME, |params| {
        DefaultDataReader::from_params(params).map(|r| Component::DataReader(Box::new(r)))
    })
}

impl PipelineComponentRegistry {
    /// A registry holding the crate's built-in components.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.insert(
            Step::DataReader,
            DefaultDataReader::NAME,
            Entry::Deferred {
                path: "junifer::pipeline::datareader::DefaultDataReader".to_string(),
                loader: load_default_datareader,
            },
        );
        registry
    }

    pub fn empty() -> Self {
        Self {
            components: RwLock::new(Step::ALL.into_iter().map(|s| (s, BTreeMap::new())).collect()),
        }
    }

    fn insert(&self, step: Step, name: &str, entry: Entry) {
        self.components
            .write()
            .entry(step)
            .or_default()
            .insert(name.to_string(), entry);
    }

    pub fn steps(&self) -> &'static [Step] {
        &Step::ALL
    }

    /// Register `class` under `step`, keyed by its own name.
    ///
    /// Registering an existing name replaces the previous entry.
    pub fn register(&self, step: &str, class: ComponentClass) -> Result<(), RegistryError> {
        let step: Step = step.parse()?;
        info!("Registering {} in {}", class.name(), step);
        let name = class.name().to_string();
        self.insert(step, &name, Entry::Resolved(Arc::new(class)));
        Ok(())
    }

    /// Register a component whose class is loaded on first lookup.
    pub fn register_deferred(
        &self,
        step: &str,
        name: &str,
        path: &str,
        loader: ClassLoader,
    ) -> Result<(), RegistryError> {
        let step: Step = step.parse()?;
        info!("Registering {} in {} (deferred: {})", name, step, path);
        self.insert(
            step,
            name,
            Entry::Deferred {
                path: path.to_string(),
                loader,
            },
        );
        Ok(())
    }

    pub fn deregister(&self, step: &str, name: &str) -> Result<(), RegistryError> {
        let step: Step = step.parse()?;
        let mut components = self.components.write();
        let entries = components.entry(step).or_default();
        if entries.remove(name).is_none() {
            return Err(RegistryError::InvalidName {
                step: step.to_string(),
                name: name.to_string(),
                valid: entries.keys().cloned().collect(),
            });
        }
        info!("Deregistered {} from {}", name, step);
        Ok(())
    }

    /// Registered names under `step`, sorted.
    pub fn step_components(&self, step: &str) -> Result<Vec<String>, RegistryError> {
        let step: Step = step.parse()?;
        Ok(self
            .components
            .read()
            .get(&step)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    pub fn components(&self) -> BTreeMap<Step, BTreeMap<String, ComponentRef>> {
        self.components
            .read()
            .iter()
            .map(|(step, entries)| {
                let view = entries
                    .iter()
                    .map(|(name, entry)| {
                        let r = match entry {
                            Entry::Deferred { path, .. } => ComponentRef::Deferred(path.clone()),
                            Entry::Resolved(class) => ComponentRef::Resolved(class.name().to_string()),
                        };
                        (name.clone(), r)
                    })
                    .collect();
                (*step, view)
            })
            .collect()
    }

    /// Resolve `name` under `step`, loading a deferred entry exactly once.
    pub fn get_class(&self, step: &str, name: &str) -> Result<Arc<ComponentClass>, RegistryError> {
        let step: Step = step.parse()?;
        let invalid_name = |entries: &BTreeMap<String, Entry>| RegistryError::InvalidName {
            step: step.to_string(),
            name: name.to_string(),
            valid: entries.keys().cloned().collect(),
        };

        {
            let components = self.components.read();
            let entries = components.get(&step).ok_or_else(|| invalid_name(&BTreeMap::new()))?;
            match entries.get(name) {
                Some(Entry::Resolved(class)) => return Ok(Arc::clone(class)),
                Some(Entry::Deferred { .. }) => {}
                None => return Err(invalid_name(entries)),
            }
        }

        // Another caller may have resolved the entry in between.
        let mut components = self.components.write();
        let entries = components.entry(step).or_default();
        let class = match entries.get_mut(name) {
            Some(Entry::Resolved(class)) => return Ok(Arc::clone(class)),
            Some(Entry::Deferred { path, loader }) => {
                debug!("Loading {} from {}", name, path);
                Arc::new((*loader)())
            }
            None => return Err(invalid_name(entries)),
        };
        entries.insert(name.to_string(), Entry::Resolved(Arc::clone(&class)));
        Ok(class)
    }

    /// Construct `name` under `step` and check it implements `base`.
    pub fn build_component_instance(
        &self,
        step: &str,
        name: &str,
        base: ComponentKind,
        init_params: Option<&ComponentParams>,
    ) -> Result<Component, RegistryError> {
        let class = self.get_class(step, name)?;
        let empty = ComponentParams::new();
        let params = init_params.unwrap_or(&empty);
        debug!("Building {} {} with {:?}", step, name, params);

        let component = class.construct(params).map_err(|e| RegistryError::Construction {
            step: step.to_string(),
            name: name.to_string(),
            message: e.to_string(),
        })?;
        if component.kind() != base {
            return Err(RegistryError::WrongBaseClass {
                step: step.to_string(),
                name: name.to_string(),
                expected: base.to_string(),
                actual: component.kind().to_string(),
            });
        }
        Ok(component)
    }
}
