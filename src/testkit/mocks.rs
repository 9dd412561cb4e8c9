//! In-memory pipeline components and collaborators.
//!
//! Every mock is `Clone` and shares its recorded state between clones, so a
//! test can hand one copy to a [`MarkerCollection`](crate::MarkerCollection)
//! or a registry constructor and inspect another afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::context::Context;
use crate::errors::{DataError, ExternalToolError, PipelineError};
use crate::external::CommandRunner;
use crate::fetch::Fetcher;
use crate::pipeline::data::{DataItem, DataObject, Payload};
use crate::pipeline::datagrabber::{DataGrabber, Element};
use crate::pipeline::marker::Marker;
use crate::pipeline::preprocessor::{Preprocessed, Preprocessor};
use crate::pipeline::registry::{Component, ComponentClass, ComponentParams, ConstructError};
use crate::pipeline::step::PipelineStep;
use crate::pipeline::storage::{MarkerOutput, MarkerResult, Storage, StorageKind};

/// A command seen by [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl RecordedCommand {
    /// Value following `flag`, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Records commands instead of running them and fabricates tool outputs.
///
/// Volume and point warps copy their input to their output, so warped data
/// equals the input. `img2imgcoord` echoes its points file after a banner
/// line. Tools registered with [`RecordingRunner::fail_on`] exit non-zero.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<RecordedCommand>>>,
    failing: Arc<Mutex<BTreeSet<String>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, name: &str) -> Vec<RecordedCommand> {
        self.calls().into_iter().filter(|c| c.name == name).collect()
    }

    fn copy_io(command: &RecordedCommand) -> Result<String, ExternalToolError> {
        let failed = |output: String| ExternalToolError::Failed {
            name: command.name.clone(),
            status: Some(1),
            output,
        };
        let input = command
            .arg_after("-i")
            .ok_or_else(|| failed("missing -i".into()))?;
        let output = command
            .arg_after("-o")
            .ok_or_else(|| failed("missing -o".into()))?;
        fs::copy(input, output).map_err(|e| failed(e.to_string()))?;
        Ok(String::new())
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, name: &str, args: &[String]) -> Result<String, ExternalToolError> {
        let command = RecordedCommand {
            name: name.to_string(),
            args: args.to_vec(),
        };
        self.calls.lock().push(command.clone());

        if self.failing.lock().contains(name) {
            return Err(ExternalToolError::Failed {
                name: name.to_string(),
                status: Some(1),
                output: format!("{name}: simulated failure"),
            });
        }
        match name {
            "antsApplyTransforms" | "applywarp" | "antsApplyTransformsToPoints" => {
                Self::copy_io(&command)
            }
            "img2imgcoord" => {
                let points = args.last().map(String::as_str).unwrap_or_default();
                let contents = fs::read_to_string(points).map_err(|e| ExternalToolError::Failed {
                    name: name.to_string(),
                    status: Some(1),
                    output: e.to_string(),
                })?;
                Ok(format!("Coordinates in Destination volume (in mm)\n{contents}"))
            }
            _ => Ok(String::new()),
        }
    }
}

/// Serves downloads from memory.
///
/// URLs matching a registered suffix get that content; any other URL gets an
/// empty placeholder file. Every call that actually writes is recorded.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    routes: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    requests: Arc<Mutex<Vec<String>>>,
    missing: Arc<Mutex<BTreeSet<String>>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(self, url_suffix: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.routes
            .lock()
            .push((url_suffix.to_string(), bytes.into()));
        self
    }

    /// Serve the contents of a local file for URLs ending in `url_suffix`.
    pub fn with_file(self, url_suffix: &str, path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        Ok(self.with_bytes(url_suffix, bytes))
    }

    /// Make URLs ending in `url_suffix` fail like a 404.
    pub fn with_missing(self, url_suffix: &str) -> Self {
        self.missing.lock().insert(url_suffix.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), DataError> {
        if dest.exists() {
            return Ok(());
        }
        if self.missing.lock().iter().any(|s| url.ends_with(s.as_str())) {
            return Err(DataError::fetch(url, "HTTP status 404 Not Found"));
        }
        self.requests.lock().push(url.to_string());
        let bytes = self
            .routes
            .lock()
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, bytes)| bytes.clone())
            .unwrap_or_default();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        fs::write(dest, bytes).map_err(|e| DataError::io(dest, e))
    }
}

fn string_list(params: &ComponentParams, key: &str) -> Result<Option<Vec<String>>, ConstructError> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ConstructError::Type(format!("`{key}` must be a list of strings")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(ConstructError::Type(format!("`{key}` must be a list of strings"))),
    }
}

/// Data grabber over a fixed set of elements.
#[derive(Debug, Clone)]
pub struct MockDataGrabber {
    keys: Vec<String>,
    types: Vec<String>,
    elements: BTreeMap<Element, DataObject>,
}

impl MockDataGrabber {
    pub fn new(types: &[&str]) -> Self {
        Self {
            keys: vec!["subject".to_string()],
            types: types.iter().map(|t| t.to_string()).collect(),
            elements: BTreeMap::new(),
        }
    }

    pub fn with_element(mut self, subject: &str, data: DataObject) -> Self {
        self.elements.insert(vec![subject.to_string()], data);
        self
    }

    /// Registry entry producing clones of this grabber.
    pub fn class(&self) -> ComponentClass {
        let grabber = self.clone();
        ComponentClass::new("MockDataGrabber", move |_| {
            Ok(Component::DataGrabber(Box::new(grabber.clone())))
        })
    }
}

impl PipelineStep for MockDataGrabber {
    fn class_name(&self) -> &str {
        "MockDataGrabber"
    }
}

impl DataGrabber for MockDataGrabber {
    fn get_types(&self) -> Vec<String> {
        self.types.clone()
    }

    fn get_element_keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    fn get_elements(&self) -> Result<Vec<Element>, PipelineError> {
        Ok(self.elements.keys().cloned().collect())
    }

    fn get(&self, element: &Element) -> Result<DataObject, PipelineError> {
        let mut data = self.elements.get(element).cloned().ok_or_else(|| {
            DataError::configuration(format!("Element {element:?} not found"))
        })?;
        let element_meta: BTreeMap<String, String> =
            self.keys.iter().cloned().zip(element.iter().cloned()).collect();
        for kind in data.kinds() {
            if let Some(item) = data.item_mut(&kind) {
                item.meta.element = element_meta.clone();
            }
        }
        Ok(data)
    }
}

/// Marker producing a 1x1 output: the image mean when the input holds an
/// image, else a fixed value.
#[derive(Debug, Clone)]
pub struct MockMarker {
    name: String,
    on: Vec<String>,
    kind: StorageKind,
    value: f64,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockMarker {
    pub fn new(name: &str, on: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            on: on.iter().map(|k| k.to_string()).collect(),
            kind: StorageKind::Vector,
            value: 1.0,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_kind(mut self, kind: StorageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Make `compute` fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Build from `{name, on?, kind?}`.
    pub fn from_params(params: &ComponentParams) -> Result<Self, ConstructError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ConstructError::Value("MockMarker requires a `name`".into()))?;
        let on = string_list(params, "on")?.unwrap_or_else(|| vec!["BOLD".to_string()]);
        let mut marker = Self::new(name, &[]);
        marker.on = on;
        if let Some(kind) = params.get("kind").and_then(Value::as_str) {
            marker.kind = kind
                .parse()
                .map_err(|e: DataError| ConstructError::Value(e.to_string()))?;
        }
        Ok(marker)
    }

    pub fn class() -> ComponentClass {
        ComponentClass::new("MockMarker", |params| {
            MockMarker::from_params(params).map(|m| Component::Marker(Box::new(m)))
        })
    }
}

impl PipelineStep for MockMarker {
    fn class_name(&self) -> &str {
        "MockMarker"
    }

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("on".into(), json!(self.on));
        params.insert("kind".into(), json!(self.kind.as_str()));
        params
    }

    fn dependencies(&self) -> BTreeSet<String> {
        ["ndarray".to_string()].into()
    }
}

impl Marker for MockMarker {
    fn name(&self) -> &str {
        &self.name
    }

    fn on(&self) -> Vec<String> {
        self.on.clone()
    }

    fn output_kind(&self, _input_kind: &str) -> Result<StorageKind, PipelineError> {
        Ok(self.kind)
    }

    fn compute(
        &self,
        _ctx: &Context,
        input: &DataItem,
        _extra_input: Option<&DataObject>,
    ) -> Result<MarkerOutput, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(PipelineError::compute(
                self.step_label(),
                anyhow::anyhow!(message.clone()),
            ));
        }
        let value = match &input.data {
            Payload::Image(_) => {
                let image = input.image()?;
                image.data().mean().map_or(0.0, f64::from)
            }
            _ => self.value,
        };
        let data = Array2::from_elem((1, 1), value);
        let names = vec!["value".to_string()];
        Ok(match self.kind {
            StorageKind::Vector => MarkerOutput::Vector {
                data,
                col_names: names,
            },
            StorageKind::Timeseries => MarkerOutput::Timeseries {
                data,
                col_names: names,
            },
            StorageKind::Matrix => MarkerOutput::Matrix {
                data,
                row_names: names.clone(),
                col_names: names,
            },
            StorageKind::ScalarTable => MarkerOutput::ScalarTable {
                data,
                row_names: names.clone(),
                col_names: names,
            },
        })
    }
}

/// Preprocessor tagging the items it touched, optionally adding a new kind.
#[derive(Debug, Clone)]
pub struct MockPreprocessor {
    on: Vec<String>,
    adds: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockPreprocessor {
    pub fn new(on: &[&str]) -> Self {
        Self {
            on: on.iter().map(|k| k.to_string()).collect(),
            adds: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Also output a copy of the input under `kind`.
    pub fn adding(mut self, kind: &str) -> Self {
        self.adds = Some(kind.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn class(&self) -> ComponentClass {
        let preprocessor = self.clone();
        ComponentClass::new("MockPreprocessor", move |_| {
            Ok(Component::Preprocessor(Box::new(preprocessor.clone())))
        })
    }
}

impl PipelineStep for MockPreprocessor {
    fn class_name(&self) -> &str {
        "MockPreprocessor"
    }

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("on".into(), json!(self.on));
        params
    }
}

impl Preprocessor for MockPreprocessor {
    fn on(&self) -> Vec<String> {
        self.on.clone()
    }

    fn output_kinds(&self, input_kind: &str) -> Vec<String> {
        let mut kinds = vec![input_kind.to_string()];
        kinds.extend(self.adds.clone());
        kinds
    }

    fn preprocess(
        &self,
        _ctx: &Context,
        mut input: DataItem,
        _extra_input: Option<&DataObject>,
    ) -> Result<Preprocessed, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        input.extra.insert("preprocessed".into(), Value::Bool(true));
        let mut result = Preprocessed::new(input.clone());
        if let Some(kind) = &self.adds {
            result = result.with_output(kind.clone(), input);
        }
        Ok(result)
    }
}

/// Storage keeping results in memory.
#[derive(Debug, Clone)]
pub struct MockStorage {
    valid: Vec<StorageKind>,
    features: Arc<Mutex<BTreeMap<String, Vec<MarkerResult>>>>,
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new(&StorageKind::ALL)
    }
}

impl MockStorage {
    pub fn new(valid: &[StorageKind]) -> Self {
        Self {
            valid: valid.to_vec(),
            features: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn class(&self) -> ComponentClass {
        let storage = self.clone();
        ComponentClass::new("MockStorage", move |_| {
            Ok(Component::Storage(Box::new(storage.clone())))
        })
    }

    /// Number of stored results per feature.
    pub fn counts(&self) -> HashMap<String, usize> {
        self.features
            .lock()
            .iter()
            .map(|(name, results)| (name.clone(), results.len()))
            .collect()
    }
}

impl PipelineStep for MockStorage {
    fn class_name(&self) -> &str {
        "MockStorage"
    }
}

impl Storage for MockStorage {
    fn valid_inputs(&self) -> Vec<StorageKind> {
        self.valid.clone()
    }

    fn store(&self, feature: &str, result: &MarkerResult) -> Result<(), PipelineError> {
        self.features
            .lock()
            .entry(feature.to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    fn read(&self, feature: &str) -> Result<Vec<MarkerResult>, PipelineError> {
        self.features.lock().get(feature).cloned().ok_or_else(|| {
            PipelineError::from(DataError::invalid_parameter(
                "feature",
                feature,
                &self.list_features(),
            ))
        })
    }

    fn list_features(&self) -> Vec<String> {
        self.features.lock().keys().cloned().collect()
    }
}
