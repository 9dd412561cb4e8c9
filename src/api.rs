//! Running a declared pipeline over a dataset.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::Context;
use crate::pipeline::collection::{CollectionOutput, MarkerCollection};
use crate::pipeline::datagrabber::Element;
use crate::pipeline::registry::{Component, ComponentParams, Step};

/// One component of a pipeline: its registered name and constructor
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub kind: String,
    #[serde(default)]
    pub params: ComponentParams,
}

impl StepConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: ComponentParams::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// A declared pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    pub datagrabber: StepConfig,
    /// The default reader when absent.
    #[serde(default)]
    pub datareader: Option<StepConfig>,
    #[serde(default)]
    pub preprocess: Vec<StepConfig>,
    pub markers: Vec<StepConfig>,
    #[serde(default)]
    pub storage: Option<StepConfig>,
}

fn build(ctx: &Context, step: Step, config: &StepConfig) -> Result<Component> {
    ctx.components()
        .build_component_instance(step.as_str(), &config.kind, step.base_kind(), Some(&config.params))
        .with_context(|| format!("Failed to build {} {}", step, config.kind))
}

fn wrong_kind(step: Step, config: &StepConfig) -> anyhow::Error {
    anyhow!("{} {} is not a {}", step, config.kind, step.base_kind())
}

/// Validate the pipeline, then fit `elements` (every element when `None`)
/// one after the other.
///
/// Returns per-element outputs; empty when a storage is configured.
pub fn run(
    ctx: &Context,
    config: &RunConfig,
    elements: Option<&[Element]>,
) -> Result<BTreeMap<Element, CollectionOutput>> {
    if let Some(workdir) = &config.workdir {
        ctx.workdir_manager()
            .set_workdir(workdir)
            .context("Failed to set the working directory")?;
    }

    let component = build(ctx, Step::DataGrabber, &config.datagrabber)?;
    let datagrabber = component
        .into_datagrabber()
        .ok_or_else(|| wrong_kind(Step::DataGrabber, &config.datagrabber))?;

    let datareader = match &config.datareader {
        Some(reader) => Some(
            build(ctx, Step::DataReader, reader)?
                .into_datareader()
                .ok_or_else(|| wrong_kind(Step::DataReader, reader))?,
        ),
        None => None,
    };

    let preprocessors = config
        .preprocess
        .iter()
        .map(|step| {
            build(ctx, Step::Preprocessing, step)?
                .into_preprocessor()
                .ok_or_else(|| wrong_kind(Step::Preprocessing, step))
        })
        .collect::<Result<Vec<_>>>()?;

    let markers = config
        .markers
        .iter()
        .map(|step| {
            build(ctx, Step::Marker, step)?
                .into_marker()
                .ok_or_else(|| wrong_kind(Step::Marker, step))
        })
        .collect::<Result<Vec<_>>>()?;

    let storage = match &config.storage {
        Some(storage) => Some(
            build(ctx, Step::Storage, storage)?
                .into_storage()
                .ok_or_else(|| wrong_kind(Step::Storage, storage))?,
        ),
        None => None,
    };

    let collection = MarkerCollection::new(markers, datareader, preprocessors, storage)?;
    collection
        .validate(datagrabber.as_ref())
        .context("Pipeline validation failed")?;

    let elements = match elements {
        Some(elements) => elements.to_vec(),
        None => datagrabber.get_elements()?,
    };
    info!("Running pipeline on {} element(s)", elements.len());

    let mut outputs = BTreeMap::new();
    for element in elements {
        info!("Fitting element {:?}", element);
        let data = datagrabber
            .get(&element)
            .with_context(|| format!("Failed to get data for element {element:?}"))?;
        let output = collection
            .fit(ctx, data)
            .with_context(|| format!("Failed to fit element {element:?}"))?;
        if let Some(output) = output {
            outputs.insert(element, output);
        }
    }
    Ok(outputs)
}
