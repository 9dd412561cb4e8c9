//! One element's full run: reader, preprocessors, markers, storage.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::context::Context;
use crate::errors::PipelineError;
use crate::pipeline::data::DataObject;
use crate::pipeline::datagrabber::DataGrabber;
use crate::pipeline::datareader::{DataReader, DefaultDataReader};
use crate::pipeline::marker::{Marker, MarkerResults};
use crate::pipeline::preprocessor::Preprocessor;
use crate::pipeline::storage::Storage;

/// Marker name → that marker's results.
pub type CollectionOutput = BTreeMap<String, MarkerResults>;

/// An ordered set of markers with the steps that feed them.
pub struct MarkerCollection {
    markers: Vec<Box<dyn Marker>>,
    datareader: Box<dyn DataReader>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    storage: Option<Box<dyn Storage>>,
}

impl std::fmt::Debug for MarkerCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerCollection")
            .field(
                "markers",
                &self.markers.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("datareader", &self.datareader.class_name())
            .field(
                "preprocessors",
                &self
                    .preprocessors
                    .iter()
                    .map(|p| p.class_name())
                    .collect::<Vec<_>>(),
            )
            .field("storage", &self.storage.as_ref().map(|s| s.class_name()))
            .finish()
    }
}

impl MarkerCollection {
    /// Build a collection; marker names must be pairwise distinct.
    ///
    /// Without a data reader the [`DefaultDataReader`] is used.
    pub fn new(
        markers: Vec<Box<dyn Marker>>,
        datareader: Option<Box<dyn DataReader>>,
        preprocessors: Vec<Box<dyn Preprocessor>>,
        storage: Option<Box<dyn Storage>>,
    ) -> Result<Self, PipelineError> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for marker in &markers {
            *counts.entry(marker.name()).or_insert(0) += 1;
        }
        let duplicated: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        if !duplicated.is_empty() {
            return Err(PipelineError::duplicate_marker_names(duplicated));
        }

        Ok(Self {
            markers,
            datareader: datareader.unwrap_or_else(|| Box::new(DefaultDataReader)),
            preprocessors,
            storage,
        })
    }

    pub fn markers(&self) -> impl Iterator<Item = &dyn Marker> {
        self.markers.iter().map(|m| m.as_ref())
    }

    pub fn storage(&self) -> Option<&dyn Storage> {
        self.storage.as_deref()
    }

    /// Run every step on one element.
    ///
    /// The element scratch space is cleaned up whether or not the run
    /// succeeds. Returns `None` when results went to storage.
    pub fn fit(
        &self,
        ctx: &Context,
        input: DataObject,
    ) -> Result<Option<CollectionOutput>, PipelineError> {
        let result = self.run(ctx, input);
        let cleanup = ctx.workdir_manager().cleanup_elementdir();
        let output = result?;
        cleanup?;
        Ok(match self.storage {
            Some(_) => None,
            None => Some(output),
        })
    }

    fn run(&self, ctx: &Context, input: DataObject) -> Result<CollectionOutput, PipelineError> {
        info!("Reading data with {}", self.datareader.class_name());
        let mut data = self.datareader.fit_transform(input)?;

        for preprocessor in &self.preprocessors {
            info!("Preprocessing data with {}", preprocessor.class_name());
            data = preprocessor.fit_transform(ctx, &data)?;
        }

        let mut output = CollectionOutput::new();
        for marker in &self.markers {
            info!("Fitting marker {}", marker.name());
            let results = marker.fit_transform(ctx, &data, self.storage.as_deref())?;
            if results.is_empty() {
                warn!("Marker {} produced no output", marker.name());
            }
            if self.storage.is_none() {
                output.insert(marker.name().to_string(), results);
            }
        }
        Ok(output)
    }

    /// Check the type flow from `datagrabber` through every step without
    /// computing anything. Stops at the first failing step.
    pub fn validate(&self, datagrabber: &dyn DataGrabber) -> Result<(), PipelineError> {
        info!("Validating Marker Collection");
        let types = datagrabber.get_types();
        info!("Data Grabber output type: {:?}", types);

        let mut types = self
            .datareader
            .validate(&types)
            .map_err(|e| e.in_step(format!("DataReader {}", self.datareader.class_name())))?;
        info!("Data Reader output type: {:?}", types);

        for preprocessor in &self.preprocessors {
            types = preprocessor
                .validate(&types)
                .map_err(|e| e.in_step(preprocessor.step_label()))?;
            info!("Preprocessor {} output type: {:?}", preprocessor.class_name(), types);
        }

        for marker in &self.markers {
            let outputs = marker
                .validate(&types)
                .map_err(|e| e.in_step(marker.step_label()))?;
            info!("Marker {} output type: {:?}", marker.name(), outputs);
            if let Some(storage) = &self.storage {
                storage.validate(&outputs).map_err(|e| {
                    e.in_step(format!(
                        "Storage {} for marker {}",
                        storage.class_name(),
                        marker.name()
                    ))
                })?;
            }
        }
        Ok(())
    }
}
