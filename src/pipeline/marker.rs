//! Marker contract.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::context::Context;
use crate::errors::PipelineError;
use crate::pipeline::data::{DataItem, DataObject};
use crate::pipeline::step::{present_kinds, PipelineStep};
use crate::pipeline::storage::{feature_name, MarkerOutput, MarkerResult, Storage, StorageKind};

/// Results of one marker for one element, keyed by data kind.
pub type MarkerResults = BTreeMap<String, MarkerResult>;

/// A feature extractor.
///
/// Markers only see the data object produced upstream; they never depend on
/// each other's output.
pub trait Marker: PipelineStep + Send + Sync {
    /// Unique name within a collection.
    fn name(&self) -> &str;

    /// Data kinds this marker can be computed on.
    fn on(&self) -> Vec<String>;

    /// Storage kind of the output computed on `input_kind`.
    fn output_kind(&self, input_kind: &str) -> Result<StorageKind, PipelineError>;

    /// Compute the feature on one data kind; the other kinds are `extra_input`.
    fn compute(
        &self,
        ctx: &Context,
        input: &DataItem,
        extra_input: Option<&DataObject>,
    ) -> Result<MarkerOutput, PipelineError>;

    fn step_label(&self) -> String {
        format!("Marker {}", self.name())
    }

    /// Kinds of `input` this marker will run on.
    fn validate_input(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        present_kinds(&self.step_label(), &self.on(), input)
    }

    /// Storage kinds produced from `input`.
    fn validate(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        self.check_ext_dependencies()?;
        self.validate_input(input)?
            .iter()
            .map(|kind| self.output_kind(kind).map(|k| k.to_string()))
            .collect()
    }

    fn store(&self, storage: &dyn Storage, result: &MarkerResult) -> Result<(), PipelineError> {
        storage.store(&feature_name(&result.kind, self.name()), result)
    }

    /// Compute on every present kind, storing when `storage` is given.
    ///
    /// With storage the results are still returned; callers decide whether to
    /// keep them.
    fn fit_transform(
        &self,
        ctx: &Context,
        data: &DataObject,
        storage: Option<&dyn Storage>,
    ) -> Result<MarkerResults, PipelineError> {
        let mut results = MarkerResults::new();
        for kind in self.on() {
            let Some(item) = data.item(&kind) else {
                debug!("Marker {} skips {}: not in data object", self.name(), kind);
                continue;
            };
            info!("Computing {} with marker {}", kind, self.name());
            let extra_input = data.without(&kind);
            let output = self.compute(ctx, item, Some(&extra_input))?;

            let mut meta = item.meta.clone();
            self.update_meta(&mut meta, "marker");
            if let Some(serde_json::Value::Object(record)) = meta.steps.get_mut("marker") {
                record.insert("name".into(), self.name().into());
            }
            let result = MarkerResult {
                kind: kind.clone(),
                output,
                meta,
            };
            if let Some(storage) = storage {
                info!("Storing {} in {}", kind, storage.class_name());
                self.store(storage, &result)?;
            }
            results.insert(kind, result);
        }
        Ok(results)
    }
}
