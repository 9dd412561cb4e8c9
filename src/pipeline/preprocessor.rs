//! Preprocessor contract.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::context::Context;
use crate::errors::PipelineError;
use crate::pipeline::data::{DataItem, DataObject};
use crate::pipeline::step::{present_kinds, PipelineStep};

/// Output of [`Preprocessor::preprocess`] for one data kind.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Replacement for the input item.
    pub item: DataItem,
    /// New data kinds to add to the data object.
    pub outputs: BTreeMap<String, DataItem>,
}

impl Preprocessed {
    pub fn new(item: DataItem) -> Self {
        Self {
            item,
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_output(mut self, kind: impl Into<String>, item: DataItem) -> Self {
        self.outputs.insert(kind.into(), item);
        self
    }
}

/// A step that rewrites or adds data kinds before markers run.
pub trait Preprocessor: PipelineStep + Send + Sync {
    /// Data kinds this preprocessor works on.
    fn on(&self) -> Vec<String>;

    /// Data kinds present after running on `input_kind`.
    fn output_kinds(&self, input_kind: &str) -> Vec<String> {
        vec![input_kind.to_string()]
    }

    fn preprocess(
        &self,
        ctx: &Context,
        input: DataItem,
        extra_input: Option<&DataObject>,
    ) -> Result<Preprocessed, PipelineError>;

    fn step_label(&self) -> String {
        format!("Preprocessor {}", self.class_name())
    }

    fn validate_input(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        present_kinds(&self.step_label(), &self.on(), input)
    }

    /// Kinds available after this step: `input` plus every output kind.
    fn validate(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        self.check_ext_dependencies()?;
        let mut available = input.to_vec();
        for kind in self.validate_input(input)? {
            for output in self.output_kinds(&kind) {
                if !available.contains(&output) {
                    available.push(output);
                }
            }
        }
        Ok(available)
    }

    /// Run on every present kind of `data`, returning a new data object.
    ///
    /// Entries this step does not touch stay shared with `data`.
    fn fit_transform(&self, ctx: &Context, data: &DataObject) -> Result<DataObject, PipelineError> {
        let mut out = data.clone();
        for kind in self.on() {
            let Some(item) = out.item(&kind).cloned() else {
                debug!("{} skips {}: not in data object", self.step_label(), kind);
                continue;
            };
            info!("Preprocessing {} with {}", kind, self.class_name());
            let extra_input = out.without(&kind);
            let Preprocessed { mut item, outputs } = self.preprocess(ctx, item, Some(&extra_input))?;
            self.update_meta(&mut item.meta, "preprocess");
            out.insert_item(kind, item);
            for (output_kind, mut output) in outputs {
                self.update_meta(&mut output.meta, "preprocess");
                out.insert_item(output_kind, output);
            }
        }
        Ok(out)
    }
}
