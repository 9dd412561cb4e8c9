//! Behavior shared by every pipeline step.
//!
//! Data readers, preprocessors, markers, data grabbers and storages all
//! describe themselves through [`PipelineStep`]: a class name, the parameters
//! they were built with, and what they need installed to run.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::errors::PipelineError;
use crate::external::{check_ext_dependencies, ExtDependency};
use crate::pipeline::data::Meta;

/// Identity and provenance of a pipeline step.
pub trait PipelineStep {
    /// Name of the concrete component, as registered.
    fn class_name(&self) -> &str;

    /// Public construction parameters, recorded in the provenance trail.
    fn params(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Libraries needed to reproduce this step's output.
    fn dependencies(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// External binaries this step shells out to.
    fn ext_dependencies(&self) -> Vec<ExtDependency> {
        Vec::new()
    }

    /// Fail if any external binary this step needs is missing from `PATH`.
    fn check_ext_dependencies(&self) -> Result<(), PipelineError> {
        for dependency in self.ext_dependencies() {
            if let Some(missing) = check_ext_dependencies(&dependency) {
                return Err(PipelineError::MissingExtDependency {
                    class: self.class_name().to_string(),
                    dependency: missing,
                });
            }
        }
        Ok(())
    }

    /// Record this step under `meta.steps[step_name]` and carry its
    /// dependencies forward.
    fn update_meta(&self, meta: &mut Meta, step_name: &str) {
        let mut record = Map::new();
        record.insert("class".into(), Value::from(self.class_name()));
        for (key, value) in self.params() {
            if !key.starts_with('_') {
                record.insert(key, value);
            }
        }
        meta.steps.insert(step_name.to_string(), Value::Object(record));
        meta.dependencies.extend(self.dependencies());
    }
}

/// Kinds in `on` that are present in `input`, in `on` order.
///
/// An empty intersection is a [`PipelineError::MissingInput`] for `step`.
pub fn present_kinds(step: &str, on: &[String], input: &[String]) -> Result<Vec<String>, PipelineError> {
    let present: Vec<String> = on.iter().filter(|k| input.contains(k)).cloned().collect();
    if present.is_empty() {
        return Err(PipelineError::missing_input(step, input, on));
    }
    Ok(present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Smoother;

    impl PipelineStep for Smoother {
        fn class_name(&self) -> &str {
            "Smoother"
        }

        fn params(&self) -> Map<String, Value> {
            let mut params = Map::new();
            params.insert("fwhm".into(), json!(6));
            params.insert("_cache".into(), json!(true));
            params
        }

        fn dependencies(&self) -> BTreeSet<String> {
            ["nilearn".to_string()].into()
        }

        fn ext_dependencies(&self) -> Vec<ExtDependency> {
            vec![ExtDependency::new("afni").with_commands(["no-such-junifer-binary"])]
        }
    }

    #[test]
    fn test_update_meta_records_class_and_public_params() {
        let mut meta = Meta::default();
        meta.dependencies.insert("numpy".into());
        Smoother.update_meta(&mut meta, "preprocess");

        assert_eq!(
            meta.steps["preprocess"],
            json!({"class": "Smoother", "fwhm": 6})
        );
        assert_eq!(
            meta.dependencies.iter().cloned().collect::<Vec<_>>(),
            vec!["nilearn".to_string(), "numpy".to_string()]
        );
    }

    #[test]
    fn test_missing_ext_dependency() {
        let err = Smoother.check_ext_dependencies().unwrap_err();
        assert!(err.to_string().contains("afni (no-such-junifer-binary)"));
    }

    #[test]
    fn test_present_kinds() {
        let on = vec!["BOLD".to_string(), "T1w".to_string()];
        let input = vec!["T1w".to_string(), "Warp".to_string()];
        assert_eq!(present_kinds("Marker x", &on, &input).unwrap(), vec!["T1w"]);

        let err = present_kinds("Marker x", &on, &["VBM_GM".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }
}
