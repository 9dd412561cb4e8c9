//! Data reader contract and the default reader.

use tracing::{debug, info};

use crate::data::image::LazyImage;
use crate::errors::PipelineError;
use crate::pipeline::data::{DataObject, Payload};
use crate::pipeline::registry::{ComponentParams, ConstructError};
use crate::pipeline::step::PipelineStep;

/// Turns a data grabber's paths into loadable payloads.
pub trait DataReader: PipelineStep + Send + Sync {
    /// Kinds available after reading; readers do not add kinds by default.
    fn validate(&self, input: &[String]) -> Result<Vec<String>, PipelineError> {
        self.check_ext_dependencies()?;
        Ok(input.to_vec())
    }

    fn fit_transform(&self, input: DataObject) -> Result<DataObject, PipelineError>;
}

const IMAGE_EXTENSIONS: &[&str] = &[".nii", ".nii.gz"];

/// Wraps NIfTI paths in lazily loaded images; everything else stays path-only.
#[derive(Debug, Default, Clone)]
pub struct DefaultDataReader;

impl DefaultDataReader {
    pub const NAME: &'static str = "DefaultDataReader";

    pub fn from_params(params: &ComponentParams) -> Result<Self, ConstructError> {
        match params.keys().next() {
            Some(key) => Err(ConstructError::Type(format!(
                "DefaultDataReader got an unexpected keyword argument '{key}'"
            ))),
            None => Ok(Self),
        }
    }
}

impl PipelineStep for DefaultDataReader {
    fn class_name(&self) -> &str {
        Self::NAME
    }
}

impl DataReader for DefaultDataReader {
    fn fit_transform(&self, mut input: DataObject) -> Result<DataObject, PipelineError> {
        for kind in input.kinds() {
            let Some(item) = input.item_mut(&kind) else {
                debug!("Passing {} through unchanged", kind);
                continue;
            };
            if !matches!(item.data, Payload::Empty) {
                debug!("{} already holds data", kind);
            } else if let Some(path) = &item.path {
                let name = path.to_string_lossy();
                if IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                    info!("Reading {} from {}", kind, path.display());
                    item.data = Payload::Image(LazyImage::new(path.clone()));
                } else {
                    debug!("Keeping {} as path only: {}", kind, path.display());
                }
            }
            self.update_meta(&mut item.meta, "datareader");
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::space::Space;
    use crate::pipeline::data::{DataItem, WarpSpec, Warper};
    use serde_json::{json, Value};

    #[test]
    fn test_reader_wraps_images_and_keeps_other_paths() {
        let mut data = DataObject::new();
        let mut bold = DataItem::new(Space::Native);
        bold.path = Some("/data/sub-01_bold.nii.gz".into());
        data.insert_item("BOLD", bold);
        let mut confounds = DataItem::new(Space::Native);
        confounds.path = Some("/data/sub-01_confounds.tsv".into());
        data.insert_item("BOLD_confounds", confounds);
        data.insert_warps(vec![WarpSpec {
            src: Space::template("MNI152NLin2009cAsym"),
            dst: Space::Native,
            path: "/data/xfm.h5".into(),
            warper: Warper::Ants,
        }]);

        let out = DefaultDataReader.fit_transform(data).unwrap();
        let bold = out.item("BOLD").unwrap();
        assert!(matches!(bold.data, Payload::Image(_)));
        assert_eq!(
            bold.meta.steps["datareader"],
            json!({"class": "DefaultDataReader"})
        );
        assert!(matches!(out.item("BOLD_confounds").unwrap().data, Payload::Empty));
        assert_eq!(out.warps().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_param_is_a_type_error() {
        let mut params = ComponentParams::new();
        params.insert("patterns".into(), Value::Null);
        assert!(matches!(
            DefaultDataReader::from_params(&params),
            Err(ConstructError::Type(_))
        ));
    }
}
