//! Data grabber contract.

use crate::errors::PipelineError;
use crate::pipeline::data::DataObject;
use crate::pipeline::step::PipelineStep;

/// One processing unit, as the values of the grabber's element keys
/// (e.g. `["sub-01", "ses-1"]`).
pub type Element = Vec<String>;

/// Source of per-element data objects.
pub trait DataGrabber: PipelineStep + Send + Sync {
    /// Data kinds every element provides.
    fn get_types(&self) -> Vec<String>;

    /// Names of the element components (e.g. `["subject", "session"]`).
    fn get_element_keys(&self) -> Vec<String>;

    fn get_elements(&self) -> Result<Vec<Element>, PipelineError>;

    /// Paths and spaces of `element`'s data; payloads are not loaded.
    fn get(&self, element: &Element) -> Result<DataObject, PipelineError>;
}
