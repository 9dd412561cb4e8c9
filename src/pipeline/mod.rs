//! Pipeline steps and their orchestration.
//!
//! An element flows through a data reader, an ordered chain of preprocessors
//! and a set of independent markers; results go to storage or back to the
//! caller. [`MarkerCollection::validate`] walks the same chain over data kind
//! names only, so configuration errors surface before any computation.

pub mod collection;
pub mod data;
pub mod datagrabber;
pub mod datareader;
pub mod marker;
pub mod preprocessor;
pub mod registry;
pub mod step;
pub mod storage;

pub use collection::{CollectionOutput, MarkerCollection};
pub use data::{DataEntry, DataItem, DataObject, Meta, Payload, WarpSpec, Warper};
pub use datagrabber::{DataGrabber, Element};
pub use datareader::{DataReader, DefaultDataReader};
pub use marker::{Marker, MarkerResults};
pub use preprocessor::{Preprocessed, Preprocessor};
pub use registry::{Component, ComponentClass, ComponentKind, PipelineComponentRegistry, Step};
pub use step::PipelineStep;
pub use storage::{MarkerOutput, MarkerResult, Storage, StorageKind};
