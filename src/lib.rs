//! Element-wise neuroimaging feature extraction.
//!
//! The crate is organised around one [`Context`](context::Context) that owns
//! the process-wide state of a run:
//!
//! - [`workdir::WorkDirManager`] hands out scratch directories and cleans them up
//! - [`pipeline::registry::PipelineComponentRegistry`] maps step names to component constructors
//! - [`data`] holds the spatial registries (coordinates, parcellations, masks, maps)
//!   and the warpers that move their payloads between spaces
//! - [`pipeline::collection::MarkerCollection`] runs one element through
//!   datareader, preprocessors, markers and storage

pub mod api;
pub mod config;
pub mod context;
pub mod data;
pub mod errors;
pub mod external;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod testkit;
pub mod workdir;

pub use crate::context::{Context, ContextBuilder};
pub use crate::data::image::{Image, Interpolation, LazyImage};
pub use crate::data::space::Space;
pub use crate::data::utils::closest_resolution;
pub use crate::errors::{
    DataError, ExternalToolError, JuniferError, PipelineError, RegistryError, Result, WorkDirError,
};
pub use crate::pipeline::collection::MarkerCollection;
pub use crate::pipeline::data::{DataEntry, DataItem, DataObject, Meta, Payload, WarpSpec, Warper};
pub use crate::pipeline::registry::{ComponentKind, PipelineComponentRegistry, Step};
pub use crate::workdir::WorkDirManager;
