//! Spatial data: images, spaces, registries and warpers.
//!
//! Each registry resolves a name to data on disk (fetching from the data
//! repository when needed) and can tailor it to a target [`DataItem`]: same
//! space, same grid. Cross-space transforms go through the external ANTs and
//! FSL tools via [`crate::external::CommandRunner`].
//!
//! [`DataItem`]: crate::pipeline::data::DataItem

pub mod coordinates;
pub mod env;
pub mod image;
pub mod maps;
pub mod masks;
pub mod parcellations;
pub mod space;
pub mod template;
pub mod utils;
pub mod warp;
pub mod xfm;

pub use coordinates::CoordinatesRegistry;
pub use env::DataEnv;
pub use image::{resample_to_img, Image, Interpolation, LazyImage};
pub use maps::MapsRegistry;
pub use masks::{MaskRegistry, MaskSpec};
pub use parcellations::ParcellationRegistry;
pub use space::Space;
pub use utils::closest_resolution;
