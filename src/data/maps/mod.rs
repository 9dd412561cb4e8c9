//! Probabilistic maps registry.
//!
//! Maps are 4-D images with one volume per label. Unlike parcellations their
//! values are continuous, so every resample and warp interpolates.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::data::env::DataEnv;
use crate::data::image::{resample_to_img, Image, Interpolation};
use crate::data::parcellations::{read_labels, LabelSource};
use crate::data::space::Space;
use crate::data::utils::{check_param, closest_resolution, format_resolution};
use crate::data::warp::{get_native_warper, warp_to_native, warp_to_template, VolumeWarp};
use crate::errors::DataError;
use crate::pipeline::data::{DataItem, DataObject};

#[derive(Debug, Clone, PartialEq)]
pub enum MapsFamily {
    Smith { component: String, dimension: u32 },
    DiFuMo { dimension: u32 },
    CustomUser { path: PathBuf, labels: Vec<String> },
}

impl MapsFamily {
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::CustomUser { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapsEntry {
    pub family: MapsFamily,
    pub space: String,
}

/// Result of [`MapsRegistry::load`].
#[derive(Debug, Clone)]
pub struct LoadedMaps {
    pub image: Option<Image>,
    pub labels: Vec<String>,
    pub path: PathBuf,
    pub space: String,
}

#[derive(Debug, Default)]
struct State {
    registry: BTreeMap<String, MapsEntry>,
    builtin: BTreeSet<String>,
    external: BTreeSet<String>,
}

/// Registry of named probabilistic maps.
#[derive(Debug)]
pub struct MapsRegistry {
    env: Arc<DataEnv>,
    state: RwLock<State>,
}

fn builtin_entries() -> Vec<(String, MapsEntry)> {
    let mut entries = Vec::new();
    for component in ["rsn", "bm"] {
        for dimension in [10, 20, 70] {
            entries.push((
                format!("Smith_{component}_{dimension}"),
                MapsEntry {
                    family: MapsFamily::Smith {
                        component: component.to_string(),
                        dimension,
                    },
                    space: "MNI152NLin6Asym".to_string(),
                },
            ));
        }
    }
    for dimension in [64, 128, 256, 512, 1024] {
        entries.push((
            format!("DiFuMo_{dimension}"),
            MapsEntry {
                family: MapsFamily::DiFuMo { dimension },
                space: "MNI152NLin2009cAsym".to_string(),
            },
        ));
    }
    entries
}

/// Image file and label source of a built-in family.
fn builtin_files(
    family: &MapsFamily,
    resolution: Option<f64>,
) -> Result<(String, LabelSource), DataError> {
    match family {
        MapsFamily::Smith {
            component,
            dimension,
        } => {
            check_param(
                "component",
                component,
                &["rsn".to_string(), "bm".to_string()],
            )?;
            check_param("dimension", dimension, &[10, 20, 70])?;
            closest_resolution(resolution, &[2.0])
                .ok_or_else(|| DataError::configuration("No resolutions available for Smith"))?;
            Ok((
                format!("maps/Smith_2009/{component}{dimension}.nii.gz"),
                LabelSource::Generated {
                    count: *dimension as usize,
                    prefix: "Map_",
                },
            ))
        }
        MapsFamily::DiFuMo { dimension } => {
            check_param("dimension", dimension, &[64, 128, 256, 512, 1024])?;
            let res = closest_resolution(resolution, &[2.0, 3.0])
                .ok_or_else(|| DataError::configuration("No resolutions available for DiFuMo"))?;
            Ok((
                format!(
                    "maps/DiFuMo/{dimension}/{}mm/maps.nii.gz",
                    format_resolution(res)
                ),
                LabelSource::CsvColumn(
                    format!("maps/DiFuMo/{dimension}/labels_{dimension}_dictionary.csv"),
                    1,
                ),
            ))
        }
        MapsFamily::CustomUser { .. } => Err(DataError::configuration(
            "Custom maps are loaded from their registered path",
        )),
    }
}

impl MapsRegistry {
    pub fn new(env: Arc<DataEnv>) -> Self {
        let mut state = State::default();
        for (name, entry) in builtin_entries() {
            state.builtin.insert(name.clone());
            state.registry.insert(name, entry);
        }
        Self {
            env,
            state: RwLock::new(state),
        }
    }

    pub fn register(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        labels: Vec<String>,
        space: &str,
        overwrite: bool,
    ) -> Result<(), DataError> {
        let mut state = self.state.write();
        if let Some(existing) = state.registry.get(name) {
            if overwrite {
                info!("Overwriting maps: {}", name);
                if !existing.family.is_custom() {
                    return Err(DataError::configuration(format!(
                        "Maps: {name} already registered as built-in maps."
                    )));
                }
            } else {
                return Err(DataError::configuration(format!(
                    "Maps: {name} already registered. Set `overwrite=True` to update its value."
                )));
            }
        }
        info!("Registering maps: {}", name);
        state.external.insert(name.to_string());
        state.registry.insert(
            name.to_string(),
            MapsEntry {
                family: MapsFamily::CustomUser {
                    path: path.into(),
                    labels,
                },
                space: space.to_string(),
            },
        );
        Ok(())
    }

    pub fn deregister(&self, name: &str) -> Result<(), DataError> {
        let mut state = self.state.write();
        if !state.external.remove(name) {
            return Err(DataError::configuration(format!(
                "Maps: {name} is not registered externally and cannot be deregistered."
            )));
        }
        state.registry.remove(name);
        info!("Deregistered maps: {}", name);
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.state.read().registry.keys().cloned().collect()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.state.read().builtin.contains(name)
    }

    fn entry(&self, name: &str) -> Result<MapsEntry, DataError> {
        let state = self.state.read();
        state.registry.get(name).cloned().ok_or_else(|| {
            let valid: Vec<&String> = state.registry.keys().collect();
            DataError::invalid_parameter("maps", name, &valid)
        })
    }

    pub fn load(
        &self,
        name: &str,
        target_space: &str,
        resolution: Option<f64>,
        path_only: bool,
    ) -> Result<LoadedMaps, DataError> {
        let entry = self.entry(name)?;
        let resolution = if entry.space == target_space {
            resolution
        } else {
            None
        };
        let (path, labels) = match &entry.family {
            MapsFamily::CustomUser { path, labels } => (path.clone(), labels.clone()),
            family => {
                let (image, labels) = builtin_files(family, resolution)?;
                let path = self.env.fetch_data(&image)?;
                (path, read_labels(&self.env, &labels)?)
            }
        };
        debug!("Loading maps {} from {}", name, path.display());

        let image = if path_only {
            None
        } else {
            let image = Image::load(&path)?;
            if image.n_volumes() != labels.len() {
                return Err(DataError::shape(format!(
                    "Maps {name} have {} volumes but {} labels.",
                    image.n_volumes(),
                    labels.len()
                )));
            }
            Some(image)
        };
        Ok(LoadedMaps {
            image,
            labels,
            path,
            space: entry.space,
        })
    }

    /// Maps tailored to the grid and space of `target`.
    pub fn get(
        &self,
        name: &str,
        target: &DataItem,
        extra_input: Option<&DataObject>,
    ) -> Result<(Image, Vec<String>), DataError> {
        let env = self.env.as_ref();
        let target_image = target.image()?;
        let (std_space, native_spec) = match &target.space {
            Space::Native => {
                let spec = get_native_warper(extra_input, false)?;
                (spec.src.as_str().to_string(), Some(spec))
            }
            Space::Template(space) => (space.clone(), None),
        };
        let resolution = target_image.min_zoom();

        let loaded = self.load(name, &std_space, Some(resolution), false)?;
        let mut image = loaded
            .image
            .ok_or_else(|| DataError::configuration(format!("Maps {name} were not loaded")))?;
        if loaded.space != std_space {
            image = warp_to_template(
                env,
                VolumeWarp {
                    name,
                    image: &image,
                    interpolation: Interpolation::Continuous,
                },
                &loaded.space,
                &std_space,
                resolution,
            )?;
        }
        image = match native_spec {
            None => resample_to_img(&image, &target_image, Interpolation::Continuous)?,
            Some(spec) => warp_to_native(
                env,
                VolumeWarp {
                    name,
                    image: &image,
                    interpolation: Interpolation::Continuous,
                },
                spec,
                target,
            )?,
        };
        Ok((image, loaded.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let names: Vec<String> = builtin_entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 11);
        assert!(names.contains(&"Smith_bm_70".to_string()));
        assert!(names.contains(&"DiFuMo_1024".to_string()));
    }

    #[test]
    fn test_difumo_resolution() {
        let (image, labels) =
            builtin_files(&MapsFamily::DiFuMo { dimension: 64 }, Some(2.5)).unwrap();
        assert_eq!(image, "maps/DiFuMo/64/2mm/maps.nii.gz");
        assert!(matches!(labels, LabelSource::CsvColumn(_, 1)));
    }

    #[test]
    fn test_smith_labels_are_generated() {
        let family = MapsFamily::Smith {
            component: "rsn".into(),
            dimension: 20,
        };
        let (image, labels) = builtin_files(&family, None).unwrap();
        assert_eq!(image, "maps/Smith_2009/rsn20.nii.gz");
        assert_eq!(
            labels,
            LabelSource::Generated {
                count: 20,
                prefix: "Map_"
            }
        );
    }

    #[test]
    fn test_invalid_dimension() {
        let err = builtin_files(&MapsFamily::DiFuMo { dimension: 100 }, None).unwrap_err();
        assert!(err.to_string().contains("`dimension` (100)"));
    }
}
