//! Parcellation registry.

pub mod catalog;
pub mod merge;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::data::env::DataEnv;
use crate::data::image::{resample_to_img, Image, Interpolation};
use crate::data::space::Space;
use crate::data::utils::split_fields;
use crate::data::warp::{get_native_warper, warp_to_native, warp_to_template, VolumeWarp};
use crate::errors::DataError;
use crate::pipeline::data::{DataItem, DataObject};

pub use catalog::{LabelSource, ParcellationEntry, ParcellationFamily};
pub use merge::{merge_parcellations, MergeWarning, MergedParcellation, NamedParcellation};

/// Result of [`ParcellationRegistry::load`].
#[derive(Debug, Clone)]
pub struct LoadedParcellation {
    /// `None` when loaded with `path_only`.
    pub image: Option<Image>,
    pub labels: Vec<String>,
    pub path: PathBuf,
    pub space: String,
}

#[derive(Debug, Default)]
struct State {
    registry: BTreeMap<String, ParcellationEntry>,
    builtin: BTreeSet<String>,
    external: BTreeSet<String>,
}

/// Registry of named parcellations.
#[derive(Debug)]
pub struct ParcellationRegistry {
    env: Arc<DataEnv>,
    state: RwLock<State>,
}

fn read_text(path: &Path) -> Result<String, DataError> {
    fs::read_to_string(path).map_err(|e| DataError::io(path, e))
}

fn column<'a>(path: &Path, fields: &[&'a str], index: usize) -> Result<&'a str, DataError> {
    fields.get(index).copied().ok_or_else(|| {
        DataError::shape(format!(
            "Expected at least {} columns in label file {}",
            index + 1,
            path.display()
        ))
    })
}

/// Read label names from a data repository file.
pub(crate) fn read_labels(env: &DataEnv, source: &LabelSource) -> Result<Vec<String>, DataError> {
    let lines = |relative: &str| -> Result<(PathBuf, String), DataError> {
        let path = env.fetch_data(relative)?;
        let text = read_text(&path)?;
        Ok((path, text))
    };
    let non_empty = |text: &str| -> Vec<String> {
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect()
    };

    match source {
        LabelSource::Generated { count, prefix } => {
            Ok((1..=*count).map(|i| format!("{prefix}{i}")).collect())
        }
        LabelSource::OnePerLine(relative) => {
            let (_, text) = lines(relative)?;
            Ok(non_empty(&text).into_iter().map(|l| l.trim().to_string()).collect())
        }
        LabelSource::TabSecondColumn(relative) => {
            let (path, text) = lines(relative)?;
            non_empty(&text)
                .iter()
                .map(|line| {
                    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
                    column(&path, &fields, 1).map(str::to_string)
                })
                .collect()
        }
        LabelSource::TsvColumn(relative, name) => {
            let (path, text) = lines(relative)?;
            let rows = non_empty(&text);
            let (header, body) = rows.split_first().ok_or_else(|| {
                DataError::shape(format!("Empty label file {}", path.display()))
            })?;
            let index = header
                .split('\t')
                .position(|h| h.trim() == *name)
                .ok_or_else(|| {
                    DataError::shape(format!("No `{name}` column in {}", path.display()))
                })?;
            body.iter()
                .map(|line| {
                    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
                    column(&path, &fields, index).map(str::to_string)
                })
                .collect()
        }
        LabelSource::CsvColumn(relative, index) => {
            let (path, text) = lines(relative)?;
            non_empty(&text)
                .iter()
                .skip(1)
                .map(|line| {
                    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
                    column(&path, &fields, *index).map(str::to_string)
                })
                .collect()
        }
        LabelSource::LastColumn(relative) => {
            let (path, text) = lines(relative)?;
            non_empty(&text)
                .iter()
                .map(|line| {
                    split_fields(line)
                        .last()
                        .map(|s| s.to_string())
                        .ok_or_else(|| DataError::shape(format!("Empty row in {}", path.display())))
                })
                .collect()
        }
    }
}

/// Distinct non-zero values must be exactly `1..=n_labels`.
fn validate_labels(name: &str, image: &Image, n_labels: usize) -> Result<(), DataError> {
    let mut values: Vec<i64> = image
        .data()
        .iter()
        .filter(|v| **v != 0.0)
        .map(|v| v.round() as i64)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    values.sort_unstable();
    if values.len() != n_labels {
        return Err(DataError::shape(format!(
            "Parcellation {name} has {} parcels but {n_labels} labels.",
            values.len()
        )));
    }
    let contiguous = values
        .iter()
        .enumerate()
        .all(|(i, v)| *v == i as i64 + 1);
    if !contiguous {
        return Err(DataError::shape(format!(
            "Parcellation {name} must have contiguous parcel values 1..={n_labels}."
        )));
    }
    Ok(())
}

impl ParcellationRegistry {
    pub fn new(env: Arc<DataEnv>) -> Self {
        let mut state = State::default();
        for (name, entry) in catalog::builtin_entries() {
            state.builtin.insert(name.clone());
            state.registry.insert(name, entry);
        }
        Self {
            env,
            state: RwLock::new(state),
        }
    }

    /// Register a parcellation image with its labels.
    ///
    /// With `overwrite`, only entries previously registered by the user may be
    /// replaced; built-in parcellations never are.
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
                info!("Overwriting parcellation: {}", name);
                if !existing.family.is_custom() {
                    return Err(DataError::configuration(format!(
                        "Parcellation: {name} already registered as built-in {} parcellation.",
                        existing.family.tag()
                    )));
                }
            } else {
                return Err(DataError::configuration(format!(
                    "Parcellation: {name} already registered. Set `overwrite=True` to update its value."
                )));
            }
        }
        info!("Registering parcellation: {}", name);
        state.external.insert(name.to_string());
        state.registry.insert(
            name.to_string(),
            ParcellationEntry {
                family: ParcellationFamily::CustomUser {
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
                "Parcellation: {name} is not registered externally and cannot be deregistered."
            )));
        }
        state.registry.remove(name);
        info!("Deregistered parcellation: {}", name);
        Ok(())
    }

    /// All registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.state.read().registry.keys().cloned().collect()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.state.read().builtin.contains(name)
    }

    fn entry(&self, name: &str) -> Result<ParcellationEntry, DataError> {
        let state = self.state.read();
        state.registry.get(name).cloned().ok_or_else(|| {
            let valid: Vec<&String> = state.registry.keys().collect();
            DataError::invalid_parameter("parcellation", name, &valid)
        })
    }

    /// Resolve `name` to files, fetching built-ins on demand.
    ///
    /// When the parcellation lives in a different space than `target_space`
    /// it will be warped anyway, so the highest resolution is loaded.
    pub fn load(
        &self,
        name: &str,
        target_space: &str,
        resolution: Option<f64>,
        path_only: bool,
    ) -> Result<LoadedParcellation, DataError> {
        let entry = self.entry(name)?;
        let resolution = if entry.space == target_space {
            resolution
        } else {
            debug!(
                "Parcellation {} is in {}, not {}; loading highest resolution",
                name, entry.space, target_space
            );
            None
        };

        let (path, labels) = match &entry.family {
            ParcellationFamily::CustomUser { path, labels } => (path.clone(), labels.clone()),
            family => {
                let files = catalog::resolve_files(family, resolution)?;
                let path = self.env.fetch_data(&files.image)?;
                let labels = read_labels(&self.env, &files.labels)?;
                (path, labels)
            }
        };
        debug!("Loading parcellation {} from {}", name, path.display());

        let image = if path_only {
            None
        } else {
            let image = Image::load(&path)?;
            validate_labels(name, &image, labels.len())?;
            Some(image)
        };
        Ok(LoadedParcellation {
            image,
            labels,
            path,
            space: entry.space,
        })
    }

    /// Parcellation(s) tailored to the grid and space of `target`.
    ///
    /// Several names are merged after each one is tailored on its own.
    pub fn get(
        &self,
        names: &[String],
        target: &DataItem,
        extra_input: Option<&DataObject>,
    ) -> Result<MergedParcellation, DataError> {
        if names.is_empty() {
            return Err(DataError::configuration("No parcellation requested"));
        }
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

        let mut tailored = Vec::with_capacity(names.len());
        for name in names {
            let loaded = self.load(name, &std_space, Some(resolution), false)?;
            let mut image = loaded.image.ok_or_else(|| {
                DataError::configuration(format!("Parcellation {name} was not loaded"))
            })?;
            if loaded.space != std_space {
                image = warp_to_template(
                    env,
                    VolumeWarp {
                        name,
                        image: &image,
                        interpolation: Interpolation::Nearest,
                    },
                    &loaded.space,
                    &std_space,
                    resolution,
                )?;
            }
            image = match native_spec {
                None => resample_to_img(&image, &target_image, Interpolation::Nearest)?,
                Some(spec) => warp_to_native(
                    env,
                    VolumeWarp {
                        name,
                        image: &image,
                        interpolation: Interpolation::Nearest,
                    },
                    spec,
                    target,
                )?,
            };
            tailored.push(NamedParcellation {
                name: name.clone(),
                image,
                labels: loaded.labels,
            });
        }

        if tailored.len() == 1 {
            let single = tailored.remove(0);
            return Ok(MergedParcellation {
                image: single.image,
                labels: single.labels,
                warnings: Vec::new(),
            });
        }
        merge_parcellations(&tailored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::image::scaled_affine;
    use ndarray::Array3;

    #[test]
    fn test_validate_labels() {
        let data = Array3::from_shape_vec((4, 1, 1), vec![0.0, 1.0, 2.0, 2.0]).unwrap();
        let image = Image::new(data.into_dyn(), scaled_affine(1.0));
        assert!(validate_labels("p", &image, 2).is_ok());
        assert!(matches!(
            validate_labels("p", &image, 3),
            Err(DataError::Shape(_))
        ));

        let data = Array3::from_shape_vec((3, 1, 1), vec![0.0, 1.0, 3.0]).unwrap();
        let gappy = Image::new(data.into_dyn(), scaled_affine(1.0));
        let err = validate_labels("p", &gappy, 2).unwrap_err();
        assert!(err.to_string().contains("contiguous"));
    }
}
