//! Coordinates (seed point) registry.
//!
//! Built-in coordinate sets are tab separated `x y z label` files fetched
//! from the data repository. User sets are held in memory.

pub mod ants;
pub mod fsl;

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use ndarray::Array2;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::data::env::DataEnv;
use crate::data::space::Space;
use crate::data::utils::split_fields;
use crate::data::warp::get_native_warper;
use crate::errors::DataError;
use crate::pipeline::data::{DataItem, DataObject, Warper};

const MNI305: &str = "MNI305";
const MNI152_NLIN6: &str = "MNI152NLin6Asym";

/// Built-in coordinate sets and their spaces.
pub const BUILTIN_COORDINATES: &[(&str, &str)] = &[
    ("AutobiographicalMemory", MNI152_NLIN6),
    ("CogAC", MNI152_NLIN6),
    ("CogAR", MNI152_NLIN6),
    ("DMNBuckner", MNI152_NLIN6),
    ("Dosenbach", MNI305),
    ("eMDN", MNI152_NLIN6),
    ("Empathy", MNI152_NLIN6),
    ("eSAD", MNI152_NLIN6),
    ("extDMN", MNI152_NLIN6),
    ("Motor", MNI152_NLIN6),
    ("MultiTask", MNI152_NLIN6),
    ("PhysioStress", MNI152_NLIN6),
    ("Power", MNI305),
    ("Power2011", MNI305),
    ("Power2013", MNI152_NLIN6),
    ("Rew", MNI152_NLIN6),
    ("Somatosensory", MNI152_NLIN6),
    ("ToM", MNI152_NLIN6),
    ("VigAtt", MNI152_NLIN6),
    ("WM", MNI152_NLIN6),
];

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatesFamily {
    Builtin,
    CustomUser {
        coordinates: Array2<f64>,
        voi_names: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatesEntry {
    pub family: CoordinatesFamily,
    pub space: String,
}

/// Result of [`CoordinatesRegistry::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCoordinates {
    pub coordinates: Array2<f64>,
    pub labels: Vec<String>,
    pub space: String,
}

#[derive(Debug, Default)]
struct State {
    builtin: BTreeMap<String, CoordinatesEntry>,
    external: BTreeMap<String, CoordinatesEntry>,
}

/// Registry of named coordinate sets.
#[derive(Debug)]
pub struct CoordinatesRegistry {
    env: Arc<DataEnv>,
    state: RwLock<State>,
}

fn parse_voi_file(path: &std::path::Path, contents: &str) -> Result<(Array2<f64>, Vec<String>), DataError> {
    let mut values = Vec::new();
    let mut labels = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let fields = split_fields(line);
        if fields.len() < 4 {
            return Err(DataError::shape(format!(
                "Expected `x y z label` rows in {}, got: {line}",
                path.display()
            )));
        }
        for field in &fields[..3] {
            values.push(field.parse::<f64>().map_err(|_| {
                DataError::shape(format!("Invalid coordinate `{field}` in {}", path.display()))
            })?);
        }
        labels.push(fields[3..].join(" "));
    }
    let coordinates = Array2::from_shape_vec((labels.len(), 3), values)
        .map_err(|e| DataError::shape(format!("Invalid coordinates in {}: {e}", path.display())))?;
    Ok((coordinates, labels))
}

impl CoordinatesRegistry {
    pub fn new(env: Arc<DataEnv>) -> Self {
        let builtin = BUILTIN_COORDINATES
            .iter()
            .map(|(name, space)| {
                (
                    (*name).to_string(),
                    CoordinatesEntry {
                        family: CoordinatesFamily::Builtin,
                        space: (*space).to_string(),
                    },
                )
            })
            .collect();
        Self {
            env,
            state: RwLock::new(State {
                builtin,
                external: BTreeMap::new(),
            }),
        }
    }

    /// Register a user coordinate set.
    ///
    /// Built-in names are never replaced. `coordinates` must be N x 3 with
    /// one name per row.
    pub fn register(
        &self,
        name: &str,
        coordinates: Array2<f64>,
        voi_names: Vec<String>,
        space: &str,
        overwrite: bool,
    ) -> Result<(), DataError> {
        let mut state = self.state.write();
        if state.builtin.contains_key(name) {
            return Err(DataError::configuration(format!(
                "Coordinates: {name} already registered as built-in coordinates."
            )));
        }
        if state.external.contains_key(name) {
            if overwrite {
                info!("Overwriting coordinates: {}", name);
            } else {
                return Err(DataError::configuration(format!(
                    "Coordinates: {name} already registered. Set `overwrite=True` to update its value."
                )));
            }
        }
        if coordinates.ncols() != 3 {
            return Err(DataError::shape(format!(
                "Each coordinate must have 3 values, got {}.",
                coordinates.ncols()
            )));
        }
        if voi_names.len() != coordinates.nrows() {
            return Err(DataError::shape(format!(
                "Length of `voi_names` ({}) must be equal to the number of coordinates ({}).",
                voi_names.len(),
                coordinates.nrows()
            )));
        }
        info!("Registering coordinates: {}", name);
        state.external.insert(
            name.to_string(),
            CoordinatesEntry {
                family: CoordinatesFamily::CustomUser {
                    coordinates,
                    voi_names,
                },
                space: space.to_string(),
            },
        );
        Ok(())
    }

    /// Remove a user coordinate set.
    pub fn deregister(&self, name: &str) -> Result<(), DataError> {
        let mut state = self.state.write();
        if state.external.remove(name).is_none() {
            return Err(DataError::configuration(format!(
                "Coordinates: {name} is not registered externally and cannot be deregistered."
            )));
        }
        info!("Deregistered coordinates: {}", name);
        Ok(())
    }

    /// All registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state
            .builtin
            .keys()
            .chain(state.external.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn entry(&self, name: &str) -> Result<CoordinatesEntry, DataError> {
        let state = self.state.read();
        state
            .builtin
            .get(name)
            .or_else(|| state.external.get(name))
            .cloned()
            .ok_or_else(|| {
                let valid: Vec<&String> = state.builtin.keys().chain(state.external.keys()).collect();
                DataError::invalid_parameter("coords", name, &valid)
            })
    }

    /// Coordinates, labels and space of `name`, fetching built-ins on demand.
    pub fn load(&self, name: &str) -> Result<LoadedCoordinates, DataError> {
        let entry = self.entry(name)?;
        match entry.family {
            CoordinatesFamily::CustomUser {
                coordinates,
                voi_names,
            } => Ok(LoadedCoordinates {
                coordinates,
                labels: voi_names,
                space: entry.space,
            }),
            CoordinatesFamily::Builtin => {
                let path = self
                    .env
                    .fetch_data(&format!("coordinates/{name}/{name}_VOIs.txt"))?;
                debug!("Loading coordinates {} from {}", name, path.display());
                let contents = fs::read_to_string(&path).map_err(|e| DataError::io(&path, e))?;
                let (coordinates, labels) = parse_voi_file(&path, &contents)?;
                Ok(LoadedCoordinates {
                    coordinates,
                    labels,
                    space: entry.space,
                })
            }
        }
    }

    /// Coordinates of `name` expressed in the space of `target`.
    pub fn get(
        &self,
        name: &str,
        target: &DataItem,
        extra_input: Option<&DataObject>,
    ) -> Result<(Array2<f64>, Vec<String>), DataError> {
        let loaded = self.load(name)?;
        let env = self.env.as_ref();
        let coordinates = match &target.space {
            Space::Native => {
                let spec = get_native_warper(extra_input, false)?;
                let mut seeds = loaded.coordinates;
                if loaded.space != spec.src.as_str() {
                    seeds = ants::warp_points_to_template(
                        env,
                        name,
                        &seeds,
                        &loaded.space,
                        spec.src.as_str(),
                    )?;
                }
                match spec.warper {
                    Warper::Fsl => fsl::warp_points_to_native(env, name, &seeds, spec, target)?,
                    Warper::Ants => {
                        let inverse = get_native_warper(extra_input, true)?;
                        ants::warp_points(env, name, &seeds, &inverse.path)?
                    }
                }
            }
            Space::Template(dst) => {
                if &loaded.space == dst {
                    loaded.coordinates
                } else {
                    ants::warp_points_to_template(env, name, &loaded.coordinates, &loaded.space, dst)?
                }
            }
        };
        Ok((coordinates, loaded.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_voi_file() {
        let (coords, labels) =
            parse_voi_file(Path::new("x.txt"), "-10\t20\t30\tLeft Amygdala\n0\t0\t0\tPCC\n").unwrap();
        assert_eq!(coords.nrows(), 2);
        assert_eq!(coords[[0, 0]], -10.0);
        assert_eq!(labels, vec!["Left Amygdala", "PCC"]);
    }

    #[test]
    fn test_parse_voi_file_rejects_short_rows() {
        assert!(parse_voi_file(Path::new("x.txt"), "1 2 3\n").is_err());
    }
}
