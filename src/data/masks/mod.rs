//! Mask registry.
//!
//! A mask request is a list of [`MaskSpec`]s. Named entries are tailored to
//! the target one by one and then combined with [`intersect_masks`]; the
//! `threshold` and `connected` entries only parameterize that combination.

pub mod callables;
pub mod combine;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::data::env::DataEnv;
use crate::data::image::{resample_to_img, Image, Interpolation};
use crate::data::space::Space;
use crate::data::utils::{closest_resolution, format_resolution};
use crate::data::warp::{get_native_warper, warp_to_native, warp_to_template, VolumeWarp};
use crate::errors::DataError;
use crate::pipeline::data::{DataItem, DataObject};

pub use callables::CallableMask;
pub use combine::{intersect_masks, largest_connected_component};

/// Name of the request entry that reuses the target's own mask.
pub const INHERIT: &str = "inherit";

/// Space of a mask entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSpace {
    /// Computed in (or taken from) whatever space the target is in.
    Inherit,
    Template(String),
}

impl MaskSpace {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inherit => INHERIT,
            Self::Template(space) => space,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaskFamily {
    VickeryPatil { variant: String },
    Ukb,
    Callable(CallableMask),
    CustomUser { path: PathBuf },
}

impl MaskFamily {
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::CustomUser { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaskEntry {
    pub family: MaskFamily,
    pub space: MaskSpace,
}

/// One entry of a mask request.
#[derive(Debug, Clone, PartialEq)]
pub enum MaskSpec {
    Named(String),
    WithParams(String, Map<String, Value>),
    Threshold(f64),
    Connected(bool),
}

impl MaskSpec {
    /// Parse `"name"`, `{"name": {params}}`, `{"threshold": t}` or `{"connected": b}`.
    pub fn from_value(value: &Value) -> Result<Self, DataError> {
        match value {
            Value::String(name) => Ok(Self::Named(name.clone())),
            Value::Object(map) if map.len() == 1 => {
                let (key, inner) = map
                    .iter()
                    .next()
                    .ok_or_else(|| DataError::configuration("Empty mask specification"))?;
                match (key.as_str(), inner) {
                    ("threshold", v) => v.as_f64().map(Self::Threshold).ok_or_else(|| {
                        DataError::configuration(format!("Mask `threshold` must be a number, got {v}"))
                    }),
                    ("connected", v) => v.as_bool().map(Self::Connected).ok_or_else(|| {
                        DataError::configuration(format!("Mask `connected` must be a boolean, got {v}"))
                    }),
                    (name, Value::Object(params)) => Ok(Self::WithParams(name.to_string(), params.clone())),
                    (name, other) => Err(DataError::configuration(format!(
                        "Parameters of mask {name} must be a mapping, got {other}"
                    ))),
                }
            }
            other => Err(DataError::configuration(format!(
                "Invalid mask specification: {other}"
            ))),
        }
    }

    /// Parse a single specification or a list of them.
    pub fn parse_list(value: &Value) -> Result<Vec<Self>, DataError> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            single => Ok(vec![Self::from_value(single)?]),
        }
    }
}

/// Result of [`MaskRegistry::load`].
#[derive(Debug, Clone)]
pub enum LoadedMask {
    Image {
        /// `None` when loaded with `path_only`.
        image: Option<Image>,
        path: PathBuf,
        space: String,
    },
    Callable(CallableMask),
}

#[derive(Debug, Default)]
struct State {
    registry: BTreeMap<String, MaskEntry>,
    builtin: BTreeSet<String>,
    external: BTreeSet<String>,
}

/// Registry of named masks.
#[derive(Debug)]
pub struct MaskRegistry {
    env: Arc<DataEnv>,
    state: RwLock<State>,
}

fn builtin_entries() -> Vec<(&'static str, MaskEntry)> {
    let mut entries = vec![
        (
            "GM_prob0.2",
            MaskEntry {
                family: MaskFamily::VickeryPatil {
                    variant: "GM_prob0.2".into(),
                },
                space: MaskSpace::Template("IXI549Space".into()),
            },
        ),
        (
            "GM_prob0.2_cortex",
            MaskEntry {
                family: MaskFamily::VickeryPatil {
                    variant: "GM_prob0.2_cortex".into(),
                },
                space: MaskSpace::Template("MNI152NLin2009aAsym".into()),
            },
        ),
        (
            "UKB_15K_GM",
            MaskEntry {
                family: MaskFamily::Ukb,
                space: MaskSpace::Template("MNI152NLin6Asym".into()),
            },
        ),
    ];
    for callable in CallableMask::ALL {
        entries.push((
            callable.name(),
            MaskEntry {
                family: MaskFamily::Callable(callable),
                space: MaskSpace::Inherit,
            },
        ));
    }
    entries
}

/// Data repository file of a built-in mask at the closest resolution.
fn builtin_file(family: &MaskFamily, resolution: Option<f64>) -> Result<String, DataError> {
    let pick = |valid: &[f64]| {
        closest_resolution(resolution, valid)
            .ok_or_else(|| DataError::configuration("No resolutions available"))
    };
    match family {
        MaskFamily::VickeryPatil { variant } => match variant.as_str() {
            "GM_prob0.2" => {
                let res = pick(&[1.5, 3.0])?;
                let suffix = if res == 3.0 { "_3mm" } else { "" };
                Ok(format!(
                    "masks/Vickery-Patil/CAT12_IXI555_MNI152_TMP_GS_GMprob0.2_clean{suffix}.nii.gz"
                ))
            }
            "GM_prob0.2_cortex" => {
                let res = pick(&[3.0])?;
                Ok(format!(
                    "masks/Vickery-Patil/GMprob0.2_cortex_{}mm_NA_rm.nii.gz",
                    format_resolution(res)
                ))
            }
            other => Err(DataError::invalid_parameter(
                "mask",
                other,
                &["GM_prob0.2", "GM_prob0.2_cortex"],
            )),
        },
        MaskFamily::Ukb => {
            pick(&[1.5])?;
            Ok("masks/UKB/UKB_15K_GM_template.nii.gz".to_string())
        }
        MaskFamily::Callable(_) | MaskFamily::CustomUser { .. } => Err(DataError::configuration(
            "Only built-in template masks have repository files",
        )),
    }
}

impl MaskRegistry {
    pub fn new(env: Arc<DataEnv>) -> Self {
        let mut state = State::default();
        for (name, entry) in builtin_entries() {
            state.builtin.insert(name.to_string());
            state.registry.insert(name.to_string(), entry);
        }
        Self {
            env,
            state: RwLock::new(state),
        }
    }

    /// Register a mask image.
    ///
    /// With `overwrite`, only entries previously registered by the user may be
    /// replaced; built-in masks never are.
    pub fn register(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        space: &str,
        overwrite: bool,
    ) -> Result<(), DataError> {
        let mut state = self.state.write();
        if let Some(existing) = state.registry.get(name) {
            if overwrite {
                info!("Overwriting mask: {}", name);
                if !existing.family.is_custom() {
                    return Err(DataError::configuration(format!(
                        "Mask: {name} already registered as built-in mask."
                    )));
                }
            } else {
                return Err(DataError::configuration(format!(
                    "Mask: {name} already registered. Set `overwrite=True` to update its value."
                )));
            }
        }
        info!("Registering mask: {}", name);
        state.external.insert(name.to_string());
        state.registry.insert(
            name.to_string(),
            MaskEntry {
                family: MaskFamily::CustomUser { path: path.into() },
                space: MaskSpace::Template(space.to_string()),
            },
        );
        Ok(())
    }

    pub fn deregister(&self, name: &str) -> Result<(), DataError> {
        let mut state = self.state.write();
        if !state.external.remove(name) {
            return Err(DataError::configuration(format!(
                "Mask: {name} is not registered externally and cannot be deregistered."
            )));
        }
        state.registry.remove(name);
        info!("Deregistered mask: {}", name);
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.state.read().registry.keys().cloned().collect()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.state.read().builtin.contains(name)
    }

    fn entry(&self, name: &str) -> Result<MaskEntry, DataError> {
        let state = self.state.read();
        state.registry.get(name).cloned().ok_or_else(|| {
            let valid: Vec<&String> = state.registry.keys().collect();
            DataError::invalid_parameter("mask", name, &valid)
        })
    }

    /// Resolve `name` to an image file or a callable.
    pub fn load(
        &self,
        name: &str,
        target_space: &str,
        resolution: Option<f64>,
        path_only: bool,
    ) -> Result<LoadedMask, DataError> {
        let entry = self.entry(name)?;
        let space = match entry.space {
            MaskSpace::Inherit => {
                return match entry.family {
                    MaskFamily::Callable(callable) => Ok(LoadedMask::Callable(callable)),
                    _ => Err(DataError::configuration(format!(
                        "Mask {name} inherits its space but is not computed"
                    ))),
                }
            }
            MaskSpace::Template(space) => space,
        };
        let resolution = if space == target_space { resolution } else { None };
        let path = match &entry.family {
            MaskFamily::CustomUser { path } => path.clone(),
            family => self.env.fetch_data(&builtin_file(family, resolution)?)?,
        };
        debug!("Loading mask {} from {}", name, path.display());
        let image = if path_only {
            None
        } else {
            Some(Image::load(&path)?)
        };
        Ok(LoadedMask::Image { image, path, space })
    }

    /// Combined mask tailored to the grid and space of `target`.
    pub fn get(
        &self,
        specs: &[MaskSpec],
        target: &DataItem,
        extra_input: Option<&DataObject>,
    ) -> Result<Image, DataError> {
        let mut named: Vec<(&str, Option<&Map<String, Value>>)> = Vec::new();
        let mut threshold = 1.0;
        let mut connected = true;
        for spec in specs {
            match spec {
                MaskSpec::Named(name) => named.push((name.as_str(), None)),
                MaskSpec::WithParams(name, params) => named.push((name.as_str(), Some(params))),
                MaskSpec::Threshold(t) => threshold = *t,
                MaskSpec::Connected(c) => connected = *c,
            }
        }
        if named.is_empty() {
            return Err(DataError::configuration(
                "No mask was passed. At least one mask is required.",
            ));
        }

        let env = self.env.as_ref();
        let target_image = target.image()?;
        let resolution = target_image.min_zoom();
        let empty = Map::new();

        let mut masks = Vec::with_capacity(named.len());
        for (name, params) in named {
            if name == INHERIT {
                let inherited = target.mask.as_ref().ok_or_else(|| {
                    DataError::missing_prerequisite(
                        "Cannot inherit mask from the target data. Target data does not have a mask.",
                    )
                })?;
                masks.push((*inherited.image()?).clone());
                continue;
            }

            if let MaskFamily::Callable(callable) = self.entry(name)?.family {
                masks.push(callable.compute(&target_image, params.unwrap_or(&empty))?);
                continue;
            }
            if params.is_some() {
                return Err(DataError::configuration(format!(
                    "Cannot pass parameters to mask {name}: it is not computed."
                )));
            }

            let (std_space, native_spec) = match &target.space {
                Space::Native => {
                    let spec = get_native_warper(extra_input, false)?;
                    (spec.src.as_str().to_string(), Some(spec))
                }
                Space::Template(space) => (space.clone(), None),
            };
            let LoadedMask::Image { image, space, .. } =
                self.load(name, &std_space, Some(resolution), false)?
            else {
                return Err(DataError::configuration(format!(
                    "Mask {name} did not resolve to an image"
                )));
            };
            let mut image = image
                .ok_or_else(|| DataError::configuration(format!("Mask {name} was not loaded")))?;
            if space != std_space {
                image = warp_to_template(
                    env,
                    VolumeWarp {
                        name,
                        image: &image,
                        interpolation: Interpolation::Nearest,
                    },
                    &space,
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
            masks.push(image);
        }

        if masks.len() == 1 {
            let mask = masks.remove(0);
            let binary = combine::binarize(&mask)?;
            return Ok(combine::mask_image(&binary, &mask));
        }
        intersect_masks(&masks, threshold, connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mask_specs() {
        let specs = MaskSpec::parse_list(&json!([
            "GM_prob0.2",
            {"compute_brain_mask": {"threshold": 0.2}},
            {"threshold": 0},
            {"connected": false}
        ]))
        .unwrap();
        assert_eq!(specs[0], MaskSpec::Named("GM_prob0.2".into()));
        assert!(matches!(&specs[1], MaskSpec::WithParams(name, p) if name == "compute_brain_mask" && p.contains_key("threshold")));
        assert_eq!(specs[2], MaskSpec::Threshold(0.0));
        assert_eq!(specs[3], MaskSpec::Connected(false));
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        assert!(MaskSpec::from_value(&json!(3)).is_err());
        assert!(MaskSpec::from_value(&json!({"threshold": "high"})).is_err());
        assert!(MaskSpec::from_value(&json!({"GM_prob0.2": 1})).is_err());
    }

    #[test]
    fn test_builtin_files() {
        let family = MaskFamily::VickeryPatil {
            variant: "GM_prob0.2".into(),
        };
        assert!(builtin_file(&family, Some(3.0)).unwrap().ends_with("_clean_3mm.nii.gz"));
        assert!(builtin_file(&family, Some(2.0)).unwrap().ends_with("_clean.nii.gz"));
        assert!(builtin_file(&MaskFamily::Callable(CallableMask::Epi), None).is_err());
    }
}
