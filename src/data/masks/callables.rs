//! Masks computed from the target image itself.

use std::collections::HashMap;

use ndarray::{Array3, Axis};
use serde_json::{Map, Value};

use crate::data::image::Image;
use crate::data::masks::combine::{largest_connected_component, mask_image};
use crate::errors::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableMask {
    Brain,
    Background,
    Epi,
}

impl CallableMask {
    pub const ALL: [CallableMask; 3] = [Self::Brain, Self::Background, Self::Epi];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Brain => "compute_brain_mask",
            Self::Background => "compute_background_mask",
            Self::Epi => "compute_epi_mask",
        }
    }

    fn allowed_params(&self) -> &'static [&'static str] {
        match self {
            Self::Brain => &["threshold"],
            Self::Background => &[],
            Self::Epi => &["lower_cutoff"],
        }
    }

    /// Compute the mask on the grid of `target`.
    pub fn compute(&self, target: &Image, params: &Map<String, Value>) -> Result<Image, DataError> {
        if let Some(key) = params
            .keys()
            .find(|k| !self.allowed_params().contains(&k.as_str()))
        {
            return Err(DataError::invalid_parameter(
                "params",
                key,
                self.allowed_params(),
            ));
        }
        let mean = mean_volume(target)?;
        let mask = match self {
            Self::Brain => {
                let threshold = float_param(params, "threshold", 0.5)?;
                let max = max_value(&mean);
                if max <= 0.0 {
                    Array3::from_elem(mean.dim(), false)
                } else {
                    mean.mapv(|v| f64::from(v) / max > threshold)
                }
            }
            Self::Background => {
                let background = border_mode(&mean);
                let mask = mean.mapv(|v| !v.is_nan() && v != background);
                largest_component_if_any(mask)
            }
            Self::Epi => {
                let lower_cutoff = float_param(params, "lower_cutoff", 0.2)?;
                let cutoff = lower_cutoff * max_value(&mean);
                let mask = mean.mapv(|v| f64::from(v) > cutoff);
                largest_component_if_any(mask)
            }
        };
        Ok(mask_image(&mask, target))
    }
}

fn float_param(params: &Map<String, Value>, key: &str, default: f64) -> Result<f64, DataError> {
    match params.get(key) {
        None => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| {
            DataError::configuration(format!("The parameter `{key}` ({value}) must be a number."))
        }),
    }
}

fn max_value(volume: &Array3<f32>) -> f64 {
    volume
        .iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, |acc, v| acc.max(f64::from(*v)))
}

fn largest_component_if_any(mask: Array3<bool>) -> Array3<bool> {
    if mask.iter().any(|b| *b) {
        largest_connected_component(&mask)
    } else {
        mask
    }
}

/// Mean over time for 4-D images, the volume itself for 3-D ones.
fn mean_volume(image: &Image) -> Result<Array3<f32>, DataError> {
    let data = image.data();
    let mean = if image.ndim() > 3 {
        data.mean_axis(Axis(3))
            .ok_or_else(|| DataError::shape("Cannot average an image without volumes"))?
    } else {
        data.clone()
    };
    mean.into_dimensionality()
        .map_err(|e| DataError::shape(format!("Expected a 3-D or 4-D image: {e}")))
}

/// Most frequent value on the faces of the volume.
fn border_mode(volume: &Array3<f32>) -> f32 {
    let (nx, ny, nz) = volume.dim();
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for ((i, j, k), v) in volume.indexed_iter() {
        let on_border = i == 0 || j == 0 || k == 0 || i + 1 == nx || j + 1 == ny || k + 1 == nz;
        if on_border && !v.is_nan() {
            *counts.entry(v.to_bits()).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|(bits, count)| (*count, std::cmp::Reverse(*bits)))
        .map_or(0.0, |(bits, _)| f32::from_bits(bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::image::scaled_affine;

    fn blob() -> Image {
        // 5x5x5 volume, bright 3x3x3 center on a zero background
        let data = Array3::from_shape_fn((5, 5, 5), |(i, j, k)| {
            if (1..4).contains(&i) && (1..4).contains(&j) && (1..4).contains(&k) {
                100.0
            } else {
                0.0
            }
        });
        Image::new(data.into_dyn(), scaled_affine(2.0))
    }

    fn count(image: &Image) -> usize {
        image.data().iter().filter(|v| **v != 0.0).count()
    }

    #[test]
    fn test_callables_find_the_blob() {
        let target = blob();
        for callable in CallableMask::ALL {
            let mask = callable.compute(&target, &Map::new()).unwrap();
            assert_eq!(count(&mask), 27, "{}", callable.name());
            assert_eq!(mask.shape(), &[5, 5, 5]);
        }
    }

    #[test]
    fn test_brain_mask_threshold_param() {
        let mut params = Map::new();
        params.insert("threshold".into(), Value::from(1.0));
        let mask = CallableMask::Brain.compute(&blob(), &params).unwrap();
        assert_eq!(count(&mask), 0);
    }

    #[test]
    fn test_unknown_param_is_rejected() {
        let mut params = Map::new();
        params.insert("smoothing".into(), Value::from(1.0));
        let err = CallableMask::Epi.compute(&blob(), &params).unwrap_err();
        assert!(err.to_string().contains("smoothing"));
    }

    #[test]
    fn test_4d_target_is_averaged() {
        let data = ndarray::Array4::from_shape_fn((3, 3, 3, 2), |(i, _, _, t)| {
            if i == 1 { 10.0 + t as f32 } else { 0.0 }
        });
        let target = Image::new(data.into_dyn(), scaled_affine(1.0));
        let mask = CallableMask::Epi.compute(&target, &Map::new()).unwrap();
        assert_eq!(mask.shape(), &[3, 3, 3]);
        assert_eq!(count(&mask), 9);
    }
}
