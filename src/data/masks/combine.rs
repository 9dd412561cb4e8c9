//! Boolean combination of masks.

use std::collections::VecDeque;

use ndarray::{Array3, Zip};

use crate::data::image::Image;
use crate::errors::DataError;

/// Keep only the largest 6-connected component of `mask`.
pub fn largest_connected_component(mask: &Array3<bool>) -> Array3<bool> {
    let (nx, ny, nz) = mask.dim();
    let mut labels = Array3::<u32>::zeros((nx, ny, nz));
    let mut best_label = 0u32;
    let mut best_size = 0usize;
    let mut next = 0u32;
    let mut queue = VecDeque::new();

    for ((i, j, k), &inside) in mask.indexed_iter() {
        if !inside || labels[[i, j, k]] != 0 {
            continue;
        }
        next += 1;
        labels[[i, j, k]] = next;
        queue.push_back((i, j, k));
        let mut size = 0usize;
        while let Some((x, y, z)) = queue.pop_front() {
            size += 1;
            let neighbours = [
                (x.wrapping_sub(1), y, z),
                (x + 1, y, z),
                (x, y.wrapping_sub(1), z),
                (x, y + 1, z),
                (x, y, z.wrapping_sub(1)),
                (x, y, z + 1),
            ];
            for (a, b, c) in neighbours {
                if a < nx && b < ny && c < nz && mask[[a, b, c]] && labels[[a, b, c]] == 0 {
                    labels[[a, b, c]] = next;
                    queue.push_back((a, b, c));
                }
            }
        }
        if size > best_size {
            best_size = size;
            best_label = next;
        }
    }

    labels.mapv(|l| l != 0 && l == best_label)
}

/// Binary version of a (3-D) image.
pub fn binarize(image: &Image) -> Result<Array3<bool>, DataError> {
    let volume = image
        .volume(0)
        .ok_or_else(|| DataError::shape("Mask image has no volume"))?;
    Ok(volume.mapv(|v| v != 0.0 && !v.is_nan()))
}

/// Image holding `mask` as 0/1 on the grid of `like`.
pub fn mask_image(mask: &Array3<bool>, like: &Image) -> Image {
    like.with_data(mask.mapv(|b| if b { 1.0 } else { 0.0 }).into_dyn())
}

/// Combine masks voxel-wise.
///
/// A voxel is kept when it is set in more than `threshold * n` of the `n`
/// masks, with `threshold` capped just below 1: `1.0` is the intersection and
/// `0.0` the union. With `connected`, only the largest component is kept.
pub fn intersect_masks(masks: &[Image], threshold: f64, connected: bool) -> Result<Image, DataError> {
    let first = masks
        .first()
        .ok_or_else(|| DataError::configuration("No masks to combine"))?;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(DataError::configuration(format!(
            "The parameter `threshold` ({threshold}) needs to be between 0 and 1."
        )));
    }
    let shape = first.spatial_shape();
    let mut counts = Array3::<u32>::zeros((shape[0], shape[1], shape[2]));
    for mask in masks {
        if mask.spatial_shape() != shape {
            return Err(DataError::shape(format!(
                "All masks must have the same shape, got {:?} and {:?}",
                shape,
                mask.spatial_shape()
            )));
        }
        let binary = binarize(mask)?;
        Zip::from(&mut counts).and(&binary).for_each(|c, &b| {
            if b {
                *c += 1;
            }
        });
    }

    let cutoff = threshold.min(1.0 - 1e-7) * masks.len() as f64;
    let mut combined = counts.mapv(|c| f64::from(c) > cutoff);
    if connected && combined.iter().any(|b| *b) {
        combined = largest_connected_component(&combined);
    }
    Ok(mask_image(&combined, first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::image::scaled_affine;

    fn mask(values: &[f32]) -> Image {
        let data = Array3::from_shape_vec((values.len(), 1, 1), values.to_vec()).unwrap();
        Image::new(data.into_dyn(), scaled_affine(1.0))
    }

    fn flat(image: &Image) -> Vec<f32> {
        image.data().iter().copied().collect()
    }

    #[test]
    fn test_intersection_and_union() {
        let a = mask(&[1.0, 1.0, 0.0, 0.0]);
        let b = mask(&[0.0, 1.0, 1.0, 0.0]);
        let both = intersect_masks(&[a.clone(), b.clone()], 1.0, false).unwrap();
        assert_eq!(flat(&both), vec![0.0, 1.0, 0.0, 0.0]);

        let any = intersect_masks(&[a, b], 0.0, false).unwrap();
        assert_eq!(flat(&any), vec![1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_connected_keeps_largest_component() {
        let a = mask(&[1.0, 0.0, 1.0, 1.0, 1.0]);
        let out = intersect_masks(&[a], 1.0, true).unwrap();
        assert_eq!(flat(&out), vec![0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = intersect_masks(&[mask(&[1.0]), mask(&[1.0, 1.0])], 1.0, true).unwrap_err();
        assert!(matches!(err, DataError::Shape(_)));
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(intersect_masks(&[mask(&[1.0])], 1.5, true).is_err());
    }
}
