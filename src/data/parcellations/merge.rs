//! Merging several parcellations into one label image.

use std::collections::HashSet;

use tracing::warn;

use crate::data::image::{resample_to_img, Image, Interpolation};
use crate::errors::DataError;

/// Something about a merge the caller should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeWarning {
    /// Voxels claimed by more than one parcellation went to the first listed.
    OverlappingVoxels,
    /// Label names repeat across parcellations and were prefixed.
    DuplicateLabels,
}

/// A parcellation to merge: its name, label image and label names.
#[derive(Debug, Clone)]
pub struct NamedParcellation {
    pub name: String,
    pub image: Image,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MergedParcellation {
    pub image: Image,
    pub labels: Vec<String>,
    pub warnings: Vec<MergeWarning>,
}

/// Merge parcellations on the grid of the first one.
///
/// Labels of each later parcellation are offset by the number of labels
/// merged so far. Voxels already labelled keep their label.
pub fn merge_parcellations(parcellations: &[NamedParcellation]) -> Result<MergedParcellation, DataError> {
    let (first, rest) = parcellations
        .split_first()
        .ok_or_else(|| DataError::configuration("No parcellations to merge"))?;

    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    let duplicated = parcellations
        .iter()
        .flat_map(|p| p.labels.iter())
        .any(|label| !seen.insert(label.as_str()));
    let prefixed = |p: &NamedParcellation| -> Vec<String> {
        if duplicated {
            p.labels.iter().map(|l| format!("{}_{}", p.name, l)).collect()
        } else {
            p.labels.clone()
        }
    };
    if duplicated {
        warn!(
            "The parcellations have duplicated labels. Each label will be prefixed with the parcellation name."
        );
        warnings.push(MergeWarning::DuplicateLabels);
    }

    let mut data = first.image.data().clone();
    let mut labels = prefixed(first);
    let mut overlapping = false;

    for parcellation in rest {
        let resampled;
        let image = if parcellation.image.shape() == first.image.shape() {
            &parcellation.image
        } else {
            warn!(
                "Parcellation {} has a different grid, resampling to {}",
                parcellation.name, first.name
            );
            resampled = resample_to_img(&parcellation.image, &first.image, Interpolation::Nearest)?;
            &resampled
        };

        let offset = labels.len() as f32;
        for (merged, value) in data.iter_mut().zip(image.data().iter()) {
            if *value == 0.0 {
                continue;
            }
            if *merged != 0.0 {
                overlapping = true;
                continue;
            }
            *merged = *value + offset;
        }
        labels.extend(prefixed(parcellation));
    }

    if overlapping {
        warn!(
            "The parcellations have overlapping voxels. The overlapping voxels will be assigned to the first parcellation."
        );
        warnings.push(MergeWarning::OverlappingVoxels);
    }

    Ok(MergedParcellation {
        image: first.image.with_data(data),
        labels,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::image::scaled_affine;
    use ndarray::{Array3, ArrayD};
    use pretty_assertions::assert_eq;

    fn parcellation(name: &str, values: &[f32], labels: &[&str]) -> NamedParcellation {
        let data = Array3::from_shape_vec((values.len(), 1, 1), values.to_vec()).unwrap();
        NamedParcellation {
            name: name.to_string(),
            image: Image::new(data.into_dyn(), scaled_affine(1.0)),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn flat(data: &ArrayD<f32>) -> Vec<f32> {
        data.iter().copied().collect()
    }

    #[test]
    fn test_disjoint_merge_offsets_labels() {
        let a = parcellation("a", &[1.0, 2.0, 0.0, 0.0], &["a1", "a2"]);
        let b = parcellation("b", &[0.0, 0.0, 1.0, 2.0], &["b1", "b2"]);
        let merged = merge_parcellations(&[a, b]).unwrap();

        assert_eq!(flat(merged.image.data()), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(merged.labels, vec!["a1", "a2", "b1", "b2"]);
        assert!(merged.warnings.is_empty());
    }

    #[test]
    fn test_overlap_keeps_first_and_warns() {
        let a = parcellation("a", &[1.0, 1.0, 0.0], &["a1"]);
        let b = parcellation("b", &[0.0, 1.0, 1.0], &["b1"]);
        let merged = merge_parcellations(&[a, b]).unwrap();

        assert_eq!(flat(merged.image.data()), vec![1.0, 1.0, 2.0]);
        assert_eq!(merged.warnings, vec![MergeWarning::OverlappingVoxels]);
    }

    #[test]
    fn test_duplicate_labels_are_prefixed() {
        let a = parcellation("left", &[1.0, 0.0], &["roi"]);
        let b = parcellation("right", &[0.0, 1.0], &["roi"]);
        let merged = merge_parcellations(&[a, b]).unwrap();

        assert_eq!(merged.labels, vec!["left_roi", "right_roi"]);
        assert_eq!(merged.warnings, vec![MergeWarning::DuplicateLabels]);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(merge_parcellations(&[]).is_err());
    }
}
