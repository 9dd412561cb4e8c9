//! Factories for images and data objects used across tests.
//!
//! | Helper | Purpose |
//! |--------|---------|
//! | [`blob_image`] | 3-D volume with a bright cube in the middle |
//! | [`label_image`] | 3-D parcellation with labels `1..=n` along the x axis |
//! | [`constant_image`] | volume filled with one value |
//! | [`bold_object`] | data object with a `BOLD` item backed by an image |
//! | [`with_warp`] | adds a `Warp` edge to a data object |

use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayD, IxDyn};

use crate::data::image::{scaled_affine, Image};
use crate::data::space::Space;
use crate::pipeline::data::{DataItem, DataObject, WarpSpec, Warper};

/// `shape` volume at `size` mm with ones inside the central cube of side
/// `shape / 2` and zeros elsewhere.
pub fn blob_image(shape: [usize; 3], size: f64) -> Image {
    let lo = shape.map(|n| n / 4);
    let hi = shape.map(|n| n - n / 4);
    let data = Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(i, j, k)| {
        let inside = (lo[0]..hi[0]).contains(&i)
            && (lo[1]..hi[1]).contains(&j)
            && (lo[2]..hi[2]).contains(&k);
        if inside {
            1.0
        } else {
            0.0
        }
    });
    Image::new(data.into_dyn(), scaled_affine(size))
}

/// Parcellation of `n_labels` slabs along x, each `width` voxels wide.
pub fn label_image(n_labels: usize, width: usize, size: f64) -> Image {
    let nx = n_labels * width;
    let data = Array3::from_shape_fn((nx, 4, 4), |(i, _, _)| (i / width + 1) as f32);
    Image::new(data.into_dyn(), scaled_affine(size))
}

/// `shape` volume (3-D or 4-D) filled with `value`.
pub fn constant_image(shape: &[usize], value: f32, size: f64) -> Image {
    Image::new(ArrayD::from_elem(IxDyn(shape), value), scaled_affine(size))
}

/// Save `image` under `dir/name` and return the path.
///
/// # Panics
///
/// Panics if the image cannot be written.
pub fn save_image(image: &Image, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image
        .save(&path)
        .unwrap_or_else(|e| panic!("Failed to save test image {}: {e}", path.display()));
    path
}

/// A data object whose `BOLD` item holds `image` in `space`.
pub fn bold_object(image: Image, path: impl Into<PathBuf>, space: Space) -> DataObject {
    let mut data = DataObject::new();
    data.insert_item("BOLD", DataItem::from_image(image, path, space));
    data
}

/// Append a transform edge to the `Warp` entry of `data`.
pub fn with_warp(
    mut data: DataObject,
    src: Space,
    dst: Space,
    path: impl Into<PathBuf>,
    warper: Warper,
) -> DataObject {
    let mut specs = data.warps().map(<[WarpSpec]>::to_vec).unwrap_or_default();
    specs.push(WarpSpec {
        src,
        dst,
        path: path.into(),
        warper,
    });
    data.insert_warps(specs);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_image_has_central_cube() {
        let image = blob_image([8, 8, 8], 2.0);
        let ones = image.data().iter().filter(|v| **v == 1.0).count();
        assert_eq!(ones, 4 * 4 * 4);
        assert_eq!(image.zooms(), [2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_label_image_labels() {
        let image = label_image(3, 2, 1.0);
        assert_eq!(image.shape(), &[6, 4, 4]);
        assert_eq!(image.data()[[0, 0, 0]], 1.0);
        assert_eq!(image.data()[[5, 3, 3]], 3.0);
    }

    #[test]
    fn test_with_warp_appends() {
        let data = bold_object(blob_image([4, 4, 4], 1.0), "/bold.nii", Space::Native);
        let data = with_warp(
            data,
            Space::Native,
            Space::template("MNI152NLin6Asym"),
            "/w1.mat",
            Warper::Fsl,
        );
        let data = with_warp(
            data,
            Space::template("MNI152NLin6Asym"),
            Space::Native,
            "/w2.h5",
            Warper::Ants,
        );
        assert_eq!(data.warps().unwrap().len(), 2);
        assert!(data.contains("BOLD"));
    }
}
