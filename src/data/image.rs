//! NIfTI volumes and grid resampling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{ArrayD, ArrayView3, Axis, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use once_cell::sync::OnceCell;

use crate::errors::DataError;

/// Voxel-to-world transform, row major.
pub type Affine = [[f64; 4]; 4];

pub const IDENTITY: Affine = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Diagonal affine with isotropic voxels of `size` mm and zero origin.
pub fn scaled_affine(size: f64) -> Affine {
    let mut affine = IDENTITY;
    for (i, row) in affine.iter_mut().enumerate().take(3) {
        row[i] = size;
    }
    affine
}

fn apply(affine: &Affine, point: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (i, value) in out.iter_mut().enumerate() {
        *value = affine[i][0] * point[0]
            + affine[i][1] * point[1]
            + affine[i][2] * point[2]
            + affine[i][3];
    }
    out
}

fn compose(a: &Affine, b: &Affine) -> Affine {
    let mut out = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[i][j] = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Inverse of an affine whose last row is `[0, 0, 0, 1]`.
pub fn invert_affine(a: &Affine) -> Option<Affine> {
    let m = |r: usize, c: usize| a[r][c];
    let det = m(0, 0) * (m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1))
        - m(0, 1) * (m(1, 0) * m(2, 2) - m(1, 2) * m(2, 0))
        + m(0, 2) * (m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0));
    if det.abs() < f64::EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let r = [
        [
            (m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1)) * inv_det,
            (m(0, 2) * m(2, 1) - m(0, 1) * m(2, 2)) * inv_det,
            (m(0, 1) * m(1, 2) - m(0, 2) * m(1, 1)) * inv_det,
        ],
        [
            (m(1, 2) * m(2, 0) - m(1, 0) * m(2, 2)) * inv_det,
            (m(0, 0) * m(2, 2) - m(0, 2) * m(2, 0)) * inv_det,
            (m(0, 2) * m(1, 0) - m(0, 0) * m(1, 2)) * inv_det,
        ],
        [
            (m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0)) * inv_det,
            (m(0, 1) * m(2, 0) - m(0, 0) * m(2, 1)) * inv_det,
            (m(0, 0) * m(1, 1) - m(0, 1) * m(1, 0)) * inv_det,
        ],
    ];
    let t = [m(0, 3), m(1, 3), m(2, 3)];
    let mut out = IDENTITY;
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = r[i][j];
        }
        out[i][3] = -(r[i][0] * t[0] + r[i][1] * t[1] + r[i][2] * t[2]);
    }
    Some(out)
}

/// Interpolation used when resampling onto another grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Labels and masks: values are copied, never blended.
    Nearest,
    /// Trilinear, for real-valued data.
    Continuous,
}

/// A 3-D or 4-D volume with its NIfTI header.
///
/// Voxel `[i, j, k]` of the array is voxel `(i, j, k)` of the file.
#[derive(Debug, Clone)]
pub struct Image {
    data: ArrayD<f32>,
    header: NiftiHeader,
}

impl Image {
    /// Build an image from voxel data and an affine.
    pub fn new(data: ArrayD<f32>, affine: Affine) -> Self {
        let mut header = NiftiHeader::default();
        header.sform_code = 1;
        header.qform_code = 0;
        header.srow_x = affine[0].map(|v| v as f32);
        header.srow_y = affine[1].map(|v| v as f32);
        header.srow_z = affine[2].map(|v| v as f32);
        for axis in 0..3 {
            let norm = (0..3).map(|r| affine[r][axis].powi(2)).sum::<f64>().sqrt();
            header.pixdim[axis + 1] = norm as f32;
        }
        let mut image = Self { data, header };
        image.sync_dims();
        image
    }

    /// Same header, new voxel data.
    pub fn with_data(&self, data: ArrayD<f32>) -> Self {
        let mut image = Self {
            data,
            header: self.header.clone(),
        };
        image.sync_dims();
        image
    }

    fn sync_dims(&mut self) {
        let shape = self.data.shape();
        self.header.dim = [1; 8];
        self.header.dim[0] = shape.len() as u16;
        for (i, n) in shape.iter().enumerate().take(7) {
            self.header.dim[i + 1] = *n as u16;
        }
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(|e| DataError::image(path, e.to_string()))?;
        let header = obj.header().clone();
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|e| DataError::image(path, e.to_string()))?;
        Ok(Self { data, header })
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        WriterOptions::new(path)
            .reference_header(&self.header)
            .write_nifti(&self.data)
            .map_err(|e| DataError::image(path, e.to_string()))
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Size of the fourth axis; 1 for 3-D images.
    pub fn n_volumes(&self) -> usize {
        if self.ndim() > 3 {
            self.shape()[3]
        } else {
            1
        }
    }

    /// Spatial shape (first three axes).
    pub fn spatial_shape(&self) -> [usize; 3] {
        let s = self.shape();
        [
            s.first().copied().unwrap_or(1),
            s.get(1).copied().unwrap_or(1),
            s.get(2).copied().unwrap_or(1),
        ]
    }

    /// One 3-D volume. For 3-D images only index 0 exists.
    pub fn volume(&self, index: usize) -> Option<ArrayView3<'_, f32>> {
        let view = if self.ndim() > 3 {
            if index >= self.shape()[3] {
                return None;
            }
            self.data.index_axis(Axis(3), index)
        } else if index == 0 {
            self.data.view()
        } else {
            return None;
        };
        view.into_dimensionality().ok()
    }

    /// Voxel-to-world transform: sform when set, else scaled by pixdim.
    pub fn affine(&self) -> Affine {
        let h = &self.header;
        if h.sform_code > 0 {
            let mut affine = IDENTITY;
            affine[0] = h.srow_x.map(f64::from);
            affine[1] = h.srow_y.map(f64::from);
            affine[2] = h.srow_z.map(f64::from);
            affine
        } else {
            let mut affine = IDENTITY;
            for (i, row) in affine.iter_mut().enumerate().take(3) {
                let size = f64::from(h.pixdim[i + 1]);
                row[i] = if size > 0.0 { size } else { 1.0 };
            }
            affine
        }
    }

    /// Voxel sizes along the three spatial axes.
    pub fn zooms(&self) -> [f64; 3] {
        let affine = self.affine();
        let mut zooms = [0.0; 3];
        for (axis, zoom) in zooms.iter_mut().enumerate() {
            *zoom = (0..3)
                .map(|r| affine[r][axis].powi(2))
                .sum::<f64>()
                .sqrt();
        }
        zooms
    }

    /// Smallest spatial voxel size, the working resolution of this image.
    pub fn min_zoom(&self) -> f64 {
        self.zooms().into_iter().fold(f64::INFINITY, f64::min)
    }

    /// Same spatial grid (shape and affine) as `other`.
    pub fn same_grid(&self, other: &Image) -> bool {
        if self.spatial_shape() != other.spatial_shape() {
            return false;
        }
        let (a, b) = (self.affine(), other.affine());
        a.iter()
            .flatten()
            .zip(b.iter().flatten())
            .all(|(x, y)| (x - y).abs() < 1e-4)
    }
}

fn sample_nearest(volume: &ArrayView3<'_, f32>, p: [f64; 3]) -> f32 {
    let dims = volume.dim();
    let dims = [dims.0, dims.1, dims.2];
    let mut idx = [0usize; 3];
    for axis in 0..3 {
        let r = p[axis].round();
        if r < 0.0 || r > (dims[axis] as f64 - 1.0) {
            return 0.0;
        }
        idx[axis] = r as usize;
    }
    volume[[idx[0], idx[1], idx[2]]]
}

fn sample_trilinear(volume: &ArrayView3<'_, f32>, p: [f64; 3]) -> f32 {
    let dims = volume.dim();
    let dims = [dims.0, dims.1, dims.2];
    let tol = 1e-6;
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut frac = [0.0f64; 3];
    for axis in 0..3 {
        let max = dims[axis] as f64 - 1.0;
        if p[axis] < -tol || p[axis] > max + tol {
            return 0.0;
        }
        let x = p[axis].clamp(0.0, max);
        let f = x.floor();
        lo[axis] = f as usize;
        hi[axis] = (lo[axis] + 1).min(dims[axis] - 1);
        frac[axis] = x - f;
    }
    let mut value = 0.0f64;
    for corner in 0..8 {
        let mut weight = 1.0;
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            if corner & (1 << axis) == 0 {
                weight *= 1.0 - frac[axis];
                idx[axis] = lo[axis];
            } else {
                weight *= frac[axis];
                idx[axis] = hi[axis];
            }
        }
        if weight > 0.0 {
            value += weight * f64::from(volume[[idx[0], idx[1], idx[2]]]);
        }
    }
    value as f32
}

/// Resample `source` onto the spatial grid of `target`.
///
/// Target voxels that map outside the source field of view become 0. The
/// result carries `target`'s header; 4-D sources keep their volume count.
/// Sources already on the target grid are copied without interpolation.
pub fn resample_to_img(
    source: &Image,
    target: &Image,
    interpolation: Interpolation,
) -> Result<Image, DataError> {
    if source.same_grid(target) {
        tracing::debug!("Source already on the target grid, skipping resampling");
        return Ok(with_target_header(source.data.clone(), target));
    }
    let inverse = invert_affine(&source.affine()).ok_or_else(|| {
        DataError::shape("Cannot resample an image with a singular affine")
    })?;
    let mapping = compose(&inverse, &target.affine());
    let [nx, ny, nz] = target.spatial_shape();
    let n_volumes = source.n_volumes();

    let shape = if source.ndim() > 3 {
        IxDyn(&[nx, ny, nz, n_volumes])
    } else {
        IxDyn(&[nx, ny, nz])
    };
    let mut out = ArrayD::<f32>::zeros(shape);

    for t in 0..n_volumes {
        let Some(volume) = source.volume(t) else {
            continue;
        };
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let p = apply(&mapping, [i as f64, j as f64, k as f64]);
                    let value = match interpolation {
                        Interpolation::Nearest => sample_nearest(&volume, p),
                        Interpolation::Continuous => sample_trilinear(&volume, p),
                    };
                    if source.ndim() > 3 {
                        out[[i, j, k, t]] = value;
                    } else {
                        out[[i, j, k]] = value;
                    }
                }
            }
        }
    }

    Ok(with_target_header(out, target))
}

fn with_target_header(data: ArrayD<f32>, target: &Image) -> Image {
    let mut header = target.header.clone();
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    let mut image = Image { data, header };
    image.sync_dims();
    image
}

/// An image loaded from `path` on first access and shared afterwards.
#[derive(Debug, Clone)]
pub struct LazyImage {
    path: PathBuf,
    cell: OnceCell<Arc<Image>>,
}

impl LazyImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::new(),
        }
    }

    /// An already loaded image; `path` is where it lives (or will live) on disk.
    pub fn loaded(path: impl Into<PathBuf>, image: Image) -> Self {
        Self {
            path: path.into(),
            cell: OnceCell::with_value(Arc::new(image)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<Image>, DataError> {
        self.cell
            .get_or_try_init(|| {
                tracing::debug!("Loading image {}", self.path.display());
                Image::load(&self.path).map(Arc::new)
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::TempDir;

    fn ramp(shape: (usize, usize, usize), size: f64) -> Image {
        let data = Array3::from_shape_fn(shape, |(i, j, k)| (i * 100 + j * 10 + k) as f32);
        Image::new(data.into_dyn(), scaled_affine(size))
    }

    #[test]
    fn test_zooms_from_affine() {
        let image = ramp((2, 2, 2), 2.0);
        assert_eq!(image.zooms(), [2.0, 2.0, 2.0]);
        assert_eq!(image.min_zoom(), 2.0);
    }

    #[test]
    fn test_pixdim_used_without_sform() {
        let mut image = ramp((2, 2, 2), 1.0);
        image.header.sform_code = 0;
        image.header.pixdim[1] = 3.0;
        image.header.pixdim[2] = 1.5;
        image.header.pixdim[3] = 2.0;
        assert_eq!(image.zooms(), [3.0, 1.5, 2.0]);
        assert_eq!(image.min_zoom(), 1.5);
    }

    #[test]
    fn test_invert_affine_roundtrip() {
        let mut affine = scaled_affine(2.0);
        affine[0][3] = -90.0;
        affine[1][3] = 10.0;
        let inverse = invert_affine(&affine).unwrap();
        let p = apply(&compose(&inverse, &affine), [3.0, 4.0, 5.0]);
        for (a, b) in p.iter().zip([3.0, 4.0, 5.0]) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_resample_identity_grid_keeps_values() {
        let image = ramp((3, 3, 3), 1.0);
        let out = resample_to_img(&image, &image, Interpolation::Nearest).unwrap();
        assert_eq!(out.data(), image.data());
    }

    #[test]
    fn test_same_grid_compares_shape_and_affine() {
        let image = ramp((3, 3, 3), 1.0);
        assert!(image.same_grid(&ramp((3, 3, 3), 1.0)));
        assert!(!image.same_grid(&ramp((3, 3, 4), 1.0)));
        assert!(!image.same_grid(&ramp((3, 3, 3), 2.0)));
    }

    #[test]
    fn test_resample_onto_same_grid_keeps_4d_values() {
        let data = ArrayD::from_shape_fn(IxDyn(&[2, 2, 2, 3]), |ix| (ix[0] + 10 * ix[3]) as f32);
        let source = Image::new(data, scaled_affine(2.0));
        let target = Image::new(ArrayD::zeros(IxDyn(&[2, 2, 2])), scaled_affine(2.0));
        let out = resample_to_img(&source, &target, Interpolation::Continuous).unwrap();
        assert_eq!(out.shape(), &[2, 2, 2, 3]);
        assert_eq!(out.data(), source.data());
    }

    #[test]
    fn test_resample_nearest_to_coarser_grid() {
        let fine = ramp((4, 4, 4), 1.0);
        let coarse = Image::new(ArrayD::zeros(IxDyn(&[2, 2, 2])), scaled_affine(2.0));
        let out = resample_to_img(&fine, &coarse, Interpolation::Nearest).unwrap();
        assert_eq!(out.shape(), &[2, 2, 2]);
        // coarse voxel (1,1,1) sits at world (2,2,2) = fine voxel (2,2,2)
        assert_eq!(out.data()[[1, 1, 1]], 222.0);
    }

    #[test]
    fn test_resample_trilinear_midpoint() {
        let data = Array3::from_shape_fn((2, 1, 1), |(i, _, _)| i as f32 * 10.0);
        let source = Image::new(data.into_dyn(), scaled_affine(2.0));
        let target = Image::new(ArrayD::zeros(IxDyn(&[3, 1, 1])), scaled_affine(1.0));
        let out = resample_to_img(&source, &target, Interpolation::Continuous).unwrap();
        assert_eq!(out.data()[[1, 0, 0]], 5.0);
        assert_eq!(out.data()[[2, 0, 0]], 10.0);
    }

    #[test]
    fn test_resample_out_of_field_is_zero() {
        let source = ramp((2, 2, 2), 1.0);
        let target = Image::new(ArrayD::zeros(IxDyn(&[4, 4, 4])), scaled_affine(1.0));
        let out = resample_to_img(&source, &target, Interpolation::Nearest).unwrap();
        assert_eq!(out.data()[[3, 3, 3]], 0.0);
        assert_eq!(out.data()[[1, 1, 1]], 111.0);
    }

    #[test]
    fn test_resample_4d_per_volume() {
        let data = ndarray::Array4::from_shape_fn((2, 2, 2, 3), |(_, _, _, t)| t as f32 + 1.0);
        let source = Image::new(data.into_dyn(), scaled_affine(1.0));
        let target = Image::new(ArrayD::zeros(IxDyn(&[2, 2, 2])), scaled_affine(1.0));
        let out = resample_to_img(&source, &target, Interpolation::Nearest).unwrap();
        assert_eq!(out.shape(), &[2, 2, 2, 3]);
        assert_eq!(out.data()[[0, 1, 0, 2]], 3.0);
    }

    #[test]
    fn test_save_and_lazy_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("img.nii");
        let image = ramp((2, 3, 4), 2.0);
        image.save(&path).unwrap();

        let lazy = LazyImage::new(&path);
        assert!(!lazy.is_loaded());
        let loaded = lazy.get().unwrap();
        assert!(lazy.is_loaded());
        assert_eq!(loaded.shape(), &[2, 3, 4]);
        assert_eq!(loaded.data()[[1, 2, 3]], 123.0);
        assert_eq!(loaded.min_zoom(), 2.0);
        assert!(Arc::ptr_eq(&loaded, &lazy.get().unwrap()));
    }
}
