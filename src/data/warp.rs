//! Volume warping through ANTs and FSL.
//!
//! Template-to-template warps always go through ANTs with a cached composite
//! transform; warps into a scan's native space use whichever tool produced
//! the element's `Warp` entry.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::data::env::DataEnv;
use crate::data::image::{Image, Interpolation};
use crate::data::space::Space;
use crate::errors::DataError;
use crate::pipeline::data::{DataItem, DataObject, WarpSpec, Warper};

pub const ANTS_APPLY: &str = "antsApplyTransforms";
pub const FSL_APPLYWARP: &str = "applywarp";

/// Find the transform into (or, with `inverse`, out of) native space.
///
/// The forward transform is the `Warp` edge with `dst == native`. The inverse
/// is the edge with `src == native` whose `dst` is the forward edge's `src`.
pub fn get_native_warper(
    extra_input: Option<&DataObject>,
    inverse: bool,
) -> Result<&WarpSpec, DataError> {
    let extra_input = extra_input.ok_or_else(|| {
        DataError::missing_prerequisite(
            "No extra input provided, requires `Warp` data type to infer target template space.",
        )
    })?;
    let warps = extra_input.warps().ok_or_else(|| {
        DataError::missing_prerequisite(
            "No `Warp` data type provided in extra input, required to infer target template space.",
        )
    })?;
    let forward = warps
        .iter()
        .find(|spec| spec.dst.is_native())
        .ok_or_else(|| {
            DataError::missing_prerequisite(
                "Could not find correct warping specification in `Warp`: no entry with `dst` set to native.",
            )
        })?;
    if !inverse {
        return Ok(forward);
    }
    warps
        .iter()
        .find(|spec| spec.src.is_native() && spec.dst == forward.src)
        .ok_or_else(|| {
            DataError::missing_prerequisite(format!(
                "Could not find inverse warping specification in `Warp`: no entry from native to {}.",
                forward.src
            ))
        })
}

pub(crate) fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

pub fn ants_interpolation(interpolation: Interpolation) -> &'static str {
    match interpolation {
        Interpolation::Nearest => "GenericLabel[NearestNeighbor]",
        Interpolation::Continuous => "LanczosWindowedSinc",
    }
}

pub fn fsl_interpolation(interpolation: Interpolation) -> &'static str {
    match interpolation {
        Interpolation::Nearest => "nn",
        Interpolation::Continuous => "spline",
    }
}

/// `antsApplyTransforms` arguments; `-e 3` marks a time series input.
pub fn ants_apply_args(
    input: &Path,
    reference: &Path,
    transform: &Path,
    output: &Path,
    interpolation: Interpolation,
    time_series: bool,
) -> Vec<String> {
    vec![
        "-d".into(),
        "3".into(),
        "-e".into(),
        if time_series { "3" } else { "0" }.into(),
        "-n".into(),
        ants_interpolation(interpolation).into(),
        "-i".into(),
        path_arg(input),
        "-r".into(),
        path_arg(reference),
        "-t".into(),
        path_arg(transform),
        "-o".into(),
        path_arg(output),
    ]
}

pub fn applywarp_args(
    input: &Path,
    reference: &Path,
    warp: &Path,
    output: &Path,
    interpolation: Interpolation,
) -> Vec<String> {
    vec![
        format!("--interp={}", fsl_interpolation(interpolation)),
        "-i".into(),
        path_arg(input),
        "-r".into(),
        path_arg(reference),
        "-w".into(),
        path_arg(warp),
        "-o".into(),
        path_arg(output),
    ]
}

/// A volume to warp, with how its values may be interpolated.
#[derive(Debug, Clone, Copy)]
pub struct VolumeWarp<'a> {
    pub name: &'a str,
    pub image: &'a Image,
    pub interpolation: Interpolation,
}

fn run_volume_warp(
    env: &DataEnv,
    volume: VolumeWarp<'_>,
    warper: Warper,
    reference: &Path,
    transform: &Path,
) -> Result<Image, DataError> {
    let name = file_safe(volume.name);
    let tempdir = env.call_tempdir(&format!("{warper}_warper_{name}"))?;
    let result = (|| -> Result<Image, DataError> {
        let input = tempdir.join(format!("{name}.nii.gz"));
        volume.image.save(&input)?;

        let output_dir: PathBuf = env.element_tempdir(&format!("{warper}_warper_{name}"))?;
        let output = output_dir.join(format!("{name}_warped.nii.gz"));
        match warper {
            Warper::Ants => env.runner.run(
                ANTS_APPLY,
                &ants_apply_args(
                    &input,
                    reference,
                    transform,
                    &output,
                    volume.interpolation,
                    volume.image.ndim() > 3,
                ),
            )?,
            Warper::Fsl => env.runner.run(
                FSL_APPLYWARP,
                &applywarp_args(&input, reference, transform, &output, volume.interpolation),
            )?,
        };
        Image::load(&output)
    })();
    env.release_tempdir(&tempdir)?;
    result
}

/// Warp `volume` from template space `src` to template space `dst` with ANTs.
///
/// The reference grid is the `dst` template at the resolution closest to
/// `resolution`.
pub fn warp_to_template(
    env: &DataEnv,
    volume: VolumeWarp<'_>,
    src: &str,
    dst: &str,
    resolution: f64,
) -> Result<Image, DataError> {
    debug!("Warping {} from {} to {} with ANTs", volume.name, src, dst);
    let transform = env.xfms.get_xfm(src, dst)?;
    let reference = env.templates.get_template(dst, Some(resolution))?;
    run_volume_warp(env, volume, Warper::Ants, &reference, &transform)
}

/// Warp `volume` into the native space of `target` using `spec`.
pub fn warp_to_native(
    env: &DataEnv,
    volume: VolumeWarp<'_>,
    spec: &WarpSpec,
    target: &DataItem,
) -> Result<Image, DataError> {
    if spec.dst != Space::Native {
        return Err(DataError::configuration(format!(
            "Native warps need a transform into native space, got {} -> {}",
            spec.src, spec.dst
        )));
    }
    let reference = target.reference.as_deref().ok_or_else(|| {
        DataError::missing_prerequisite(format!(
            "Warping {} to native space requires a `reference` for the target data",
            volume.name
        ))
    })?;
    debug!(
        "Warping {} from {} to native with {}",
        volume.name, spec.src, spec.warper
    );
    run_volume_warp(env, volume, spec.warper, reference, &spec.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warps() -> DataObject {
        let mut data = DataObject::new();
        data.insert_warps(vec![
            WarpSpec {
                src: Space::template("MNI152NLin2009cAsym"),
                dst: Space::Native,
                path: PathBuf::from("/w/to_native.h5"),
                warper: Warper::Ants,
            },
            WarpSpec {
                src: Space::Native,
                dst: Space::template("MNI152NLin2009cAsym"),
                path: PathBuf::from("/w/from_native.h5"),
                warper: Warper::Ants,
            },
        ]);
        data
    }

    #[test]
    fn test_forward_and_inverse_lookup() {
        let data = warps();
        let forward = get_native_warper(Some(&data), false).unwrap();
        assert_eq!(forward.path, PathBuf::from("/w/to_native.h5"));
        let inverse = get_native_warper(Some(&data), true).unwrap();
        assert_eq!(inverse.path, PathBuf::from("/w/from_native.h5"));
    }

    #[test]
    fn test_missing_extra_input_is_prerequisite_error() {
        let err = get_native_warper(None, false).unwrap_err();
        assert!(matches!(err, DataError::MissingPrerequisite(_)));

        let err = get_native_warper(Some(&DataObject::new()), false).unwrap_err();
        assert!(matches!(err, DataError::MissingPrerequisite(_)));
    }

    #[test]
    fn test_inverse_requires_matching_dst() {
        let mut data = DataObject::new();
        data.insert_warps(vec![WarpSpec {
            src: Space::template("MNI152NLin6Asym"),
            dst: Space::Native,
            path: PathBuf::from("/w/fsl.mat"),
            warper: Warper::Fsl,
        }]);
        let err = get_native_warper(Some(&data), true).unwrap_err();
        assert!(err.to_string().contains("MNI152NLin6Asym"));
    }

    #[test]
    fn test_command_lines() {
        let args = ants_apply_args(
            Path::new("in.nii.gz"),
            Path::new("ref.nii.gz"),
            Path::new("x.h5"),
            Path::new("out.nii.gz"),
            Interpolation::Nearest,
            false,
        );
        assert_eq!(
            args.join(" "),
            "-d 3 -e 0 -n GenericLabel[NearestNeighbor] -i in.nii.gz -r ref.nii.gz -t x.h5 -o out.nii.gz"
        );

        let args = applywarp_args(
            Path::new("in.nii.gz"),
            Path::new("ref.nii.gz"),
            Path::new("warp.nii.gz"),
            Path::new("out.nii.gz"),
            Interpolation::Continuous,
        );
        assert_eq!(args[0], "--interp=spline");
        assert_eq!(args.len(), 9);
    }

    #[test]
    fn test_file_safe_names() {
        assert_eq!(file_safe("GM_prob0.2"), "GM_prob0.2");
        assert_eq!(file_safe("a/b c"), "a_b_c");
    }
}
