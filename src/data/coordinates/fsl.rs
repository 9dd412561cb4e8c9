//! Point warps into native space with FSL's `img2imgcoord`.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use ndarray::Array2;
use tracing::debug;

use crate::data::env::DataEnv;
use crate::data::warp::file_safe;
use crate::errors::DataError;
use crate::pipeline::data::{DataItem, WarpSpec};

pub const FSL_IMG2IMGCOORD: &str = "img2imgcoord";

pub fn img2imgcoord_args(source: &Path, dest: &Path, warp: &Path, points: &Path) -> Vec<String> {
    vec![
        "-mm".into(),
        "-src".into(),
        source.display().to_string(),
        "-dest".into(),
        dest.display().to_string(),
        "-warp".into(),
        warp.display().to_string(),
        points.display().to_string(),
    ]
}

/// Parse whitespace separated `x y z` rows.
pub(crate) fn parse_points(path: &Path, contents: &str) -> Result<Array2<f64>, DataError> {
    let mut values = Vec::new();
    let mut rows = 0;
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(DataError::shape(format!(
                "Expected 3 values per coordinate in {}, got: {line}",
                path.display()
            )));
        }
        for field in fields {
            values.push(field.parse::<f64>().map_err(|_| {
                DataError::shape(format!("Invalid coordinate `{field}` in {}", path.display()))
            })?);
        }
        rows += 1;
    }
    Array2::from_shape_vec((rows, 3), values)
        .map_err(|e| DataError::shape(format!("Invalid coordinates in {}: {e}", path.display())))
}

/// Map template-space `points` into the native space of `target`.
pub fn warp_points_to_native(
    env: &DataEnv,
    name: &str,
    points: &Array2<f64>,
    spec: &WarpSpec,
    target: &DataItem,
) -> Result<Array2<f64>, DataError> {
    let source = target.path.as_deref().ok_or_else(|| {
        DataError::missing_prerequisite("Warping coordinates with FSL requires the target's `path`")
    })?;
    let reference = target.reference.as_deref().ok_or_else(|| {
        DataError::missing_prerequisite(
            "Warping coordinates with FSL requires a `reference` for the target data",
        )
    })?;
    debug!("Warping coordinates {} to native with FSL", name);

    let name = file_safe(name);
    let tempdir = env.call_tempdir(&format!("fsl_coordinates_warper_{name}"))?;
    let result = (|| -> Result<Array2<f64>, DataError> {
        let input = tempdir.join(format!("{name}.txt"));
        let mut text = String::new();
        for row in points.rows() {
            let _ = writeln!(text, "{} {} {}", row[0], row[1], row[2]);
        }
        fs::write(&input, text).map_err(|e| DataError::io(&input, e))?;

        let stdout = env.runner.run(
            FSL_IMG2IMGCOORD,
            &img2imgcoord_args(source, reference, &spec.path, &input),
        )?;
        // First line is the "Coordinates in Destination volume (in mm)" banner.
        let warped: String = stdout.lines().skip(1).map(|l| format!("{l}\n")).collect();

        let output_dir = env.element_tempdir(&format!("fsl_coordinates_warper_{name}"))?;
        let output = output_dir.join(format!("{name}_warped.txt"));
        fs::write(&output, &warped).map_err(|e| DataError::io(&output, e))?;
        parse_points(&output, &warped)
    })();
    env.release_tempdir(&tempdir)?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_points() {
        let points = parse_points(Path::new("p.txt"), "1 2 3\n\n-4.5 5 6\n").unwrap();
        assert_eq!(points, array![[1.0, 2.0, 3.0], [-4.5, 5.0, 6.0]]);
    }

    #[test]
    fn test_parse_points_rejects_wrong_width() {
        assert!(parse_points(Path::new("p.txt"), "1 2\n").is_err());
    }

    #[test]
    fn test_args_order() {
        let args = img2imgcoord_args(
            Path::new("bold.nii"),
            Path::new("t1.nii"),
            Path::new("warp.nii"),
            Path::new("in.txt"),
        );
        assert_eq!(
            args.join(" "),
            "-mm -src bold.nii -dest t1.nii -warp warp.nii in.txt"
        );
    }
}
