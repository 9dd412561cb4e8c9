//! Point warps with `antsApplyTransformsToPoints`.
//!
//! ANTs works in LPS while coordinates are stored in RAS, so x and y are
//! flipped on the way in and out. Points are mapped with the inverse of a
//! transform, which is why template point warps use the `dst` to `src` file.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use ndarray::Array2;
use tracing::debug;

use crate::data::env::DataEnv;
use crate::data::warp::file_safe;
use crate::errors::DataError;

pub const ANTS_APPLY_POINTS: &str = "antsApplyTransformsToPoints";

pub(crate) fn points_to_lps_csv(points: &Array2<f64>) -> String {
    let mut csv = String::from("x,y,z\n");
    for row in points.rows() {
        let _ = writeln!(csv, "{},{},{}", -row[0], -row[1], row[2]);
    }
    csv
}

pub(crate) fn points_from_lps_csv(path: &Path, contents: &str) -> Result<Array2<f64>, DataError> {
    let mut values = Vec::new();
    let mut rows = 0;
    for line in contents.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            return Err(DataError::shape(format!(
                "Expected at least 3 columns in {}, got: {line}",
                path.display()
            )));
        }
        for (axis, field) in fields.iter().take(3).enumerate() {
            let value: f64 = field.parse().map_err(|_| {
                DataError::shape(format!("Invalid coordinate `{field}` in {}", path.display()))
            })?;
            values.push(if axis < 2 { -value } else { value });
        }
        rows += 1;
    }
    Array2::from_shape_vec((rows, 3), values)
        .map_err(|e| DataError::shape(format!("Invalid coordinates in {}: {e}", path.display())))
}

pub fn ants_points_args(input: &Path, output: &Path, transform: &Path) -> Vec<String> {
    vec![
        "-d".into(),
        "3".into(),
        "-p".into(),
        "1".into(),
        "-f".into(),
        "0".into(),
        "-i".into(),
        input.display().to_string(),
        "-o".into(),
        output.display().to_string(),
        "-t".into(),
        transform.display().to_string(),
    ]
}

/// Map `points` through `transform`.
pub fn warp_points(
    env: &DataEnv,
    name: &str,
    points: &Array2<f64>,
    transform: &Path,
) -> Result<Array2<f64>, DataError> {
    let name = file_safe(name);
    let tempdir = env.call_tempdir(&format!("ants_coordinates_warper_{name}"))?;
    let result = (|| -> Result<Array2<f64>, DataError> {
        let input = tempdir.join(format!("{name}_lps.csv"));
        fs::write(&input, points_to_lps_csv(points)).map_err(|e| DataError::io(&input, e))?;
        let output = tempdir.join(format!("{name}_warped_lps.csv"));
        env.runner
            .run(ANTS_APPLY_POINTS, &ants_points_args(&input, &output, transform))?;
        let contents = fs::read_to_string(&output).map_err(|e| DataError::io(&output, e))?;
        points_from_lps_csv(&output, &contents)
    })();
    env.release_tempdir(&tempdir)?;
    result
}

/// Map `points` from template space `src` to template space `dst`.
pub fn warp_points_to_template(
    env: &DataEnv,
    name: &str,
    points: &Array2<f64>,
    src: &str,
    dst: &str,
) -> Result<Array2<f64>, DataError> {
    debug!("Warping coordinates {} from {} to {} with ANTs", name, src, dst);
    let transform = env.xfms.get_xfm(dst, src)?;
    warp_points(env, name, points, &transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_lps_flip_is_undone_on_read() {
        let points = array![[10.0, -20.0, 30.0], [1.5, 2.5, -3.5]];
        let csv = points_to_lps_csv(&points);
        assert!(csv.starts_with("x,y,z\n-10,20,30\n"));
        let back = points_from_lps_csv(Path::new("p.csv"), &csv).unwrap();
        assert_eq!(back, points);
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let csv = "x,y,z,t\n1,2,3,0\n";
        let points = points_from_lps_csv(Path::new("p.csv"), csv).unwrap();
        assert_eq!(points, array![[-1.0, -2.0, 3.0]]);
    }

    #[test]
    fn test_malformed_rows_are_shape_errors() {
        let err = points_from_lps_csv(Path::new("p.csv"), "x,y,z\n1,2\n").unwrap_err();
        assert!(matches!(err, DataError::Shape(_)));
    }
}
