//! Built-in parcellation families and where their files live.

use std::path::PathBuf;

use crate::data::utils::{check_param, closest_resolution, format_resolution};
use crate::errors::DataError;

const MNI152_NLIN6: &str = "MNI152NLin6Asym";
const MNI152_NLIN2009C: &str = "MNI152NLin2009cAsym";

/// Retrieval strategy of a parcellation entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ParcellationFamily {
    Schaefer { n_rois: u32, yeo_networks: u32 },
    /// Melbourne subcortex atlas.
    Tian { scale: u32, magneticfield: String },
    Suit { space: String },
    Aicha { version: u32 },
    Shen { year: u32, n_rois: u32 },
    Yan {
        n_rois: u32,
        yeo_networks: Option<u32>,
        kong_networks: Option<u32>,
    },
    Brainnetome { threshold: u32 },
    CustomUser { path: PathBuf, labels: Vec<String> },
}

impl ParcellationFamily {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Schaefer { .. } => "Schaefer2018",
            Self::Tian { .. } => "Melbourne",
            Self::Suit { .. } => "SUIT",
            Self::Aicha { .. } => "AICHA",
            Self::Shen { .. } => "Shen",
            Self::Yan { .. } => "Yan2023",
            Self::Brainnetome { .. } => "Brainnetome",
            Self::CustomUser { .. } => "CustomUserParcellation",
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::CustomUser { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParcellationEntry {
    pub family: ParcellationFamily,
    pub space: String,
}

/// How to obtain the label names of a parcellation.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelSource {
    /// Tab separated, name in the second column.
    TabSecondColumn(String),
    /// One name per line.
    OnePerLine(String),
    /// Tab separated with a header row; the named column.
    TsvColumn(String, &'static str),
    /// Comma separated with a header row; the column at this index.
    CsvColumn(String, usize),
    /// Whitespace separated lookup table; name in the last column.
    LastColumn(String),
    /// `1..=count`, each behind `prefix`.
    Generated { count: usize, prefix: &'static str },
}

/// Data repository files of one built-in parcellation at one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcellationFiles {
    pub image: String,
    pub labels: LabelSource,
    pub resolution: f64,
}

fn pick(resolution: Option<f64>, valid: &[f64], family: &str) -> Result<f64, DataError> {
    closest_resolution(resolution, valid).ok_or_else(|| {
        DataError::configuration(format!("No resolutions available for {family}"))
    })
}

/// Resolve a built-in family to its repository files.
pub fn resolve_files(
    family: &ParcellationFamily,
    resolution: Option<f64>,
) -> Result<ParcellationFiles, DataError> {
    match family {
        ParcellationFamily::Schaefer {
            n_rois,
            yeo_networks,
        } => {
            let valid_rois: Vec<u32> = (1..=10).map(|i| i * 100).collect();
            check_param("n_rois", n_rois, &valid_rois)?;
            check_param("yeo_networks", yeo_networks, &[7, 17])?;
            let res = pick(resolution, &[1.0, 2.0], "Schaefer")?;
            let stem = format!("Schaefer2018_{n_rois}Parcels_{yeo_networks}Networks_order");
            Ok(ParcellationFiles {
                image: format!(
                    "parcellations/Schaefer2018/{stem}_FSLMNI152_{}mm.nii.gz",
                    format_resolution(res)
                ),
                labels: LabelSource::TabSecondColumn(format!(
                    "parcellations/Schaefer2018/{stem}.txt"
                )),
                resolution: res,
            })
        }
        ParcellationFamily::Tian {
            scale,
            magneticfield,
        } => {
            check_param("scale", scale, &[1, 2, 3, 4])?;
            check_param(
                "magneticfield",
                magneticfield,
                &["3T".to_string(), "7T".to_string()],
            )?;
            if magneticfield == "7T" {
                let res = pick(resolution, &[1.6], "Melbourne")?;
                Ok(ParcellationFiles {
                    image: format!("parcellations/Melbourne/Tian_Subcortex_S{scale}_7T.nii.gz"),
                    labels: LabelSource::OnePerLine(format!(
                        "parcellations/Melbourne/Tian_Subcortex_S{scale}_7T_label.txt"
                    )),
                    resolution: res,
                })
            } else {
                let res = pick(resolution, &[1.0, 2.0], "Melbourne")?;
                Ok(ParcellationFiles {
                    image: format!(
                        "parcellations/Melbourne/Tian_Subcortex_S{scale}_3T_{}mm.nii.gz",
                        format_resolution(res)
                    ),
                    labels: LabelSource::OnePerLine(format!(
                        "parcellations/Melbourne/Tian_Subcortex_S{scale}_3T_label.txt"
                    )),
                    resolution: res,
                })
            }
        }
        ParcellationFamily::Suit { space } => {
            check_param("space", space, &["SUIT".to_string(), "MNI".to_string()])?;
            let res = pick(resolution, &[1.0], "SUIT")?;
            let stem = format!("SUIT_{space}Space_1mm");
            Ok(ParcellationFiles {
                image: format!("parcellations/SUIT/{stem}.nii"),
                labels: LabelSource::TsvColumn(format!("parcellations/SUIT/{stem}.tsv"), "name"),
                resolution: res,
            })
        }
        ParcellationFamily::Aicha { version } => {
            check_param("version", version, &[1, 2])?;
            let res = pick(resolution, &[1.0], "AICHA")?;
            Ok(ParcellationFiles {
                image: format!("parcellations/AICHA/v{version}/AICHA.nii"),
                labels: LabelSource::TabSecondColumn(format!(
                    "parcellations/AICHA/v{version}/AICHA_vol{version}.txt"
                )),
                resolution: res,
            })
        }
        ParcellationFamily::Shen { year, n_rois } => {
            check_param("year", year, &[2013, 2015, 2019])?;
            match year {
                2013 => {
                    check_param("n_rois", n_rois, &[50, 100, 150])?;
                    let res = pick(resolution, &[1.0, 2.0], "Shen")?;
                    Ok(ParcellationFiles {
                        image: format!(
                            "parcellations/Shen/2013/fconn_atlas_{n_rois}_{}mm.nii",
                            format_resolution(res)
                        ),
                        labels: LabelSource::Generated {
                            count: *n_rois as usize,
                            prefix: "",
                        },
                        resolution: res,
                    })
                }
                2015 => {
                    check_param("n_rois", n_rois, &[268])?;
                    let res = pick(resolution, &[1.0, 2.0], "Shen")?;
                    Ok(ParcellationFiles {
                        image: format!(
                            "parcellations/Shen/2015/shen_{}mm_268_parcellation.nii.gz",
                            format_resolution(res)
                        ),
                        labels: LabelSource::Generated {
                            count: 268,
                            prefix: "",
                        },
                        resolution: res,
                    })
                }
                _ => {
                    check_param("n_rois", n_rois, &[368])?;
                    let res = pick(resolution, &[1.0], "Shen")?;
                    Ok(ParcellationFiles {
                        image: "parcellations/Shen/2019/Shen_1mm_368_parcellation.nii.gz".into(),
                        labels: LabelSource::CsvColumn(
                            "parcellations/Shen/2019/Shen_368_labels.csv".into(),
                            1,
                        ),
                        resolution: res,
                    })
                }
            }
        }
        ParcellationFamily::Yan {
            n_rois,
            yeo_networks,
            kong_networks,
        } => {
            let valid_rois: Vec<u32> = (1..=10).map(|i| i * 100).collect();
            check_param("n_rois", n_rois, &valid_rois)?;
            let res = pick(resolution, &[1.0, 2.0], "Yan2023")?;
            let stem = match (yeo_networks, kong_networks) {
                (Some(yeo), None) => {
                    check_param("yeo_networks", yeo, &[7, 17])?;
                    format!("{n_rois}Parcels_Yeo2011_{yeo}Networks")
                }
                (None, Some(kong)) => {
                    check_param("kong_networks", kong, &[17])?;
                    format!("{n_rois}Parcels_Kong2022_{kong}Networks")
                }
                (Some(_), Some(_)) => {
                    return Err(DataError::configuration(
                        "Either one of `yeo_networks` or `kong_networks` need to be specified, not both.",
                    ))
                }
                (None, None) => {
                    return Err(DataError::configuration(
                        "Either one of `yeo_networks` or `kong_networks` need to be specified.",
                    ))
                }
            };
            Ok(ParcellationFiles {
                image: format!(
                    "parcellations/Yan2023/{stem}_FSLMNI152_{}mm.nii.gz",
                    format_resolution(res)
                ),
                labels: LabelSource::LastColumn(format!("parcellations/Yan2023/{stem}_LUT.txt")),
                resolution: res,
            })
        }
        ParcellationFamily::Brainnetome { threshold } => {
            check_param("threshold", threshold, &[0, 25, 50])?;
            let res = pick(resolution, &[1.0, 2.0], "Brainnetome")?;
            Ok(ParcellationFiles {
                image: format!(
                    "parcellations/Brainnetome/BNA-maxprob-thr{threshold}-{}mm.nii.gz",
                    format_resolution(res)
                ),
                labels: LabelSource::OnePerLine(
                    "parcellations/Brainnetome/BNA_labels.txt".into(),
                ),
                resolution: res,
            })
        }
        ParcellationFamily::CustomUser { .. } => Err(DataError::configuration(
            "Custom parcellations are loaded from their registered path",
        )),
    }
}

/// The built-in catalog as `(name, entry)` pairs.
pub fn builtin_entries() -> Vec<(String, ParcellationEntry)> {
    let mut entries = Vec::new();
    let mut push = |name: String, family: ParcellationFamily, space: &str| {
        entries.push((
            name,
            ParcellationEntry {
                family,
                space: space.to_string(),
            },
        ));
    };

    for n_rois in (1..=10).map(|i| i * 100) {
        for yeo_networks in [7, 17] {
            push(
                format!("Schaefer{n_rois}x{yeo_networks}"),
                ParcellationFamily::Schaefer {
                    n_rois,
                    yeo_networks,
                },
                MNI152_NLIN6,
            );
        }
    }
    for scale in 1..=4 {
        push(
            format!("TianxS{scale}x3TxMNI6thgeneration"),
            ParcellationFamily::Tian {
                scale,
                magneticfield: "3T".into(),
            },
            MNI152_NLIN6,
        );
        push(
            format!("TianxS{scale}x7TxMNInonlinear2009cAsym"),
            ParcellationFamily::Tian {
                scale,
                magneticfield: "7T".into(),
            },
            MNI152_NLIN2009C,
        );
    }
    push(
        "SUITxSUIT".into(),
        ParcellationFamily::Suit {
            space: "SUIT".into(),
        },
        "SUIT",
    );
    push(
        "SUITxMNI".into(),
        ParcellationFamily::Suit {
            space: "MNI".into(),
        },
        MNI152_NLIN6,
    );
    for version in [1, 2] {
        push(
            format!("AICHA_v{version}"),
            ParcellationFamily::Aicha { version },
            "IXI549Space",
        );
    }
    for n_rois in [50, 100, 150] {
        push(
            format!("Shen_2013_{n_rois}"),
            ParcellationFamily::Shen { year: 2013, n_rois },
            MNI152_NLIN2009C,
        );
    }
    push(
        "Shen_2015_268".into(),
        ParcellationFamily::Shen {
            year: 2015,
            n_rois: 268,
        },
        MNI152_NLIN2009C,
    );
    push(
        "Shen_2019_368".into(),
        ParcellationFamily::Shen {
            year: 2019,
            n_rois: 368,
        },
        MNI152_NLIN2009C,
    );
    for n_rois in (1..=10).map(|i| i * 100) {
        for yeo in [7, 17] {
            push(
                format!("Yan{n_rois}xYeo{yeo}"),
                ParcellationFamily::Yan {
                    n_rois,
                    yeo_networks: Some(yeo),
                    kong_networks: None,
                },
                MNI152_NLIN6,
            );
        }
        push(
            format!("Yan{n_rois}xKong17"),
            ParcellationFamily::Yan {
                n_rois,
                yeo_networks: None,
                kong_networks: Some(17),
            },
            MNI152_NLIN6,
        );
    }
    for threshold in [0, 25, 50] {
        push(
            format!("Brainnetome_thr{threshold}"),
            ParcellationFamily::Brainnetome { threshold },
            MNI152_NLIN6,
        );
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_size_and_names() {
        let entries = builtin_entries();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"Schaefer100x7"));
        assert!(names.contains(&"TianxS2x7TxMNInonlinear2009cAsym"));
        assert!(names.contains(&"Yan300xKong17"));
        assert!(names.contains(&"Brainnetome_thr25"));
        // 20 Schaefer + 8 Tian + 2 SUIT + 2 AICHA + 5 Shen + 30 Yan + 3 Brainnetome
        assert_eq!(entries.len(), 70);
    }

    #[test]
    fn test_family_tags() {
        let entries = builtin_entries();
        let tag = |name: &str| {
            entries
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, e)| e.family.tag())
        };
        assert_eq!(tag("Schaefer100x7"), Some("Schaefer2018"));
        assert_eq!(tag("Brainnetome_thr25"), Some("Brainnetome"));
        let custom = ParcellationFamily::CustomUser {
            path: PathBuf::from("/p.nii"),
            labels: vec![],
        };
        assert_eq!(custom.tag(), "CustomUserParcellation");
        assert!(custom.is_custom());
    }

    #[test]
    fn test_schaefer_files_use_closest_resolution() {
        let files = resolve_files(
            &ParcellationFamily::Schaefer {
                n_rois: 100,
                yeo_networks: 7,
            },
            Some(3.0),
        )
        .unwrap();
        assert_eq!(files.resolution, 2.0);
        assert_eq!(
            files.image,
            "parcellations/Schaefer2018/Schaefer2018_100Parcels_7Networks_order_FSLMNI152_2mm.nii.gz"
        );
    }

    #[test]
    fn test_invalid_family_params() {
        let err = resolve_files(
            &ParcellationFamily::Schaefer {
                n_rois: 150,
                yeo_networks: 7,
            },
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("`n_rois` (150)"));

        let err = resolve_files(
            &ParcellationFamily::Yan {
                n_rois: 100,
                yeo_networks: Some(7),
                kong_networks: Some(17),
            },
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_tian_7t_has_single_resolution() {
        let files = resolve_files(
            &ParcellationFamily::Tian {
                scale: 3,
                magneticfield: "7T".into(),
            },
            Some(1.0),
        )
        .unwrap();
        assert_eq!(files.resolution, 1.6);
    }
}
