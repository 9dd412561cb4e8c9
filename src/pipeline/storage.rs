//! Storage contract and marker output payloads.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::errors::{DataError, PipelineError};
use crate::pipeline::data::Meta;
use crate::pipeline::step::PipelineStep;

/// Shape class of a marker output, which decides how storage lays it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Vector,
    Matrix,
    Timeseries,
    ScalarTable,
}

impl StorageKind {
    pub const ALL: [StorageKind; 4] = [
        Self::Vector,
        Self::Matrix,
        Self::Timeseries,
        Self::ScalarTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Matrix => "matrix",
            Self::Timeseries => "timeseries",
            Self::ScalarTable => "scalar_table",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(StorageKind::as_str).collect();
                DataError::invalid_parameter("storage kind", s, &valid)
            })
    }
}

/// A computed feature.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOutput {
    /// One row of named values.
    Vector {
        data: Array2<f64>,
        col_names: Vec<String>,
    },
    Matrix {
        data: Array2<f64>,
        row_names: Vec<String>,
        col_names: Vec<String>,
    },
    /// Rows are time points.
    Timeseries {
        data: Array2<f64>,
        col_names: Vec<String>,
    },
    ScalarTable {
        data: Array2<f64>,
        row_names: Vec<String>,
        col_names: Vec<String>,
    },
}

impl MarkerOutput {
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Vector { .. } => StorageKind::Vector,
            Self::Matrix { .. } => StorageKind::Matrix,
            Self::Timeseries { .. } => StorageKind::Timeseries,
            Self::ScalarTable { .. } => StorageKind::ScalarTable,
        }
    }

    pub fn data(&self) -> &Array2<f64> {
        match self {
            Self::Vector { data, .. }
            | Self::Matrix { data, .. }
            | Self::Timeseries { data, .. }
            | Self::ScalarTable { data, .. } => data,
        }
    }
}

/// One marker output for one data kind of one element, with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerResult {
    /// Data kind the marker was computed on.
    pub kind: String,
    pub output: MarkerOutput,
    pub meta: Meta,
}

/// Name a feature is stored under: `<data kind>_<marker name>`.
pub fn feature_name(kind: &str, marker: &str) -> String {
    format!("{kind}_{marker}")
}

/// Where marker results end up.
///
/// `store` takes `&self`: implementations synchronize internally.
pub trait Storage: PipelineStep + Send + Sync {
    /// Output kinds this storage can persist.
    fn valid_inputs(&self) -> Vec<StorageKind>;

    /// Fail if any of `input` (storage kind names) cannot be stored.
    fn validate(&self, input: &[String]) -> Result<(), PipelineError> {
        let valid = self.valid_inputs();
        for kind in input {
            let supported = kind
                .parse::<StorageKind>()
                .map(|k| valid.contains(&k))
                .unwrap_or(false);
            if !supported {
                return Err(PipelineError::UnsupportedStorageInput {
                    kind: kind.clone(),
                    valid: valid.iter().map(ToString::to_string).collect(),
                });
            }
        }
        Ok(())
    }

    fn store(&self, feature: &str, result: &MarkerResult) -> Result<(), PipelineError>;

    /// Every stored result of `feature`, across elements.
    fn read(&self, feature: &str) -> Result<Vec<MarkerResult>, PipelineError>;

    /// Names of the stored features, sorted.
    fn list_features(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_storage_kind_names() {
        assert_eq!("scalar_table".parse::<StorageKind>().unwrap(), StorageKind::ScalarTable);
        let err = "hdf5".parse::<StorageKind>().unwrap_err();
        assert!(err.to_string().contains("needs to be one of the following"));
    }

    #[test]
    fn test_output_kind() {
        let output = MarkerOutput::Timeseries {
            data: array![[1.0, 2.0], [3.0, 4.0]],
            col_names: vec!["a".into(), "b".into()],
        };
        assert_eq!(output.kind(), StorageKind::Timeseries);
        assert_eq!(output.data().nrows(), 2);
    }

    #[test]
    fn test_feature_name() {
        assert_eq!(feature_name("BOLD", "fc"), "BOLD_fc");
    }
}
