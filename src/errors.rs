//! Error types for junifer operations.
//!
//! Every subsystem owns one error enum so callers can tell failure kinds apart
//! without string matching:
//!
//! - [`WorkDirError`]: scratch directory creation/removal
//! - [`RegistryError`]: pipeline component lookup and construction
//! - [`DataError`]: spatial data registries, warpers and the data object
//! - [`ExternalToolError`]: non-zero exits of AFNI/FSL/ANTs binaries
//! - [`PipelineError`]: marker collection validation and fitting
//!
//! [`JuniferError`] wraps all of them for callers that do not care which
//! subsystem failed.
//!
//! # Example
//!
//! ```rust
//! use junifer::errors::{DataError, JuniferError};
//!
//! let err: JuniferError = DataError::configuration("Parcellation: Foo not found.").into();
//! assert_eq!(err.category(), "Data");
//! assert!(err.is_configuration());
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the working directory manager.
///
/// Removal of a directory that does not exist is never an error.
#[derive(Debug, Error)]
pub enum WorkDirError {
    /// A directory could not be created.
    #[error("Failed to create directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be removed.
    #[error("Failed to remove directory {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkDirError {
    pub fn create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Create {
            path: path.into(),
            source,
        }
    }

    pub fn remove(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Remove {
            path: path.into(),
            source,
        }
    }
}

/// A non-zero exit (or failed spawn) of an external neuroimaging binary.
#[derive(Debug, Error)]
pub enum ExternalToolError {
    /// The tool ran and exited with a non-zero status.
    #[error("{name} failed with the following error:\n{output}")]
    Failed {
        name: String,
        status: Option<i32>,
        output: String,
    },

    /// The tool could not be started at all.
    #[error("{name} could not be started: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExternalToolError {
    /// Name of the tool that failed.
    pub fn tool(&self) -> &str {
        match self {
            Self::Failed { name, .. } | Self::Spawn { name, .. } => name,
        }
    }
}

/// Pipeline component registry failures.
///
/// The four variants are the four failure kinds callers must be able to
/// distinguish: unknown step, unknown name, wrong base class, and a
/// constructor that raised.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid step: {step}. Valid steps are: {valid:?}")]
    InvalidStep {
        step: String,
        valid: Vec<&'static str>,
    },

    #[error("Invalid name: {name} is not registered under step {step}. Valid names are: {valid:?}")]
    InvalidName {
        step: String,
        name: String,
        valid: Vec<String>,
    },

    #[error("Invalid {step} ({name}): must be an instance of {expected}, got {actual}")]
    WrongBaseClass {
        step: String,
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to create {step} ({name}). Error: {message}")]
    Construction {
        step: String,
        name: String,
        message: String,
    },
}

/// Failures of the spatial data registries, warpers and data object accessors.
#[derive(Debug, Error)]
pub enum DataError {
    /// Invalid names, parameters or overwrite attempts.
    #[error("{0}")]
    Configuration(String),

    /// Native-space operations without the `Warp`/reference data they need.
    #[error("{0}")]
    MissingPrerequisite(String),

    /// Mismatched label/row counts and similar shape violations.
    #[error("{0}")]
    Shape(String),

    #[error(transparent)]
    ExternalTool(#[from] ExternalToolError),

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to handle image {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error(transparent)]
    WorkDir(#[from] WorkDirError),
}

impl DataError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn missing_prerequisite(message: impl Into<String>) -> Self {
        Self::MissingPrerequisite(message.into())
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn image(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Image {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// "The parameter `name` (value) needs to be one of the following: [...]"
    pub fn invalid_parameter<V, T>(name: &str, value: V, valid: &[T]) -> Self
    where
        V: std::fmt::Display,
        T: std::fmt::Debug,
    {
        Self::Configuration(format!(
            "The parameter `{name}` ({value}) needs to be one of the following: {valid:?}"
        ))
    }
}

/// Marker collection and pipeline step failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Markers must have different names. Current names are: {rendered}")]
    DuplicateMarkerNames {
        counts: Vec<(String, usize)>,
        rendered: String,
    },

    #[error(
        "Input does not have the required data.\n\t Step: {step}\n\t Input: {available:?}\n\t Required (any of): {required:?}"
    )]
    MissingInput {
        step: String,
        available: Vec<String>,
        required: Vec<String>,
    },

    #[error("{class} requires the following external dependency: {dependency}")]
    MissingExtDependency { class: String, dependency: String },

    #[error("Storage cannot store {kind}. Valid inputs are: {valid:?}")]
    UnsupportedStorageInput { kind: String, valid: Vec<String> },

    #[error("Validation of {step} failed: {source}")]
    Validation {
        step: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("{step} failed: {source}")]
    Compute {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    WorkDir(#[from] WorkDirError),
}

impl PipelineError {
    /// Build the duplicate-name error from `(name, count)` pairs.
    pub fn duplicate_marker_names(counts: Vec<(String, usize)>) -> Self {
        let rendered = counts
            .iter()
            .map(|(name, count)| format!("'{name}': {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        Self::DuplicateMarkerNames {
            counts,
            rendered: format!("{{{rendered}}}"),
        }
    }

    pub fn missing_input(step: impl Into<String>, available: &[String], required: &[String]) -> Self {
        Self::MissingInput {
            step: step.into(),
            available: available.to_vec(),
            required: required.to_vec(),
        }
    }

    pub fn compute(step: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Compute {
            step: step.into(),
            source: source.into(),
        }
    }

    /// Tag this error with the step whose validation produced it.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::Validation {
            step: step.into(),
            source: Box::new(self),
        }
    }
}

/// Umbrella error for callers that span subsystems.
#[derive(Debug, Error)]
pub enum JuniferError {
    #[error(transparent)]
    WorkDir(#[from] WorkDirError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    ExternalTool(#[from] ExternalToolError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl JuniferError {
    /// Get the error category name.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::WorkDir(_) => "WorkDir",
            Self::Registry(_) => "Registry",
            Self::Data(_) => "Data",
            Self::ExternalTool(_) => "ExternalTool",
            Self::Pipeline(_) => "Pipeline",
        }
    }

    /// Check if this error stems from user configuration rather than the
    /// environment (filesystem, external tools, network).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Registry(_) => true,
            Self::Data(err) => matches!(
                err,
                DataError::Configuration(_) | DataError::MissingPrerequisite(_) | DataError::Shape(_)
            ),
            Self::Pipeline(err) => matches!(
                err,
                PipelineError::DuplicateMarkerNames { .. }
                    | PipelineError::MissingInput { .. }
                    | PipelineError::MissingExtDependency { .. }
                    | PipelineError::UnsupportedStorageInput { .. }
                    | PipelineError::Validation { .. }
            ),
            Self::WorkDir(_) | Self::ExternalTool(_) => false,
        }
    }
}

/// Result type alias using the umbrella error type
pub type Result<T> = std::result::Result<T, JuniferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_message() {
        let err = DataError::invalid_parameter("n_rois", 150, &[100, 200]);
        assert_eq!(
            err.to_string(),
            "The parameter `n_rois` (150) needs to be one of the following: [100, 200]"
        );
    }

    #[test]
    fn test_duplicate_marker_names_rendering() {
        let err = PipelineError::duplicate_marker_names(vec![("x".to_string(), 2)]);
        let msg = err.to_string();
        assert!(msg.contains("'x': 2"), "unexpected message: {msg}");
    }

    #[test]
    fn test_missing_input_names_step() {
        let err = PipelineError::missing_input(
            "Marker fc",
            &["T1w".to_string()],
            &["BOLD".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("Marker fc"));
        assert!(msg.contains("T1w"));
        assert!(msg.contains("BOLD"));
    }

    #[test]
    fn test_external_tool_error_is_not_configuration() {
        let err: JuniferError = ExternalToolError::Failed {
            name: "applywarp".into(),
            status: Some(1),
            output: "boom".into(),
        }
        .into();
        assert_eq!(err.category(), "ExternalTool");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_validation_wraps_source() {
        let inner = PipelineError::missing_input("Marker a", &[], &["BOLD".to_string()]);
        let err = inner.in_step("Marker: a");
        assert!(err.to_string().starts_with("Validation of Marker: a failed"));
    }
}
