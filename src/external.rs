//! Execution of external neuroimaging tools (ANTs, FSL, AFNI).

use std::process::{Command, Stdio};

use tracing::info;

use crate::errors::ExternalToolError;

/// Runs an external binary and captures its output.
///
/// Implementations must fail on a non-zero exit with the tool's captured
/// output and must succeed on exit code 0.
pub trait CommandRunner: Send + Sync {
    /// Run `name` with `args`, returning the captured stdout.
    fn run(&self, name: &str, args: &[String]) -> Result<String, ExternalToolError>;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, name: &str, args: &[String]) -> Result<String, ExternalToolError> {
        info!("{} command to be executed:\n{} {}", name, name, args.join(" "));

        let output = Command::new(name)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExternalToolError::Spawn {
                name: name.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let mut captured = stdout;
            captured.push_str(&stderr);
            return Err(ExternalToolError::Failed {
                name: name.to_string(),
                status: output.status.code(),
                output: captured,
            });
        }

        info!("{} command succeeded with the following output:\n{}", name, stdout);
        Ok(stdout)
    }
}

/// An external binary a pipeline step needs, with the commands it provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtDependency {
    /// Package name as users know it (`fsl`, `ants`, `afni`).
    pub name: String,
    /// Executables that must be on `PATH`; empty means the package name itself.
    pub commands: Vec<String>,
}

impl ExtDependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }
}

/// Return the first of `dependency`'s commands that is not on `PATH`.
pub fn check_ext_dependencies(dependency: &ExtDependency) -> Option<String> {
    let commands: Vec<&str> = if dependency.commands.is_empty() {
        vec![dependency.name.as_str()]
    } else {
        dependency.commands.iter().map(String::as_str).collect()
    };

    commands
        .into_iter()
        .find(|command| which::which(command).is_err())
        .map(|command| {
            if command == dependency.name {
                command.to_string()
            } else {
                format!("{} ({})", dependency.name, command)
            }
        })
}
