//! The external build step.
//!
//! The pipeline only cares whether the build succeeded and where its output
//! is; the build itself is opaque.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::DeployError;

/// Produces a build output directory.
#[async_trait]
pub trait BuildStep: Send + Sync {
    /// Short description for logs and the report.
    fn describe(&self) -> String;

    /// Run the build and return the output directory.
    async fn run(&self) -> Result<PathBuf, DeployError>;

    /// Output directory of an earlier build, without building again.
    fn existing_output(&self) -> Result<PathBuf, DeployError>;
}

/// Runs a shell command (`sh -c`) and expects `output_dir` afterwards.
#[derive(Debug, Clone)]
pub struct CommandBuild {
    command: String,
    working_dir: PathBuf,
    output_dir: PathBuf,
}

impl CommandBuild {
    /// # Arguments
    /// * `command` - Shell command line, e.g. `npm run build`
    /// * `output_dir` - Build output directory; relative paths resolve
    ///   against the working directory
    pub fn new(command: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: PathBuf::from("."),
            output_dir: output_dir.into(),
        }
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    fn resolved_output(&self) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            self.working_dir.join(&self.output_dir)
        }
    }
}

#[async_trait]
impl BuildStep for CommandBuild {
    fn describe(&self) -> String {
        format!("`{}`", self.command)
    }

    async fn run(&self) -> Result<PathBuf, DeployError> {
        tracing::info!(command = %self.command, dir = %self.working_dir.display(), "Running build");

        let status: ExitStatus = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| DeployError::Build {
                message: format!("could not start `{}`: {}", self.command, e),
            })?;

        if !status.success() {
            let code: String = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(DeployError::Build {
                message: format!("`{}` exited with {}", self.command, code),
            });
        }

        self.existing_output()
    }

    fn existing_output(&self) -> Result<PathBuf, DeployError> {
        existing_dir(&self.resolved_output())
    }
}

/// Uses an output directory produced earlier, outside this tool.
#[derive(Debug, Clone)]
pub struct ExistingOutput {
    output_dir: PathBuf,
}

impl ExistingOutput {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl BuildStep for ExistingOutput {
    fn describe(&self) -> String {
        format!("existing output {}", self.output_dir.display())
    }

    async fn run(&self) -> Result<PathBuf, DeployError> {
        self.existing_output()
    }

    fn existing_output(&self) -> Result<PathBuf, DeployError> {
        existing_dir(&self.output_dir)
    }
}

fn existing_dir(path: &Path) -> Result<PathBuf, DeployError> {
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(DeployError::Build {
            message: format!("output directory {} does not exist", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_existing_output() {
        let dir = tempdir().unwrap();
        let step = ExistingOutput::new(dir.path());
        assert_eq!(step.run().await.unwrap(), dir.path());

        let missing = ExistingOutput::new(dir.path().join("nope"));
        assert!(matches!(missing.run().await, Err(DeployError::Build { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_build_creates_output() {
        let dir = tempdir().unwrap();
        let step = CommandBuild::new("mkdir -p out && echo hi > out/index.html", "out")
            .with_working_dir(dir.path());

        let output = step.run().await.unwrap();
        assert_eq!(output, dir.path().join("out"));
        assert!(output.join("index.html").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_build_failure() {
        let dir = tempdir().unwrap();
        let step = CommandBuild::new("exit 3", "out").with_working_dir(dir.path());

        let err = step.run().await.unwrap_err();
        assert!(err.to_string().contains("exited with 3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_build_existing_output_does_not_run_command() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let step = CommandBuild::new("touch BUILD_RAN", "out").with_working_dir(dir.path());

        assert_eq!(step.existing_output().unwrap(), dir.path().join("out"));
        assert!(!dir.path().join("BUILD_RAN").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_build_without_output() {
        let dir = tempdir().unwrap();
        let step = CommandBuild::new("true", "out").with_working_dir(dir.path());
        assert!(matches!(step.run().await, Err(DeployError::Build { .. })));
    }
}
