//! Hand-off to the external toolchain.
//!
//! kernelplan does not compile anything itself. An invoker receives the
//! validated plan and drives whatever actually builds the extension.

use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::builder::plan::BuildPlan;
use crate::util::process::ProcessBuilder;

/// Failure of the external build program.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ExternalToolError {
    #[error("failed to run `{command}`: {message}")]
    #[diagnostic(code(kernelplan::invoke::spawn))]
    Spawn { command: String, message: String },

    #[error("`{command}` exited with {status}")]
    #[diagnostic(code(kernelplan::invoke::failed))]
    Failed { command: String, status: String },

    #[error("failed to serialize build plan: {0}")]
    #[diagnostic(code(kernelplan::invoke::serialize))]
    Serialize(#[from] serde_json::Error),
}

/// Something that can execute a build plan.
pub trait ToolchainInvoker {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Build the plan.
    fn invoke(&self, plan: &BuildPlan) -> Result<(), ExternalToolError>;
}

/// Runs an external program with the plan JSON on stdin.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandInvoker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandInvoker {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program from this directory (usually the project root).
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn process(&self) -> ProcessBuilder {
        let mut process = ProcessBuilder::new(&self.program).args(&self.args);
        if let Some(cwd) = &self.cwd {
            process = process.cwd(cwd);
        }
        process
    }
}

impl ToolchainInvoker for CommandInvoker {
    fn describe(&self) -> String {
        self.process().display_command()
    }

    /// The program's stdout and stderr go straight to ours, so compiler
    /// progress and warnings stay visible.
    fn invoke(&self, plan: &BuildPlan) -> Result<(), ExternalToolError> {
        let json = plan.to_json()?;
        let process = self.process().stdin(json);
        let command = process.display_command();

        tracing::info!("invoking `{}`", command);

        let status = process.status().map_err(|e| ExternalToolError::Spawn {
            command: command.clone(),
            message: format!("{:#}", e),
        })?;

        if !status.success() {
            return Err(ExternalToolError::Failed {
                command,
                status: status.to_string(),
            });
        }

        Ok(())
    }
}
