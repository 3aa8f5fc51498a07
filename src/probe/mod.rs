//! NVSHMEM discovery.
//!
//! Probing is a chain of [`ProbeStep`]s tried in order:
//!
//! 1. [`ExplicitDirStep`] - the `NVSHMEM_DIR` override
//! 2. [`InterpreterStep`] - ask Python where `nvidia.nvshmem` is installed
//! 3. [`SitePackagesStep`] - scan package roots for `nvidia/nvshmem`
//!
//! The first step to return [`ProbeOutcome::Found`] or
//! [`ProbeOutcome::Invalid`] ends the chain. `NotFound` reasons are
//! collected and reported together as a [`ProbeWarning`] when nothing
//! turns up; NVSHMEM is optional, so that is not an error.

mod steps;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::config::{BuildConfig, ConfigError};
use crate::util::diagnostic::{suggestions, Diagnostic};

pub use steps::{
    find_runtime_library, ExplicitDirStep, InterpreterStep, SitePackagesStep,
    DEVICE_STATIC_LIBRARY, RUNTIME_LIBRARY_PATTERN, UNVERSIONED_RUNTIME_LIBRARY,
};

/// A located NVSHMEM installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceleratorInstall {
    /// Installation root (contains `include/` and `lib/`)
    pub root: PathBuf,

    /// File name of the host runtime shared object, e.g. `libnvshmem_host.so.3`
    pub runtime_library: String,
}

impl AcceleratorInstall {
    pub fn new(root: impl Into<PathBuf>, runtime_library: impl Into<String>) -> Self {
        AcceleratorInstall {
            root: root.into(),
            runtime_library: runtime_library.into(),
        }
    }

    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }
}

/// Outcome of a single probe step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(AcceleratorInstall),
    /// Nothing here; try the next step
    NotFound(String),
    /// Explicitly configured but unusable; fatal
    Invalid { path: PathBuf, reason: String },
}

/// One link in the probe chain.
pub trait ProbeStep {
    /// Short name used in logs and warnings.
    fn name(&self) -> &'static str;

    fn probe(&self) -> ProbeOutcome;
}

/// Non-fatal notice that NVSHMEM could not be located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeWarning {
    /// `(step, reason)` for every step that came up empty
    pub reasons: Vec<(String, String)>,
}

impl fmt::Display for ProbeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NVSHMEM not found, internode and low-latency features are disabled"
        )?;
        for (step, reason) in &self.reasons {
            write!(f, "\n  {}: {}", step, reason)?;
        }
        Ok(())
    }
}

impl ProbeWarning {
    /// Render as a warning diagnostic with the install hint.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diagnostic = Diagnostic::warning(
            "NVSHMEM not found, internode and low-latency features are disabled",
        );
        for (step, reason) in &self.reasons {
            diagnostic = diagnostic.with_context(format!("{}: {}", step, reason));
        }
        diagnostic.with_suggestion(suggestions::INSTALL_NVSHMEM)
    }
}

/// Result of running the probe chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub found: bool,
    pub library_root: Option<PathBuf>,
    pub runtime_library_filename: Option<String>,

    /// Step that located the installation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_by: Option<String>,

    /// Set when nothing was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<ProbeWarning>,
}

impl ProbeResult {
    /// A result reporting NVSHMEM at `root`.
    pub fn found(root: impl Into<PathBuf>, runtime_library: impl Into<String>) -> Self {
        ProbeResult {
            found: true,
            library_root: Some(root.into()),
            runtime_library_filename: Some(runtime_library.into()),
            found_by: None,
            warning: None,
        }
    }

    /// A result reporting no NVSHMEM.
    pub fn not_found() -> Self {
        ProbeResult::default()
    }

    /// The installation, if one was found.
    pub fn install(&self) -> Option<AcceleratorInstall> {
        if !self.found {
            return None;
        }
        let root = self.library_root.clone()?;
        let runtime = self
            .runtime_library_filename
            .clone()
            .unwrap_or_else(|| UNVERSIONED_RUNTIME_LIBRARY.to_string());
        Some(AcceleratorInstall::new(root, runtime))
    }
}

/// The probe chain.
#[derive(Default)]
pub struct Prober {
    steps: Vec<Box<dyn ProbeStep>>,
}

impl Prober {
    /// Create an empty chain. An empty chain always reports not-found.
    pub fn new() -> Self {
        Prober { steps: Vec::new() }
    }

    /// The standard chain for a build configuration.
    pub fn from_config(config: &BuildConfig) -> Self {
        let mut prober = Prober::new().with_step(ExplicitDirStep::new(config.nvshmem_dir.clone()));
        if config.probe.python {
            prober = prober.with_step(InterpreterStep::new());
        }
        prober.with_step(SitePackagesStep::new(config.probe.site_packages.clone()))
    }

    /// Append a step to the chain.
    pub fn with_step(mut self, step: impl ProbeStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Names of the configured steps, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the chain.
    ///
    /// An `Invalid` outcome becomes [`ConfigError::AcceleratorDirNotFound`].
    pub fn probe(&self) -> Result<ProbeResult, ConfigError> {
        let mut reasons = Vec::new();

        for step in &self.steps {
            match step.probe() {
                ProbeOutcome::Found(install) => {
                    tracing::debug!(
                        "{} found NVSHMEM at {} ({})",
                        step.name(),
                        install.root.display(),
                        install.runtime_library
                    );
                    let mut result = ProbeResult::found(install.root, install.runtime_library);
                    result.found_by = Some(step.name().to_string());
                    return Ok(result);
                }
                ProbeOutcome::Invalid { path, reason } => {
                    return Err(ConfigError::AcceleratorDirNotFound { path, reason });
                }
                ProbeOutcome::NotFound(reason) => {
                    tracing::debug!("{}: {}", step.name(), reason);
                    reasons.push((step.name().to_string(), reason));
                }
            }
        }

        let warning = ProbeWarning { reasons };
        tracing::warn!("{}", warning);

        Ok(ProbeResult {
            warning: Some(warning),
            ..ProbeResult::not_found()
        })
    }
}

/// Check whether `path` looks like an NVSHMEM package directory.
pub(crate) fn is_nvshmem_dir(path: &Path) -> bool {
    path.is_dir() && path.join("lib").is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::diagnostic::Severity;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Fixed {
        name: &'static str,
        outcome: ProbeOutcome,
        calls: Rc<Cell<usize>>,
    }

    impl Fixed {
        fn new(name: &'static str, outcome: ProbeOutcome) -> (Self, Rc<Cell<usize>>) {
            let calls = Rc::new(Cell::new(0));
            (
                Fixed {
                    name,
                    outcome,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl ProbeStep for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn probe(&self) -> ProbeOutcome {
            self.calls.set(self.calls.get() + 1);
            self.outcome.clone()
        }
    }

    #[test]
    fn test_empty_chain_not_found() {
        let result = Prober::new().probe().unwrap();
        assert!(!result.found);
        assert!(result.install().is_none());
        assert!(result.warning.unwrap().reasons.is_empty());
    }

    #[test]
    fn test_first_found_wins() {
        let (miss, miss_calls) = Fixed::new("miss", ProbeOutcome::NotFound("nope".into()));
        let (hit, _) = Fixed::new(
            "hit",
            ProbeOutcome::Found(AcceleratorInstall::new("/opt/acc", "libacc.so.3")),
        );
        let (later, later_calls) = Fixed::new(
            "later",
            ProbeOutcome::Found(AcceleratorInstall::new("/elsewhere", "libacc.so.2")),
        );

        let result = Prober::new()
            .with_step(miss)
            .with_step(hit)
            .with_step(later)
            .probe()
            .unwrap();

        assert!(result.found);
        assert_eq!(result.library_root, Some(PathBuf::from("/opt/acc")));
        assert_eq!(result.runtime_library_filename.as_deref(), Some("libacc.so.3"));
        assert_eq!(result.found_by.as_deref(), Some("hit"));
        assert_eq!(miss_calls.get(), 1);
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn test_invalid_is_fatal() {
        let (bad, _) = Fixed::new(
            "explicit",
            ProbeOutcome::Invalid {
                path: PathBuf::from("/missing"),
                reason: "directory does not exist".into(),
            },
        );
        let (hit, hit_calls) = Fixed::new(
            "hit",
            ProbeOutcome::Found(AcceleratorInstall::new("/opt/acc", "libacc.so.3")),
        );

        let err = Prober::new().with_step(bad).with_step(hit).probe().unwrap_err();
        assert!(matches!(err, ConfigError::AcceleratorDirNotFound { .. }));
        assert_eq!(hit_calls.get(), 0);
    }

    #[test]
    fn test_not_found_collects_reasons() {
        let (a, _) = Fixed::new("a", ProbeOutcome::NotFound("not set".into()));
        let (b, _) = Fixed::new("b", ProbeOutcome::NotFound("not installed".into()));

        let result = Prober::new().with_step(a).with_step(b).probe().unwrap();
        let warning = result.warning.unwrap();
        assert_eq!(warning.reasons.len(), 2);
        let text = warning.to_string();
        assert!(text.contains("a: not set"));
        assert!(text.contains("b: not installed"));
    }

    #[test]
    fn test_warning_diagnostic() {
        let warning = ProbeWarning {
            reasons: vec![("NVSHMEM_DIR".into(), "not specified".into())],
        };
        let diagnostic = warning.to_diagnostic();
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert_eq!(diagnostic.context, vec!["NVSHMEM_DIR: not specified"]);
        assert_eq!(diagnostic.suggestions, vec![suggestions::INSTALL_NVSHMEM]);

        let text = diagnostic.format(false);
        assert!(text.starts_with("warning: NVSHMEM not found"));
        assert!(text.contains("  -> NVSHMEM_DIR: not specified"));
    }

    #[test]
    fn test_install_defaults_runtime_library() {
        let mut result = ProbeResult::found("/opt/acc", "libacc.so.3");
        result.runtime_library_filename = None;
        let install = result.install().unwrap();
        assert_eq!(install.runtime_library, UNVERSIONED_RUNTIME_LIBRARY);
        assert_eq!(install.lib_dir(), PathBuf::from("/opt/acc/lib"));
        assert_eq!(install.include_dir(), PathBuf::from("/opt/acc/include"));
    }
}
