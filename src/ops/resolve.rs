//! End-to-end plan resolution.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::builder::plan::{BuildPlan, PlanInputs};
use crate::builder::validate::validate;
use crate::core::features::FeatureFlags;
use crate::probe::{ProbeResult, Prober};
use crate::resolver::{resolve_features, InvariantViolation};
use crate::util::config::{BuildConfig, ConfigError};
use crate::util::diagnostic::Diagnostic;

/// Any failure of the probe/resolve/assemble/validate pipeline.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum PlanError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl PlanError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            PlanError::Config(e) => e.to_diagnostic(),
            PlanError::Invariant(e) => e.to_diagnostic(),
        }
    }
}

/// Everything produced by one resolution run.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub probe: ProbeResult,
    pub flags: FeatureFlags,
    pub plan: BuildPlan,
}

/// Probe, resolve, assemble and validate.
pub fn resolve_plan(
    config: &BuildConfig,
    prober: &Prober,
    revision: &str,
) -> Result<Resolution, PlanError> {
    let probe = prober.probe()?;
    let flags = resolve_features(&probe, &config.overrides)?;

    let install = if flags.accelerator_enabled {
        probe.install()
    } else {
        None
    };
    let inputs = PlanInputs {
        accelerator: install.as_ref(),
        arch_list: config.overrides.arch_list.as_ref(),
    };
    let plan = BuildPlan::assemble(&flags, &inputs)?.with_revision(revision);
    validate(&plan, &flags)?;

    tracing::debug!(
        "plan for `{}`: {} sources, fingerprint {}",
        plan.extension,
        plan.sources.len(),
        plan.fingerprint()
    );

    Ok(Resolution { probe, flags, plan })
}
