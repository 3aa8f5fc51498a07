//! Invariant violations and their diagnostics.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// An unresolvable inconsistency between feature flags, or between the
/// resolved flags and an assembled plan.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum InvariantViolation {
    #[error("NVSHMEM was force-enabled but no NVSHMEM installation was found")]
    #[diagnostic(code(kernelplan::resolve::accelerator_unavailable))]
    AcceleratorUnavailable,

    #[error("NVSHMEM was force-enabled but hardware profile `{profile}` rules it out")]
    #[diagnostic(code(kernelplan::resolve::hardware_profile_conflict))]
    HardwareProfileConflict { profile: String },

    #[error("NVSHMEM kernels require the SM90 architecture generation")]
    #[diagnostic(code(kernelplan::resolve::accelerator_requires_current))]
    AcceleratorRequiresCurrent,

    #[error("aggressive PTX instructions require the SM90 architecture generation")]
    #[diagnostic(code(kernelplan::resolve::aggressive_requires_current))]
    AggressiveRequiresCurrent,

    #[error("aggressive PTX instructions require the architecture list `9.0`, got `{arch}`")]
    #[diagnostic(code(kernelplan::resolve::aggressive_requires_default_arch))]
    AggressiveRequiresDefaultArch { arch: String },

    #[error("plan {what} `{item}` does not match NVSHMEM enabled = {enabled}")]
    #[diagnostic(code(kernelplan::validate::accelerator_mismatch))]
    AcceleratorMismatch {
        what: &'static str,
        item: String,
        enabled: bool,
    },

    #[error("plan {stage} flags define `{name}` {count} times, expected exactly once")]
    #[diagnostic(code(kernelplan::validate::definition_count))]
    DefinitionCount {
        stage: &'static str,
        name: &'static str,
        count: usize,
    },

    #[error("plan {stage} flags {} `-D{name}`", presence(.present))]
    #[diagnostic(code(kernelplan::validate::definition_presence))]
    DefinitionPresence {
        stage: &'static str,
        name: &'static str,
        present: bool,
    },

    #[error("plan {stage} flags define `{name}={found}`, expected `{name}={expected}`")]
    #[diagnostic(code(kernelplan::validate::definition_value))]
    DefinitionValue {
        stage: &'static str,
        name: &'static str,
        expected: String,
        found: String,
    },

    #[error("plan sources are inconsistent: {reason}")]
    #[diagnostic(code(kernelplan::validate::sources))]
    Sources { reason: String },

    #[error("plan carries flags that differ from the resolved flags")]
    #[diagnostic(code(kernelplan::validate::flags_mismatch))]
    FlagsMismatch,

    #[error("plan has an empty architecture descriptor")]
    #[diagnostic(code(kernelplan::validate::empty_arch))]
    EmptyArch,

    #[error("{} plan invariants violated", .0.len())]
    #[diagnostic(code(kernelplan::validate::multiple))]
    Multiple(Vec<InvariantViolation>),
}

fn presence(present: &bool) -> &'static str {
    if *present {
        "unexpectedly define"
    } else {
        "are missing"
    }
}

impl InvariantViolation {
    /// Collapse a list of violations into one error.
    ///
    /// Returns `None` for an empty list.
    pub fn collect(mut errors: Vec<InvariantViolation>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(InvariantViolation::Multiple(errors)),
        }
    }

    /// Short name of the violated invariant.
    pub fn invariant(&self) -> &'static str {
        match self {
            InvariantViolation::AcceleratorUnavailable => "nvshmem-requires-install",
            InvariantViolation::HardwareProfileConflict { .. } => "nvshmem-hardware-profile",
            InvariantViolation::AcceleratorRequiresCurrent => "nvshmem-requires-sm90",
            InvariantViolation::AggressiveRequiresCurrent => "aggressive-ptx-requires-sm90",
            InvariantViolation::AggressiveRequiresDefaultArch { .. } => {
                "aggressive-ptx-requires-arch-9.0"
            }
            InvariantViolation::AcceleratorMismatch { .. } => "nvshmem-plan-consistency",
            InvariantViolation::DefinitionCount { .. }
            | InvariantViolation::DefinitionPresence { .. }
            | InvariantViolation::DefinitionValue { .. } => "definitions-mirror-flags",
            InvariantViolation::Sources { .. } => "source-units",
            InvariantViolation::FlagsMismatch => "plan-flags",
            InvariantViolation::EmptyArch => "arch-descriptor",
            InvariantViolation::Multiple(_) => "multiple",
        }
    }

    /// All individual violations, flattening `Multiple`.
    pub fn violations(&self) -> Vec<&InvariantViolation> {
        match self {
            InvariantViolation::Multiple(errors) => {
                errors.iter().flat_map(|e| e.violations()).collect()
            }
            e => vec![e],
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string());

        for violation in self.violations() {
            if matches!(self, InvariantViolation::Multiple(_)) {
                diag = diag.with_context(format!("[{}] {}", violation.invariant(), violation));
            } else {
                diag = diag.with_context(format!("invariant: {}", violation.invariant()));
            }
        }

        match self {
            InvariantViolation::AcceleratorUnavailable => diag
                .with_suggestion("Set NVSHMEM_DIR to an NVSHMEM installation")
                .with_suggestion("Install the `nvidia-nvshmem` Python package")
                .with_suggestion("Drop DISABLE_NVSHMEM=0 to fall back to a build without NVSHMEM"),
            InvariantViolation::HardwareProfileConflict { .. } => diag
                .with_suggestion("Drop the hardware profile, or stop forcing NVSHMEM on"),
            InvariantViolation::AcceleratorRequiresCurrent => diag
                .with_suggestion("Unset DISABLE_SM90_FEATURES to target SM90")
                .with_suggestion("Set DISABLE_NVSHMEM=1 to build without NVSHMEM"),
            InvariantViolation::AggressiveRequiresCurrent
            | InvariantViolation::AggressiveRequiresDefaultArch { .. } => diag
                .with_suggestion("Set DISABLE_AGGRESSIVE_PTX_INSTRS=1")
                .with_suggestion("Target TORCH_CUDA_ARCH_LIST=9.0 on SM90"),
            _ => diag
                .with_suggestion(suggestions::PLAN_INVALID)
                .with_suggestion("This is a bug in the plan assembler; please report it"),
        }
    }
}
