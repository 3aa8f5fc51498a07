//! Feature flag resolution.
//!
//! Turns a probe result plus explicit overrides into a consistent
//! [`FeatureFlags`]. Overrides are applied in a fixed order:
//!
//! 1. NVSHMEM force on/off and the hardware profile
//! 2. Architecture generation
//! 3. Aggressive PTX instructions
//! 4. Index width
//!
//! Downgrading to the legacy generation cascades: NVSHMEM and aggressive
//! instructions are switched off with it. That is the only automatic
//! downgrade. Anything else that contradicts an invariant, such as forcing
//! NVSHMEM on for a legacy build, is an [`InvariantViolation`].

pub mod errors;

use crate::core::features::{ArchGeneration, FeatureFlags, IndexWidth, CURRENT_DEFAULT_ARCH};
use crate::core::overrides::{AcceleratorOverride, FeatureOverrides};
use crate::probe::ProbeResult;

pub use errors::InvariantViolation;

/// Resolve feature flags from a probe result and overrides.
pub fn resolve_features(
    probe: &ProbeResult,
    overrides: &FeatureOverrides,
) -> Result<FeatureFlags, InvariantViolation> {
    let force_enable = overrides.accelerator == AcceleratorOverride::ForceEnable;

    // (a) NVSHMEM
    let mut accelerator_enabled = probe.found;
    match overrides.accelerator {
        AcceleratorOverride::Auto => {}
        AcceleratorOverride::ForceDisable => {
            tracing::debug!("NVSHMEM disabled by override");
            accelerator_enabled = false;
        }
        AcceleratorOverride::ForceEnable => {
            if !probe.found {
                return Err(InvariantViolation::AcceleratorUnavailable);
            }
            accelerator_enabled = true;
        }
    }

    if overrides.hardware_profile.disables_accelerator() {
        if force_enable {
            return Err(InvariantViolation::HardwareProfileConflict {
                profile: overrides.hardware_profile.to_string(),
            });
        }
        if accelerator_enabled {
            tracing::info!(
                "hardware profile `{}` disables NVSHMEM",
                overrides.hardware_profile
            );
        }
        accelerator_enabled = false;
    }

    // (b) architecture generation
    let arch_generation = overrides.arch_generation.unwrap_or_default();
    let mut aggressive_cascaded_off = false;
    if arch_generation == ArchGeneration::Legacy {
        if force_enable {
            return Err(InvariantViolation::AcceleratorRequiresCurrent);
        }
        if accelerator_enabled {
            tracing::info!("legacy architecture generation: disabling NVSHMEM");
        }
        accelerator_enabled = false;
        aggressive_cascaded_off = true;
    }

    // (c) aggressive PTX instructions
    let arch = overrides.effective_arch(arch_generation);
    let default_arch = arch.as_str() == CURRENT_DEFAULT_ARCH;
    let aggressive_instr_enabled = match overrides.aggressive_instrs {
        Some(true) => {
            if arch_generation == ArchGeneration::Legacy {
                return Err(InvariantViolation::AggressiveRequiresCurrent);
            }
            if !default_arch {
                return Err(InvariantViolation::AggressiveRequiresDefaultArch {
                    arch: arch.to_string(),
                });
            }
            true
        }
        Some(false) => false,
        None => {
            if !aggressive_cascaded_off && !default_arch {
                tracing::debug!(
                    "architecture list `{}` is not `{}`: aggressive PTX instructions off",
                    arch,
                    CURRENT_DEFAULT_ARCH
                );
            }
            !aggressive_cascaded_off && default_arch
        }
    };

    // (d) index width
    let index_width = overrides.index_width.unwrap_or(IndexWidth::W64);

    let flags = FeatureFlags {
        accelerator_enabled,
        arch_generation,
        aggressive_instr_enabled,
        index_width,
    };
    flags.check(&arch)?;

    tracing::debug!(
        "resolved flags: nvshmem={}, generation={}, aggressive_ptx={}, topk_idx_bits={}",
        flags.accelerator_enabled,
        flags.arch_generation,
        flags.aggressive_instr_enabled,
        flags.index_width
    );

    Ok(flags)
}
