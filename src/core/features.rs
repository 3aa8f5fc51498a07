//! Feature flags controlling which parts of the extension get built.
//!
//! The flags are mutually dependent: NVSHMEM transport and aggressive PTX
//! instructions both need the SM90 generation. [`FeatureFlags::check`]
//! is the single place that states those rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::arch::ArchList;
use crate::resolver::errors::InvariantViolation;

/// Default architecture list for the current (SM90) generation.
pub const CURRENT_DEFAULT_ARCH: &str = "9.0";

/// Default architecture list for the legacy (SM80) generation.
pub const LEGACY_DEFAULT_ARCH: &str = "8.0";

/// Instruction-set tier targeted by device compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchGeneration {
    /// SM80 (Ampere). No TMA, no FP8, no NVSHMEM kernels.
    Legacy,
    /// SM90 (Hopper)
    #[default]
    Current,
}

impl ArchGeneration {
    /// Architecture list used when no explicit list is configured.
    pub fn default_arch(&self) -> &'static str {
        match self {
            ArchGeneration::Legacy => LEGACY_DEFAULT_ARCH,
            ArchGeneration::Current => CURRENT_DEFAULT_ARCH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchGeneration::Legacy => "legacy",
            ArchGeneration::Current => "current",
        }
    }
}

impl fmt::Display for ArchGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit width of the top-k index tensor (`TOPK_IDX_BITS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum IndexWidth {
    W32,
    #[default]
    W64,
}

impl IndexWidth {
    pub fn bits(&self) -> u32 {
        match self {
            IndexWidth::W32 => 32,
            IndexWidth::W64 => 64,
        }
    }
}

impl TryFrom<u32> for IndexWidth {
    type Error = IndexWidthError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            32 => Ok(IndexWidth::W32),
            64 => Ok(IndexWidth::W64),
            other => Err(IndexWidthError(other.to_string())),
        }
    }
}

impl From<IndexWidth> for u32 {
    fn from(width: IndexWidth) -> Self {
        width.bits()
    }
}

impl std::str::FromStr for IndexWidth {
    type Err = IndexWidthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "32" => Ok(IndexWidth::W32),
            "64" => Ok(IndexWidth::W64),
            other => Err(IndexWidthError(other.to_string())),
        }
    }
}

impl fmt::Display for IndexWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Error returned when parsing an index width other than 32 or 64.
#[derive(Debug, Clone)]
pub struct IndexWidthError(pub String);

impl fmt::Display for IndexWidthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid index width '{}', valid values: 32, 64", self.0)
    }
}

impl std::error::Error for IndexWidthError {}

/// A validated, internally consistent set of feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Build the NVSHMEM-backed internode and low-latency kernels
    pub accelerator_enabled: bool,

    /// Targeted architecture generation
    pub arch_generation: ArchGeneration,

    /// Allow aggressive PTX load/store instructions
    pub aggressive_instr_enabled: bool,

    /// Top-k index width
    pub index_width: IndexWidth,
}

impl FeatureFlags {
    /// Check the cross-flag invariants.
    ///
    /// `arch` is the architecture descriptor the plan will be built for; it
    /// matters only for aggressive instructions, which are restricted to the
    /// plain SM90 list.
    pub fn check(&self, arch: &ArchList) -> Result<(), InvariantViolation> {
        if self.accelerator_enabled && self.arch_generation != ArchGeneration::Current {
            return Err(InvariantViolation::AcceleratorRequiresCurrent);
        }
        if self.aggressive_instr_enabled {
            if self.arch_generation != ArchGeneration::Current {
                return Err(InvariantViolation::AggressiveRequiresCurrent);
            }
            if arch.as_str() != CURRENT_DEFAULT_ARCH {
                return Err(InvariantViolation::AggressiveRequiresDefaultArch {
                    arch: arch.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            accelerator_enabled: false,
            arch_generation: ArchGeneration::Current,
            aggressive_instr_enabled: true,
            index_width: IndexWidth::W64,
        }
    }
}
