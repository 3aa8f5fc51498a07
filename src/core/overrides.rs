//! Explicit overrides applied on top of probe results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::arch::ArchList;
use crate::core::features::{ArchGeneration, IndexWidth};

/// Explicit control over the NVSHMEM transport (`DISABLE_NVSHMEM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AcceleratorOverride {
    /// Follow the probe result
    #[default]
    Auto,
    ForceDisable,
    /// Require NVSHMEM; resolution fails if it cannot be enabled
    ForceEnable,
}

/// Known hardware classes that cannot use the NVSHMEM transport even when
/// the library is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareProfile {
    #[default]
    Default,
    /// Single GPU without RDMA headers (no `mlx5dv.h`), e.g. a lone A100.
    SingleGpuNoRdma,
}

impl HardwareProfile {
    /// Whether this profile rules out NVSHMEM regardless of the probe.
    pub fn disables_accelerator(&self) -> bool {
        matches!(self, HardwareProfile::SingleGpuNoRdma)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareProfile::Default => "default",
            HardwareProfile::SingleGpuNoRdma => "single-gpu-no-rdma",
        }
    }
}

impl std::str::FromStr for HardwareProfile {
    type Err = HardwareProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(HardwareProfile::Default),
            "single-gpu-no-rdma" | "single-gpu" => Ok(HardwareProfile::SingleGpuNoRdma),
            _ => Err(HardwareProfileParseError(s.to_string())),
        }
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown hardware profile.
#[derive(Debug, Clone)]
pub struct HardwareProfileParseError(pub String);

impl fmt::Display for HardwareProfileParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid hardware profile '{}', valid values: default, single-gpu-no-rdma",
            self.0
        )
    }
}

impl std::error::Error for HardwareProfileParseError {}

/// All explicit overrides, already parsed into typed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOverrides {
    /// Force NVSHMEM on or off
    pub accelerator: AcceleratorOverride,

    /// Hardware class override
    pub hardware_profile: HardwareProfile,

    /// Force the architecture generation
    pub arch_generation: Option<ArchGeneration>,

    /// Force aggressive PTX instructions on or off
    pub aggressive_instrs: Option<bool>,

    /// Force the top-k index width
    pub index_width: Option<IndexWidth>,

    /// Explicit architecture list
    pub arch_list: Option<ArchList>,
}

impl FeatureOverrides {
    /// The architecture list the plan will target for `generation`.
    pub fn effective_arch(&self, generation: ArchGeneration) -> ArchList {
        match &self.arch_list {
            Some(list) => list.clone(),
            None => ArchList::from(generation),
        }
    }
}
