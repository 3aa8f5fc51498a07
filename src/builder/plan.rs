//! Build plan generation.
//!
//! A BuildPlan describes everything the external toolchain invoker needs
//! to compile and link the `deep_ep_cpp` extension: sources, search paths,
//! per-stage compiler flags, link flags and the CUDA architecture list.
//! Assembly is a pure function of the resolved feature flags.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::arch::ArchList;
use crate::core::features::{ArchGeneration, FeatureFlags};
use crate::probe::{AcceleratorInstall, DEVICE_STATIC_LIBRARY};
use crate::resolver::InvariantViolation;
use crate::util::hash::sha256_str;

/// Name of the extension module.
pub const EXTENSION_NAME: &str = "deep_ep_cpp";

/// Include directory shared by all source units.
pub const BASE_INCLUDE_DIR: &str = "csrc/";

pub const HOST_BASE_FLAGS: &[&str] = &[
    "-O3",
    "-Wno-deprecated-declarations",
    "-Wno-unused-variable",
    "-Wno-sign-compare",
    "-Wno-reorder",
    "-Wno-attributes",
];

pub const DEVICE_BASE_FLAGS: &[&str] = &["-O3", "-Xcompiler", "-O3"];

/// Relocatable device code and register tuning, SM90 only.
pub const DEVICE_SM90_FLAGS: &[&str] = &["-rdc=true", "--ptxas-options=--register-usage-level=10"];

/// Driver API, always linked.
pub const BASE_LINK_FLAGS: &[&str] = &["-lcuda"];

/// Preprocessor definitions mirrored from the feature flags.
pub mod defines {
    pub const DISABLE_NVSHMEM: &str = "DISABLE_NVSHMEM";
    pub const DISABLE_SM90_FEATURES: &str = "DISABLE_SM90_FEATURES";
    pub const DISABLE_AGGRESSIVE_PTX_INSTRS: &str = "DISABLE_AGGRESSIVE_PTX_INSTRS";
    pub const TOPK_IDX_BITS: &str = "TOPK_IDX_BITS";
}

/// A compilation unit of the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SourceUnit {
    /// Python bindings and the dispatch/combine entry points
    CoreDispatch,
    Runtime,
    Layout,
    /// NVLink transport within a node
    Intranode,
    /// RDMA transport across nodes (NVSHMEM)
    Internode,
    /// Low-latency RDMA kernels (NVSHMEM)
    InternodeLowLatency,
}

impl SourceUnit {
    /// Units built in every configuration, in build order.
    pub const BASE: [SourceUnit; 4] = [
        SourceUnit::CoreDispatch,
        SourceUnit::Runtime,
        SourceUnit::Layout,
        SourceUnit::Intranode,
    ];

    /// Units built only with NVSHMEM.
    pub const ACCELERATOR: [SourceUnit; 2] =
        [SourceUnit::Internode, SourceUnit::InternodeLowLatency];

    /// Path relative to the project root.
    pub fn path(&self) -> &'static str {
        match self {
            SourceUnit::CoreDispatch => "csrc/deep_ep.cpp",
            SourceUnit::Runtime => "csrc/kernels/runtime.cu",
            SourceUnit::Layout => "csrc/kernels/layout.cu",
            SourceUnit::Intranode => "csrc/kernels/intranode.cu",
            SourceUnit::Internode => "csrc/kernels/internode.cu",
            SourceUnit::InternodeLowLatency => "csrc/kernels/internode_ll.cu",
        }
    }
}

impl From<SourceUnit> for String {
    fn from(unit: SourceUnit) -> Self {
        unit.path().to_string()
    }
}

impl TryFrom<String> for SourceUnit {
    type Error = String;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        SourceUnit::BASE
            .iter()
            .chain(SourceUnit::ACCELERATOR.iter())
            .find(|u| u.path() == path)
            .copied()
            .ok_or_else(|| format!("unknown source unit `{}`", path))
    }
}

/// Compiler flags for each compilation stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFlags {
    /// Host C++ compiler
    pub cxx: Vec<String>,

    /// CUDA device compiler
    pub nvcc: Vec<String>,

    /// Device link stage; only present with NVSHMEM
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nvcc_dlink: Option<Vec<String>>,
}

impl CompileFlags {
    /// Add a flag to both host and device stages.
    fn push_both(&mut self, flag: String) {
        self.cxx.push(flag.clone());
        self.nvcc.push(flag);
    }
}

/// A complete build plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    /// Extension module name
    pub extension: String,

    /// Source units in build order
    pub sources: Vec<SourceUnit>,

    /// Include directories
    pub include_dirs: Vec<PathBuf>,

    /// Library search paths
    pub library_dirs: Vec<PathBuf>,

    /// Per-stage compiler flags
    pub compile_flags: CompileFlags,

    /// Extra linker arguments
    pub link_flags: Vec<String>,

    /// CUDA architecture list, `TORCH_CUDA_ARCH_LIST` syntax
    pub arch_list: String,

    /// NVSHMEM installation root, when enabled
    pub nvshmem_dir: Option<PathBuf>,

    /// Flags this plan was assembled from
    pub features: FeatureFlags,

    /// Source revision tag, empty when unknown
    #[serde(default)]
    pub revision: String,
}

/// Everything besides the flags that the assembler needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanInputs<'a> {
    /// Located NVSHMEM install; required when NVSHMEM is enabled
    pub accelerator: Option<&'a AcceleratorInstall>,

    /// Explicit architecture list
    pub arch_list: Option<&'a ArchList>,
}

/// Format a valued preprocessor definition flag.
pub fn define_flag(name: &str, value: impl std::fmt::Display) -> String {
    format!("-D{}={}", name, value)
}

impl BuildPlan {
    /// Assemble the plan for a resolved flag set.
    ///
    /// Fails only if NVSHMEM is enabled without an install to point at.
    pub fn assemble(
        flags: &FeatureFlags,
        inputs: &PlanInputs<'_>,
    ) -> Result<Self, InvariantViolation> {
        let mut sources = SourceUnit::BASE.to_vec();
        let mut include_dirs = vec![PathBuf::from(BASE_INCLUDE_DIR)];
        let mut library_dirs = Vec::new();
        let mut compile_flags = CompileFlags {
            cxx: HOST_BASE_FLAGS.iter().map(|s| s.to_string()).collect(),
            nvcc: DEVICE_BASE_FLAGS.iter().map(|s| s.to_string()).collect(),
            nvcc_dlink: None,
        };
        let mut link_flags: Vec<String> = BASE_LINK_FLAGS.iter().map(|s| s.to_string()).collect();

        let nvshmem_dir = if flags.accelerator_enabled {
            let install = inputs
                .accelerator
                .ok_or(InvariantViolation::AcceleratorUnavailable)?;
            let lib_dir = install.lib_dir();

            sources.extend(SourceUnit::ACCELERATOR);
            include_dirs.push(install.include_dir());
            library_dirs.push(lib_dir.clone());
            compile_flags.nvcc_dlink = Some(vec![
                "-dlink".to_string(),
                format!("-L{}", lib_dir.display()),
                "-lnvshmem_device".to_string(),
            ]);
            link_flags.extend([
                format!("-l:{}", install.runtime_library),
                format!("-l:{}", DEVICE_STATIC_LIBRARY),
                format!("-Wl,-rpath,{}", lib_dir.display()),
            ]);
            Some(install.root.clone())
        } else {
            compile_flags.push_both(format!("-D{}", defines::DISABLE_NVSHMEM));
            None
        };

        match flags.arch_generation {
            ArchGeneration::Legacy => {
                compile_flags.push_both(format!("-D{}", defines::DISABLE_SM90_FEATURES));
            }
            ArchGeneration::Current => {
                compile_flags
                    .nvcc
                    .extend(DEVICE_SM90_FLAGS.iter().map(|s| s.to_string()));
            }
        }

        compile_flags.push_both(define_flag(
            defines::DISABLE_AGGRESSIVE_PTX_INSTRS,
            u8::from(!flags.aggressive_instr_enabled),
        ));
        compile_flags.push_both(define_flag(defines::TOPK_IDX_BITS, flags.index_width));

        let arch_list = match inputs.arch_list {
            Some(list) => list.to_string(),
            None => flags.arch_generation.default_arch().to_string(),
        };

        Ok(BuildPlan {
            extension: EXTENSION_NAME.to_string(),
            sources,
            include_dirs,
            library_dirs,
            compile_flags,
            link_flags,
            arch_list,
            nvshmem_dir,
            features: *flags,
            revision: String::new(),
        })
    }

    /// Attach a source revision tag.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Source paths in build order.
    pub fn source_paths(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.path()).collect()
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// SHA-256 of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        // Serializing plain data with string keys cannot fail.
        let canonical = serde_json::to_string(self).unwrap_or_default();
        sha256_str(&canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::IndexWidth;

    fn install() -> AcceleratorInstall {
        AcceleratorInstall::new("/opt/acc", "libacc.so.3")
    }

    fn flags(accelerator: bool) -> FeatureFlags {
        FeatureFlags {
            accelerator_enabled: accelerator,
            ..FeatureFlags::default()
        }
    }

    #[test]
    fn test_base_plan() {
        let plan = BuildPlan::assemble(&flags(false), &PlanInputs::default()).unwrap();

        assert_eq!(
            plan.source_paths(),
            vec![
                "csrc/deep_ep.cpp",
                "csrc/kernels/runtime.cu",
                "csrc/kernels/layout.cu",
                "csrc/kernels/intranode.cu",
            ]
        );
        assert_eq!(plan.include_dirs, vec![PathBuf::from("csrc/")]);
        assert!(plan.library_dirs.is_empty());
        assert!(plan.compile_flags.nvcc_dlink.is_none());
        assert_eq!(plan.link_flags, vec!["-lcuda"]);
        assert_eq!(plan.arch_list, "9.0");
        assert!(plan.nvshmem_dir.is_none());
        assert!(plan.compile_flags.cxx.contains(&"-DDISABLE_NVSHMEM".to_string()));
        assert!(plan.compile_flags.nvcc.contains(&"-DDISABLE_NVSHMEM".to_string()));
        assert!(plan.compile_flags.nvcc.contains(&"-rdc=true".to_string()));
    }

    #[test]
    fn test_accelerator_plan() {
        let install = install();
        let inputs = PlanInputs {
            accelerator: Some(&install),
            arch_list: None,
        };
        let plan = BuildPlan::assemble(&flags(true), &inputs).unwrap();

        assert_eq!(plan.sources.len(), 6);
        assert_eq!(plan.sources[4], SourceUnit::Internode);
        assert_eq!(plan.sources[5], SourceUnit::InternodeLowLatency);
        assert!(plan.include_dirs.contains(&PathBuf::from("/opt/acc/include")));
        assert_eq!(plan.library_dirs, vec![PathBuf::from("/opt/acc/lib")]);
        assert_eq!(
            plan.compile_flags.nvcc_dlink,
            Some(vec![
                "-dlink".to_string(),
                "-L/opt/acc/lib".to_string(),
                "-lnvshmem_device".to_string()
            ])
        );
        assert_eq!(
            plan.link_flags,
            vec![
                "-lcuda",
                "-l:libacc.so.3",
                "-l:libnvshmem_device.a",
                "-Wl,-rpath,/opt/acc/lib"
            ]
        );
        assert!(!plan.compile_flags.cxx.iter().any(|f| f == "-DDISABLE_NVSHMEM"));
        assert_eq!(plan.nvshmem_dir, Some(PathBuf::from("/opt/acc")));
    }

    #[test]
    fn test_accelerator_without_install() {
        assert_eq!(
            BuildPlan::assemble(&flags(true), &PlanInputs::default()),
            Err(InvariantViolation::AcceleratorUnavailable)
        );
    }

    #[test]
    fn test_definitions_mirror_flags() {
        let flags = FeatureFlags {
            accelerator_enabled: false,
            arch_generation: ArchGeneration::Legacy,
            aggressive_instr_enabled: false,
            index_width: IndexWidth::W32,
        };
        let plan = BuildPlan::assemble(&flags, &PlanInputs::default()).unwrap();

        for stage in [&plan.compile_flags.cxx, &plan.compile_flags.nvcc] {
            assert!(stage.contains(&"-DTOPK_IDX_BITS=32".to_string()));
            assert!(stage.contains(&"-DDISABLE_AGGRESSIVE_PTX_INSTRS=1".to_string()));
            assert!(stage.contains(&"-DDISABLE_SM90_FEATURES".to_string()));
        }
        assert!(!plan.compile_flags.nvcc.contains(&"-rdc=true".to_string()));
        assert_eq!(plan.arch_list, "8.0");
    }

    #[test]
    fn test_default_index_width_flag() {
        let plan = BuildPlan::assemble(&flags(false), &PlanInputs::default()).unwrap();
        assert!(plan.compile_flags.cxx.contains(&"-DTOPK_IDX_BITS=64".to_string()));
        assert!(plan
            .compile_flags
            .nvcc
            .contains(&"-DDISABLE_AGGRESSIVE_PTX_INSTRS=0".to_string()));
    }

    #[test]
    fn test_arch_list_override() {
        let list: ArchList = "8.0 9.0".parse().unwrap();
        let inputs = PlanInputs {
            accelerator: None,
            arch_list: Some(&list),
        };
        let plan = BuildPlan::assemble(&flags(false), &inputs).unwrap();
        assert_eq!(plan.arch_list, "8.0;9.0");
    }

    #[test]
    fn test_source_unit_serde() {
        let json = serde_json::to_string(&SourceUnit::InternodeLowLatency).unwrap();
        assert_eq!(json, "\"csrc/kernels/internode_ll.cu\"");
        let unit: SourceUnit = serde_json::from_str("\"csrc/kernels/layout.cu\"").unwrap();
        assert_eq!(unit, SourceUnit::Layout);
        assert!(serde_json::from_str::<SourceUnit>("\"csrc/other.cu\"").is_err());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let install = install();
        let inputs = PlanInputs {
            accelerator: Some(&install),
            arch_list: None,
        };
        let a = BuildPlan::assemble(&flags(true), &inputs).unwrap();
        let b = BuildPlan::assemble(&flags(true), &inputs).unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = a.clone().with_revision("abc1234");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_plan_json_round_trip_fields() {
        let plan = BuildPlan::assemble(&flags(false), &PlanInputs::default()).unwrap();
        let json = plan.to_json().unwrap();
        assert!(json.contains("\"extension\": \"deep_ep_cpp\""));
        assert!(!json.contains("nvcc_dlink"));
        let back: BuildPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
