//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use kernelplan::util::config::{RawOverrides, RawValue};

/// kernelplan - resolve the build plan for the DeepEP native extension
#[derive(Parser)]
#[command(name = "kernelplan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(flatten)]
    pub inputs: InputArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve and print the build plan
    Plan(PlanArgs),

    /// Report where NVSHMEM was found
    Probe(ProbeArgs),

    /// Print compiler and linker flags from the plan
    Flags(FlagsArgs),

    /// Resolve the plan and hand it to an external build program
    Build(BuildArgs),
}

/// Named build inputs, shared by every command.
///
/// Each one can also come from its environment variable or a config file.
#[derive(Args, Debug, Default)]
pub struct InputArgs {
    /// NVSHMEM installation directory
    #[arg(long, global = true, env = "NVSHMEM_DIR", value_name = "DIR")]
    pub nvshmem_dir: Option<String>,

    /// CUDA architecture list, e.g. "9.0" or "8.0;9.0"
    #[arg(long, global = true, env = "TORCH_CUDA_ARCH_LIST", value_name = "LIST")]
    pub arch_list: Option<String>,

    /// Build for SM80 instead of SM90 (0/1)
    #[arg(long, global = true, env = "DISABLE_SM90_FEATURES", value_name = "BOOL")]
    pub disable_sm90_features: Option<String>,

    /// Disable aggressive PTX instructions (0/1)
    #[arg(long, global = true, env = "DISABLE_AGGRESSIVE_PTX_INSTRS", value_name = "BOOL")]
    pub disable_aggressive_ptx_instrs: Option<String>,

    /// Top-k index width (32 or 64)
    #[arg(long, global = true, env = "TOPK_IDX_BITS", value_name = "BITS")]
    pub topk_idx_bits: Option<String>,

    /// 1 forces NVSHMEM off, 0 forces it on
    #[arg(long, global = true, env = "DISABLE_NVSHMEM", value_name = "BOOL")]
    pub disable_nvshmem: Option<String>,

    /// Hardware profile (default, single-gpu-no-rdma)
    #[arg(long, global = true, env = "KERNELPLAN_HARDWARE_PROFILE", value_name = "PROFILE")]
    pub hardware_profile: Option<String>,

    /// Extra package roots to scan for nvidia/nvshmem
    #[arg(
        long,
        global = true,
        env = "PYTHONPATH",
        value_delimiter = ':',
        value_name = "DIR"
    )]
    pub site_packages: Vec<PathBuf>,

    /// Do not ask the Python interpreter where NVSHMEM is installed
    #[arg(long, global = true)]
    pub no_python_probe: bool,

    /// Project root (defaults to the nearest directory containing csrc/)
    #[arg(long, global = true, value_name = "DIR")]
    pub project_root: Option<PathBuf>,

    /// Use this config file instead of .kernelplan/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl InputArgs {
    /// The command-line and environment values as raw overrides.
    pub fn raw_overrides(&self) -> RawOverrides {
        let value = |v: &Option<String>| v.as_deref().map(RawValue::from);
        RawOverrides {
            nvshmem_dir: value(&self.nvshmem_dir),
            arch_list: value(&self.arch_list),
            disable_sm90_features: value(&self.disable_sm90_features),
            disable_aggressive_ptx_instrs: value(&self.disable_aggressive_ptx_instrs),
            topk_idx_bits: value(&self.topk_idx_bits),
            disable_nvshmem: value(&self.disable_nvshmem),
            hardware_profile: value(&self.hardware_profile),
        }
    }
}

#[derive(Args)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the plan JSON to a file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ProbeArgs {
    /// Print the probe result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct FlagsArgs {
    /// Host compiler flags only
    #[arg(long, conflicts_with_all = ["device", "link"])]
    pub host: bool,

    /// Device compiler flags only
    #[arg(long, conflicts_with = "link")]
    pub device: bool,

    /// Linker flags only
    #[arg(long)]
    pub link: bool,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Program that builds the extension; receives the plan JSON on stdin
    #[arg(long, value_name = "PROGRAM")]
    pub invoke: PathBuf,

    /// Arguments for the build program
    #[arg(last = true)]
    pub args: Vec<String>,
}
