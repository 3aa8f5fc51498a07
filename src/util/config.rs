//! Configuration for plan resolution.
//!
//! Every input is a named value that can come from three places:
//! - Global config: `~/.kernelplan/config.toml`
//! - Project config: `.kernelplan/config.toml`
//! - Command line / environment (`NVSHMEM_DIR`, `TORCH_CUDA_ARCH_LIST`, ...)
//!
//! Later sources take precedence. Values are captured once as strings in
//! [`RawOverrides`] and parsed into a typed [`BuildConfig`]; each malformed
//! field gets its own [`ConfigError`].

use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::arch::ArchList;
use crate::core::features::{ArchGeneration, IndexWidth};
use crate::core::overrides::{AcceleratorOverride, FeatureOverrides, HardwareProfile};
use crate::util::diagnostic::Diagnostic;

/// Environment variable names for each named input.
pub mod env {
    pub const NVSHMEM_DIR: &str = "NVSHMEM_DIR";
    pub const ARCH_LIST: &str = "TORCH_CUDA_ARCH_LIST";
    pub const DISABLE_SM90_FEATURES: &str = "DISABLE_SM90_FEATURES";
    pub const DISABLE_AGGRESSIVE_PTX_INSTRS: &str = "DISABLE_AGGRESSIVE_PTX_INSTRS";
    pub const TOPK_IDX_BITS: &str = "TOPK_IDX_BITS";
    pub const DISABLE_NVSHMEM: &str = "DISABLE_NVSHMEM";
    pub const HARDWARE_PROFILE: &str = "KERNELPLAN_HARDWARE_PROFILE";

    /// All override variables, for callers that need to scrub them.
    pub const ALL: &[&str] = &[
        NVSHMEM_DIR,
        ARCH_LIST,
        DISABLE_SM90_FEATURES,
        DISABLE_AGGRESSIVE_PTX_INSTRS,
        TOPK_IDX_BITS,
        DISABLE_NVSHMEM,
        HARDWARE_PROFILE,
    ];
}

/// Malformed or unusable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum ConfigError {
    #[error("`{field}` must be a boolean toggle (0/1, true/false, yes/no, on/off), got `{value}`")]
    #[diagnostic(code(kernelplan::config::invalid_toggle))]
    InvalidToggle { field: &'static str, value: String },

    #[error("`{field}` must be 32 or 64, got `{value}`")]
    #[diagnostic(code(kernelplan::config::invalid_index_width))]
    InvalidIndexWidth { field: &'static str, value: String },

    #[error("`{field}` is not a valid architecture list: {reason}")]
    #[diagnostic(code(kernelplan::config::invalid_arch_list))]
    InvalidArchList {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("`{field}` is not a known hardware profile: `{value}`")]
    #[diagnostic(code(kernelplan::config::invalid_hardware_profile))]
    InvalidHardwareProfile { field: &'static str, value: String },

    #[error("`{field}` is set but empty")]
    #[diagnostic(code(kernelplan::config::empty_value))]
    EmptyValue { field: &'static str },

    #[error("{reason}: {}", .path.display())]
    #[diagnostic(code(kernelplan::config::nvshmem_dir_not_found))]
    AcceleratorDirNotFound { path: PathBuf, reason: String },

    #[error("failed to read config file {}: {message}", .path.display())]
    #[diagnostic(code(kernelplan::config::read))]
    Read { path: PathBuf, message: String },

    #[error("failed to parse config file {}: {message}", .path.display())]
    #[diagnostic(code(kernelplan::config::parse))]
    Parse { path: PathBuf, message: String },
}

impl ConfigError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            ConfigError::AcceleratorDirNotFound { path, .. } => diag
                .with_location(path)
                .with_suggestion(format!(
                    "Point {} at an NVSHMEM installation",
                    env::NVSHMEM_DIR
                ))
                .with_suggestion(format!("Unset {} to probe automatically", env::NVSHMEM_DIR)),
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => {
                diag.with_location(path)
            }
            _ => diag.with_suggestion("Fix or unset the value; see `kernelplan --help`"),
        }
    }
}

/// A raw configuration value.
///
/// Config files may use native TOML booleans and integers; the command line
/// and environment always provide strings. Everything is parsed from the
/// string form so both spellings behave the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Str(s)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Str(s.to_string())
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Str(s) => f.write_str(s),
        }
    }
}

/// Named override inputs, unparsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOverrides {
    /// NVSHMEM installation directory
    pub nvshmem_dir: Option<RawValue>,

    /// CUDA architecture list
    pub arch_list: Option<RawValue>,

    /// Build for SM80 instead of SM90
    pub disable_sm90_features: Option<RawValue>,

    /// Disable aggressive PTX instructions
    pub disable_aggressive_ptx_instrs: Option<RawValue>,

    /// Top-k index width, 32 or 64
    pub topk_idx_bits: Option<RawValue>,

    /// 1 forces NVSHMEM off, 0 forces it on
    pub disable_nvshmem: Option<RawValue>,

    /// Hardware profile name
    pub hardware_profile: Option<RawValue>,
}

impl RawOverrides {
    /// Merge another set of overrides into this one (other takes precedence).
    pub fn merge(&mut self, other: RawOverrides) {
        if other.nvshmem_dir.is_some() {
            self.nvshmem_dir = other.nvshmem_dir;
        }
        if other.arch_list.is_some() {
            self.arch_list = other.arch_list;
        }
        if other.disable_sm90_features.is_some() {
            self.disable_sm90_features = other.disable_sm90_features;
        }
        if other.disable_aggressive_ptx_instrs.is_some() {
            self.disable_aggressive_ptx_instrs = other.disable_aggressive_ptx_instrs;
        }
        if other.topk_idx_bits.is_some() {
            self.topk_idx_bits = other.topk_idx_bits;
        }
        if other.disable_nvshmem.is_some() {
            self.disable_nvshmem = other.disable_nvshmem;
        }
        if other.hardware_profile.is_some() {
            self.hardware_profile = other.hardware_profile;
        }
    }
}

/// Probe settings from config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Ask the Python interpreter where NVSHMEM is installed
    pub python: Option<bool>,

    /// Extra package roots to scan for `nvidia/nvshmem`
    pub site_packages: Vec<PathBuf>,
}

/// Contents of a `config.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Named override values
    pub overrides: RawOverrides,

    /// Probe settings
    pub probe: ProbeSettings,
}

impl ConfigFile {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load configuration, treating a missing file as empty.
    pub fn load_if_exists(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: ConfigFile) {
        self.overrides.merge(other.overrides);
        if other.probe.python.is_some() {
            self.probe.python = other.probe.python;
        }
        // Later roots are searched after earlier ones.
        self.probe.site_packages.extend(other.probe.site_packages);
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.kernelplan/config.toml)
/// 2. Global config (~/.kernelplan/config.toml)
/// 3. Defaults
///
/// A config file that exists but fails to parse is an error.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<ConfigFile, ConfigError> {
    let mut config = ConfigFile::default();

    if let Some(global_path) = global_path {
        let global = ConfigFile::load_if_exists(global_path)?;
        config.merge(global);
    }

    let project = ConfigFile::load_if_exists(project_path)?;
    config.merge(project);

    Ok(config)
}

/// Typed probe configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Run the Python interpreter step
    pub python: bool,

    /// Package roots for the site-packages step
    pub site_packages: Vec<PathBuf>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            python: true,
            site_packages: Vec::new(),
        }
    }
}

/// Fully parsed configuration for one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
    /// Explicit NVSHMEM directory
    pub nvshmem_dir: Option<PathBuf>,

    /// Feature overrides
    pub overrides: FeatureOverrides,

    /// Probe settings
    pub probe: ProbeConfig,
}

impl BuildConfig {
    /// Parse raw override values.
    pub fn from_raw(raw: &RawOverrides, probe: ProbeConfig) -> Result<Self, ConfigError> {
        let nvshmem_dir = non_empty(env::NVSHMEM_DIR, raw.nvshmem_dir.as_ref())?.map(PathBuf::from);

        let arch_list = non_empty(env::ARCH_LIST, raw.arch_list.as_ref())?
            .map(|value| {
                value
                    .parse::<ArchList>()
                    .map_err(|e| ConfigError::InvalidArchList {
                        field: env::ARCH_LIST,
                        reason: e.to_string(),
                        value,
                    })
            })
            .transpose()?;

        let arch_generation = parse_toggle(
            env::DISABLE_SM90_FEATURES,
            raw.disable_sm90_features.as_ref(),
        )?
        .map(|legacy| {
            if legacy {
                ArchGeneration::Legacy
            } else {
                ArchGeneration::Current
            }
        });

        let aggressive_instrs = parse_toggle(
            env::DISABLE_AGGRESSIVE_PTX_INSTRS,
            raw.disable_aggressive_ptx_instrs.as_ref(),
        )?
        .map(|disabled| !disabled);

        let index_width = non_empty(env::TOPK_IDX_BITS, raw.topk_idx_bits.as_ref())?
            .map(|value| {
                value
                    .parse::<IndexWidth>()
                    .map_err(|_| ConfigError::InvalidIndexWidth {
                        field: env::TOPK_IDX_BITS,
                        value,
                    })
            })
            .transpose()?;

        let accelerator = match parse_toggle(env::DISABLE_NVSHMEM, raw.disable_nvshmem.as_ref())? {
            None => AcceleratorOverride::Auto,
            Some(true) => AcceleratorOverride::ForceDisable,
            Some(false) => AcceleratorOverride::ForceEnable,
        };

        let hardware_profile = non_empty(env::HARDWARE_PROFILE, raw.hardware_profile.as_ref())?
            .map(|value| {
                value
                    .parse::<HardwareProfile>()
                    .map_err(|_| ConfigError::InvalidHardwareProfile {
                        field: env::HARDWARE_PROFILE,
                        value,
                    })
            })
            .transpose()?
            .unwrap_or_default();

        Ok(BuildConfig {
            nvshmem_dir,
            overrides: FeatureOverrides {
                accelerator,
                hardware_profile,
                arch_generation,
                aggressive_instrs,
                index_width,
                arch_list,
            },
            probe,
        })
    }
}

/// The value as a trimmed string, rejecting empty values.
fn non_empty(field: &'static str, value: Option<&RawValue>) -> Result<Option<String>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) => {
            let s = value.to_string().trim().to_string();
            if s.is_empty() {
                Err(ConfigError::EmptyValue { field })
            } else {
                Ok(Some(s))
            }
        }
    }
}

/// Parse a boolean toggle.
pub fn parse_toggle(field: &'static str, value: Option<&RawValue>) -> Result<Option<bool>, ConfigError> {
    let Some(value) = non_empty(field, value)? else {
        return Ok(None);
    };

    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidToggle { field, value }),
    }
}
