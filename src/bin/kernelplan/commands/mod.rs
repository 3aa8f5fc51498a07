//! Command implementations

pub mod build;
pub mod flags;
pub mod plan;
pub mod probe;

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::InputArgs;
use kernelplan::probe::Prober;
use kernelplan::util::config::{load_config, BuildConfig, ProbeConfig};
use kernelplan::util::GlobalContext;

/// Inputs captured once at startup.
pub struct Session {
    pub project_root: PathBuf,
    pub config: BuildConfig,
}

impl Session {
    /// Merge config files with command-line and environment values.
    pub fn load(inputs: &InputArgs) -> Result<Self> {
        let ctx = GlobalContext::new()?;
        let project_root = match &inputs.project_root {
            Some(root) => root.clone(),
            None => ctx.find_project_root(),
        };

        let project_config = match &inputs.config {
            Some(path) => path.clone(),
            None => ctx.project_config_path(&project_root),
        };
        let mut file = load_config(ctx.config_path().as_deref(), &project_config)?;
        file.overrides.merge(inputs.raw_overrides());

        let mut site_packages = inputs.site_packages.clone();
        site_packages.retain(|p| !p.as_os_str().is_empty());
        site_packages.extend(file.probe.site_packages);

        let probe = ProbeConfig {
            python: !inputs.no_python_probe && file.probe.python.unwrap_or(true),
            site_packages,
        };
        let config = BuildConfig::from_raw(&file.overrides, probe)?;

        tracing::debug!("project root: {}", project_root.display());
        Ok(Session {
            project_root,
            config,
        })
    }

    pub fn prober(&self) -> Prober {
        Prober::from_config(&self.config)
    }
}
