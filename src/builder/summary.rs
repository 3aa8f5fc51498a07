//! Human-readable plan summary.

use std::fmt;
use std::path::PathBuf;

use crate::builder::plan::BuildPlan;
use crate::probe::ProbeResult;

/// Audit view of a plan, with what the prober found.
pub struct PlanSummary<'a> {
    plan: &'a BuildPlan,
    probe: Option<&'a ProbeResult>,
}

impl<'a> PlanSummary<'a> {
    pub fn new(plan: &'a BuildPlan) -> Self {
        PlanSummary { plan, probe: None }
    }

    /// Report where NVSHMEM was found even when the plan does not use it.
    pub fn with_probe(mut self, probe: &'a ProbeResult) -> Self {
        self.probe = Some(probe);
        self
    }

    fn nvshmem_line(&self) -> String {
        if let Some(root) = &self.plan.nvshmem_dir {
            return root.display().to_string();
        }
        match self.probe.and_then(|p| p.library_root.as_ref()) {
            Some(root) => format!("disabled (found at {})", root.display()),
            None => "not found".to_string(),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, title: &str, items: &[String]) -> fmt::Result {
    writeln!(f, "{}:", title)?;
    if items.is_empty() {
        writeln!(f, "  (none)")?;
    }
    for item in items {
        writeln!(f, "  {}", item)?;
    }
    Ok(())
}

fn paths(dirs: &[PathBuf]) -> Vec<String> {
    dirs.iter().map(|p| p.display().to_string()).collect()
}

impl fmt::Display for PlanSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        let features = &plan.features;

        writeln!(f, "Build plan for '{}'", plan.extension)?;
        writeln!(f)?;
        writeln!(f, "NVSHMEM:        {}", self.nvshmem_line())?;
        writeln!(f, "Generation:     {}", features.arch_generation)?;
        writeln!(f, "Arch list:      {}", plan.arch_list)?;
        writeln!(
            f,
            "Aggressive PTX: {}",
            if features.aggressive_instr_enabled { "on" } else { "off" }
        )?;
        writeln!(f, "Top-k index:    {} bits", features.index_width)?;
        writeln!(f)?;

        let sources: Vec<String> = plan.source_paths().iter().map(|s| s.to_string()).collect();
        write_list(f, "Sources", &sources)?;
        write_list(f, "Include dirs", &paths(&plan.include_dirs))?;
        write_list(f, "Library dirs", &paths(&plan.library_dirs))?;
        writeln!(f, "Host flags:     {}", plan.compile_flags.cxx.join(" "))?;
        writeln!(f, "Device flags:   {}", plan.compile_flags.nvcc.join(" "))?;
        if let Some(dlink) = &plan.compile_flags.nvcc_dlink {
            writeln!(f, "Device link:    {}", dlink.join(" "))?;
        }
        writeln!(f, "Link flags:     {}", plan.link_flags.join(" "))?;
        writeln!(f)?;

        if plan.revision.is_empty() {
            writeln!(f, "Revision:       (unknown)")?;
        } else {
            writeln!(f, "Revision:       {}", plan.revision)?;
        }
        write!(f, "Fingerprint:    {}", plan.fingerprint())
    }
}
