//! `kernelplan build` command

use anyhow::Result;

use super::Session;
use crate::cli::{BuildArgs, InputArgs};
use kernelplan::builder::{CommandInvoker, PlanSummary, ToolchainInvoker};
use kernelplan::ops::{resolve_plan, revision_tag};

pub fn execute(args: BuildArgs, inputs: &InputArgs) -> Result<()> {
    let session = Session::load(inputs)?;
    let revision = revision_tag(&session.project_root);
    let resolution = resolve_plan(&session.config, &session.prober(), &revision)?;

    let invoker = CommandInvoker::new(&args.invoke)
        .args(args.args)
        .cwd(&session.project_root);

    // The summary is the audit record of what is about to be built; stdout
    // belongs to the build program.
    eprintln!(
        "{}",
        PlanSummary::new(&resolution.plan).with_probe(&resolution.probe)
    );
    eprintln!();

    tracing::info!(
        "building {} ({} sources, NVSHMEM {})",
        resolution.plan.extension,
        resolution.plan.sources.len(),
        if resolution.flags.accelerator_enabled {
            "on"
        } else {
            "off"
        }
    );

    invoker.invoke(&resolution.plan)?;

    tracing::info!("`{}` finished", invoker.describe());
    Ok(())
}
