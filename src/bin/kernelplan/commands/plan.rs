//! `kernelplan plan` command

use anyhow::{Context, Result};

use super::Session;
use crate::cli::{InputArgs, PlanArgs};
use kernelplan::builder::PlanSummary;
use kernelplan::ops::{resolve_plan, revision_tag};

pub fn execute(args: PlanArgs, inputs: &InputArgs) -> Result<()> {
    let session = Session::load(inputs)?;
    let revision = revision_tag(&session.project_root);
    let resolution = resolve_plan(&session.config, &session.prober(), &revision)?;
    let plan = &resolution.plan;

    if let Some(path) = &args.output {
        let json = plan.to_json()?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("wrote build plan to {}", path.display());
    }

    if args.json {
        println!("{}", plan.to_json()?);
    } else if args.output.is_none() {
        println!("{}", PlanSummary::new(plan).with_probe(&resolution.probe));
    }

    Ok(())
}
