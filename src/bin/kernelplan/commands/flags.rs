//! `kernelplan flags` command

use anyhow::Result;

use super::Session;
use crate::cli::{FlagsArgs, InputArgs};
use kernelplan::ops::resolve_plan;

pub fn execute(args: FlagsArgs, inputs: &InputArgs) -> Result<()> {
    let session = Session::load(inputs)?;
    let resolution = resolve_plan(&session.config, &session.prober(), "")?;
    let plan = &resolution.plan;

    let include_flags: Vec<String> = plan
        .include_dirs
        .iter()
        .map(|d| format!("-I{}", d.display()))
        .collect();

    let host = || {
        let mut flags = include_flags.clone();
        flags.extend(plan.compile_flags.cxx.iter().cloned());
        flags.join(" ")
    };
    let device = || {
        let mut flags = include_flags.clone();
        flags.extend(plan.compile_flags.nvcc.iter().cloned());
        flags.join(" ")
    };
    let link = || {
        let mut flags: Vec<String> = plan
            .library_dirs
            .iter()
            .map(|d| format!("-L{}", d.display()))
            .collect();
        flags.extend(plan.link_flags.iter().cloned());
        flags.join(" ")
    };

    if args.host {
        println!("{}", host());
    } else if args.device {
        println!("{}", device());
    } else if args.link {
        println!("{}", link());
    } else {
        println!("# Host compile flags:");
        println!("  {}", host());
        println!("# Device compile flags:");
        println!("  {}", device());
        if let Some(dlink) = &plan.compile_flags.nvcc_dlink {
            println!("# Device link flags:");
            println!("  {}", dlink.join(" "));
        }
        println!("# Link flags:");
        println!("  {}", link());
        println!("# Architectures: {}", plan.arch_list);
    }

    Ok(())
}
