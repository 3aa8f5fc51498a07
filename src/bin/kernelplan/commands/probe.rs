//! `kernelplan probe` command

use anyhow::Result;

use super::Session;
use crate::cli::{InputArgs, ProbeArgs};

pub fn execute(args: ProbeArgs, inputs: &InputArgs) -> Result<()> {
    let session = Session::load(inputs)?;
    let prober = session.prober();
    let result = prober.probe()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match (&result.library_root, &result.runtime_library_filename) {
        (Some(root), runtime) => {
            println!("NVSHMEM found at {}", root.display());
            if let Some(runtime) = runtime {
                println!("  runtime library: {}", runtime);
            }
            if let Some(step) = &result.found_by {
                println!("  found by:        {}", step);
            }
        }
        (None, _) => {
            match &result.warning {
                Some(warning) => print!("{}", warning.to_diagnostic()),
                None => println!("NVSHMEM not found"),
            }
        }
    }

    println!();
    println!("Probe order: {}", prober.step_names().join(" -> "));

    Ok(())
}
