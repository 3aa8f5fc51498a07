//! kernelplan CLI - build plan resolver for the DeepEP native extension

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use kernelplan::builder::ExternalToolError;
use kernelplan::ops::PlanError;
use kernelplan::util::config::ConfigError;
use kernelplan::util::diagnostic::{emit, Diagnostic};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli) {
        match render(&e) {
            Some(diagnostic) => emit(&diagnostic, color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

/// Pipeline errors get a full diagnostic; anything else prints its chain.
fn render(e: &anyhow::Error) -> Option<Diagnostic> {
    if let Some(e) = e.downcast_ref::<PlanError>() {
        return Some(e.to_diagnostic());
    }
    if let Some(e) = e.downcast_ref::<ConfigError>() {
        return Some(e.to_diagnostic());
    }
    if let Some(ExternalToolError::Failed { .. }) = e.downcast_ref::<ExternalToolError>() {
        return Some(
            Diagnostic::error(e.to_string())
                .with_context("the build program's own output is shown above"),
        );
    }
    None
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("kernelplan=debug")
    } else {
        EnvFilter::new("kernelplan=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::Plan(args) => commands::plan::execute(args, &cli.inputs),
        Commands::Probe(args) => commands::probe::execute(args, &cli.inputs),
        Commands::Flags(args) => commands::flags::execute(args, &cli.inputs),
        Commands::Build(args) => commands::build::execute(args, &cli.inputs),
    }
}
