//! High-level operations.
//!
//! This module contains the pipeline behind kernelplan commands.

pub mod resolve;
pub mod revision;

pub use resolve::{resolve_plan, PlanError, Resolution};
pub use revision::revision_tag;
