//! kernelplan - build plan resolver for the DeepEP native extension
//!
//! This crate probes for an NVSHMEM installation, resolves a consistent set
//! of feature flags from the probe result and user overrides, and assembles
//! a validated build plan for the `deep_ep_cpp` extension.

pub mod builder;
pub mod core;
pub mod ops;
pub mod probe;
pub mod resolver;
pub mod util;

pub use builder::{BuildPlan, PlanSummary};
pub use crate::core::{ArchGeneration, ArchList, FeatureFlags, FeatureOverrides, IndexWidth};
pub use ops::{resolve_plan, PlanError, Resolution};
pub use probe::{ProbeResult, Prober};
pub use resolver::{resolve_features, InvariantViolation};
pub use util::context::GlobalContext;
