//! Build planning.
//!
//! Assembles the plan for the `deep_ep_cpp` extension from resolved feature
//! flags, checks it, and hands it to an external toolchain.

pub mod invoker;
pub mod plan;
pub mod summary;
pub mod validate;

pub use invoker::{CommandInvoker, ExternalToolError, ToolchainInvoker};
pub use plan::{BuildPlan, CompileFlags, PlanInputs, SourceUnit};
pub use summary::PlanSummary;
pub use validate::validate;
