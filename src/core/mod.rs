//! Core data types: feature flags, architecture lists and overrides.

pub mod arch;
pub mod features;
pub mod overrides;

pub use arch::{ArchList, ArchListError};
pub use features::{ArchGeneration, FeatureFlags, IndexWidth};
pub use overrides::{AcceleratorOverride, FeatureOverrides, HardwareProfile};
