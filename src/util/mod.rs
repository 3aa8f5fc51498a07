//! Shared utilities

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod hash;
pub mod process;

pub use config::{BuildConfig, ConfigError};
pub use context::GlobalContext;
pub use diagnostic::Diagnostic;
