//! Utility modules shared by every stage.
//!
//! - Error types and diagnostic codes
//! - Diagnostic accumulation
//! - Front-end configuration
//! - Source location tracking

pub mod errors;
pub mod diagnostics;
pub mod config;
pub mod location;

// Re-exports
pub use errors::*;
pub use diagnostics::Diagnostics;
pub use config::FrontendConfig;
pub use location::{FileId, SourceLocation, SourceMap, Span};
