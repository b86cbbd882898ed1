//! # dmfront - a front end for DM compilers
//!
//! Turns DM (BYOND dialect) source into proc bytecode operations:
//! - Indentation-aware lexing
//! - Recursive-descent parsing with statement-level error recovery
//! - Constant folding over the AST
//! - Expression resolution against a type tree
//! - Statement lowering with termination tracking and dead-code detection
//!
//! ## Architecture
//!
//! ```text
//! Source → Scanner → Lexer → Parser → Simplifier → Resolver → Statement compiler → Emitter
//! ```
//!
//! The type tree ([`compile::ObjectTree`]) and the bytecode writer
//! ([`compile::ProcEmitter`]) are supplied by the host.
//! [`compile::MemoryTree`] and [`compile::RecordingEmitter`] are in-memory
//! versions of both.
//!
//! ## Example
//!
//! ```rust
//! use dmfront::prelude::*;
//!
//! let source = "/mob/proc/greet(name)\n\tif (!name)\n\t\treturn\n\tworld << \"Hello, [name]!\"\n";
//! let (file, mut diagnostics) = dmfront::parse_source(source, FileId(0));
//! let mut tree = MemoryTree::from_file(&file);
//! let compiled = dmfront::compile::compile_file(&file, &mut tree, &mut diagnostics);
//!
//! assert_eq!(compiled.len(), 1);
//! assert!(!diagnostics.has_errors());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod frontend;
pub mod ir;
pub mod compile;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::frontend::{parse_expression, parse_source, Lexer, Parser, TypePath};
    pub use crate::frontend::ast;
    pub use crate::compile::{
        compile_file, compile_proc, CompiledProc, MemoryTree, ObjectTree, Op, ProcEmitter,
        RecordingEmitter, Resolver, ScopeMode, Termination,
    };
    pub use crate::utils::config::FrontendConfig;
    pub use crate::utils::diagnostics::Diagnostics;
    pub use crate::utils::errors::*;
    pub use crate::utils::location::{FileId, Span};
}

pub use frontend::{parse_expression, parse_source};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
