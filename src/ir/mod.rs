//! Intermediate representation shared by the resolver and the statement
//! compiler.
//!
//! - [`expr`]: resolved expressions, the hand-off from name resolution to
//!   statement lowering

pub mod expr;

pub use expr::{Argument, Builtin, DerefKind, DerefOp, Expr, ExprKind, ListEntry, PickEntry, ProcTarget};
