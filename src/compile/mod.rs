//! Expression resolution and proc compilation.
//!
//! - [`tree`]: the type tree the compiler queries
//! - [`resolve`]: AST expressions to [`ir::Expr`](crate::ir::Expr)
//! - [`stmt`]: proc bodies to [`emitter`] operations
//! - [`termination`], [`scope`], [`attributes`]: state tracked while
//!   compiling a proc

pub mod attributes;
pub mod emitter;
pub mod resolve;
pub mod scope;
pub mod stmt;
pub mod termination;
pub mod tree;

pub use attributes::{ProcAttributes, ProcFlags};
pub use emitter::{EnumeratorKind, Label, Op, ProcEmitter, RecordingEmitter};
pub use resolve::{Resolver, ScopeMode};
pub use scope::{LocalVar, ProcFrame};
pub use stmt::{CompiledProc, ProcCompiler};
pub use termination::Termination;
pub use tree::{GlobalVar, MemoryTree, ObjectTree, VarInfo};

use crate::frontend::ast::{File, ProcDefinition};
use crate::frontend::{parse_expression, TypePath};
use crate::ir;
use crate::utils::diagnostics::Diagnostics;
use crate::utils::errors::{CompileError, DmResult};

/// Compile one proc definition into `emitter`.
pub fn compile_proc(
    tree: &mut dyn ObjectTree,
    definition: &ProcDefinition,
    emitter: &mut dyn ProcEmitter,
    diagnostics: &mut Diagnostics,
) -> CompiledProc {
    let frame = ProcFrame::new(definition.object_path.to_absolute(), definition.name.clone());
    ProcCompiler::new(tree, frame, emitter, diagnostics).compile_definition(definition)
}

/// Compile every proc of a file, recording the operations of each.
pub fn compile_file(
    file: &File,
    tree: &mut dyn ObjectTree,
    diagnostics: &mut Diagnostics,
) -> Vec<(CompiledProc, RecordingEmitter)> {
    file.procs()
        .map(|definition| {
            let mut emitter = RecordingEmitter::new();
            let compiled = compile_proc(tree, definition, &mut emitter, diagnostics);
            (compiled, emitter)
        })
        .collect()
}

/// Resolve the initializers of every global var.
///
/// Each initializer is first tried with only global procs visible, so that
/// initializers which only call procs do not depend on other globals. The
/// ones that need more are resolved again in static scope, where all
/// globals are visible.
pub fn resolve_globals(tree: &MemoryTree, diagnostics: &mut Diagnostics) -> Vec<(usize, ir::Expr)> {
    let mut resolved = Vec::new();
    for global in tree.globals() {
        let Some(value) = &global.value else {
            continue;
        };

        let mut scratch = diagnostics.fork();
        let first_pass = Resolver::new(tree, &global.owner, None, &mut scratch)
            .with_mode(ScopeMode::FirstPassStatic)
            .resolve(value, global.ty.as_ref());
        let result = match first_pass {
            Ok(expr) => {
                diagnostics.append(scratch);
                Ok(expr)
            }
            Err(_) => Resolver::new(tree, &global.owner, None, diagnostics)
                .with_mode(ScopeMode::Static)
                .resolve(value, global.ty.as_ref()),
        };

        match result {
            Ok(expr) => resolved.push((global.id, expr)),
            Err(error) => diagnostics.push(error.into()),
        }
    }
    log::debug!("resolved {} global initializers", resolved.len());
    resolved
}

/// Parse and resolve a standalone value in static scope, such as a map or
/// config override, against `owner`.
pub fn evaluate_static(tree: &dyn ObjectTree, owner: &TypePath, text: &str) -> DmResult<ir::Expr> {
    let expr = parse_expression(text)?;
    let mut diagnostics = Diagnostics::new();
    let resolved = Resolver::new(tree, owner, None, &mut diagnostics)
        .with_mode(ScopeMode::Static)
        .resolve(&expr, None)?;
    if diagnostics.has_errors() {
        return Err(CompileError::Reported(diagnostics.error_count()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::utils::errors::ErrorCode;
    use crate::utils::location::FileId;

    #[test]
    fn test_compile_file() {
        let source = "/mob/proc/attack(target)\n\treturn target\n/mob/verb/wave()\n\tusr << \"waves\"\n";
        let file = Parser::from_source(source, FileId(0)).parse_file();
        let mut tree = MemoryTree::from_file(&file);
        let mut diagnostics = Diagnostics::new();
        let compiled = compile_file(&file, &mut tree, &mut diagnostics);

        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].0.path.to_string(), "/mob/proc/attack");
        assert_eq!(compiled[0].0.termination, Termination::PROC_RETURN);
        assert!(!compiled[1].1.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_resolve_globals() {
        let source = "var/a = 1\nvar/b = a + 1\nvar/c = helper()\nvar/d = missing\n/proc/helper()\n\treturn 1\n";
        let file = Parser::from_source(source, FileId(0)).parse_file();
        let tree = MemoryTree::from_file(&file);
        let mut diagnostics = Diagnostics::new();
        let resolved = resolve_globals(&tree, &mut diagnostics);

        assert_eq!(resolved.len(), 3);
        assert!(diagnostics.contains(ErrorCode::ItemDoesntExist));
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_evaluate_static() {
        let file = Parser::from_source("var/limit = 5\n/obj/item\n\tvar/weight = 1\n", FileId(0)).parse_file();
        let tree = MemoryTree::from_file(&file);
        let owner = TypePath::parse("/obj/item");

        assert!(evaluate_static(&tree, &owner, "limit * 2").is_ok());
        assert!(matches!(evaluate_static(&tree, &owner, "weight"), Err(CompileError::Semantic(_))));
        assert!(matches!(evaluate_static(&tree, &owner, "1 +"), Err(CompileError::Parse(_))));
    }
}
