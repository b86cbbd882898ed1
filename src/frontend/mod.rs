//! Frontend: scanner, lexer, parser, AST and simplifier for DM.
//!
//! Source text flows through three layers before anything is resolved:
//!
//! ```text
//! text -> Scanner -> RawToken -> Lexer -> Token -> Parser -> ast::File
//! ```
//!
//! The [`Scanner`] produces the raw token vocabulary (whitespace, newlines,
//! punctuators, identifiers, numbers, strings). The [`Lexer`] classifies
//! keywords, merges multi-token operators and turns leading whitespace into
//! `Indent`/`Dedent` tokens. The [`Parser`] builds the AST, reporting
//! recoverable problems into a [`Diagnostics`] sink.
//!
//! ```text
//! /mob/proc/greet(name)
//!     if (!name)
//!         return
//!     world << "Hello, [name]!"
//! ```

pub mod scanner;
pub mod token;
pub mod lexer;
pub mod ast;
pub mod path;
pub mod parser;
pub mod simplify;

// Re-exports
pub use lexer::Lexer;
pub use parser::Parser;
pub use path::{PathKind, TypePath};
pub use scanner::{RawKind, RawToken, Scanner};
pub use simplify::{constant_truth, simplify, Simplify};
pub use token::{Token, TokenKind};
pub use crate::utils::errors::ParseError;

use crate::utils::diagnostics::Diagnostics;
use crate::utils::errors::ParseResult;
use crate::utils::location::FileId;

/// Parse a whole file and fold its constant expressions.
///
/// Never fails: problems are returned as diagnostics alongside whatever
/// could be parsed.
pub fn parse_source(text: &str, file: FileId) -> (ast::File, Diagnostics) {
    parse_source_with(text, file, Diagnostics::new())
}

/// Like [`parse_source`], reporting into an existing sink.
pub fn parse_source_with(text: &str, file: FileId, diagnostics: Diagnostics) -> (ast::File, Diagnostics) {
    let mut parser = Parser::with_diagnostics(Lexer::from_source(text, file), diagnostics);
    let mut tree = parser.parse_file();
    simplify(&mut tree);
    (tree, parser.into_diagnostics())
}

/// Parse a single expression, such as one embedded in a map file.
pub fn parse_expression(text: &str) -> ParseResult<ast::Expr> {
    let mut expr = Parser::from_source(text, FileId(0)).parse_expression()?;
    simplify(&mut expr);
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{ExprKind, StatementKind};

    #[test]
    fn test_parse_source() {
        let source = "/obj/item\n\tvar/weight = 2 * 3\n\tproc/use()\n\t\treturn weight\n";
        let (file, diagnostics) = parse_source(source, FileId(0));
        assert!(diagnostics.is_empty());
        assert_eq!(file.procs().count(), 1);

        let folded = file.flatten().into_iter().find_map(|statement| match &statement.kind {
            StatementKind::VarDefinition(var) => var.value.clone(),
            _ => None,
        });
        assert!(matches!(folded.map(|expr| expr.kind), Some(ExprKind::Integer(6))));
    }

    #[test]
    fn test_parse_expression() {
        let expr = parse_expression("1 << 3").unwrap();
        assert!(matches!(expr.kind, ExprKind::Integer(8)));
        assert!(parse_expression("1 +").is_err());
    }
}
