//! End-to-end tests: source text through parsing, folding, resolution and
//! proc compilation.

use dmfront::compile::{self, MemoryTree, Op, ProcFrame, RecordingEmitter, Resolver, ScopeMode, Termination};
use dmfront::frontend::ast::{self, ExprKind, StatementKind};
use dmfront::frontend::{parse_expression, parse_source, simplify, Lexer, Parser, TokenKind, TypePath};
use dmfront::ir::{self, DerefKind};
use dmfront::utils::{Diagnostics, ErrorCode, FileId, SemanticErrorKind};

fn compile_first(source: &str) -> (compile::CompiledProc, RecordingEmitter, Diagnostics) {
    let (file, mut diagnostics) = parse_source(source, FileId(0));
    let mut tree = MemoryTree::from_file(&file);
    let definition = file.procs().next().expect("source has a proc");
    let mut emitter = RecordingEmitter::new();
    let compiled = compile::compile_proc(&mut tree, definition, &mut emitter, &mut diagnostics);
    (compiled, emitter, diagnostics)
}

// ============================================================================
// Lexing
// ============================================================================

#[test]
fn test_indentation_balances() {
    let sources = [
        "/obj\n\tvar/a = 1\n\tproc/f()\n\t\tif (a)\n\t\t\treturn\n",
        "/mob\n    name = \"m\"\n    proc/g(x)\n        return x\n/turf\n",
        "/proc/f()\n\tvar/L = list(\n\t\t1,\n\t\t2)\n\treturn L\n",
    ];

    for source in sources {
        let mut lexer = Lexer::from_source(source, FileId(0));
        let mut indents = 0;
        let mut dedents = 0;
        for token in lexer.by_ref() {
            match token.kind {
                TokenKind::Indent => indents += 1,
                TokenKind::Dedent => dedents += 1,
                TokenKind::Eof => break,
                _ => {}
            }
        }
        assert_eq!(indents, dedents, "unbalanced indentation for {:?}", source);
        assert_eq!(lexer.indentation_levels(), &[0], "stack not reset for {:?}", source);
    }
}

#[test]
fn test_brackets_suppress_indentation() {
    let tokens = Lexer::from_source("f(1,\n\t2)\n", FileId(0)).tokenize();
    assert!(!tokens.iter().any(|t| matches!(t.kind, TokenKind::Indent | TokenKind::Dedent)));
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parser_recovers_between_statements() {
    let source = "/obj/first\n\tname = \"a\"\n/obj/broken = = 1\n/obj/second\n\tname = \"b\"\n";
    let (file, diagnostics) = parse_source(source, FileId(0));
    assert!(!diagnostics.is_empty());

    let paths: Vec<String> = file
        .flatten()
        .into_iter()
        .filter_map(|statement| match &statement.kind {
            StatementKind::ObjectDefinition { path, .. } => Some(path.to_string()),
            _ => None,
        })
        .collect();
    assert!(paths.contains(&"/obj/first".to_string()), "{:?}", paths);
    assert!(paths.contains(&"/obj/second".to_string()), "{:?}", paths);
}

#[test]
fn test_ternary_forms_agree() {
    fn parts(source: &str) -> (ast::Expr, ast::Expr, ast::Expr) {
        match parse_expression(source).unwrap().kind {
            ExprKind::Ternary { condition, then_expr, else_expr } => (*condition, *then_expr, *else_expr),
            other => panic!("expected ternary for {:?}, got {:?}", source, other),
        }
    }

    let (c1, t1, e1) = parts("a ? b.c : d");
    let (c2, t2, e2) = parts("a ? b.c:d");
    assert_eq!(c1.kind, c2.kind);
    assert_eq!(t1.kind, t2.kind);
    assert_eq!(e1.kind, e2.kind);
    assert!(matches!(t1.kind, ExprKind::Dereference { .. }));
    assert_eq!(e2.as_identifier(), Some("d"));
}

// ============================================================================
// Simplification
// ============================================================================

#[test]
fn test_constant_folding_examples() {
    assert_eq!(parse_expression("2 + 3").unwrap().kind, ExprKind::Integer(5));
    assert_eq!(parse_expression("7 / 2").unwrap().kind, ExprKind::Float(3.5));
    assert_eq!(parse_expression("6 / 2").unwrap().kind, ExprKind::Float(3.0));
    assert_eq!(parse_expression("\"a\" + \"b\"").unwrap().kind, ExprKind::String("ab".to_string()));
    assert_eq!(parse_expression("1 << 3").unwrap().kind, ExprKind::Integer(8));
}

#[test]
fn test_simplify_is_idempotent() {
    let source = "/obj/item\n\tvar/a = 1 + 2 * 3\n\tvar/b = \"x\" + \"y\"\n\tproc/f(x)\n\t\tif (!0 && x)\n\t\t\treturn (1 << 4) | x\n\t\treturn -(3 - 5)\n";
    let mut file = Parser::from_source(source, FileId(0)).parse_file();
    simplify(&mut file);
    let once = format!("{:?}", file);
    simplify(&mut file);
    assert_eq!(once, format!("{:?}", file));
}

// ============================================================================
// Resolution
// ============================================================================

const TYPES: &str = "/obj/item\n\tvar/weight = 1\n\tproc/use()\n\t\treturn\n";

fn resolve_in(mode: ScopeMode, expr: &str) -> (Result<ir::Expr, dmfront::utils::SemanticError>, Diagnostics) {
    let (file, _) = parse_source(TYPES, FileId(0));
    let tree = MemoryTree::from_file(&file);
    let owner = TypePath::parse("/obj/item");
    let mut frame = ProcFrame::new(owner.clone(), "use");
    frame.declare("list_var", Some(TypePath::parse("/list")), None);

    let mut diagnostics = Diagnostics::new();
    let parsed = parse_expression(expr).unwrap();
    let result = Resolver::new(&tree, &owner, Some(&frame), &mut diagnostics)
        .with_mode(mode)
        .resolve(&parsed, None);
    (result, diagnostics)
}

#[test]
fn test_index_makes_dereference_fuzzy() {
    let (result, diagnostics) = resolve_in(ScopeMode::Normal, "list_var[1].whatever");
    let resolved = result.unwrap();
    assert!(diagnostics.is_empty());
    assert!(resolved.fuzzy);
    match resolved.kind {
        ir::ExprKind::Dereference { ops, .. } => {
            assert!(matches!(&ops[1].kind, DerefKind::Field { name, search: true } if name == "whatever"));
        }
        other => panic!("expected a dereference, got {:?}", other),
    }
}

#[test]
fn test_static_mode_excludes_locals() {
    let (result, _) = resolve_in(ScopeMode::Static, "list_var");
    assert_eq!(result.unwrap_err().kind, SemanticErrorKind::UnknownIdentifier);

    let (result, _) = resolve_in(ScopeMode::Normal, "list_var");
    assert!(result.is_ok());
}

// ============================================================================
// Statement compilation
// ============================================================================

#[test]
fn test_code_after_constant_return_is_dead() {
    let (compiled, _, diagnostics) = compile_first("/proc/f()\n\tif (1) { return 1 } return 2\n");
    assert_eq!(compiled.termination, Termination::PROC_RETURN);
    assert!(diagnostics.contains(ErrorCode::UnreachableCode));
}

#[test]
fn test_constant_switch_compiles_one_case() {
    let (compiled, emitter, diagnostics) =
        compile_first("/proc/f()\n\tswitch (1) { if (1) return 1; else return 2 }\n");
    assert_eq!(compiled.termination, Termination::PROC_RETURN);
    assert!(diagnostics.contains(ErrorCode::UnreachableCode));

    let returns = emitter.ops().filter(|op| matches!(op, Op::Return)).count();
    assert_eq!(returns, 1);
    assert!(!emitter.ops().any(|op| matches!(op, Op::SwitchCase(_))));
}

#[test]
fn test_unreachable_reporting_can_be_disabled() {
    use dmfront::utils::FrontendConfig;
    use std::sync::Arc;

    let config = FrontendConfig { report_unreachable_code: false, ..Default::default() };
    let (file, mut diagnostics) = dmfront::frontend::parse_source_with(
        "/proc/f()\n\treturn 1\n\treturn 2\n",
        FileId(0),
        Diagnostics::with_config(Arc::new(config)),
    );
    let mut tree = MemoryTree::from_file(&file);
    let compiled = compile::compile_file(&file, &mut tree, &mut diagnostics);
    assert_eq!(compiled[0].0.termination, Termination::PROC_RETURN);
    assert!(!diagnostics.contains(ErrorCode::UnreachableCode));
}

#[test]
fn test_full_file() {
    let source = r#"
/mob
	var/health = 100
	var/list/items

	proc/heal(amount = 10)
		health += amount
		if (health > 100)
			health = 100
		return health

	verb/inventory()
		set name = "Inventory"
		set category = "Items"
		for (var/obj/o in items)
			usr << o.name

/obj
	var/name = "thing"
"#;
    let (file, mut diagnostics) = parse_source(source, FileId(0));
    let mut tree = MemoryTree::from_file(&file);
    compile::resolve_globals(&tree, &mut diagnostics);
    let compiled = compile::compile_file(&file, &mut tree, &mut diagnostics);

    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.iter().collect::<Vec<_>>());
    assert_eq!(compiled.len(), 2);

    let (heal, ops) = &compiled[0];
    assert_eq!(heal.path.to_string(), "/mob/proc/heal");
    assert_eq!(heal.termination, Termination::PROC_RETURN);
    assert!(ops.ops().any(|op| matches!(op, Op::IsNull)));

    let (inventory, _) = &compiled[1];
    assert_eq!(inventory.attributes.verb_name.as_deref(), Some("Inventory"));
    assert_eq!(inventory.attributes.verb_category, Some(Some("Items".to_string())));
    assert_eq!(tree.verbs(&TypePath::parse("/mob")).len(), 1);

}
