//! Constant folding over the AST.
//!
//! The pass rewrites operator nodes whose operands are literals into a single
//! literal, in place and bottom-up. Containers (`list()`, `new`, calls) are
//! walked but never collapsed. Running it twice is the same as running it once.

use crate::frontend::ast::*;

/// A node the simplifier can walk.
pub trait Simplify {
    /// Fold constant subexpressions in place.
    fn simplify(&mut self);
}

/// Fold constant subexpressions of `node` in place.
pub fn simplify<T: Simplify + ?Sized>(node: &mut T) {
    node.simplify();
}

impl Simplify for File {
    fn simplify(&mut self) {
        self.statements.iter_mut().for_each(Simplify::simplify);
    }
}

impl Simplify for Statement {
    fn simplify(&mut self) {
        match &mut self.kind {
            StatementKind::ObjectDefinition { body, .. } => body.iter_mut().for_each(Simplify::simplify),
            StatementKind::Aggregate(inner) => inner.iter_mut().for_each(Simplify::simplify),
            StatementKind::VarDefinition(def) => simplify_opt(&mut def.value),
            StatementKind::VarOverride { value, .. } => value.simplify(),
            StatementKind::ProcDefinition(def) => {
                for parameter in &mut def.parameters {
                    simplify_opt(&mut parameter.default);
                    simplify_opt(&mut parameter.possible_values);
                }
                if let Some(body) = &mut def.body {
                    body.simplify();
                }
            }
        }
    }
}

impl Simplify for ProcBlock {
    fn simplify(&mut self) {
        self.statements.iter_mut().for_each(Simplify::simplify);
    }
}

impl Simplify for ProcStatement {
    fn simplify(&mut self) {
        use ProcStatementKind::*;

        match &mut self.kind {
            Expression(expr) | Del(expr) | Throw(expr) => expr.simplify(),
            VarDeclaration(var) => simplify_opt(&mut var.value),
            Aggregate(inner) => inner.iter_mut().for_each(Simplify::simplify),
            Set { value, .. } => value.simplify(),
            Return(value) => simplify_opt(value),
            Break(_) | Continue(_) | Goto(_) => {}
            Label { body, .. } => {
                if let Some(body) = body {
                    body.simplify();
                }
            }
            If { condition, body, else_body } => {
                condition.simplify();
                body.simplify();
                if let Some(else_body) = else_body {
                    else_body.simplify();
                }
            }
            ForStandard { init, condition, increment, body } => {
                if let Some(init) = init {
                    init.simplify();
                }
                simplify_opt(condition);
                simplify_opt(increment);
                body.simplify();
            }
            ForIn { list, body, .. } => {
                list.simplify();
                body.simplify();
            }
            ForRange { start, end, step, body, .. } => {
                start.simplify();
                end.simplify();
                simplify_opt(step);
                body.simplify();
            }
            ForType { body, .. } | InfLoop(body) => body.simplify(),
            While { condition, body } | DoWhile { body, condition } => {
                condition.simplify();
                body.simplify();
            }
            Switch { value, cases } => {
                value.simplify();
                for case in cases {
                    if let SwitchCaseKind::Values(values) = &mut case.kind {
                        for value in values {
                            match value {
                                SwitchValue::Single(v) => v.simplify(),
                                SwitchValue::Range { start, end } => {
                                    start.simplify();
                                    end.simplify();
                                }
                            }
                        }
                    }
                    case.body.simplify();
                }
            }
            Spawn { delay, body } => {
                simplify_opt(delay);
                body.simplify();
            }
            TryCatch { try_body, catch_variable, catch_body } => {
                try_body.simplify();
                if let Some(var) = catch_variable {
                    simplify_opt(&mut var.value);
                }
                if let Some(catch_body) = catch_body {
                    catch_body.simplify();
                }
            }
            Output { receiver, message } => {
                receiver.simplify();
                message.simplify();
            }
            Input { source, target } => {
                source.simplify();
                target.simplify();
            }
            Browse { receiver, body, options } => {
                receiver.simplify();
                body.simplify();
                options.simplify();
            }
            BrowseResource { receiver, file, filename } => {
                receiver.simplify();
                file.simplify();
                filename.simplify();
            }
            OutputControl { receiver, message, control } => {
                receiver.simplify();
                message.simplify();
                control.simplify();
            }
            Ftp { receiver, file, name } => {
                receiver.simplify();
                file.simplify();
                name.simplify();
            }
            Link { receiver, url } => {
                receiver.simplify();
                url.simplify();
            }
        }
    }
}

impl Simplify for Expr {
    fn simplify(&mut self) {
        let folded = match &mut self.kind {
            ExprKind::Unary { op, operand } => {
                operand.simplify();
                fold_unary(*op, operand)
            }
            ExprKind::Binary { op, left, right } => {
                left.simplify();
                right.simplify();
                fold_binary(*op, left, right)
            }
            other => {
                simplify_children(other);
                None
            }
        };

        if let Some(kind) = folded {
            self.kind = kind;
        }
    }
}

fn simplify_opt(expr: &mut Option<Expr>) {
    if let Some(expr) = expr {
        expr.simplify();
    }
}

fn simplify_params(params: &mut [CallParameter]) {
    for param in params {
        if let Some(key) = &mut param.key {
            key.simplify();
        }
        param.value.simplify();
    }
}

/// Walk the children of a node that never folds itself.
fn simplify_children(kind: &mut ExprKind) {
    use ExprKind::*;

    match kind {
        Null | Integer(_) | Float(_) | String(_) | Resource(_) | Path(_) | UpwardPathSearch { .. } | Identifier(_)
        | SelfValue | VarDecl { .. } => {}
        Unary { operand, .. } => operand.simplify(),
        Binary { left, right, .. } => {
            left.simplify();
            right.simplify();
        }
        StringFormat { holes, .. } => {
            for hole in holes.iter_mut().flatten() {
                hole.simplify();
            }
        }
        Assign { target, value, .. } => {
            target.simplify();
            value.simplify();
        }
        Ternary { condition, then_expr, else_expr } => {
            condition.simplify();
            then_expr.simplify();
            else_expr.simplify();
        }
        In { value, container } => {
            value.simplify();
            container.simplify();
        }
        InRange { value, start, end, step } => {
            value.simplify();
            start.simplify();
            end.simplify();
            if let Some(step) = step {
                step.simplify();
            }
        }
        New { target, args } => {
            if let NewTarget::Expr(target) = target {
                target.simplify();
            }
            simplify_params(args);
        }
        Dereference { base, ops } => {
            base.simplify();
            for op in ops {
                match &mut op.kind {
                    DerefKind::Field { .. } => {}
                    DerefKind::Index(index) => index.simplify(),
                    DerefKind::Call { args, .. } => simplify_params(args),
                }
            }
        }
        ProcCall { args, .. } => simplify_params(args),
        DynamicCall { callee, args } => {
            simplify_params(callee);
            simplify_params(args);
        }
        Scope { base, call, .. } => {
            if let Some(base) = base {
                base.simplify();
            }
            if let Some(args) = call {
                simplify_params(args);
            }
        }
        List(args) | NewList(args) | AddText(args) | Gradient(args) | Rgb(args) => simplify_params(args),
        Pick(values) => {
            for value in values {
                if let Some(weight) = &mut value.weight {
                    weight.simplify();
                }
                value.value.simplify();
            }
        }
        Input { args, list, .. } => {
            simplify_params(args);
            if let Some(list) = list {
                list.simplify();
            }
        }
        Initial(inner) | NameOf(inner) | IsSaved(inner) | IsNull(inner) | Length(inner) | Prob(inner) => {
            inner.simplify()
        }
        Math { arg, .. } => arg.simplify(),
        ArcTan2 { x, y } => {
            x.simplify();
            y.simplify();
        }
        Log { value, base } => {
            value.simplify();
            if let Some(base) = base {
                base.simplify();
            }
        }
        IsType { value, ty } => {
            value.simplify();
            if let Some(ty) = ty {
                ty.simplify();
            }
        }
        GetStep { reference, dir } => {
            reference.simplify();
            dir.simplify();
        }
        GetDir { from, to } => {
            from.simplify();
            to.simplify();
        }
        Locate { ty, container } => {
            if let Some(ty) = ty {
                ty.simplify();
            }
            if let Some(container) = container {
                container.simplify();
            }
        }
        LocateCoordinates { x, y, z } => {
            x.simplify();
            y.simplify();
            z.simplify();
        }
    }
}

/// Truthiness of a literal, `None` when not known at compile time.
pub fn constant_truth(expr: &Expr) -> Option<bool> {
    match &expr.kind {
        ExprKind::Integer(v) => Some(*v != 0),
        ExprKind::Float(v) => Some(*v != 0.0),
        ExprKind::String(s) => Some(!s.is_empty()),
        ExprKind::Null => Some(false),
        ExprKind::Path(_) | ExprKind::Resource(_) => Some(true),
        _ => None,
    }
}

fn fold_unary(op: UnaryOp, operand: &Expr) -> Option<ExprKind> {
    match (op, &operand.kind) {
        (UnaryOp::Neg, ExprKind::Integer(v)) => Some(ExprKind::Integer(v.wrapping_neg())),
        (UnaryOp::Neg, ExprKind::Float(v)) => Some(ExprKind::Float(-v)),
        (UnaryOp::BitNot, ExprKind::Integer(v)) => Some(ExprKind::Integer(!v & 0xFF_FFFF)),
        (UnaryOp::Not, _) => constant_truth(operand).map(|truth| ExprKind::Integer(if truth { 0 } else { 1 })),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, left: &Expr, right: &Expr) -> Option<ExprKind> {
    use ExprKind::{Float, Integer};

    match op {
        BinaryOp::Or => match constant_truth(left)? {
            true => Some(left.kind.clone()),
            false if right.is_constant() => Some(right.kind.clone()),
            false => None,
        },
        BinaryOp::And => match constant_truth(left)? {
            false => Some(left.kind.clone()),
            true if right.is_constant() => Some(right.kind.clone()),
            true => None,
        },
        BinaryOp::Add => match (&left.kind, &right.kind) {
            (Integer(a), Integer(b)) => Some(Integer(a.wrapping_add(*b))),
            (ExprKind::String(a), ExprKind::String(b)) => Some(ExprKind::String(format!("{}{}", a, b))),
            _ => numeric_pair(left, right).map(|(a, b)| Float(a + b)),
        },
        BinaryOp::Mul => match (&left.kind, &right.kind) {
            (Integer(a), Integer(b)) => Some(Integer(a.wrapping_mul(*b))),
            _ => numeric_pair(left, right).map(|(a, b)| Float(a * b)),
        },
        BinaryOp::Div => {
            let (a, b) = numeric_pair(left, right)?;
            if b == 0.0 {
                return None;
            }
            Some(Float(a / b))
        }
        _ => {
            let (Integer(a), Integer(b)) = (&left.kind, &right.kind) else {
                return None;
            };
            fold_integers(op, *a, *b).map(Integer)
        }
    }
}

fn fold_integers(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Sub => Some(a.wrapping_sub(b)),
        BinaryOp::Mod => a.checked_rem(b),
        BinaryOp::LeftShift => u32::try_from(b).ok().and_then(|b| a.checked_shl(b)),
        BinaryOp::RightShift => u32::try_from(b).ok().and_then(|b| a.checked_shr(b)),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Power => u32::try_from(b).ok().and_then(|b| a.checked_pow(b)),
        _ => None,
    }
}

/// Both operands as numbers, when at least one side is a float.
fn numeric_pair(left: &Expr, right: &Expr) -> Option<(f64, f64)> {
    match (&left.kind, &right.kind) {
        (ExprKind::Integer(_) | ExprKind::Float(_), ExprKind::Integer(_) | ExprKind::Float(_)) => {
            Some((left.as_number()?, right.as_number()?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::utils::location::FileId;

    fn folded(source: &str) -> Expr {
        let mut expr = Parser::from_source(source, FileId(0)).parse_expression().unwrap();
        expr.simplify();
        expr
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(folded("2 + 3").kind, ExprKind::Integer(5));
        assert_eq!(folded("10 - 4 * 2").kind, ExprKind::Integer(2));
        assert_eq!(folded("7 % 4").kind, ExprKind::Integer(3));
        assert_eq!(folded("2 ** 10").kind, ExprKind::Integer(1024));
    }

    #[test]
    fn test_division_is_float() {
        assert_eq!(folded("7 / 2").kind, ExprKind::Float(3.5));
        assert_eq!(folded("6 / 2").kind, ExprKind::Float(3.0));
        assert!(matches!(folded("1 / 0").kind, ExprKind::Binary { op: BinaryOp::Div, .. }));
    }

    #[test]
    fn test_float_promotion() {
        assert_eq!(folded("1 + 0.5").kind, ExprKind::Float(1.5));
        assert_eq!(folded("2 * 1.5").kind, ExprKind::Float(3.0));
        // Subtraction only folds integer pairs.
        assert!(matches!(folded("2 - 0.5").kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(folded("\"a\" + \"b\"").kind, ExprKind::String("ab".to_string()));
        assert!(matches!(folded("\"a\" * 2").kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(folded("1 << 3").kind, ExprKind::Integer(8));
        assert_eq!(folded("16 >> 2").kind, ExprKind::Integer(4));
        assert_eq!(folded("6 & 3").kind, ExprKind::Integer(2));
        assert_eq!(folded("6 | 3").kind, ExprKind::Integer(7));
        assert_eq!(folded("6 ^ 3").kind, ExprKind::Integer(5));
        assert_eq!(folded("~0").kind, ExprKind::Integer(0xFF_FFFF));
    }

    #[test]
    fn test_logical() {
        assert_eq!(folded("!0").kind, ExprKind::Integer(1));
        assert_eq!(folded("!\"text\"").kind, ExprKind::Integer(0));
        assert_eq!(folded("0 && x").kind, ExprKind::Integer(0));
        assert_eq!(folded("1 || x").kind, ExprKind::Integer(1));
        assert_eq!(folded("2 && 3").kind, ExprKind::Integer(3));
        assert!(matches!(folded("1 && x").kind, ExprKind::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_nested_inside_calls() {
        let expr = folded("list(1 + 1, foo(2 * 3))");
        let ExprKind::List(args) = &expr.kind else { panic!("expected list, got {:?}", expr.kind) };
        assert_eq!(args[0].value.kind, ExprKind::Integer(2));
        let ExprKind::ProcCall { args: inner, .. } = &args[1].value.kind else { panic!("expected call") };
        assert_eq!(inner[0].value.kind, ExprKind::Integer(6));
    }

    #[test]
    fn test_comparisons_are_kept() {
        let expr = folded("1 + 1 == 2");
        let ExprKind::Binary { op, left, .. } = &expr.kind else { panic!("expected comparison") };
        assert_eq!(*op, BinaryOp::Equal);
        assert_eq!(left.kind, ExprKind::Integer(2));
    }

    #[test]
    fn test_idempotent() {
        let once = folded("(1 + 2) * x + \"a\" + \"b\" + (8 >> 1)");
        let mut twice = once.clone();
        twice.simplify();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_simplifies_proc_bodies() {
        let mut file = Parser::from_source("/proc/f()\n\treturn 2 + 3\n", FileId(0)).parse_file();
        simplify(&mut file);
        let body = file.procs().next().and_then(|p| p.body.clone()).unwrap();
        let ProcStatementKind::Return(Some(value)) = &body.statements[0].kind else { panic!("expected return") };
        assert_eq!(value.kind, ExprKind::Integer(5));
    }
}
