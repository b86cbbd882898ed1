//! Built-in pseudo-functions.
//!
//! `name(...)` is looked up here before it becomes a plain proc call.
//! Built-ins with fixed shapes get their own AST nodes so later stages
//! never have to re-check arity.

use super::Parser;
use crate::frontend::ast::*;
use crate::frontend::scanner::RawToken;
use crate::frontend::token::TokenKind;
use crate::utils::errors::{ErrorCode, ParseError, ParseErrorKind, ParseResult};
use crate::utils::location::Span;

impl<I: Iterator<Item = RawToken>> Parser<I> {
    /// Parse a call to `name`; the current token is `(`.
    pub(super) fn call_builtin(&mut self, name: String, start: Span) -> ParseResult<Expr> {
        if name == "pick" {
            let values = self.pick_arguments()?;
            return Ok(Expr::new(ExprKind::Pick(values), start.merge(&self.previous.span)));
        }

        let args = self.call_parameters()?;
        let span = start.merge(&self.previous.span);
        let arity = |message: &str| ParseError::new(ParseErrorKind::InvalidArgumentCount, message, span);

        let kind = match name.as_str() {
            "list" => ExprKind::List(args),
            "newlist" => ExprKind::NewList(args),
            "addtext" => ExprKind::AddText(args),
            "gradient" => ExprKind::Gradient(args),
            "prob" => {
                let [arg] = exactly(args).map_err(|_| arity("prob() takes 1 argument"))?;
                if arg.key.is_some() {
                    return Err(arity("prob() does not take a named argument"));
                }
                ExprKind::Prob(Box::new(arg.value))
            }
            "input" => {
                let types = self.as_types(false)?;
                let list = if self.match_token(TokenKind::In) { Some(Box::new(self.expression()?)) } else { None };
                return Ok(Expr::new(ExprKind::Input { args, types, list }, start.merge(&self.previous.span)));
            }
            "initial" => ExprKind::Initial(single(args).map_err(|_| arity("initial() requires 1 argument"))?),
            "nameof" => ExprKind::NameOf(single(args).map_err(|_| arity("nameof() requires 1 argument"))?),
            "issaved" => ExprKind::IsSaved(single(args).map_err(|_| arity("issaved() requires 1 argument"))?),
            "isnull" => ExprKind::IsNull(single(args).map_err(|_| arity("isnull() requires 1 argument"))?),
            "length" => ExprKind::Length(single(args).map_err(|_| arity("length() requires 1 argument"))?),
            "arctan" if args.len() == 2 => {
                let [x, y] = exactly(args).map_err(|_| arity("arctan() requires 1 or 2 arguments"))?;
                ExprKind::ArcTan2 { x: Box::new(x.value), y: Box::new(y.value) }
            }
            "sin" | "cos" | "tan" | "arcsin" | "arccos" | "arctan" | "sqrt" | "abs" => {
                let message = format!("{}() requires 1 argument", name);
                let arg = single(args).map_err(|_| arity(&message))?;
                match MathFn::from_name(&name) {
                    Some(func) => ExprKind::Math { func, arg },
                    None => return Err(arity(&message)),
                }
            }
            "log" => match args.len() {
                1 => ExprKind::Log { value: single(args).map_err(|_| arity("log() requires 1 or 2 arguments"))?, base: None },
                2 => {
                    let [base, value] = exactly(args).map_err(|_| arity("log() requires 1 or 2 arguments"))?;
                    ExprKind::Log { value: Box::new(value.value), base: Some(Box::new(base.value)) }
                }
                _ => return Err(arity("log() requires 1 or 2 arguments")),
            },
            "istype" => match args.len() {
                1 => ExprKind::IsType { value: single(args).map_err(|_| arity("istype() requires 1 or 2 arguments"))?, ty: None },
                2 => {
                    let [value, ty] = exactly(args).map_err(|_| arity("istype() requires 1 or 2 arguments"))?;
                    ExprKind::IsType { value: Box::new(value.value), ty: Some(Box::new(ty.value)) }
                }
                _ => return Err(arity("istype() requires 1 or 2 arguments")),
            },
            "get_step" => {
                let [reference, dir] = exactly(args).map_err(|_| arity("get_step() requires 2 arguments"))?;
                ExprKind::GetStep { reference: Box::new(reference.value), dir: Box::new(dir.value) }
            }
            "get_dir" => {
                let [from, to] = exactly(args).map_err(|_| arity("get_dir() requires 2 arguments"))?;
                ExprKind::GetDir { from: Box::new(from.value), to: Box::new(to.value) }
            }
            "rgb" => {
                if !(3..=5).contains(&args.len()) {
                    return Err(arity("Expected 3 to 5 arguments for rgb()"));
                }
                ExprKind::Rgb(args)
            }
            "locate" => return self.locate(args, start),
            _ => ExprKind::ProcCall { target: CallTarget::Named(name), args },
        };
        Ok(Expr::new(kind, span))
    }

    /// `locate(x, y, z)`, `locate(type) in container`, `locate(tag)` or
    /// `locate() in container`.
    fn locate(&mut self, args: Vec<CallParameter>, start: Span) -> ParseResult<Expr> {
        if args.len() > 3 {
            return Err(ParseError::new(
                ParseErrorKind::InvalidArgumentCount,
                "locate() was given too many arguments",
                start.merge(&self.previous.span),
            ));
        }
        if args.len() == 3 {
            let span = start.merge(&self.previous.span);
            let [x, y, z] = exactly(args).map_err(|_| {
                ParseError::new(ParseErrorKind::InvalidArgumentCount, "locate() requires 3 coordinates", span)
            })?;
            return Ok(Expr::new(
                ExprKind::LocateCoordinates { x: Box::new(x.value), y: Box::new(y.value), z: Box::new(z.value) },
                span,
            ));
        }

        let mut args = args.into_iter().map(|arg| Box::new(arg.value));
        let ty = args.next();
        let mut container = args.next();
        if self.match_token(TokenKind::In) {
            container = Some(Box::new(self.expression()?));
        }
        Ok(Expr::new(ExprKind::Locate { ty, container }, start.merge(&self.previous.span)))
    }

    /// `pick(a, b)` or `pick(prob(10); a, 20; b)`.
    fn pick_arguments(&mut self) -> ParseResult<Vec<PickValue>> {
        let start = self.current.span;
        self.consume(TokenKind::LeftParen, "Expected '('")?;

        let mut values = Vec::new();
        while !self.check(TokenKind::RightParen) {
            let first = self.expression()?;
            let value = if self.match_token(TokenKind::Semicolon) {
                let value = self.expression()?;
                let weight = match first.kind {
                    ExprKind::Prob(probability) => *probability,
                    kind => {
                        self.diagnostics.emit(
                            ErrorCode::PickWeightedSyntax,
                            first.span,
                            "Use prob() to give a pick() weight",
                        );
                        Expr::new(kind, first.span)
                    }
                };
                PickValue { weight: Some(weight), value }
            } else {
                PickValue { weight: None, value: first }
            };
            values.push(value);

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')'")?;

        if values.is_empty() {
            return Err(ParseError::new(
                ParseErrorKind::ExpectedExpression,
                "Expected a pick argument",
                start.merge(&self.previous.span),
            ));
        }
        Ok(values)
    }
}

/// Destructure an argument list of exactly `N` entries.
fn exactly<const N: usize>(args: Vec<CallParameter>) -> Result<[CallParameter; N], Vec<CallParameter>> {
    <[CallParameter; N]>::try_from(args)
}

fn single(args: Vec<CallParameter>) -> Result<Box<Expr>, Vec<CallParameter>> {
    let [arg] = exactly(args)?;
    Ok(Box::new(arg.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::utils::diagnostics::Diagnostics;
    use crate::utils::location::FileId;

    fn parse(source: &str) -> (ParseResult<Expr>, Diagnostics) {
        let mut parser = Parser::from_source(source, FileId(0));
        let result = parser.parse_expression();
        (result, parser.into_diagnostics())
    }

    fn kind(source: &str) -> ExprKind {
        match parse(source).0 {
            Ok(expr) => expr.kind,
            Err(error) => panic!("failed to parse {:?}: {}", source, error),
        }
    }

    fn error_kind(source: &str) -> Option<ParseErrorKind> {
        parse(source).0.err().map(|e| e.kind)
    }

    #[test]
    fn test_list_constructors() {
        match kind("list(1, \"a\" = 2)") {
            ExprKind::List(args) => {
                assert_eq!(args.len(), 2);
                assert!(args[1].key.is_some());
            }
            other => panic!("Expected list, got {:?}", other),
        }
        assert!(matches!(kind("newlist(/obj)"), ExprKind::NewList(_)));
        assert!(matches!(kind("addtext(a, b)"), ExprKind::AddText(_)));
    }

    #[test]
    fn test_math_functions() {
        assert!(matches!(kind("sin(x)"), ExprKind::Math { func: MathFn::Sin, .. }));
        assert!(matches!(kind("arctan(x)"), ExprKind::Math { func: MathFn::ArcTan, .. }));
        assert!(matches!(kind("arctan(1, 2)"), ExprKind::ArcTan2 { .. }));
        assert_eq!(error_kind("sqrt(1, 2)"), Some(ParseErrorKind::InvalidArgumentCount));
    }

    #[test]
    fn test_log_argument_order() {
        match kind("log(10, 100)") {
            ExprKind::Log { value, base } => {
                assert_eq!(value.kind, ExprKind::Integer(100));
                assert_eq!(base.map(|b| b.kind), Some(ExprKind::Integer(10)));
            }
            other => panic!("Expected log, got {:?}", other),
        }
        assert!(matches!(kind("log(5)"), ExprKind::Log { base: None, .. }));
    }

    #[test]
    fn test_prob() {
        assert!(matches!(kind("prob(50)"), ExprKind::Prob(_)));
        assert_eq!(error_kind("prob(1, 2)"), Some(ParseErrorKind::InvalidArgumentCount));
        assert_eq!(error_kind("prob(p = 1)"), Some(ParseErrorKind::InvalidArgumentCount));
    }

    #[test]
    fn test_input_with_types_and_list() {
        match kind("input(usr, \"Pick\") as null|anything in choices") {
            ExprKind::Input { args, types, list } => {
                assert_eq!(args.len(), 2);
                assert_eq!(types, Some(ValueTypes::NULL));
                assert!(list.is_some());
            }
            other => panic!("Expected input, got {:?}", other),
        }
    }

    #[test]
    fn test_locate_forms() {
        assert!(matches!(kind("locate(1, 2, 3)"), ExprKind::LocateCoordinates { .. }));
        match kind("locate(/obj) in world") {
            ExprKind::Locate { ty, container } => {
                assert!(ty.is_some());
                assert!(container.is_some());
            }
            other => panic!("Expected locate, got {:?}", other),
        }
        assert!(matches!(kind("locate(\"tag\")"), ExprKind::Locate { container: None, .. }));
        assert_eq!(error_kind("locate(1, 2, 3, 4)"), Some(ParseErrorKind::InvalidArgumentCount));
    }

    #[test]
    fn test_pick() {
        match kind("pick(prob(10); \"a\", 20; \"b\", \"c\",)") {
            ExprKind::Pick(values) => {
                assert_eq!(values.len(), 3);
                assert_eq!(values[0].weight.as_ref().map(|w| w.kind.clone()), Some(ExprKind::Integer(10)));
                assert!(values[2].weight.is_none());
            }
            other => panic!("Expected pick, got {:?}", other),
        }
        let (_, diagnostics) = parse("pick(20; \"b\")");
        assert!(diagnostics.contains(ErrorCode::PickWeightedSyntax));
        assert_eq!(error_kind("pick()"), Some(ParseErrorKind::ExpectedExpression));
    }

    #[test]
    fn test_rgb_and_predicates() {
        assert!(matches!(kind("rgb(255, 0, 0)"), ExprKind::Rgb(_)));
        assert_eq!(error_kind("rgb(1, 2)"), Some(ParseErrorKind::InvalidArgumentCount));
        assert!(matches!(kind("istype(x, /mob)"), ExprKind::IsType { ty: Some(_), .. }));
        assert!(matches!(kind("istype(x)"), ExprKind::IsType { ty: None, .. }));
        assert!(matches!(kind("get_dir(a, b)"), ExprKind::GetDir { .. }));
        assert!(matches!(kind("isnull(x)"), ExprKind::IsNull(_)));
    }

    #[test]
    fn test_unknown_name_is_a_proc_call() {
        assert!(matches!(
            kind("world_log(1)"),
            ExprKind::ProcCall { target: CallTarget::Named(name), .. } if name == "world_log"
        ));
    }
}
