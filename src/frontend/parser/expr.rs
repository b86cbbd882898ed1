//! Expression parsing.
//!
//! One method per precedence level, lowest first. Each level parses the
//! next-higher level for its operands and loops while it sees one of its
//! own operators.

use super::Parser;
use crate::frontend::ast::*;
use crate::frontend::path::TypePath;
use crate::frontend::scanner::RawToken;
use crate::frontend::token::{TokenKind, TokenValue};
use crate::utils::errors::{ErrorCode, ParseError, ParseErrorKind, ParseResult};
use crate::utils::location::Span;

type Level<I> = fn(&mut Parser<I>) -> ParseResult<Expr>;

impl<I: Iterator<Item = RawToken>> Parser<I> {
    /// Parse an expression, failing if none starts here.
    pub(super) fn expression(&mut self) -> ParseResult<Expr> {
        match self.expression_opt()? {
            Some(expr) => Ok(expr),
            None => Err(self.error(ParseErrorKind::ExpectedExpression, "Expected an expression")),
        }
    }

    /// Parse an expression if the current token can start one.
    pub(super) fn expression_opt(&mut self) -> ParseResult<Option<Expr>> {
        if !self.can_start_expression() {
            return Ok(None);
        }
        self.assign().map(Some)
    }

    fn can_start_expression(&self) -> bool {
        use TokenKind::*;
        match self.current.kind {
            Integer | Float | String | Resource | RawString | StringBegin | Null => true,
            Identifier | Step | LeftParen | Slash | Period | SuperProc | Colon | DoubleColon | New | Call => true,
            Exclamation | Tilde | PlusPlus | MinusMinus | Minus | Plus => true,
            Var => self.allow_var_decl,
            _ => false,
        }
    }

    fn assign(&mut self) -> ParseResult<Expr> {
        let target = self.in_expr()?;
        let Some(op) = assign_op(self.current.kind) else {
            return Ok(target);
        };
        self.advance();
        let value = self.assign()?;
        let span = target.span.merge(&value.span);
        Ok(Expr::new(ExprKind::Assign { op, target: Box::new(target), value: Box::new(value) }, span))
    }

    /// `value in container` or `value in start to end step n`
    fn in_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.ternary()?;
        while self.match_token(TokenKind::In) {
            let container = self.ternary()?;
            if self.match_token(TokenKind::To) {
                let end = self.ternary()?;
                let step = if self.match_token(TokenKind::Step) { Some(Box::new(self.ternary()?)) } else { None };
                let span = expr.span.merge(&self.previous.span);
                expr = Expr::new(
                    ExprKind::InRange { value: Box::new(expr), start: Box::new(container), end: Box::new(end), step },
                    span,
                );
            } else {
                let span = expr.span.merge(&container.span);
                expr = Expr::new(ExprKind::In { value: Box::new(expr), container: Box::new(container) }, span);
            }
        }
        Ok(expr)
    }

    fn ternary(&mut self) -> ParseResult<Expr> {
        let condition = self.or()?;
        if !self.match_token(TokenKind::Question) {
            return Ok(condition);
        }

        let mut then_expr = self.ternary()?;
        let else_expr = if self.match_token(TokenKind::Colon) {
            self.ternary()?
        } else {
            // `a ? b:c` parses `b:c` as a search; the last link is the else branch.
            match unwind_search(&mut then_expr) {
                Some(else_expr) => else_expr,
                None => return Err(self.error(ParseErrorKind::ExpectedToken, "Expected ':'")),
            }
        };

        let span = condition.span.merge(&self.previous.span);
        Ok(Expr::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// Left-associative binary level.
    fn binary_level(&mut self, next: Level<I>, op_for: fn(TokenKind) -> Option<BinaryOp>) -> ParseResult<Expr> {
        let mut left = next(self)?;
        while let Some(op) = op_for(self.current.kind) {
            self.advance();
            let right = next(self)?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::and, |kind| (kind == TokenKind::BarBar).then_some(BinaryOp::Or))
    }

    fn and(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::bit_or, |kind| (kind == TokenKind::AndAnd).then_some(BinaryOp::And))
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::bit_xor, |kind| (kind == TokenKind::Bar).then_some(BinaryOp::BitOr))
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::bit_and, |kind| (kind == TokenKind::Xor).then_some(BinaryOp::BitXor))
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::equality, |kind| (kind == TokenKind::And).then_some(BinaryOp::BitAnd))
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::shift, |kind| match kind {
            TokenKind::EqualsEquals => Some(BinaryOp::Equal),
            TokenKind::ExclamationEquals => Some(BinaryOp::NotEqual),
            TokenKind::TildeEquals => Some(BinaryOp::Equivalent),
            TokenKind::TildeExclamation => Some(BinaryOp::NotEquivalent),
            _ => None,
        })
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::comparison, |kind| match kind {
            TokenKind::LeftShift => Some(BinaryOp::LeftShift),
            TokenKind::RightShift => Some(BinaryOp::RightShift),
            _ => None,
        })
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::term, |kind| match kind {
            TokenKind::LessThan => Some(BinaryOp::Less),
            TokenKind::LessThanEquals => Some(BinaryOp::LessEqual),
            TokenKind::GreaterThan => Some(BinaryOp::Greater),
            TokenKind::GreaterThanEquals => Some(BinaryOp::GreaterEqual),
            _ => None,
        })
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::factor, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::power, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Modulus => Some(BinaryOp::Mod),
            TokenKind::ModulusModulus => Some(BinaryOp::ModMod),
            _ => None,
        })
    }

    /// `**` is right-associative.
    fn power(&mut self) -> ParseResult<Expr> {
        let left = self.unary()?;
        if !self.match_token(TokenKind::StarStar) {
            return Ok(left);
        }
        let right = self.power()?;
        let span = left.span.merge(&right.span);
        Ok(Expr::new(ExprKind::Binary { op: BinaryOp::Power, left: Box::new(left), right: Box::new(right) }, span))
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let start = self.current.span;
        let op = match self.current.kind {
            TokenKind::Exclamation => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::PlusPlus => UnaryOp::PreIncrement,
            TokenKind::MinusMinus => UnaryOp::PreDecrement,
            _ => return self.sign(),
        };
        self.advance();
        let operand = if op.is_mutating() { self.postfix()? } else { self.unary()? };
        let span = start.merge(&operand.span);
        Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span))
    }

    /// Unary `-` and `+`. Negated number literals fold into the literal.
    fn sign(&mut self) -> ParseResult<Expr> {
        let start = self.current.span;
        if self.match_token(TokenKind::Plus) {
            return self.sign();
        }
        if !self.match_token(TokenKind::Minus) {
            return self.postfix();
        }

        let operand = self.sign()?;
        let span = start.merge(&operand.span);
        Ok(match operand.kind {
            ExprKind::Integer(value) => Expr::int_lit(value.wrapping_neg(), span),
            ExprKind::Float(value) => Expr::float_lit(-value, span),
            _ => Expr::new(ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }, span),
        })
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let expr = self.new_expr()?;
        let op = match self.current.kind {
            TokenKind::PlusPlus => UnaryOp::PostIncrement,
            TokenKind::MinusMinus => UnaryOp::PostDecrement,
            _ => return Ok(expr),
        };
        self.advance();
        let span = expr.span.merge(&self.previous.span);
        Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(expr) }, span))
    }

    fn new_expr(&mut self) -> ParseResult<Expr> {
        if !self.match_token(TokenKind::New) {
            let primary = self.primary()?;
            return self.dereference(primary, true);
        }

        let start = self.previous.span;
        let explicit_type = if self.check(TokenKind::LeftParen) { None } else { self.primary_opt(false)? };
        let target = match explicit_type {
            Some(type_expr) => match self.dereference(type_expr, false)? {
                Expr { kind: ExprKind::Path(path), .. } => NewTarget::Path(path),
                other => NewTarget::Expr(Box::new(other)),
            },
            None => NewTarget::Inferred,
        };
        let args = if self.check(TokenKind::LeftParen) { self.call_parameters()? } else { Vec::new() };

        let new_expr = Expr::new(ExprKind::New { target, args }, start.merge(&self.previous.span));
        self.dereference(new_expr, true)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.primary_opt(true)? {
            Some(expr) => Ok(expr),
            None => Err(self.error(ParseErrorKind::ExpectedExpression, "Expected an expression")),
        }
    }

    fn primary_opt(&mut self, allow_parens: bool) -> ParseResult<Option<Expr>> {
        let token = self.current.clone();
        let start = token.span;

        if matches!(token.kind, TokenKind::Slash | TokenKind::Colon | TokenKind::Period) {
            if let Some(path) = self.path(true)? {
                return self.path_expression(path, start).map(Some);
            }
        }

        let expr = match token.kind {
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression_opt()?;
                self.consume(TokenKind::RightParen, "Expected ')'")?;
                inner.unwrap_or_else(|| Expr::null(start.merge(&self.previous.span)))
            }
            TokenKind::Var if self.allow_var_decl => {
                let Some(path) = self.path(false)? else {
                    return Err(self.error(ParseErrorKind::ExpectedIdentifier, "Expected a var declaration"));
                };
                let (_, mut elements) = VarModifiers::split(&path.elements[1..]);
                let Some(name) = elements.pop() else {
                    return Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, "Expected a var name", start));
                };
                let ty = (!elements.is_empty()).then(|| TypePath::absolute(&elements));
                Expr::new(ExprKind::VarDecl { name, ty }, start.merge(&self.previous.span))
            }
            TokenKind::Integer => {
                self.advance();
                let value = match token.value {
                    TokenValue::Integer(value) => value,
                    _ => 0,
                };
                Expr::int_lit(value, start)
            }
            TokenKind::Float => {
                self.advance();
                let value = match token.value {
                    TokenValue::Float(value) => value,
                    _ => 0.0,
                };
                Expr::float_lit(value, start)
            }
            TokenKind::Null => {
                self.advance();
                Expr::null(start)
            }
            TokenKind::Resource => {
                self.advance();
                Expr::new(ExprKind::Resource(token.string_value().unwrap_or_default().to_string()), start)
            }
            TokenKind::RawString => {
                self.advance();
                Expr::string_lit(token.string_value().unwrap_or_default(), start)
            }
            TokenKind::String => {
                self.advance();
                self.string_literal(&token)
            }
            TokenKind::StringBegin => self.string_segments()?,
            TokenKind::Identifier | TokenKind::Step => {
                self.advance();
                if allow_parens && self.check(TokenKind::LeftParen) {
                    self.call_builtin(token.text, start)?
                } else {
                    Expr::ident(token.text, start)
                }
            }
            TokenKind::SuperProc => {
                self.advance();
                let args = self.call_parameters()?;
                Expr::new(ExprKind::ProcCall { target: CallTarget::SuperProc, args }, start.merge(&self.previous.span))
            }
            TokenKind::Period => {
                self.advance();
                if self.check(TokenKind::LeftParen) {
                    let args = self.call_parameters()?;
                    Expr::new(ExprKind::ProcCall { target: CallTarget::SelfProc, args }, start.merge(&self.previous.span))
                } else {
                    Expr::new(ExprKind::SelfValue, start)
                }
            }
            TokenKind::DoubleColon => {
                self.advance();
                self.scope_identifier(None, start)?
            }
            TokenKind::Call => {
                self.advance();
                let callee = self.call_parameters()?;
                if callee.is_empty() || callee.len() > 2 {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidArgumentCount,
                        "call() requires 1 or 2 parameters",
                        start.merge(&self.previous.span),
                    ));
                }
                let args = self.call_parameters()?;
                Expr::new(ExprKind::DynamicCall { callee, args }, start.merge(&self.previous.span))
            }
            _ => return Ok(None),
        };
        Ok(Some(expr))
    }

    /// A constant path, possibly followed by `.upward/search` and a
    /// `{...}` modified-type block.
    fn path_expression(&mut self, path: TypePath, start: Span) -> ParseResult<Expr> {
        let mut expr = if !self.current.space_before && self.match_token(TokenKind::Period) {
            let Some(search) = self.path(false)? else {
                return Err(self.error(ParseErrorKind::InvalidPath, "Expected a path for an upward search"));
            };
            Expr::new(ExprKind::UpwardPathSearch { base: path, search }, start.merge(&self.previous.span))
        } else {
            Expr::new(ExprKind::Path(path), start.merge(&self.previous.span))
        };

        if self.check(TokenKind::LeftCurly) {
            self.diagnostics.emit(
                ErrorCode::UnimplementedAccess,
                self.current.span,
                "Modified types are currently not supported and modified values will be ignored.",
            );
            while !self.check(TokenKind::RightCurly) && !self.is_at_end() {
                self.advance();
            }
            self.consume(TokenKind::RightCurly, "Expected '}'")?;
            expr.span = expr.span.merge(&self.previous.span);
        }
        Ok(expr)
    }

    /// Parse the postfix chain after `expr`: `.a`, `:b`, `[i]`, `?.c`, `::d`
    /// and, when `allow_calls`, calls on field links.
    pub(super) fn dereference(&mut self, expr: Expr, allow_calls: bool) -> ParseResult<Expr> {
        let mut base = expr;
        let mut ops: Vec<DerefOp> = Vec::new();

        loop {
            let token = self.current.clone();
            let attached = !token.space_before;
            let (search, safe) = match token.kind {
                TokenKind::LeftBracket | TokenKind::QuestionLeftBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.consume(TokenKind::RightBracket, "Expected ']'")?;
                    let safe = token.kind == TokenKind::QuestionLeftBracket;
                    let span = token.span.merge(&self.previous.span);

                    if allow_calls && self.check(TokenKind::LeftParen) {
                        self.diagnostics.emit(ErrorCode::BadToken, self.current.span, "Attempt to call an invalid l-value");
                        self.call_parameters()?;
                        return Ok(Expr::null(span));
                    }
                    ops.push(DerefOp { kind: DerefKind::Index(Box::new(index)), safe, span });
                    continue;
                }
                TokenKind::DoubleColon if attached => {
                    self.advance();
                    let start = base.span;
                    let flushed = wrap_dereference(base, std::mem::take(&mut ops));
                    base = self.scope_identifier(Some(flushed), start)?;
                    continue;
                }
                TokenKind::Period if attached => (false, false),
                TokenKind::QuestionPeriod if attached => (false, true),
                TokenKind::Colon if attached => {
                    let next_is_name = matches!(self.peek().kind, TokenKind::Identifier | TokenKind::Step);
                    if (base.is_constant() && ops.is_empty()) || !next_is_name {
                        break;
                    }
                    (true, false)
                }
                TokenKind::QuestionColon if attached => (true, true),
                _ => break,
            };
            self.advance();

            if !matches!(self.current.kind, TokenKind::Identifier | TokenKind::Step) {
                self.diagnostics.emit(ErrorCode::BadToken, self.current.span, "Identifier expected");
                return Ok(Expr::null(token.span));
            }
            let name = self.current.text.clone();
            self.advance();

            let kind = if allow_calls && self.check(TokenKind::LeftParen) {
                let args = self.call_parameters()?;
                DerefKind::Call { name, search, args }
            } else {
                DerefKind::Field { name, search }
            };
            ops.push(DerefOp { kind, safe, span: token.span.merge(&self.previous.span) });
        }

        Ok(wrap_dereference(base, ops))
    }

    /// `base::name`, `base::name(args)`, chained on further `::`. The
    /// leading `::` has been consumed.
    fn scope_identifier(&mut self, base: Option<Expr>, start: Span) -> ParseResult<Expr> {
        let mut base = base.map(Box::new);
        loop {
            if !matches!(self.current.kind, TokenKind::Identifier | TokenKind::Step) {
                self.diagnostics.emit(ErrorCode::BadToken, self.current.span, "Identifier expected");
                return Ok(Expr::null(start));
            }
            let name = self.current.text.clone();
            self.advance();
            let call = if self.check(TokenKind::LeftParen) { Some(self.call_parameters()?) } else { None };

            let scope = Expr::new(ExprKind::Scope { base, name, call }, start.merge(&self.previous.span));
            if !(self.check(TokenKind::DoubleColon) && !self.current.space_before) {
                return Ok(scope);
            }
            self.advance();
            base = Some(Box::new(scope));
        }
    }

    /// Parse `(a, key = b, , c)`. Empty slots before a comma become `null`.
    pub(super) fn call_parameters(&mut self) -> ParseResult<Vec<CallParameter>> {
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let saved = std::mem::replace(&mut self.allow_var_decl, false);
        let result = self.call_parameter_list();
        self.allow_var_decl = saved;
        let parameters = result?;
        self.consume(TokenKind::RightParen, "Expected ')'")?;
        Ok(parameters)
    }

    fn call_parameter_list(&mut self) -> ParseResult<Vec<CallParameter>> {
        let mut parameters = Vec::new();
        loop {
            let value = self.expression_opt()?;
            let comma = self.match_token(TokenKind::Comma);
            match value {
                Some(value) => parameters.push(keyed_parameter(value)),
                None if comma => parameters.push(CallParameter::positional(Expr::null(self.previous.span))),
                None => {}
            }
            if !comma {
                return Ok(parameters);
            }
        }
    }
}

fn assign_op(kind: TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Equals => AssignOp::Assign,
        TokenKind::AssignInto => AssignOp::AssignInto,
        TokenKind::PlusEquals => AssignOp::Add,
        TokenKind::MinusEquals => AssignOp::Sub,
        TokenKind::StarEquals => AssignOp::Mul,
        TokenKind::SlashEquals => AssignOp::Div,
        TokenKind::ModulusEquals => AssignOp::Mod,
        TokenKind::ModulusModulusEquals => AssignOp::ModMod,
        TokenKind::BarEquals => AssignOp::BitOr,
        TokenKind::AndEquals => AssignOp::BitAnd,
        TokenKind::XorEquals => AssignOp::BitXor,
        TokenKind::BarBarEquals => AssignOp::LogicalOr,
        TokenKind::AndAndEquals => AssignOp::LogicalAnd,
        TokenKind::LeftShiftEquals => AssignOp::LeftShift,
        TokenKind::RightShiftEquals => AssignOp::RightShift,
        _ => return None,
    })
}

/// `key = value` in an argument list names the argument.
fn keyed_parameter(value: Expr) -> CallParameter {
    match value.kind {
        ExprKind::Assign { op: AssignOp::Assign, target, value } => {
            let key = match target.kind {
                ExprKind::Identifier(name) => Expr::string_lit(name, target.span),
                ExprKind::Null => Expr::string_lit("null", target.span),
                _ => *target,
            };
            CallParameter { key: Some(key), value: *value }
        }
        kind => CallParameter::positional(Expr::new(kind, value.span)),
    }
}

fn wrap_dereference(base: Expr, ops: Vec<DerefOp>) -> Expr {
    if ops.is_empty() {
        return base;
    }
    let span = ops.last().map_or(base.span, |op| base.span.merge(&op.span));
    Expr::new(ExprKind::Dereference { base: Box::new(base), ops }, span)
}

/// Pop the trailing search link off the right edge of `expr`, turning it
/// into a standalone expression.
fn unwind_search(expr: &mut Expr) -> Option<Expr> {
    match &mut expr.kind {
        ExprKind::Binary { right, .. } => unwind_search(right),
        ExprKind::Unary { op, operand } if !matches!(op, UnaryOp::PostIncrement | UnaryOp::PostDecrement) => {
            unwind_search(operand)
        }
        ExprKind::Dereference { ops, .. } => {
            let last = ops.last()?;
            let is_search = matches!(
                last.kind,
                DerefKind::Field { search: true, .. } | DerefKind::Call { search: true, .. }
            );
            if !is_search || last.safe {
                return None;
            }
            let op = ops.pop()?;
            let emptied = ops.is_empty();
            let unwound = match op.kind {
                DerefKind::Field { name, .. } => Expr::ident(name, op.span),
                DerefKind::Call { name, args, .. } => {
                    Expr::new(ExprKind::ProcCall { target: CallTarget::Named(name), args }, op.span)
                }
                DerefKind::Index(_) => return None,
            };
            if emptied {
                if let ExprKind::Dereference { base, .. } = std::mem::replace(&mut expr.kind, ExprKind::Null) {
                    *expr = *base;
                }
            }
            Some(unwound)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::Parser;
    use crate::utils::diagnostics::Diagnostics;
    use crate::utils::location::FileId;

    fn parse_expr(source: &str) -> Expr {
        let mut parser = Parser::from_source(source, FileId(0));
        match parser.parse_expression() {
            Ok(expr) => expr,
            Err(error) => panic!("failed to parse {:?}: {}", source, error),
        }
    }

    fn parse_with_diagnostics(source: &str) -> (ParseResult<Expr>, Diagnostics) {
        let mut parser = Parser::from_source(source, FileId(0));
        let result = parser.parse_expression();
        (result, parser.into_diagnostics())
    }

    fn ternary_parts(expr: Expr) -> (Expr, Expr, Expr) {
        match expr.kind {
            ExprKind::Ternary { condition, then_expr, else_expr } => (*condition, *then_expr, *else_expr),
            other => panic!("Expected ternary, got {:?}", other),
        }
    }

    fn is_field_chain(expr: &Expr, base_name: &str, field: &str) -> bool {
        match &expr.kind {
            ExprKind::Dereference { base, ops } => {
                base.as_identifier() == Some(base_name)
                    && ops.len() == 1
                    && matches!(&ops[0].kind, DerefKind::Field { name, search: false } if name == field)
            }
            _ => false,
        }
    }

    #[test]
    fn test_precedence_ladder() {
        let expr = parse_expr("a || b && c | d == e << f < g + h * i ** j");
        let ExprKind::Binary { op: BinaryOp::Or, right, .. } = expr.kind else {
            panic!("Expected || at the root");
        };
        let ExprKind::Binary { op: BinaryOp::And, right, .. } = right.kind else {
            panic!("Expected && below ||");
        };
        let ExprKind::Binary { op: BinaryOp::BitOr, right, .. } = right.kind else {
            panic!("Expected | below &&");
        };
        let ExprKind::Binary { op: BinaryOp::Equal, right, .. } = right.kind else {
            panic!("Expected == below |");
        };
        let ExprKind::Binary { op: BinaryOp::LeftShift, right, .. } = right.kind else {
            panic!("Expected << below ==");
        };
        let ExprKind::Binary { op: BinaryOp::Less, right, .. } = right.kind else {
            panic!("Expected < below <<");
        };
        let ExprKind::Binary { op: BinaryOp::Add, right, .. } = right.kind else {
            panic!("Expected + below <");
        };
        let ExprKind::Binary { op: BinaryOp::Mul, right, .. } = right.kind else {
            panic!("Expected * below +");
        };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Power, .. }));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse_expr("a = b += 1");
        match expr.kind {
            ExprKind::Assign { op: AssignOp::Assign, value, .. } => {
                assert!(matches!(value.kind, ExprKind::Assign { op: AssignOp::Add, .. }));
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse_expr("2 ** 3 ** 2");
        match expr.kind {
            ExprKind::Binary { op: BinaryOp::Power, left, right } => {
                assert_eq!(left.kind, ExprKind::Integer(2));
                assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Power, .. }));
            }
            other => panic!("Expected power, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_literals_fold() {
        assert_eq!(parse_expr("-5").kind, ExprKind::Integer(-5));
        assert_eq!(parse_expr("-2.5").kind, ExprKind::Float(-2.5));
        assert!(matches!(parse_expr("-x").kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
        assert_eq!(parse_expr("+7").kind, ExprKind::Integer(7));
    }

    #[test]
    fn test_increments() {
        assert!(matches!(parse_expr("++i").kind, ExprKind::Unary { op: UnaryOp::PreIncrement, .. }));
        assert!(matches!(parse_expr("i--").kind, ExprKind::Unary { op: UnaryOp::PostDecrement, .. }));
        assert!(matches!(parse_expr("!~x").kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_in_and_range() {
        assert!(matches!(parse_expr("x in L").kind, ExprKind::In { .. }));
        match parse_expr("x in 1 to 10 step 2").kind {
            ExprKind::InRange { step, .. } => assert!(step.is_some()),
            other => panic!("Expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary_with_spaced_colon() {
        let (condition, then_expr, else_expr) = ternary_parts(parse_expr("a ? b.c : d"));
        assert_eq!(condition.kind, ExprKind::Identifier("a".to_string()));
        assert!(matches!(then_expr.kind, ExprKind::Dereference { .. }));
        assert_eq!(else_expr.kind, ExprKind::Identifier("d".to_string()));
    }

    #[test]
    fn test_ternary_unwinds_search_chain() {
        for source in ["a ? b.c : d", "a ? b.c:d"] {
            let (condition, then_expr, else_expr) = ternary_parts(parse_expr(source));
            assert_eq!(condition.as_identifier(), Some("a"), "{}", source);
            assert!(is_field_chain(&then_expr, "b", "c"), "{}: {:?}", source, then_expr);
            assert_eq!(else_expr.as_identifier(), Some("d"), "{}", source);
        }
    }

    #[test]
    fn test_ternary_unwinds_to_base() {
        let (_, then_expr, else_expr) = ternary_parts(parse_expr("a ? b:c"));
        assert_eq!(then_expr.kind, ExprKind::Identifier("b".to_string()));
        assert_eq!(else_expr.kind, ExprKind::Identifier("c".to_string()));
    }

    #[test]
    fn test_ternary_with_constant_branches() {
        let (_, then_expr, else_expr) = ternary_parts(parse_expr("a ? 1:2"));
        assert_eq!(then_expr.kind, ExprKind::Integer(1));
        assert_eq!(else_expr.kind, ExprKind::Integer(2));
    }

    #[test]
    fn test_ternary_without_else_fails() {
        let (result, _) = parse_with_diagnostics("a ? b.c");
        let error = result.expect_err("missing else should fail");
        assert_eq!(error.message, "Expected ':'");
    }

    #[test]
    fn test_dereference_chain() {
        match parse_expr("src.loc:contents[1]?.name").kind {
            ExprKind::Dereference { base, ops } => {
                assert_eq!(base.kind, ExprKind::Identifier("src".to_string()));
                assert_eq!(ops.len(), 4);
                assert!(matches!(&ops[0].kind, DerefKind::Field { name, search: false } if name == "loc"));
                assert!(matches!(&ops[1].kind, DerefKind::Field { name, search: true } if name == "contents"));
                assert!(matches!(ops[2].kind, DerefKind::Index(_)));
                assert!(ops[3].safe);
            }
            other => panic!("Expected dereference, got {:?}", other),
        }
    }

    #[test]
    fn test_method_calls() {
        match parse_expr("usr.client.foo(1, 2)").kind {
            ExprKind::Dereference { ops, .. } => {
                assert!(matches!(&ops[1].kind, DerefKind::Call { name, args, .. } if name == "foo" && args.len() == 2));
            }
            other => panic!("Expected dereference, got {:?}", other),
        }
    }

    #[test]
    fn test_calling_an_index_is_an_error() {
        let (result, diagnostics) = parse_with_diagnostics("L[1](2)");
        assert_eq!(result.map(|e| e.kind).ok(), Some(ExprKind::Null));
        assert!(diagnostics.contains(ErrorCode::BadToken));
    }

    #[test]
    fn test_new_forms() {
        match parse_expr("new /obj/item(src, 5)").kind {
            ExprKind::New { target: NewTarget::Path(path), args } => {
                assert_eq!(path.to_string(), "/obj/item");
                assert_eq!(args.len(), 2);
            }
            other => panic!("Expected new path, got {:?}", other),
        }
        assert!(matches!(parse_expr("new T").kind, ExprKind::New { target: NewTarget::Expr(_), .. }));
        assert!(matches!(parse_expr("new()").kind, ExprKind::New { target: NewTarget::Inferred, .. }));
    }

    #[test]
    fn test_self_and_super_calls() {
        assert!(matches!(parse_expr("..()").kind, ExprKind::ProcCall { target: CallTarget::SuperProc, .. }));
        assert!(matches!(parse_expr(".(1)").kind, ExprKind::ProcCall { target: CallTarget::SelfProc, .. }));
        assert_eq!(parse_expr(".").kind, ExprKind::SelfValue);
    }

    #[test]
    fn test_call_parameters() {
        match parse_expr("f(a, , name = 2, null = 3,)").kind {
            ExprKind::ProcCall { target: CallTarget::Named(name), args } => {
                assert_eq!(name, "f");
                assert_eq!(args.len(), 4);
                assert_eq!(args[1].value.kind, ExprKind::Null);
                assert_eq!(args[2].key.as_ref().map(|k| k.kind.clone()), Some(ExprKind::String("name".to_string())));
                assert_eq!(args[3].key.as_ref().map(|k| k.kind.clone()), Some(ExprKind::String("null".to_string())));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_call() {
        assert!(matches!(parse_expr("call(src, \"proc\")(1)").kind, ExprKind::DynamicCall { .. }));
        let (result, _) = parse_with_diagnostics("call()(1)");
        assert_eq!(result.map_err(|e| e.kind).err(), Some(ParseErrorKind::InvalidArgumentCount));
    }

    #[test]
    fn test_lookahead_skips_error_tokens() {
        let (result, diagnostics) = parse_with_diagnostics("a:$b");
        match result.map(|expr| expr.kind) {
            Ok(ExprKind::Dereference { ops, .. }) => {
                assert!(matches!(&ops[0].kind, DerefKind::Field { name, search: true } if name == "b"));
            }
            other => panic!("Expected a search dereference, got {:?}", other),
        }
        assert!(diagnostics.contains(ErrorCode::BadToken));
    }

    #[test]
    fn test_scope_operator() {
        match parse_expr("/obj::name").kind {
            ExprKind::Scope { base, name, call } => {
                assert!(matches!(base.map(|b| b.kind), Some(ExprKind::Path(_))));
                assert_eq!(name, "name");
                assert!(call.is_none());
            }
            other => panic!("Expected scope, got {:?}", other),
        }
        assert!(matches!(parse_expr("::foo()").kind, ExprKind::Scope { base: None, call: Some(_), .. }));
    }

    #[test]
    fn test_paths() {
        assert!(matches!(parse_expr("/obj/item").kind, ExprKind::Path(_)));
        match parse_expr("/obj.proc/foo").kind {
            ExprKind::UpwardPathSearch { base, search } => {
                assert_eq!(base.to_string(), "/obj");
                assert_eq!(search.to_string(), "proc/foo");
            }
            other => panic!("Expected upward search, got {:?}", other),
        }
    }

    #[test]
    fn test_modified_type_warns() {
        let (result, diagnostics) = parse_with_diagnostics("/obj{name = \"x\"}");
        assert!(matches!(result.map(|e| e.kind), Ok(ExprKind::Path(_))));
        assert!(diagnostics.contains(ErrorCode::UnimplementedAccess));
    }

    #[test]
    fn test_missing_expression() {
        let (result, _) = parse_with_diagnostics("1 +");
        assert_eq!(result.map_err(|e| e.kind).err(), Some(ParseErrorKind::ExpectedExpression));
    }
}
