//! Statements inside proc bodies.

use super::Parser;
use crate::frontend::ast::*;
use crate::frontend::path::{PathKind, TypePath};
use crate::frontend::scanner::RawToken;
use crate::frontend::token::TokenKind;
use crate::utils::errors::{ErrorCode, ParseError, ParseErrorKind, ParseResult};
use crate::utils::location::Span;

impl<I: Iterator<Item = RawToken>> Parser<I> {
    /// Parse a braced or indented block, restoring the newline when neither
    /// follows.
    pub(super) fn proc_block(&mut self) -> ParseResult<Option<ProcBlock>> {
        let before = self.current.clone();
        let had_newline = self.newline();

        let block = if self.check(TokenKind::LeftCurly) {
            Some(self.braced_proc_block()?)
        } else if self.check(TokenKind::Indent) {
            Some(self.indented_proc_block()?)
        } else {
            None
        };

        if block.is_none() && had_newline {
            self.reuse_token(before);
        }
        Ok(block)
    }

    fn braced_proc_block(&mut self) -> ParseResult<ProcBlock> {
        let start = self.current.span;
        self.consume(TokenKind::LeftCurly, "Expected '{'")?;
        self.newline();

        if self.match_token(TokenKind::Indent) {
            let statements = self.proc_block_inner();
            if self.match_token(TokenKind::RightCurly) {
                // Closing brace written at the inner indentation.
                self.newline();
                self.match_token(TokenKind::Dedent);
            } else {
                self.consume(TokenKind::Dedent, "Expected end of braced block")?;
                self.newline();
                self.consume(TokenKind::RightCurly, "Expected '}'")?;
            }
            return Ok(ProcBlock::new(statements, start.merge(&self.previous.span)));
        }

        let mut statements = self.proc_block_inner();
        while !self.check(TokenKind::RightCurly) {
            if self.is_at_end() {
                return Err(self.error(ParseErrorKind::UnexpectedEof, "Expected '}'"));
            }
            let error = self.error(ParseErrorKind::UnexpectedToken, "Expected end of braced block");
            self.report(error);
            self.match_token(TokenKind::Dedent);
            self.locate_next_statement();
            self.delimiter();
            statements.extend(self.proc_block_inner());
        }
        self.advance();

        Ok(ProcBlock::new(statements, start.merge(&self.previous.span)))
    }

    fn indented_proc_block(&mut self) -> ParseResult<ProcBlock> {
        let start = self.current.span;
        self.consume(TokenKind::Indent, "Expected indented block")?;

        let mut statements = self.proc_block_inner();
        while !self.match_token(TokenKind::Dedent) {
            if self.is_at_end() {
                break;
            }
            let error = self.error(ParseErrorKind::UnexpectedToken, "Expected end of proc statement");
            self.report(error);
            if !self.match_token(TokenKind::RightCurly) {
                self.locate_next_statement();
            }
            self.delimiter();
            statements.extend(self.proc_block_inner());
        }

        Ok(ProcBlock::new(statements, start.merge(&self.previous.span)))
    }

    fn proc_block_inner(&mut self) -> Vec<ProcStatement> {
        let mut statements = Vec::new();
        loop {
            self.delimiter();
            if matches!(self.current.kind, TokenKind::Dedent | TokenKind::RightCurly | TokenKind::Eof) {
                break;
            }

            match self.proc_statement() {
                Ok(Some(statement)) => {
                    let is_label = matches!(statement.kind, ProcStatementKind::Label { .. });
                    statements.push(statement);
                    let closed_block = matches!(self.previous.kind, TokenKind::RightCurly | TokenKind::Dedent);
                    if !is_label && !closed_block && !self.at_statement_end() {
                        let error = self.error(ParseErrorKind::UnexpectedToken, "Expected end of proc statement");
                        self.report(error);
                        self.locate_next_statement();
                    }
                }
                Ok(None) => {
                    let error = self.error(ParseErrorKind::UnexpectedToken, "Expected a proc statement");
                    self.report(error);
                    self.locate_next_statement();
                }
                Err(error) => {
                    self.report(error);
                    self.locate_next_statement();
                }
            }
        }
        statements
    }

    /// A block, a single statement on the same line, or nothing.
    fn proc_body(&mut self) -> ParseResult<Option<ProcBlock>> {
        if let Some(block) = self.proc_block()? {
            return Ok(Some(block));
        }
        if self.at_statement_end() {
            return Ok(None);
        }
        Ok(self.proc_statement()?.map(ProcBlock::single))
    }

    fn proc_body_or_empty(&mut self) -> ParseResult<ProcBlock> {
        let span = self.previous.span;
        Ok(self.proc_body()?.unwrap_or_else(|| ProcBlock::new(Vec::new(), span)))
    }

    /// Parse one proc statement. Returns `None` when the current token
    /// cannot start a statement.
    pub(super) fn proc_statement(&mut self) -> ParseResult<Option<ProcStatement>> {
        let start = self.current.span;
        let leading_colon = self.match_token(TokenKind::Colon);

        let expression = if self.check(TokenKind::Var) { None } else { self.expression_opt()? };

        if leading_colon && !matches!(expression.as_ref().map(|e| &e.kind), Some(ExprKind::Identifier(_))) {
            return Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, "Expected a label identifier", start));
        }

        if let Some(expression) = expression {
            let span = start.merge(&expression.span);
            let kind = match expression.kind {
                ExprKind::Identifier(name) => {
                    if name == "sleep" && !leading_colon && !self.check(TokenKind::Colon) {
                        let delay = match self.expression_opt()? {
                            Some(delay) => delay,
                            None => Expr::null(span),
                        };
                        let call = ExprKind::ProcCall {
                            target: CallTarget::Named(name),
                            args: vec![CallParameter::positional(delay)],
                        };
                        ProcStatementKind::Expression(Expr::new(call, start.merge(&self.previous.span)))
                    } else {
                        self.match_token(TokenKind::Colon);
                        let body = self.proc_block()?;
                        ProcStatementKind::Label { name, body }
                    }
                }
                ExprKind::Binary { op: BinaryOp::RightShift, left, right } => {
                    ProcStatementKind::Input { source: *left, target: *right }
                }
                ExprKind::Binary { op: BinaryOp::LeftShift, left, right } => self.output_statement(*left, *right, span)?,
                kind => ProcStatementKind::Expression(Expr::new(kind, expression.span)),
            };
            return Ok(Some(ProcStatement::new(kind, start.merge(&self.previous.span))));
        }

        let kind = match self.current.kind {
            TokenKind::If => self.if_statement()?,
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() { None } else { self.expression_opt()? };
                ProcStatementKind::Return(value)
            }
            TokenKind::Var => self.var_statement()?,
            TokenKind::For => self.for_statement()?,
            TokenKind::Set => self.set_statement()?,
            TokenKind::Switch => self.switch_statement()?,
            TokenKind::Continue => {
                self.advance();
                ProcStatementKind::Continue(self.optional_label())
            }
            TokenKind::Break => {
                self.advance();
                ProcStatementKind::Break(self.optional_label())
            }
            TokenKind::Spawn => self.spawn_statement()?,
            TokenKind::While => self.while_statement()?,
            TokenKind::Do => self.do_while_statement()?,
            TokenKind::Throw => {
                self.advance();
                let value = if self.at_statement_end() { None } else { self.expression_opt()? };
                ProcStatementKind::Throw(value.unwrap_or_else(|| Expr::null(start)))
            }
            TokenKind::Del => {
                self.advance();
                let parenthesized = self.match_token(TokenKind::LeftParen);
                let value = self.expression_opt()?;
                let Some(value) = value else {
                    return Err(self.error(ParseErrorKind::ExpectedExpression, "Expected value to delete"));
                };
                if parenthesized {
                    self.consume(TokenKind::RightParen, "Expected ')'")?;
                }
                ProcStatementKind::Del(value)
            }
            TokenKind::Try => self.try_catch_statement()?,
            TokenKind::Goto => {
                self.advance();
                ProcStatementKind::Goto(self.consume_identifier("Expected a label")?)
            }
            _ => return Ok(None),
        };

        Ok(Some(ProcStatement::new(kind, start.merge(&self.previous.span))))
    }

    fn optional_label(&mut self) -> Option<String> {
        if self.check(TokenKind::Identifier) {
            let name = self.current.text.clone();
            self.advance();
            Some(name)
        } else {
            None
        }
    }

    /// `receiver << message`, special-cased for the browser and file
    /// transfer built-ins.
    fn output_statement(&mut self, receiver: Expr, message: Expr, span: Span) -> ParseResult<ProcStatementKind> {
        let (name, args) = match message.kind {
            ExprKind::ProcCall { target: CallTarget::Named(name), args }
                if matches!(name.as_str(), "browse" | "browse_rsc" | "output" | "ftp" | "link") =>
            {
                (name, args)
            }
            kind => {
                let message = Expr::new(kind, message.span);
                return Ok(ProcStatementKind::Output { receiver, message });
            }
        };

        let (min, max) = match name.as_str() {
            "output" => (2, 2),
            "link" => (1, 1),
            _ => (1, 2),
        };
        if args.len() < min || args.len() > max {
            let expected = if min == max { min.to_string() } else { format!("{} or {}", min, max) };
            return Err(ParseError::new(
                ParseErrorKind::InvalidArgumentCount,
                format!("{}() requires {} parameters", name, expected),
                span,
            ));
        }

        let mut values = args.into_iter().map(|a| a.value);
        let first = values.next().unwrap_or_else(|| Expr::null(span));
        let second = values.next().unwrap_or_else(|| Expr::null(span));
        Ok(match name.as_str() {
            "browse" => ProcStatementKind::Browse { receiver, body: first, options: second },
            "browse_rsc" => ProcStatementKind::BrowseResource { receiver, file: first, filename: second },
            "output" => ProcStatementKind::OutputControl { receiver, message: first, control: second },
            "ftp" => ProcStatementKind::Ftp { receiver, file: first, name: second },
            _ => ProcStatementKind::Link { receiver, url: first },
        })
    }

    // Declarations

    fn var_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::Var, "Expected 'var'")?;
        let start = self.previous.span;
        let mut declarations = Vec::new();
        self.proc_var_end(None, true, &mut declarations)?;

        match declarations.len() {
            0 => Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, "Expected a var declaration", start)),
            1 => Ok(declarations.remove(0).kind),
            _ => Ok(ProcStatementKind::Aggregate(declarations)),
        }
    }

    fn proc_var_end(
        &mut self,
        prefix: Option<&TypePath>,
        allow_multiple: bool,
        out: &mut Vec<ProcStatement>,
    ) -> ParseResult<()> {
        let path = self.path(false)?;
        let combined = match (prefix, path) {
            (Some(prefix), Some(path)) => Some(prefix.combine(&path)),
            (None, path) => path,
            (Some(_), None) => None,
        };

        if allow_multiple && self.proc_var_block(combined.as_ref(), out)? {
            return Ok(());
        }

        let Some(mut var_path) = combined.filter(|p| !p.elements.is_empty()) else {
            return Err(self.error(ParseErrorKind::ExpectedIdentifier, "Expected a var declaration"));
        };
        loop {
            let start = self.current.span;
            let mut value = self.path_array(&mut var_path)?;
            if self.match_token(TokenKind::Equals) {
                value = Some(self.expression()?);
            }
            let types = self.as_types(false)?.unwrap_or_default();
            let local = self.make_local_var(&var_path, value, types, start.merge(&self.previous.span))?;
            let span = local.span;
            out.push(ProcStatement::new(ProcStatementKind::VarDeclaration(Box::new(local)), span));

            if !(allow_multiple && self.match_token(TokenKind::Comma)) {
                break;
            }
            var_path = match self.path(false)? {
                Some(path) => path,
                None => return Err(self.error(ParseErrorKind::ExpectedIdentifier, "Expected a var declaration")),
            };
        }
        Ok(())
    }

    /// `var` followed by an indented or braced list of declarations.
    fn proc_var_block(&mut self, prefix: Option<&TypePath>, out: &mut Vec<ProcStatement>) -> ParseResult<bool> {
        let before = self.current.clone();
        let had_newline = self.newline();

        if self.match_token(TokenKind::Indent) {
            loop {
                self.delimiter();
                if self.match_token(TokenKind::Dedent) || self.is_at_end() {
                    break;
                }
                self.proc_var_end(prefix, true, out)?;
            }
            return Ok(true);
        }

        if self.match_token(TokenKind::LeftCurly) {
            self.newline();
            let indented = self.match_token(TokenKind::Indent);
            loop {
                self.delimiter();
                if matches!(self.current.kind, TokenKind::Dedent | TokenKind::RightCurly | TokenKind::Eof) {
                    break;
                }
                self.proc_var_end(prefix, true, out)?;
            }
            if indented {
                self.match_token(TokenKind::Dedent);
                self.newline();
            }
            self.consume(TokenKind::RightCurly, "Expected '}'")?;
            return Ok(true);
        }

        if had_newline {
            self.reuse_token(before);
        }
        Ok(false)
    }

    fn make_local_var(&self, path: &TypePath, value: Option<Expr>, types: ValueTypes, span: Span) -> ParseResult<LocalVar> {
        let Some((name, type_elements)) = path.elements.split_last() else {
            return Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, "Expected a var name", span));
        };
        let (modifiers, type_elements) = VarModifiers::split(type_elements);
        Ok(LocalVar {
            name: name.clone(),
            ty: (!type_elements.is_empty()).then(|| TypePath::new(PathKind::Absolute, type_elements)),
            value,
            modifiers,
            types,
            span,
        })
    }

    fn set_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::Set, "Expected 'set'")?;
        let start = self.previous.span;
        let mut sets = Vec::new();

        if !self.set_block(&mut sets)? {
            self.set_chain(&mut sets)?;
        }

        match sets.len() {
            0 => Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, "Expected set declaration", start)),
            1 => Ok(sets.remove(0).kind),
            _ => Ok(ProcStatementKind::Aggregate(sets)),
        }
    }

    fn set_block(&mut self, out: &mut Vec<ProcStatement>) -> ParseResult<bool> {
        let before = self.current.clone();
        let had_newline = self.newline();

        let braced = self.match_token(TokenKind::LeftCurly);
        if braced {
            self.newline();
        }
        let indented = self.match_token(TokenKind::Indent);
        if !braced && !indented {
            if had_newline {
                self.reuse_token(before);
            }
            return Ok(false);
        }

        loop {
            self.delimiter();
            if matches!(self.current.kind, TokenKind::Dedent | TokenKind::RightCurly | TokenKind::Eof) {
                break;
            }
            self.set_chain(out)?;
        }
        if indented {
            self.match_token(TokenKind::Dedent);
        }
        if braced {
            self.newline();
            self.consume(TokenKind::RightCurly, "Expected '}'")?;
        }
        Ok(true)
    }

    /// `name = value, name in value, ...`
    fn set_chain(&mut self, out: &mut Vec<ProcStatement>) -> ParseResult<()> {
        loop {
            let start = self.current.span;
            if !self.check(TokenKind::Identifier) {
                return Err(self.error(ParseErrorKind::ExpectedIdentifier, "Expected an identifier for set declaration"));
            }
            let attribute = self.current.text.clone();
            self.advance();

            let was_in = if self.match_token(TokenKind::Equals) {
                false
            } else if self.match_token(TokenKind::In) {
                true
            } else {
                return Err(self.error(ParseErrorKind::ExpectedToken, "Expected a 'in' or '=' for set declaration"));
            };
            let value = self.expression()?;

            let span = start.merge(&self.previous.span);
            out.push(ProcStatement::new(ProcStatementKind::Set { attribute, value, was_in }, span));
            if !self.match_token(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    // Control flow

    fn if_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::If, "Expected 'if'")?;
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let condition = self.expression()?;
        if matches!(condition.kind, ExprKind::Assign { op: AssignOp::Assign, .. }) {
            self.diagnostics.emit(ErrorCode::AssignmentInConditional, condition.span, "Assignment in conditional");
        }
        self.consume(TokenKind::RightParen, "Expected ')'")?;
        self.match_token(TokenKind::Colon);

        let body = self.proc_body_or_empty()?;

        let before = self.current.clone();
        let had_delimiter = self.delimiter();
        let else_body = if self.match_token(TokenKind::Else) {
            self.match_token(TokenKind::Colon);
            Some(self.proc_body_or_empty()?)
        } else {
            if had_delimiter {
                self.reuse_token(before);
            }
            None
        };

        Ok(ProcStatementKind::If { condition, body, else_body })
    }

    fn while_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::While, "Expected 'while'")?;
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "Expected ')'")?;
        self.match_token(TokenKind::Semicolon);

        let span = self.previous.span;
        let body = match self.proc_body()? {
            Some(body) => body,
            None => ProcBlock::single(ProcStatement::new(ProcStatementKind::Continue(None), span)),
        };
        Ok(ProcStatementKind::While { condition, body })
    }

    fn do_while_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::Do, "Expected 'do'")?;
        let body = match self.proc_body()? {
            Some(body) if !body.is_empty() => body,
            _ => {
                return Err(self.error(
                    ParseErrorKind::ExpectedExpression,
                    "Expected statement - do-while requires a non-empty block",
                ))
            }
        };

        self.delimiter();
        self.consume(TokenKind::While, "Expected 'while'")?;
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let condition = self.expression()?;
        self.consume(TokenKind::RightParen, "Expected ')'")?;
        Ok(ProcStatementKind::DoWhile { body, condition })
    }

    fn spawn_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::Spawn, "Expected 'spawn'")?;
        let mut delay = None;
        if self.match_token(TokenKind::LeftParen) && !self.match_token(TokenKind::RightParen) {
            delay = Some(self.expression()?);
            self.consume(TokenKind::RightParen, "Expected ')'")?;
        }

        let span = self.previous.span;
        let body = match self.proc_body()? {
            Some(body) => body,
            None => {
                self.diagnostics.emit(ErrorCode::BadExpression, span, "Expected body or statement");
                ProcBlock::new(Vec::new(), span)
            }
        };
        Ok(ProcStatementKind::Spawn { delay, body })
    }

    fn try_catch_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::Try, "Expected 'try'")?;
        let span = self.previous.span;
        let try_body = match self.proc_body()? {
            Some(body) => body,
            None => {
                self.diagnostics.emit(ErrorCode::BadExpression, span, "Expected body or statement");
                ProcBlock::new(Vec::new(), span)
            }
        };

        self.newline();
        self.consume(TokenKind::Catch, "Expected catch")?;

        let mut catch_variable = None;
        if self.match_token(TokenKind::LeftParen) {
            if self.match_token(TokenKind::Var) {
                let mut declarations = Vec::new();
                self.proc_var_end(None, false, &mut declarations)?;
                if let Some(ProcStatement { kind: ProcStatementKind::VarDeclaration(local), .. }) = declarations.pop() {
                    catch_variable = Some(local);
                }
            }
            self.consume(TokenKind::RightParen, "Expected ')'")?;
        }

        let catch_body = self.proc_body()?;
        Ok(ProcStatementKind::TryCatch { try_body, catch_variable, catch_body })
    }

    fn switch_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::Switch, "Expected 'switch'")?;
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let value = self.expression()?;
        self.consume(TokenKind::RightParen, "Expected ')'")?;

        self.newline();
        let braced = self.match_token(TokenKind::LeftCurly);
        if braced {
            self.newline();
        }
        let indented = self.match_token(TokenKind::Indent);
        if !braced && !indented {
            return Err(self.error(ParseErrorKind::ExpectedToken, "Expected switch cases"));
        }

        let mut cases = Vec::new();
        loop {
            self.delimiter();
            if matches!(self.current.kind, TokenKind::Dedent | TokenKind::RightCurly | TokenKind::Eof) {
                break;
            }
            match self.switch_case()? {
                Some(case) => cases.push(case),
                None => return Err(self.error(ParseErrorKind::UnexpectedToken, "Expected \"if\" or \"else\"")),
            }
        }

        if indented {
            self.consume(TokenKind::Dedent, "Expected \"if\" or \"else\"")?;
        }
        if braced {
            self.newline();
            self.consume(TokenKind::RightCurly, "Expected '}'")?;
        }
        Ok(ProcStatementKind::Switch { value, cases })
    }

    fn switch_case(&mut self) -> ParseResult<Option<SwitchCase>> {
        let start = self.current.span;

        let kind = if self.match_token(TokenKind::If) {
            self.consume(TokenKind::LeftParen, "Expected '('")?;
            let mut values = Vec::new();
            loop {
                let Some(value) = self.expression_opt()? else {
                    if values.is_empty() {
                        let span = self.current.span;
                        self.diagnostics.emit(ErrorCode::BadExpression, span, "Expected an expression");
                    }
                    break;
                };
                if self.match_token(TokenKind::To) {
                    let end = match self.expression_opt()? {
                        Some(end) => end,
                        None => {
                            let span = self.current.span;
                            self.diagnostics.emit(ErrorCode::BadExpression, span, "Expected an upper limit");
                            Expr::null(span)
                        }
                    };
                    values.push(SwitchValue::Range { start: value, end });
                } else {
                    values.push(SwitchValue::Single(value));
                }
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RightParen, "Expected ')'")?;
            SwitchCaseKind::Values(values)
        } else if self.match_token(TokenKind::Else) {
            if self.check(TokenKind::If) {
                let span = self.current.span;
                self.diagnostics.emit(
                    ErrorCode::SuspiciousSwitchCase,
                    span,
                    "Expected \"if\" or \"else\" - \"else if\" is ambiguous as a switch case and may cause unintended flow",
                );
            }
            SwitchCaseKind::Default
        } else {
            return Ok(None);
        };

        let body = self.proc_body_or_empty()?;
        Ok(Some(SwitchCase { kind, body, span: start.merge(&self.previous.span) }))
    }

    fn for_statement(&mut self) -> ParseResult<ProcStatementKind> {
        self.consume(TokenKind::For, "Expected 'for'")?;
        self.consume(TokenKind::LeftParen, "Expected '('")?;

        if self.match_token(TokenKind::RightParen) {
            return Ok(ProcStatementKind::InfLoop(self.for_body()?));
        }

        let saved = std::mem::replace(&mut self.allow_var_decl, true);
        let first = self.expression_opt();
        let types = first.is_ok().then(|| self.as_types(false));
        self.allow_var_decl = saved;
        let first = first?;
        let types = types.transpose()?.flatten();

        let first = match first {
            Some(first) => first,
            None if self.is_for_separator() => Expr::null(self.current.span),
            None => return Err(self.error(ParseErrorKind::ExpectedExpression, "Expected 1st expression in for")),
        };

        if self.match_token(TokenKind::To) {
            let ExprKind::Assign { op: AssignOp::Assign, target, value } = first.kind else {
                return Err(self.error(ParseErrorKind::InvalidSyntax, "Expected = before to in for"));
            };
            let end = self.expression()?;
            let step = if self.match_token(TokenKind::Step) { Some(self.expression()?) } else { None };
            self.consume(TokenKind::RightParen, "Expected ')' in for after to expression")?;
            let body = self.for_body()?;
            return Ok(ProcStatementKind::ForRange { variable: target, start: *value, end, step, body });
        }

        if self.match_token(TokenKind::In) {
            let list = self.expression()?;
            self.consume(TokenKind::RightParen, "Expected ')' in for after expression 2")?;
            let body = self.for_body()?;
            return Ok(ProcStatementKind::ForIn { variable: Box::new(first), types, list, body });
        }

        if !self.is_for_separator() {
            self.consume(TokenKind::RightParen, "Expected ')' in for after expression 1")?;
            let body = self.for_body()?;
            return Ok(match first.kind {
                ExprKind::In { value, container } => {
                    ProcStatementKind::ForIn { variable: value, types, list: *container, body }
                }
                ExprKind::InRange { value, start, end, step } => ProcStatementKind::ForRange {
                    variable: value,
                    start: *start,
                    end: *end,
                    step: step.map(|s| *s),
                    body,
                },
                ExprKind::VarDecl { ty: Some(_), .. } => ProcStatementKind::ForType { variable: Box::new(first), body },
                _ => ProcStatementKind::ForStandard {
                    init: Some(Box::new(first)),
                    condition: None,
                    increment: None,
                    body,
                },
            });
        }

        let init = (!matches!(first.kind, ExprKind::Null)).then(|| Box::new(first));
        self.advance();
        let mut condition = None;
        let mut increment = None;
        if !self.match_token(TokenKind::RightParen) {
            condition = self.expression_opt()?;
            if self.is_for_separator() {
                self.advance();
                if !self.check(TokenKind::RightParen) {
                    increment = self.expression_opt()?;
                }
            }
            self.consume(TokenKind::RightParen, "Expected ')' in for")?;
        }

        let body = self.for_body()?;
        Ok(ProcStatementKind::ForStandard { init, condition, increment, body })
    }

    fn is_for_separator(&self) -> bool {
        matches!(self.current.kind, TokenKind::Semicolon | TokenKind::Comma)
    }

    fn for_body(&mut self) -> ParseResult<ProcBlock> {
        let header = self.previous.span;
        if let Some(block) = self.proc_block()? {
            return Ok(block);
        }

        let span = self.current.span;
        let null_statement = || ProcBlock::single(ProcStatement::new(ProcStatementKind::Expression(Expr::null(span)), span));
        if self.match_token(TokenKind::Semicolon) {
            return Ok(null_statement());
        }
        if !self.at_statement_end() {
            if let Some(statement) = self.proc_statement()? {
                return Ok(ProcBlock::single(statement));
            }
        }
        self.diagnostics.emit(ErrorCode::BadExpression, header, "Expected body or statement");
        Ok(null_statement())
    }
}
