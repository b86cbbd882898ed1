//! Recursive descent parser for DM.
//!
//! The parser pulls [`Token`]s from a [`Lexer`] and builds the AST in
//! [`crate::frontend::ast`]. It is split by grammar level:
//!
//! - this module: token plumbing, recovery, paths, object-level statements
//! - [`proc_stmt`]: statements inside proc bodies
//! - [`expr`]: the expression precedence ladder and dereference chains
//! - [`builtins`]: built-in pseudo-functions such as `locate` and `pick`
//! - [`string`]: interpolated string literals
//!
//! A malformed statement never aborts the file. The failing statement is
//! reported to the [`Diagnostics`] sink and the parser skips to the next
//! statement boundary before resuming.

mod builtins;
mod expr;
mod proc_stmt;
pub mod string;

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::path::{PathKind, TypePath};
use crate::frontend::scanner::{RawToken, Scanner};
use crate::frontend::token::{Token, TokenKind, TokenValue};
use crate::utils::diagnostics::Diagnostics;
use crate::utils::errors::{ErrorCode, ParseError, ParseErrorKind, ParseResult};
use crate::utils::location::{FileId, Span};

/// Tokens that may appear as a segment of a type path.
const PATH_ELEMENT_KINDS: &[TokenKind] = &[
    TokenKind::Identifier,
    TokenKind::Var,
    TokenKind::Proc,
    TokenKind::Step,
    TokenKind::Throw,
    TokenKind::Null,
    TokenKind::Switch,
    TokenKind::Spawn,
    TokenKind::Do,
    TokenKind::While,
    TokenKind::For,
];

/// Operators that can follow `operator` in an overload's path.
const OPERATOR_OVERLOAD_KINDS: &[TokenKind] = &[
    TokenKind::Plus,
    TokenKind::PlusPlus,
    TokenKind::PlusEquals,
    TokenKind::Minus,
    TokenKind::MinusMinus,
    TokenKind::MinusEquals,
    TokenKind::Star,
    TokenKind::StarStar,
    TokenKind::StarEquals,
    TokenKind::SlashEquals,
    TokenKind::Modulus,
    TokenKind::ModulusEquals,
    TokenKind::ModulusModulus,
    TokenKind::ModulusModulusEquals,
    TokenKind::And,
    TokenKind::AndEquals,
    TokenKind::Bar,
    TokenKind::BarEquals,
    TokenKind::Xor,
    TokenKind::XorEquals,
    TokenKind::Tilde,
    TokenKind::TildeEquals,
    TokenKind::TildeExclamation,
    TokenKind::EqualsEquals,
    TokenKind::LessThan,
    TokenKind::LessThanEquals,
    TokenKind::GreaterThan,
    TokenKind::GreaterThanEquals,
    TokenKind::LeftShift,
    TokenKind::LeftShiftEquals,
    TokenKind::RightShift,
    TokenKind::RightShiftEquals,
    TokenKind::AssignInto,
    TokenKind::DoubleSquareBracket,
    TokenKind::DoubleSquareBracketEquals,
    TokenKind::String,
];

/// A parser for DM source.
pub struct Parser<I: Iterator<Item = RawToken>> {
    lexer: Lexer<I>,
    current: Token,
    previous: Token,
    /// Tokens handed back with [`Parser::reuse_token`], next one last
    pushback: Vec<Token>,
    /// Type path of the enclosing object block
    current_path: TypePath,
    /// `var/x` is accepted as an expression (inside `for` headers)
    allow_var_decl: bool,
    diagnostics: Diagnostics,
}

impl<'a> Parser<Scanner<'a>> {
    /// Create a parser over source text.
    pub fn from_source(source: &'a str, file: FileId) -> Self {
        Parser::new(Lexer::from_source(source, file))
    }
}

impl<I: Iterator<Item = RawToken>> Parser<I> {
    /// Create a new parser from a lexer.
    pub fn new(lexer: Lexer<I>) -> Self {
        Self::with_diagnostics(lexer, Diagnostics::new())
    }

    /// Create a parser reporting into an existing sink.
    pub fn with_diagnostics(lexer: Lexer<I>, diagnostics: Diagnostics) -> Self {
        let placeholder = Token::new(TokenKind::Eof, Span::dummy(), "");
        let mut parser = Self {
            lexer,
            current: placeholder.clone(),
            previous: placeholder,
            pushback: Vec::new(),
            current_path: TypePath::root(),
            allow_var_decl: false,
            diagnostics,
        };
        parser.advance();
        parser
    }

    /// Diagnostics reported so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Consume the parser, returning its diagnostics.
    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Parse a complete file.
    ///
    /// Never fails: malformed statements are reported and skipped.
    pub fn parse_file(&mut self) -> File {
        let start = self.current.span;
        let mut statements = Vec::new();

        loop {
            self.delimiter();
            while self.match_token(TokenKind::Dedent) {
                self.delimiter();
            }
            if self.is_at_end() {
                break;
            }

            let skip_from = self.current.span;
            match self.statement() {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => {
                    let error = self.error(ParseErrorKind::UnexpectedToken, "Expected a type path");
                    self.report(error);
                    self.locate_next_top_level(skip_from);
                }
                Err(error) => {
                    self.report(error);
                    self.locate_next_top_level(skip_from);
                }
            }
        }

        log::debug!("parsed {} top-level statements", statements.len());
        File { statements, span: start.merge(&self.previous.span) }
    }

    /// Parse a single expression that must span the whole input.
    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.delimiter();
        let expr = self.expression()?;
        self.delimiter();
        while self.match_token(TokenKind::Dedent) {}
        if !self.is_at_end() {
            return Err(self.error(ParseErrorKind::UnexpectedToken, "Expected end of expression"));
        }
        Ok(expr)
    }

    // Object-level statements

    fn statement(&mut self) -> ParseResult<Option<Statement>> {
        let start = self.current.span;
        let Some(path) = self.path(false)? else {
            return Ok(None);
        };

        let combined = self.current_path.combine(&path);
        let old_path = std::mem::replace(&mut self.current_path, combined);
        let result = self.statement_after_path(start);
        self.current_path = old_path;
        result.map(Some)
    }

    fn statement_after_path(&mut self, start: Span) -> ParseResult<Statement> {
        let statement = if self.match_token(TokenKind::LeftParen) {
            self.proc_definition(start)?
        } else if let Some(body) = self.block()? {
            let path = self.current_path.clone();
            Statement::new(StatementKind::ObjectDefinition { path, body }, start.merge(&self.previous.span))
        } else if self.current_path.find_element("var").is_some() {
            self.var_definitions(start)?
        } else if self.match_token(TokenKind::Equals) {
            let value = self.expression()?;
            let object_path = self.current_path.parent().unwrap_or_else(TypePath::root);
            let name = self.current_path.last_element().unwrap_or_default().to_string();
            Statement::new(
                StatementKind::VarOverride { object_path, name, value },
                start.merge(&self.previous.span),
            )
        } else {
            let path = self.current_path.clone();
            Statement::new(StatementKind::ObjectDefinition { path, body: Vec::new() }, start)
        };

        let closed_block = matches!(self.previous.kind, TokenKind::Dedent | TokenKind::RightCurly);
        if !closed_block && !self.at_statement_end() {
            return Err(self.error(ParseErrorKind::UnexpectedToken, "Expected end of object statement"));
        }
        Ok(statement)
    }

    fn proc_definition(&mut self, start: Span) -> ParseResult<Statement> {
        log::trace!("parsing proc {}", self.current_path);
        let parameters = self.definition_parameters()?;
        self.consume(TokenKind::RightParen, "Expected ')' after proc parameters")?;
        let return_types = self.as_types(true)?;

        let body = if let Some(block) = self.proc_block()? {
            Some(block)
        } else if !self.at_statement_end() {
            self.proc_statement()?.map(ProcBlock::single)
        } else {
            None
        };

        let path = &self.current_path;
        let marker = path.find_element("proc").or_else(|| path.find_element("verb"));
        let is_verb = marker.map_or(false, |index| path.elements[index] == "verb");
        let object_end = marker.unwrap_or(path.elements.len().saturating_sub(1));
        let definition = ProcDefinition {
            object_path: path.from_elements(0, object_end),
            name: path.last_element().unwrap_or_default().to_string(),
            is_override: marker.is_none(),
            is_verb,
            parameters,
            body,
            return_types,
            span: start.merge(&self.previous.span),
        };

        let span = definition.span;
        Ok(Statement::new(StatementKind::ProcDefinition(Box::new(definition)), span))
    }

    fn definition_parameters(&mut self) -> ParseResult<Vec<ProcParameter>> {
        let mut parameters = Vec::new();
        loop {
            if self.match_token(TokenKind::IndeterminateArgs) {
                // `...` accepts any further arguments.
            } else if let Some(parameter) = self.definition_parameter()? {
                parameters.push(parameter);
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        Ok(parameters)
    }

    fn definition_parameter(&mut self) -> ParseResult<Option<ProcParameter>> {
        let start = self.current.span;
        let Some(path) = self.path(false)? else {
            return Ok(None);
        };

        let mut elements = path.elements;
        if elements.first().map(String::as_str) == Some("var") {
            elements.remove(0);
        }
        let Some(name) = elements.pop() else {
            return Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, "Expected a parameter name", start));
        };
        let (_, mut type_elements) = VarModifiers::split(&elements);

        let mut default = None;
        if matches!(self.current.kind, TokenKind::LeftBracket | TokenKind::DoubleSquareBracket) {
            if type_elements.first().map(String::as_str) != Some("list") {
                type_elements.insert(0, "list".to_string());
            }
            self.array_dimensions()?;
        }
        if self.match_token(TokenKind::DoubleSquareBracketEquals) || self.match_token(TokenKind::Equals) {
            default = Some(self.expression()?);
        }
        let types = self.as_types(false)?.unwrap_or_default();
        let possible_values = if self.match_token(TokenKind::In) {
            Some(self.expression()?)
        } else {
            None
        };

        let ty = (!type_elements.is_empty()).then(|| TypePath::new(PathKind::Absolute, type_elements));
        Ok(Some(ProcParameter {
            name,
            ty,
            default,
            possible_values,
            types,
            span: start.merge(&self.previous.span),
        }))
    }

    fn var_definitions(&mut self, start: Span) -> ParseResult<Statement> {
        let mut definitions = Vec::new();
        let mut var_path = self.current_path.clone();

        loop {
            let def_start = self.previous.span;
            let base = var_path.parent().unwrap_or_else(TypePath::root);
            let dimensions = self.path_array(&mut var_path)?;
            let mut value = dimensions;
            if self.match_token(TokenKind::Equals) {
                value = Some(self.expression()?);
            }
            let types = self.as_types(false)?.unwrap_or_default();

            let span = def_start.merge(&self.previous.span);
            let definition = self.make_var_definition(&var_path, value, types, span)?;
            definitions.push(Statement::new(StatementKind::VarDefinition(Box::new(definition)), span));

            if !self.match_token(TokenKind::Comma) {
                break;
            }
            let Some(next) = self.path(false)? else {
                return Err(self.error(ParseErrorKind::ExpectedIdentifier, "Expected a var definition"));
            };
            var_path = next.elements.iter().fold(base, |path, element| path.add_to_path(element));
        }

        if definitions.len() == 1 {
            Ok(definitions.remove(0))
        } else {
            Ok(Statement::new(StatementKind::Aggregate(definitions), start.merge(&self.previous.span)))
        }
    }

    fn make_var_definition(
        &self,
        var_path: &TypePath,
        value: Option<Expr>,
        types: ValueTypes,
        span: Span,
    ) -> ParseResult<VarDefinition> {
        let var_index = var_path.find_element("var").unwrap_or(0);
        let after_var = &var_path.elements[var_index + 1..];
        let Some((name, type_elements)) = after_var.split_last() else {
            return Err(ParseError::new(ParseErrorKind::ExpectedIdentifier, "Expected a var name", span));
        };
        let (modifiers, type_elements) = VarModifiers::split(type_elements);

        Ok(VarDefinition {
            object_path: var_path.from_elements(0, var_index),
            name: name.clone(),
            ty: (!type_elements.is_empty()).then(|| TypePath::new(PathKind::Absolute, type_elements)),
            modifiers,
            value,
            types,
            span,
        })
    }

    /// Parse `[a][b]` after a var name, inserting `list` after `var` in the
    /// path. Returns the implied `new /list(a, b)` when sizes were given.
    fn path_array(&mut self, path: &mut TypePath) -> ParseResult<Option<Expr>> {
        if !matches!(self.current.kind, TokenKind::LeftBracket | TokenKind::DoubleSquareBracket) {
            return Ok(None);
        }
        let start = self.current.span;

        let type_part = &path.elements[..path.elements.len().saturating_sub(1)];
        if !type_part.iter().any(|e| e == "list") {
            let insert_at = path.find_element("var").map_or(0, |index| index + 1);
            let mut elements = path.elements.clone();
            elements.insert(insert_at, "list".to_string());
            *path = TypePath::new(path.kind, elements);
        }

        let sizes = self.array_dimensions()?;
        if sizes.is_empty() {
            return Ok(None);
        }
        let args = sizes.into_iter().map(CallParameter::positional).collect();
        let span = start.merge(&self.previous.span);
        Ok(Some(Expr::new(
            ExprKind::New { target: NewTarget::Path(TypePath::absolute(&["list"])), args },
            span,
        )))
    }

    fn array_dimensions(&mut self) -> ParseResult<Vec<Expr>> {
        let mut sizes = Vec::new();
        loop {
            if self.match_token(TokenKind::DoubleSquareBracket) {
                continue;
            }
            if !self.match_token(TokenKind::LeftBracket) {
                break;
            }
            if let Some(size) = self.expression_opt()? {
                sizes.push(size);
            }
            self.consume(TokenKind::RightBracket, "Expected ']'")?;
        }
        Ok(sizes)
    }

    // Paths

    /// Parse a type path. In expression position a leading `/`, `:` or `.`
    /// is required.
    fn path(&mut self, expression: bool) -> ParseResult<Option<TypePath>> {
        let first = self.current.clone();
        let kind = if self.match_token(TokenKind::Slash) {
            if self.match_token(TokenKind::Period) {
                PathKind::UpwardSearch
            } else {
                PathKind::Absolute
            }
        } else if self.match_token(TokenKind::Colon) {
            PathKind::DownwardSearch
        } else if self.match_token(TokenKind::Period) {
            PathKind::UpwardSearch
        } else if expression {
            return Ok(None);
        } else {
            PathKind::Relative
        };

        let Some(first_element) = self.path_element() else {
            if expression && kind != PathKind::Relative {
                self.reuse_token(first);
            }
            return Ok(None);
        };

        let mut elements = vec![first_element];
        while !self.current.space_before && self.match_token(TokenKind::Slash) {
            let Some(mut element) = self.path_element() else {
                break;
            };
            if element == "operator" {
                if self.check(TokenKind::Slash) && self.peek().kind == TokenKind::LeftParen {
                    self.advance();
                    element.push('/');
                } else if OPERATOR_OVERLOAD_KINDS.contains(&self.current.kind) {
                    if self.check(TokenKind::String) && self.current.string_value() != Some("") {
                        let span = self.current.span;
                        self.diagnostics.emit(ErrorCode::BadToken, span, "The quotes in a stringify overload must be empty");
                    }
                    let text = if self.check(TokenKind::String) { "\"\"".to_string() } else { self.current.text.clone() };
                    element.push_str(&text);
                    self.advance();
                }
            }
            elements.push(element);
        }

        Ok(Some(TypePath::new(kind, elements)))
    }

    fn path_element(&mut self) -> Option<String> {
        if PATH_ELEMENT_KINDS.contains(&self.current.kind) {
            let text = self.current.text.clone();
            self.advance();
            Some(text)
        } else {
            None
        }
    }

    /// Parse an `as` clause: `as text|null` or `as (num|obj)`.
    fn as_types(&mut self, allow_path: bool) -> ParseResult<Option<ValueTypes>> {
        if !self.match_token(TokenKind::As) {
            return Ok(None);
        }

        let mut types = ValueTypes::ANYTHING;
        let parenthetical = self.match_token(TokenKind::LeftParen);
        loop {
            if parenthetical && self.check(TokenKind::RightParen) {
                break;
            }
            let token = self.current.clone();
            if matches!(token.kind, TokenKind::Identifier | TokenKind::Null) {
                self.advance();
                match ValueTypes::from_name(&token.text) {
                    Some(flag) => types |= flag,
                    None => {
                        return Err(ParseError::new(
                            ParseErrorKind::InvalidSyntax,
                            format!("Invalid value type '{}'", token.text),
                            token.span,
                        ))
                    }
                }
            } else {
                let path = self.path(false)?;
                if !allow_path || path.is_none() {
                    let message = if allow_path { "Expected value type or path" } else { "Expected value type" };
                    self.diagnostics.emit(ErrorCode::BadToken, token.span, message);
                }
                if path.is_none() {
                    break;
                }
            }
            if !self.match_token(TokenKind::Bar) {
                break;
            }
        }
        if parenthetical {
            self.consume(TokenKind::RightParen, "Expected ')'")?;
        }
        Ok(Some(types))
    }

    // Object-level blocks

    fn block(&mut self) -> ParseResult<Option<Vec<Statement>>> {
        let before = self.current.clone();
        let had_newline = self.newline();

        let block = if self.match_token(TokenKind::LeftCurly) {
            self.newline();
            let indented = self.match_token(TokenKind::Indent);
            let statements = self.block_inner();
            if indented {
                self.newline();
                self.match_token(TokenKind::Dedent);
            }
            self.newline();
            self.consume(TokenKind::RightCurly, "Expected '}'")?;
            Some(statements)
        } else if self.match_token(TokenKind::Indent) {
            let statements = self.block_inner();
            self.newline();
            self.consume(TokenKind::Dedent, "Expected dedent")?;
            Some(statements)
        } else {
            None
        };

        if block.is_none() && had_newline {
            self.reuse_token(before);
        }
        Ok(block)
    }

    fn block_inner(&mut self) -> Vec<Statement> {
        let mut statements = Vec::new();
        loop {
            self.delimiter();
            if matches!(self.current.kind, TokenKind::Dedent | TokenKind::RightCurly | TokenKind::Eof) {
                break;
            }
            match self.statement() {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => {
                    let error = self.error(ParseErrorKind::UnexpectedToken, "Expected a type path");
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

    // Token plumbing

    fn advance(&mut self) {
        let next = self.next_token();
        self.previous = std::mem::replace(&mut self.current, next);
    }

    /// The next buffered or lexed token. Error tokens are reported and
    /// skipped.
    fn next_token(&mut self) -> Token {
        loop {
            let token = match self.pushback.pop() {
                Some(token) => token,
                None => self.lexer.next_token(),
            };
            if token.kind != TokenKind::Error {
                return token;
            }
            let message = match &token.value {
                TokenValue::String(message) => message.clone(),
                _ => format!("Invalid token '{}'", token.text),
            };
            self.diagnostics.emit(ErrorCode::BadToken, token.span, message);
        }
    }

    /// Look at the token after the current one.
    fn peek(&mut self) -> &Token {
        if self.pushback.is_empty() {
            let next = self.next_token();
            self.pushback.push(next);
        }
        &self.pushback[self.pushback.len() - 1]
    }

    /// Make `token` current again, pushing the current token back.
    fn reuse_token(&mut self, token: Token) {
        let current = std::mem::replace(&mut self.current, token);
        self.pushback.push(current);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            self.advance();
            Ok(self.previous.clone())
        } else {
            let mut error = self.error(ParseErrorKind::ExpectedToken, message);
            error.expected.push(kind.to_string());
            Err(error)
        }
    }

    fn consume_identifier(&mut self, message: &str) -> ParseResult<String> {
        if matches!(self.current.kind, TokenKind::Identifier | TokenKind::Step) {
            let name = self.current.text.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(ParseErrorKind::ExpectedIdentifier, message))
        }
    }

    /// Skip newlines, returning whether there were any.
    fn newline(&mut self) -> bool {
        let mut found = false;
        while self.match_token(TokenKind::Newline) {
            found = true;
        }
        found
    }

    /// Skip newlines and semicolons, returning whether there were any.
    fn delimiter(&mut self) -> bool {
        let mut found = false;
        while self.match_token(TokenKind::Semicolon) || self.match_token(TokenKind::Newline) {
            found = true;
        }
        found
    }

    fn at_statement_end(&self) -> bool {
        self.current.kind.is_statement_end() || self.check(TokenKind::RightCurly)
    }

    fn error(&self, kind: ParseErrorKind, message: &str) -> ParseError {
        ParseError::new(kind, message, self.current.span).with_found(self.current.kind.to_string())
    }

    fn report(&mut self, error: ParseError) {
        log::trace!("parse error: {}", error);
        self.diagnostics.emit(error.kind.code(), error.span, error.message);
    }

    // Recovery

    /// Skip to the end of the current statement without leaving its block.
    fn locate_next_statement(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current.kind {
                TokenKind::Eof => return,
                TokenKind::Newline | TokenKind::Semicolon if depth == 0 => return,
                TokenKind::Dedent | TokenKind::RightCurly if depth == 0 => return,
                TokenKind::Indent | TokenKind::LeftCurly => depth += 1,
                TokenKind::Dedent | TokenKind::RightCurly => depth -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip to the next line that starts at column zero.
    fn locate_next_top_level(&mut self, skip_from: Span) {
        if !self.is_at_end() {
            self.advance();
        }
        while !self.is_at_end() {
            if self.current.line_indentation() == Some(0) {
                break;
            }
            self.advance();
        }
        log::warn!("error recovery skipped from {} to {}", skip_from, self.current.span);
        let span = self.current.span;
        self.diagnostics.emit(
            ErrorCode::ParserRecovery,
            skip_from,
            format!("Error recovery had to skip to {}", span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn parse(source: &str) -> (File, Diagnostics) {
        let mut parser = Parser::from_source(source, FileId(0));
        let file = parser.parse_file();
        (file, parser.into_diagnostics())
    }

    fn flat_kinds(file: &File) -> Vec<&StatementKind> {
        file.flatten().into_iter().map(|s| &s.kind).collect()
    }

    #[test]
    fn test_empty_file() {
        let (file, diagnostics) = parse("");
        assert!(file.statements.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_object_definition() {
        let (file, diagnostics) = parse("/obj/item\n\tname = \"thing\"\n");
        assert!(diagnostics.is_empty(), "{:?}", diagnostics.iter().collect::<Vec<_>>());
        match &file.statements[0].kind {
            StatementKind::ObjectDefinition { path, body } => {
                assert_eq!(path.to_string(), "/obj/item");
                match &body[0].kind {
                    StatementKind::VarOverride { object_path, name, value } => {
                        assert_eq!(object_path.to_string(), "/obj/item");
                        assert_eq!(name, "name");
                        assert_eq!(value.kind, ExprKind::String("thing".to_string()));
                    }
                    other => panic!("Expected var override, got {:?}", other),
                }
            }
            other => panic!("Expected object definition, got {:?}", other),
        }
    }

    #[test]
    fn test_braced_object_definition() {
        let (file, diagnostics) = parse("/mob { var/health = 100 }\n");
        assert!(diagnostics.is_empty());
        let kinds = flat_kinds(&file);
        assert!(kinds.iter().any(|k| matches!(k, StatementKind::VarDefinition(def) if def.name == "health")));
    }

    #[test]
    fn test_var_definitions() {
        let (file, _) = parse("/obj/var/static/list/L[5], count = 2 as num\n");
        let defs: Vec<&VarDefinition> = file
            .flatten()
            .into_iter()
            .filter_map(|s| match &s.kind {
                StatementKind::VarDefinition(def) => Some(def.as_ref()),
                _ => None,
            })
            .collect();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "L");
        assert!(defs[0].modifiers.is_static);
        assert_eq!(defs[0].ty.as_ref().map(|t| t.to_string()), Some("/list".to_string()));
        assert!(matches!(defs[0].value.as_ref().map(|v| &v.kind), Some(ExprKind::New { .. })));
        assert_eq!(defs[1].name, "count");
        assert_eq!(defs[1].object_path.to_string(), "/obj");
        assert_eq!(defs[1].types, ValueTypes::NUM);
    }

    #[test]
    fn test_proc_definitions() {
        let source = "/mob/proc/attack(mob/target, damage = 5)\n\treturn damage\n/mob/Login()\n\t..()\n/mob/verb/say(msg as text)\n\tset name = \"Say\"\n";
        let (file, diagnostics) = parse(source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics.iter().collect::<Vec<_>>());
        let procs: Vec<&ProcDefinition> = file.procs().collect();
        assert_eq!(procs.len(), 3);

        assert_eq!(procs[0].name, "attack");
        assert_eq!(procs[0].object_path.to_string(), "/mob");
        assert!(!procs[0].is_override);
        assert_eq!(procs[0].parameters.len(), 2);
        assert_eq!(procs[0].parameters[0].ty.as_ref().map(|t| t.to_string()), Some("/mob".to_string()));
        assert!(procs[0].parameters[1].default.is_some());

        assert!(procs[1].is_override);
        assert_eq!(procs[1].name, "Login");

        assert!(procs[2].is_verb);
        assert_eq!(procs[2].parameters[0].types, ValueTypes::TEXT);
    }

    #[test]
    fn test_nested_proc_block() {
        let (file, diagnostics) = parse("/mob\n\tproc\n\t\tfoo()\n\t\t\treturn 1\n");
        assert!(diagnostics.is_empty());
        let procs: Vec<&ProcDefinition> = file.procs().collect();
        assert_eq!(procs[0].path().to_string(), "/mob/proc/foo");
    }

    #[test]
    fn test_inline_proc_body() {
        let (file, _) = parse("/proc/double(x) return x * 2\n");
        let procs: Vec<&ProcDefinition> = file.procs().collect();
        let body = procs[0].body.as_ref().expect("inline body");
        assert!(matches!(body.statements[0].kind, ProcStatementKind::Return(Some(_))));
    }

    #[test]
    fn test_operator_overload_path() {
        let (file, _) = parse("/datum/proc/operator+(other)\n\treturn src\n");
        let procs: Vec<&ProcDefinition> = file.procs().collect();
        assert_eq!(procs[0].name, "operator+");
    }

    #[test]
    fn test_top_level_recovery() {
        let source = "/obj/a\n\tname = \"a\"\n) ) )\n/obj/b\n\tname = \"b\"\n";
        let (file, diagnostics) = parse(source);
        assert!(diagnostics.has_errors());
        assert!(diagnostics.contains(ErrorCode::ParserRecovery));
        let paths: Vec<String> = file
            .statements
            .iter()
            .filter_map(|s| match &s.kind {
                StatementKind::ObjectDefinition { path, .. } => Some(path.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec!["/obj/a", "/obj/b"]);
    }

    #[test]
    fn test_top_level_recovery_skips_indented_lines() {
        let source = "/obj/a\n\tname = \"a\"\n) junk\n\tname = \"lost\"\n\t\tdeeper = 1\n/obj/b\n\tname = \"b\"\n";
        let (file, diagnostics) = parse(source);
        assert!(diagnostics.contains(ErrorCode::ParserRecovery));
        let paths: Vec<String> = file
            .statements
            .iter()
            .filter_map(|s| match &s.kind {
                StatementKind::ObjectDefinition { path, .. } => Some(path.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec!["/obj/a", "/obj/b"]);
    }

    #[test]
    fn test_statement_recovery_inside_proc() {
        let source = "/proc/f()\n\tvar/a = 1\n\tvar/b = )\n\tvar/c = 3\n";
        let (file, diagnostics) = parse(source);
        assert!(diagnostics.has_errors());
        let procs: Vec<&ProcDefinition> = file.procs().collect();
        assert_eq!(procs.len(), 1);
        let body = procs[0].body.as_ref().expect("proc body");
        assert_eq!(body.statements.len(), 2);
    }

    #[test]
    fn test_parse_expression_entry() {
        let mut parser = Parser::from_source("1 + 2 * 3", FileId(0));
        let expr = parser.parse_expression().unwrap();
        match expr.kind {
            ExprKind::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("Expected addition, got {:?}", other),
        }
    }
}
