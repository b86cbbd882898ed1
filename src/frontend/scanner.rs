//! Raw scanner producing preprocessor-level tokens.
//!
//! The DM lexer expects its input to come from a preprocessor that has
//! already expanded macros. This scanner produces the same token
//! vocabulary straight from source text, without any macro support, so
//! the front end can be driven from a plain `.dm` file or from the text
//! of an embedded string expression.
//!
//! Blank lines and comment-only lines are collapsed, so a `Newline` is
//! always followed by the indentation of a line that carries code.

use crate::utils::location::{FileId, SourceLocation, Span};
use serde::{Serialize, Deserialize};
use std::iter::Peekable;
use std::str::Chars;
use unicode_xid::UnicodeXID;

/// Kinds of raw tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawKind {
    /// A run of spaces or tabs
    Whitespace,
    /// End of a line
    Newline,
    /// Any operator not listed separately; the text holds the operator
    Punctuator,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `.`
    Period,
    /// `;`
    Semicolon,
    /// Identifier or identifier fragment
    Identifier,
    /// Numeric literal text
    Number,
    /// A complete string literal; the value holds the undecoded body
    ConstantString,
    /// Start of a pre-split interpolated string
    StringBegin,
    /// Text between two interpolations of a pre-split string
    StringMiddle,
    /// End of a pre-split interpolated string
    StringEnd,
    /// Unscannable input; the value holds the message
    Error,
    /// End of input
    Eof,
}

/// A token as produced by the preprocessing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToken {
    /// The kind of token
    pub kind: RawKind,
    /// Raw text
    pub text: String,
    /// Decoded value, for strings and errors
    pub value: Option<String>,
    /// The source span
    pub span: Span,
}

impl RawToken {
    /// Create a token with no decoded value.
    pub fn new(kind: RawKind, text: impl Into<String>, span: Span) -> Self {
        Self { kind, text: text.into(), value: None, span }
    }

    /// Create a token carrying a decoded value.
    pub fn with_value(kind: RawKind, text: impl Into<String>, value: impl Into<String>, span: Span) -> Self {
        Self { kind, text: text.into(), value: Some(value.into()), span }
    }
}

/// Scans source text into [`RawToken`]s.
pub struct Scanner<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    offset: usize,
    line: usize,
    column: usize,
    token_start: SourceLocation,
    file: FileId,
    /// When set, every token reports this span instead of its own.
    anchor: Option<Span>,
    at_line_start: bool,
    at_eof: bool,
}

impl<'a> Scanner<'a> {
    /// Create a scanner for the given source.
    pub fn new(source: &'a str, file: FileId) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            token_start: SourceLocation::start(),
            file,
            anchor: None,
            at_line_start: true,
            at_eof: false,
        }
    }

    /// Create a scanner whose tokens all report `anchor` as their span.
    ///
    /// Used for text embedded in another token, such as the expression
    /// inside a string interpolation.
    pub fn anchored(source: &'a str, anchor: Span) -> Self {
        let mut scanner = Self::new(source, anchor.file);
        scanner.anchor = Some(anchor);
        scanner
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.offset)
    }

    fn mark_token_start(&mut self) {
        self.token_start = self.current_location();
    }

    fn make_span(&self) -> Span {
        match self.anchor {
            Some(anchor) => anchor,
            None => Span::from_locations(self.file, self.token_start, self.current_location()),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_line_end(&mut self) -> bool {
        matches!(self.peek(), Some('\n') | Some('\r'))
    }

    /// Consume one line ending (`\n`, `\r\n` or a lone `\r`).
    fn consume_line_end(&mut self) -> bool {
        match self.peek() {
            Some('\r') => {
                while self.peek() == Some('\r') {
                    self.advance();
                }
                self.match_char('\n');
                true
            }
            Some('\n') => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn skip_horizontal_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.advance();
        }
    }

    /// Skip any comments at the current position.
    ///
    /// Returns an error message for an unterminated block comment.
    fn skip_comments(&mut self) -> Result<(), &'static str> {
        loop {
            if self.peek() != Some('/') {
                return Ok(());
            }
            match self.peek_next() {
                Some('/') => {
                    while self.peek().is_some() && !self.at_line_end() {
                        if self.advance() == Some('\\') && self.at_line_end() {
                            self.consume_line_end();
                        }
                    }
                }
                Some('*') => {
                    self.advance();
                    self.advance();
                    let mut depth = 1;
                    while depth > 0 {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                depth -= 1;
                            }
                            Some('/') if self.peek() == Some('*') => {
                                self.advance();
                                depth += 1;
                            }
                            Some('/') if self.peek() == Some('/') => {
                                while self.peek().is_some() && !self.at_line_end() {
                                    self.advance();
                                }
                            }
                            None => return Err("Expected \"*/\" to end multiline comment"),
                            _ => {}
                        }
                    }
                    self.skip_horizontal_whitespace();
                }
                _ => return Ok(()),
            }
        }
    }

    fn make_token(&mut self, kind: RawKind) -> RawToken {
        let span = self.make_span();
        let text = &self.source[self.token_start.offset..self.offset];
        self.at_line_start = kind == RawKind::Newline;
        RawToken::new(kind, text, span)
    }

    fn make_punctuator(&mut self, text: &str) -> RawToken {
        let mut token = self.make_token(RawKind::Punctuator);
        token.text = text.to_string();
        token
    }

    fn make_error(&mut self, message: impl Into<String>) -> RawToken {
        let mut token = self.make_token(RawKind::Error);
        token.value = Some(message.into());
        token
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> RawToken {
        loop {
            self.mark_token_start();

            let c = match self.peek() {
                Some(c) => c,
                None => {
                    self.at_eof = true;
                    return self.make_token(RawKind::Eof);
                }
            };

            match c {
                ' ' | '\t' => {
                    self.skip_horizontal_whitespace();
                    let whitespace_end = self.offset;
                    if self.at_line_start {
                        if let Err(message) = self.skip_comments() {
                            return self.make_error(message);
                        }
                        if self.peek().is_none() || self.at_line_end() {
                            continue;
                        }
                    }
                    let span = self.make_span();
                    let text = &self.source[self.token_start.offset..whitespace_end];
                    self.at_line_start = false;
                    return RawToken::new(RawKind::Whitespace, text, span);
                }
                '\r' | '\n' => {
                    self.consume_line_end();
                    if self.at_line_start {
                        continue;
                    }
                    let mut token = self.make_token(RawKind::Newline);
                    token.text = "\n".to_string();
                    return token;
                }
                '/' if matches!(self.peek_next(), Some('/') | Some('*')) => {
                    if let Err(message) = self.skip_comments() {
                        return self.make_error(message);
                    }
                    continue;
                }
                '\\' if matches!(self.peek_next(), Some('\n') | Some('\r')) => {
                    self.advance();
                    self.consume_line_end();
                    self.skip_horizontal_whitespace();
                    continue;
                }
                '#' => {
                    while self.peek().is_some() && !self.at_line_end() {
                        self.advance();
                    }
                    return self.make_error("Preprocessor directives are not supported");
                }
                _ => {}
            }

            self.advance();
            return match c {
                '(' => self.make_token(RawKind::LeftParen),
                ')' => self.make_token(RawKind::RightParen),
                ']' => self.make_token(RawKind::RightBracket),
                ',' => self.make_token(RawKind::Comma),
                ';' => self.make_token(RawKind::Semicolon),
                '.' => self.make_token(RawKind::Period),
                '?' => self.make_token(RawKind::Question),
                '}' => self.make_punctuator("}"),
                '[' => {
                    if self.match_char(']') {
                        if self.match_char('=') {
                            self.make_punctuator("[]=")
                        } else {
                            self.make_punctuator("[]")
                        }
                    } else {
                        self.make_token(RawKind::LeftBracket)
                    }
                }
                ':' => {
                    if self.match_char('=') {
                        self.make_punctuator(":=")
                    } else if self.match_char(':') {
                        self.make_punctuator("::")
                    } else {
                        self.make_token(RawKind::Colon)
                    }
                }
                '{' => {
                    if self.peek() == Some('"') {
                        self.advance();
                        self.scan_string('"', true)
                    } else {
                        self.make_punctuator("{")
                    }
                }
                '"' | '\'' => self.scan_string(c, false),
                '@' => self.scan_raw_string(),
                '+' | '-' | '*' | '/' | '%' | '^' | '!' | '=' | '~' | '&' | '|' | '<' | '>' => {
                    let text = self.scan_operator(c);
                    self.make_punctuator(&text)
                }
                c if c.is_ascii_digit() => self.scan_number(),
                c if c.is_xid_start() || c == '_' => {
                    while self.peek().map(|c| c.is_xid_continue()).unwrap_or(false) {
                        self.advance();
                    }
                    self.make_token(RawKind::Identifier)
                }
                c => self.make_error(format!("Unknown character: {}", c)),
            };
        }
    }

    /// Maximal munch over the operator table, first character consumed.
    fn scan_operator(&mut self, first: char) -> String {
        let mut text = String::from(first);
        match first {
            '+' | '-' => {
                if self.match_char(first) {
                    text.push(first);
                } else if self.match_char('=') {
                    text.push('=');
                }
            }
            '*' => {
                if self.match_char('*') {
                    text.push('*');
                } else if self.match_char('=') {
                    text.push('=');
                }
            }
            '%' => {
                if self.match_char('%') {
                    text.push('%');
                }
                if self.match_char('=') {
                    text.push('=');
                }
            }
            '&' | '|' => {
                if self.match_char(first) {
                    text.push(first);
                }
                if self.match_char('=') {
                    text.push('=');
                }
            }
            '<' | '>' => {
                if self.match_char(first) {
                    text.push(first);
                    if self.match_char('=') {
                        text.push('=');
                    }
                } else if self.match_char('=') {
                    text.push('=');
                } else if first == '<' && self.match_char('>') {
                    text.push('>');
                }
            }
            '~' => {
                if self.match_char('=') {
                    text.push('=');
                } else if self.match_char('!') {
                    text.push('!');
                }
            }
            _ => {
                if self.match_char('=') {
                    text.push('=');
                }
            }
        }
        text
    }

    fn scan_number(&mut self) -> RawToken {
        let mut previous = self.source[self.token_start.offset..self.offset].chars().last().unwrap_or('0');
        loop {
            let Some(c) = self.peek() else { break };
            if matches!(previous, 'e' | 'E') && matches!(c, '-' | '+') {
                self.advance();
                previous = c;
                continue;
            }
            if previous == '#' && c == 'I' {
                self.advance();
                let n = self.advance();
                let last = self.advance();
                if n != Some('N') || !matches!(last, Some('F') | Some('D')) {
                    return self.make_error("Invalid number");
                }
                previous = 'F';
                continue;
            }
            if c.is_ascii_hexdigit() || matches!(c, '.' | 'x' | '#' | 'p' | 'P') {
                self.advance();
                previous = c;
            } else {
                break;
            }
        }
        self.make_token(RawKind::Number)
    }

    /// Scan the body of a string literal; the opening delimiter is consumed.
    ///
    /// Interpolated expressions are skipped over structurally so that
    /// strings nested inside `[...]` do not end the outer literal.
    fn scan_string(&mut self, terminator: char, is_long: bool) -> RawToken {
        let mut value = String::new();
        match self.scan_string_body(terminator, is_long, &mut value) {
            Ok(()) => {
                let span = self.make_span();
                let text = self.source[self.token_start.offset..self.offset].to_string();
                self.at_line_start = false;
                RawToken::with_value(RawKind::ConstantString, text, value, span)
            }
            Err(message) => self.make_error(message),
        }
    }

    fn scan_string_body(&mut self, terminator: char, is_long: bool, value: &mut String) -> Result<(), String> {
        loop {
            let Some(c) = self.peek() else {
                return Err(if is_long {
                    "Expected '}' to end long string".to_string()
                } else {
                    format!("Expected '{}' to end string", terminator)
                });
            };
            if !is_long && (c == '\n' || c == '\r') {
                return Err(format!("Expected '{}' to end string", terminator));
            }
            self.advance();
            match c {
                '\\' => {
                    if self.at_line_end() {
                        self.consume_line_end();
                        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\n') | Some('\r')) {
                            self.advance();
                        }
                    } else {
                        value.push('\\');
                        if let Some(escaped) = self.advance() {
                            value.push(escaped);
                        }
                    }
                }
                '[' => {
                    value.push('[');
                    self.scan_embedded_expression(value)?;
                }
                c if c == terminator => {
                    if !is_long {
                        return Ok(());
                    }
                    if self.match_char('}') {
                        return Ok(());
                    }
                    value.push(c);
                }
                c => value.push(c),
            }
        }
    }

    /// Copy an interpolated expression up to and including its closing `]`.
    fn scan_embedded_expression(&mut self, value: &mut String) -> Result<(), String> {
        let mut depth = 1;
        while depth > 0 {
            let Some(c) = self.advance() else {
                return Err("Expected ']' to end expression".to_string());
            };
            value.push(c);
            match c {
                '[' => depth += 1,
                ']' => depth -= 1,
                '"' | '\'' => {
                    self.scan_string_body(c, false, value)?;
                    value.push(c);
                }
                '{' if self.peek() == Some('"') => {
                    self.advance();
                    value.push('"');
                    self.scan_string_body('"', true, value)?;
                    value.push_str("\"}");
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn scan_raw_string(&mut self) -> RawToken {
        let Some(delimiter) = self.advance() else {
            return self.make_error("Expected a raw string delimiter");
        };
        let is_long = delimiter == '{' && self.peek() == Some('"');
        let mut value = String::new();
        if is_long {
            self.advance();
            loop {
                match self.advance() {
                    Some('"') if self.peek() == Some('}') => {
                        self.advance();
                        break;
                    }
                    Some(c) => value.push(c),
                    None => return self.make_error("Expected '}' to end raw string"),
                }
            }
        } else {
            loop {
                if self.at_line_end() {
                    return self.make_error(format!("Expected '{}' to end raw string", delimiter));
                }
                match self.advance() {
                    Some(c) if c == delimiter => break,
                    Some(c) => value.push(c),
                    None => return self.make_error(format!("Expected '{}' to end raw string", delimiter)),
                }
            }
        }
        let span = self.make_span();
        let text = self.source[self.token_start.offset..self.offset].to_string();
        self.at_line_start = false;
        RawToken::with_value(RawKind::ConstantString, text, value, span)
    }

    /// Collect all tokens, including the final `Eof`.
    pub fn tokenize(self) -> Vec<RawToken> {
        self.collect()
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = RawToken;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_eof {
            None
        } else {
            Some(self.next_token())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<RawKind> {
        Scanner::new(source, FileId::default()).map(|t| t.kind).collect()
    }

    fn texts(source: &str) -> Vec<String> {
        Scanner::new(source, FileId::default()).map(|t| t.text).collect()
    }

    #[test]
    fn test_indentation_whitespace_kept() {
        use RawKind::*;
        assert_eq!(
            kinds("/obj\n\tvar/x"),
            vec![Punctuator, Identifier, Newline, Whitespace, Identifier, Punctuator, Identifier, Eof]
        );
    }

    #[test]
    fn test_blank_and_comment_lines_collapsed() {
        use RawKind::*;
        let source = "a\n\n   \n  // note\n/* block */\nb";
        assert_eq!(kinds(source), vec![Identifier, Newline, Identifier, Eof]);
    }

    #[test]
    fn test_operator_munch() {
        let t = texts("a <<= b %%= c []= d ~! e <> f");
        assert!(t.contains(&"<<=".to_string()));
        assert!(t.contains(&"%%=".to_string()));
        assert!(t.contains(&"[]=".to_string()));
        assert!(t.contains(&"~!".to_string()));
        assert!(t.contains(&"<>".to_string()));
    }

    #[test]
    fn test_question_and_period_stay_single() {
        use RawKind::*;
        assert_eq!(kinds("a?.b"), vec![Identifier, Question, Period, Identifier, Eof]);
        assert_eq!(kinds("..."), vec![Period, Period, Period, Eof]);
    }

    #[test]
    fn test_string_with_nested_interpolation() {
        let tokens: Vec<_> = Scanner::new(r#""a [f("]")] b""#, FileId::default()).collect();
        assert_eq!(tokens[0].kind, RawKind::ConstantString);
        assert_eq!(tokens[0].value.as_deref(), Some(r#"a [f("]")] b"#));
        assert_eq!(tokens[1].kind, RawKind::Eof);
    }

    #[test]
    fn test_long_and_raw_strings() {
        let tokens: Vec<_> = Scanner::new("{\"line1\nline2\"} @\"raw\\n\" 'icon.dmi'", FileId::default()).collect();
        assert_eq!(tokens[0].value.as_deref(), Some("line1\nline2"));
        assert!(tokens[0].text.starts_with('{'));
        assert_eq!(tokens[2].value.as_deref(), Some("raw\\n"));
        assert!(tokens[2].text.starts_with('@'));
        assert_eq!(tokens[4].value.as_deref(), Some("icon.dmi"));
        assert!(tokens[4].text.starts_with('\''));
    }

    #[test]
    fn test_numbers() {
        let t = texts("1.#INF 0x1F 1e-5 3.25");
        assert_eq!(t[0], "1.#INF");
        assert_eq!(t[2], "0x1F");
        assert_eq!(t[4], "1e-5");
        assert_eq!(t[6], "3.25");
    }

    #[test]
    fn test_unterminated_string_is_error_token() {
        let tokens: Vec<_> = Scanner::new("\"abc\nx", FileId::default()).collect();
        assert_eq!(tokens[0].kind, RawKind::Error);
    }

    #[test]
    fn test_anchored_spans() {
        let anchor = Span::new(7, 3, 7, 20);
        let tokens: Vec<_> = Scanner::anchored("a + b", anchor).collect();
        assert!(tokens.iter().all(|t| t.span == anchor));
    }
}
