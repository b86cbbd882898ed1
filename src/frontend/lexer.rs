//! Lexer for the DM language.
//!
//! The lexer layers language tokens over a stream of [`RawToken`]s:
//! keywords are classified, multi-token operators such as `?.` and `...`
//! are merged, and `Indent`/`Dedent` tokens are synthesised from the
//! whitespace that follows each newline.

use crate::frontend::scanner::{RawKind, RawToken, Scanner};
use crate::frontend::token::{Token, TokenKind, TokenValue};
use crate::utils::location::{FileId, Span};
use std::collections::VecDeque;
use std::iter::Peekable;

/// A lexer pulling raw tokens from any token source.
pub struct Lexer<I: Iterator<Item = RawToken>> {
    /// Raw token source
    source: Peekable<I>,
    /// Tokens already produced but not yet handed out
    pending: VecDeque<Token>,
    /// Open `(` and `[` count
    bracket_nesting: usize,
    /// Indentation levels, innermost last
    indentation_stack: Vec<usize>,
    /// Whitespace was skipped since the last produced token
    space_pending: bool,
    /// Span of the most recent raw token
    last_span: Span,
    /// Whether we've hit EOF
    at_eof: bool,
}

impl<'a> Lexer<Scanner<'a>> {
    /// Create a lexer over source text.
    pub fn from_source(source: &'a str, file: FileId) -> Self {
        Lexer::new(Scanner::new(source, file))
    }
}

impl<I: Iterator<Item = RawToken>> Lexer<I> {
    /// Create a new lexer over a raw token source.
    pub fn new(source: I) -> Self {
        Self {
            source: source.peekable(),
            pending: VecDeque::new(),
            bracket_nesting: 0,
            indentation_stack: vec![0],
            space_pending: false,
            last_span: Span::dummy(),
            at_eof: false,
        }
    }

    /// The innermost indentation level.
    pub fn current_indentation(&self) -> usize {
        self.indentation_stack.last().copied().unwrap_or(0)
    }

    /// All open indentation levels, outermost first.
    pub fn indentation_levels(&self) -> &[usize] {
        &self.indentation_stack
    }

    /// Check whether the end token has been produced.
    pub fn is_at_end(&self) -> bool {
        self.at_eof && self.pending.is_empty()
    }

    fn make_token(&mut self, kind: TokenKind, raw: &RawToken) -> Token {
        let mut token = Token::new(kind, raw.span, raw.text.clone());
        token.space_before = std::mem::take(&mut self.space_pending);
        token
    }

    fn make_error(&mut self, message: impl Into<String>, raw: &RawToken) -> Token {
        self.make_token(TokenKind::Error, raw)
            .with_value(TokenValue::String(message.into()))
    }

    fn next_raw(&mut self) -> RawToken {
        match self.source.next() {
            Some(raw) => {
                self.last_span = raw.span;
                raw
            }
            None => RawToken::new(RawKind::Eof, "", self.last_span),
        }
    }

    fn next_raw_if(&mut self, kind: RawKind) -> Option<RawToken> {
        self.source.next_if(|raw| raw.kind == kind)
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.pending.pop_front() {
            return token;
        }

        loop {
            let raw = self.next_raw();
            let token = match raw.kind {
                RawKind::Whitespace => {
                    self.space_pending = true;
                    continue;
                }
                RawKind::Newline => {
                    if self.bracket_nesting > 0 {
                        self.space_pending = true;
                        continue;
                    }
                    self.lex_newline(&raw)
                }
                RawKind::Eof => self.lex_eof(&raw),
                RawKind::Error => {
                    let message = raw.value.clone().unwrap_or_else(|| format!("Invalid token '{}'", raw.text));
                    self.make_error(message, &raw)
                }
                RawKind::LeftParen => {
                    self.bracket_nesting += 1;
                    self.make_token(TokenKind::LeftParen, &raw)
                }
                RawKind::RightParen => {
                    self.bracket_nesting = self.bracket_nesting.saturating_sub(1);
                    self.make_token(TokenKind::RightParen, &raw)
                }
                RawKind::LeftBracket => {
                    self.bracket_nesting += 1;
                    self.make_token(TokenKind::LeftBracket, &raw)
                }
                RawKind::RightBracket => {
                    self.bracket_nesting = self.bracket_nesting.saturating_sub(1);
                    self.make_token(TokenKind::RightBracket, &raw)
                }
                RawKind::Comma => self.make_token(TokenKind::Comma, &raw),
                RawKind::Semicolon => self.make_token(TokenKind::Semicolon, &raw),
                RawKind::Colon => self.make_token(TokenKind::Colon, &raw),
                RawKind::Question => self.lex_question(&raw),
                RawKind::Period => self.lex_period(&raw),
                RawKind::Punctuator => self.lex_punctuator(&raw),
                RawKind::Identifier => self.lex_identifier(raw),
                RawKind::Number => self.lex_number(&raw),
                RawKind::ConstantString => self.lex_string(&raw),
                RawKind::StringBegin => self.lex_string_part(TokenKind::StringBegin, &raw),
                RawKind::StringMiddle => self.lex_string_part(TokenKind::StringMiddle, &raw),
                RawKind::StringEnd => self.lex_string_part(TokenKind::StringEnd, &raw),
            };
            return token;
        }
    }

    fn lex_eof(&mut self, raw: &RawToken) -> Token {
        self.at_eof = true;
        while self.indentation_stack.len() > 1 {
            self.indentation_stack.pop();
            let dedent = self.make_token(TokenKind::Dedent, raw);
            self.pending.push_back(dedent);
        }
        let eof = self.make_token(TokenKind::Eof, raw);
        self.pending.push_back(eof);
        self.pending.pop_front().unwrap_or_else(|| Token::new(TokenKind::Eof, raw.span, ""))
    }

    fn lex_newline(&mut self, raw: &RawToken) -> Token {
        let level = match self.next_raw_if(RawKind::Whitespace) {
            Some(whitespace) => whitespace.text.chars().count(),
            None => 0,
        };
        let newline = self.make_token(TokenKind::Newline, raw).with_value(TokenValue::Integer(level as i64));
        let current = self.current_indentation();

        if level > current {
            self.indentation_stack.push(level);
            self.pending.push_back(newline);
            Token::new(TokenKind::Indent, raw.span, "")
        } else if level < current {
            let result = if self.indentation_stack.contains(&level) {
                newline
            } else {
                self.pending.push_back(newline);
                Token::new(TokenKind::Error, raw.span, "")
                    .with_value(TokenValue::String("Invalid indentation".to_string()))
            };
            loop {
                self.indentation_stack.pop();
                self.pending.push_back(Token::new(TokenKind::Dedent, raw.span, ""));
                if level >= self.current_indentation() {
                    break;
                }
            }
            result
        } else {
            newline
        }
    }

    fn lex_question(&mut self, raw: &RawToken) -> Token {
        if let Some(next) = self.next_raw_if(RawKind::Period) {
            let mut token = self.make_token(TokenKind::QuestionPeriod, raw);
            token.span = raw.span.merge(&next.span);
            token.text = "?.".to_string();
            token
        } else if let Some(next) = self.next_raw_if(RawKind::Colon) {
            let mut token = self.make_token(TokenKind::QuestionColon, raw);
            token.span = raw.span.merge(&next.span);
            token.text = "?:".to_string();
            token
        } else if let Some(next) = self.next_raw_if(RawKind::LeftBracket) {
            self.bracket_nesting += 1;
            let mut token = self.make_token(TokenKind::QuestionLeftBracket, raw);
            token.span = raw.span.merge(&next.span);
            token.text = "?[".to_string();
            token
        } else {
            self.make_token(TokenKind::Question, raw)
        }
    }

    fn lex_period(&mut self, raw: &RawToken) -> Token {
        let Some(second) = self.next_raw_if(RawKind::Period) else {
            return self.make_token(TokenKind::Period, raw);
        };
        let mut token = match self.next_raw_if(RawKind::Period) {
            Some(third) => {
                let mut token = self.make_token(TokenKind::IndeterminateArgs, raw);
                token.span = raw.span.merge(&third.span);
                token.text = "...".to_string();
                token
            }
            None => {
                let mut token = self.make_token(TokenKind::SuperProc, raw);
                token.text = "..".to_string();
                token
            }
        };
        token.span = token.span.merge(&second.span);
        token
    }

    fn lex_punctuator(&mut self, raw: &RawToken) -> Token {
        match TokenKind::punctuator(&raw.text) {
            Some(TokenKind::RightCurly) => {
                // `}` closes the statement before it.
                let newline = self.make_token(TokenKind::Newline, raw);
                self.pending.push_back(Token::new(TokenKind::RightCurly, raw.span, "}"));
                newline
            }
            Some(kind) => self.make_token(kind, raw),
            None => {
                let first = raw.text.chars().next().unwrap_or(' ');
                self.make_error(format!("Invalid punctuator token '{}'", first), raw)
            }
        }
    }

    fn lex_identifier(&mut self, raw: RawToken) -> Token {
        let mut text = raw.text.clone();
        let mut span = raw.span;
        while let Some(fragment) = self
            .source
            .next_if(|next| matches!(next.kind, RawKind::Identifier | RawKind::Number))
        {
            text.push_str(&fragment.text);
            span = span.merge(&fragment.span);
            self.last_span = fragment.span;
        }

        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier);
        let mut token = self.make_token(kind, &raw);
        token.span = span;
        token.text = text;
        token
    }

    fn lex_number(&mut self, raw: &RawToken) -> Token {
        match parse_number(&raw.text) {
            Some(TokenValue::Integer(value)) => {
                self.make_token(TokenKind::Integer, raw).with_value(TokenValue::Integer(value))
            }
            Some(TokenValue::Float(value)) => {
                self.make_token(TokenKind::Float, raw).with_value(TokenValue::Float(value))
            }
            _ => self.make_error("Invalid number", raw),
        }
    }

    fn lex_string(&mut self, raw: &RawToken) -> Token {
        let kind = match raw.text.chars().next() {
            Some('\'') => TokenKind::Resource,
            Some('@') => TokenKind::RawString,
            _ => TokenKind::String,
        };
        let value = raw.value.clone().unwrap_or_default();
        self.make_token(kind, raw).with_value(TokenValue::String(value))
    }

    fn lex_string_part(&mut self, kind: TokenKind, raw: &RawToken) -> Token {
        let value = raw.value.clone().unwrap_or_default();
        self.make_token(kind, raw).with_value(TokenValue::String(value))
    }

    /// Tokenize the entire input, including the final `Eof`.
    pub fn tokenize(self) -> Vec<Token> {
        self.collect()
    }
}

/// Decode numeric literal text.
///
/// Hex with an explicit `0x` prefix, then a 32-bit integer, then a float.
/// `1.#INF` and `1.#IND` spell infinity and NaN.
pub fn parse_number(text: &str) -> Option<TokenValue> {
    match text {
        "1.#INF" | "1#INF" => return Some(TokenValue::Float(f64::INFINITY)),
        "1.#IND" | "1#IND" => return Some(TokenValue::Float(f64::NAN)),
        _ => {}
    }
    if let Some(hex) = text.strip_prefix("0x") {
        if let Ok(value) = i32::from_str_radix(hex, 16) {
            return Some(TokenValue::Integer(value as i64));
        }
    }
    if let Ok(value) = text.parse::<i32>() {
        return Some(TokenValue::Integer(value as i64));
    }
    text.parse::<f64>().ok().map(TokenValue::Float)
}

impl<I: Iterator<Item = RawToken>> Iterator for Lexer<I> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        Some(self.next_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::from_source(source, FileId::default()).tokenize()
    }

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty() {
        assert_eq!(token_kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_keywords() {
        use TokenKind::*;
        assert_eq!(
            token_kinds("var proc new del call_ext spawn"),
            vec![Var, Proc, New, Del, Call, Spawn, Eof]
        );
        assert_eq!(token_kinds("verb"), vec![Identifier, Eof]);
    }

    #[test]
    fn test_indent_and_dedent() {
        use TokenKind::*;
        let kinds = token_kinds("/obj\n\tvar/x\n\tvar/y\nmob");
        assert_eq!(
            kinds,
            vec![
                Slash, Identifier, Indent, Newline, Var, Slash, Identifier, Newline, Var, Slash,
                Identifier, Newline, Dedent, Identifier, Eof
            ]
        );
    }

    #[test]
    fn test_newlines_carry_line_indentation() {
        let levels: Vec<Option<usize>> = Lexer::from_source("/obj\n\tvar/x\n\t\tf()\nmob {x}", FileId(0))
            .filter(|token| token.kind == TokenKind::Newline)
            .map(|token| token.line_indentation())
            .collect();
        assert_eq!(levels, vec![Some(1), Some(2), Some(0), None]);
    }

    #[test]
    fn test_dedents_flushed_at_eof() {
        let mut lexer = Lexer::from_source("a\n\tb\n\t\tc", FileId::default());
        let mut kinds = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.is_eof();
            kinds.push(token.kind);
            if done {
                break;
            }
        }
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        assert_eq!(lexer.indentation_levels(), &[0]);
    }

    #[test]
    fn test_invalid_indentation_recovers() {
        let tokens = lex("a\n\t\tb\n\tc");
        let error = tokens.iter().find(|t| t.kind == TokenKind::Error);
        assert_eq!(error.and_then(|t| t.string_value()), Some("Invalid indentation"));
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(dedents, 1);
    }

    #[test]
    fn test_brackets_suppress_indentation() {
        let kinds = token_kinds("f(1,\n\t2)\ng");
        assert!(!kinds.contains(&TokenKind::Indent));
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn test_composites() {
        use TokenKind::*;
        assert_eq!(token_kinds("a?.b"), vec![Identifier, QuestionPeriod, Identifier, Eof]);
        assert_eq!(token_kinds("a?:b"), vec![Identifier, QuestionColon, Identifier, Eof]);
        assert_eq!(token_kinds("a?[1]"), vec![Identifier, QuestionLeftBracket, Integer, RightBracket, Eof]);
        assert_eq!(token_kinds("..()"), vec![SuperProc, LeftParen, RightParen, Eof]);
        assert_eq!(token_kinds("..."), vec![IndeterminateArgs, Eof]);
        assert_eq!(token_kinds("a ? b"), vec![Identifier, Question, Identifier, Eof]);
    }

    #[test]
    fn test_right_curly_ends_statement() {
        use TokenKind::*;
        assert_eq!(token_kinds("{x}"), vec![LeftCurly, Identifier, Newline, RightCurly, Eof]);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("42 0x10 2.5 1.#INF 3000000000");
        assert_eq!(tokens[0].value, TokenValue::Integer(42));
        assert_eq!(tokens[1].value, TokenValue::Integer(16));
        assert_eq!(tokens[2].value, TokenValue::Float(2.5));
        assert_eq!(tokens[3].value, TokenValue::Float(f64::INFINITY));
        assert_eq!(tokens[4].kind, TokenKind::Float);
        assert!(matches!(parse_number("1.#IND"), Some(TokenValue::Float(f)) if f.is_nan()));
        assert_eq!(parse_number("12abc"), None);
    }

    #[test]
    fn test_string_kinds() {
        use TokenKind::*;
        assert_eq!(token_kinds("\"a\" 'b.dmi' @\"c\" {\"d\"}"), vec![String, Resource, RawString, String, Eof]);
    }

    #[test]
    fn test_space_before() {
        let tokens = lex("a :b c:d");
        assert!(tokens[1].space_before);
        assert!(!tokens[2].space_before);
        assert!(!tokens[4].space_before);
    }

    #[test]
    fn test_identifier_fragments_joined() {
        let raws = vec![
            RawToken::new(RawKind::Identifier, "ab", Span::dummy()),
            RawToken::new(RawKind::Number, "12", Span::dummy()),
            RawToken::new(RawKind::Identifier, "c", Span::dummy()),
            RawToken::new(RawKind::Eof, "", Span::dummy()),
        ];
        let tokens = Lexer::new(raws.into_iter()).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "ab12c");
    }
}
