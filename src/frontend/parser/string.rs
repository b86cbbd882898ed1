//! String literals, escapes and interpolation.
//!
//! Interpolated values and text macros are encoded into the string as
//! marker characters in the `U+FF00` block, one per hole or macro. The
//! low byte is the [`FormatCode`].

use super::Parser;
use crate::frontend::ast::{Expr, ExprKind};
use crate::frontend::lexer::Lexer;
use crate::frontend::scanner::{RawToken, Scanner};
use crate::frontend::token::{Token, TokenKind};
use crate::utils::diagnostics::Diagnostics;
use crate::utils::errors::{ErrorCode, ParseErrorKind, ParseResult};
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};

const FORMAT_PREFIX: u32 = 0xFF00;

/// Formatting markers stored in string values.
///
/// The first three describe how an interpolated value is printed; the
/// rest are text macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FormatCode {
    /// `[x]`, with an article when the value needs one
    StringifyWithArticle = 0,
    /// `[x]` after an article macro
    StringifyNoArticle,
    /// `\ref[x]`
    ReferenceOfValue,
    /// `\The`
    UpperDefiniteArticle,
    /// `\the`
    LowerDefiniteArticle,
    /// `\A`, `\An`
    UpperIndefiniteArticle,
    /// `\a`, `\an`
    LowerIndefiniteArticle,
    /// `\He`, `\She`
    UpperSubjectPronoun,
    /// `\he`, `\she`
    LowerSubjectPronoun,
    /// `\His`
    UpperPossessiveAdjective,
    /// `\his`
    LowerPossessiveAdjective,
    /// `\him`
    ObjectPronoun,
    /// `\himself`, `\herself`
    ReflexivePronoun,
    /// `\Hers`
    UpperPossessivePronoun,
    /// `\hers`
    LowerPossessivePronoun,
    /// `\proper`
    Proper,
    /// `\improper`
    Improper,
    /// `\roman`
    LowerRoman,
    /// `\Roman`
    UpperRoman,
    /// `\th`
    OrdinalIndicator,
    /// `\s`
    PluralSuffix,
    /// `\icon`
    Icon,
    /// `\red`
    ColorRed,
    /// `\blue`
    ColorBlue,
    /// `\green`
    ColorGreen,
    /// `\black`
    ColorBlack,
    /// `\yellow`
    ColorYellow,
    /// `\navy`
    ColorNavy,
    /// `\teal`
    ColorTeal,
    /// `\cyan`
    ColorCyan,
    /// `\bold`, `\b`
    Bold,
    /// `\italic`
    Italic,
}

impl FormatCode {
    const ALL: [FormatCode; 32] = [
        FormatCode::StringifyWithArticle,
        FormatCode::StringifyNoArticle,
        FormatCode::ReferenceOfValue,
        FormatCode::UpperDefiniteArticle,
        FormatCode::LowerDefiniteArticle,
        FormatCode::UpperIndefiniteArticle,
        FormatCode::LowerIndefiniteArticle,
        FormatCode::UpperSubjectPronoun,
        FormatCode::LowerSubjectPronoun,
        FormatCode::UpperPossessiveAdjective,
        FormatCode::LowerPossessiveAdjective,
        FormatCode::ObjectPronoun,
        FormatCode::ReflexivePronoun,
        FormatCode::UpperPossessivePronoun,
        FormatCode::LowerPossessivePronoun,
        FormatCode::Proper,
        FormatCode::Improper,
        FormatCode::LowerRoman,
        FormatCode::UpperRoman,
        FormatCode::OrdinalIndicator,
        FormatCode::PluralSuffix,
        FormatCode::Icon,
        FormatCode::ColorRed,
        FormatCode::ColorBlue,
        FormatCode::ColorGreen,
        FormatCode::ColorBlack,
        FormatCode::ColorYellow,
        FormatCode::ColorNavy,
        FormatCode::ColorTeal,
        FormatCode::ColorCyan,
        FormatCode::Bold,
        FormatCode::Italic,
    ];

    /// The character stored in the string for this code.
    pub fn marker(self) -> char {
        char::from_u32(FORMAT_PREFIX + self as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    /// Decode a marker character.
    pub fn from_marker(c: char) -> Option<FormatCode> {
        let code = (c as u32).checked_sub(FORMAT_PREFIX)?;
        Self::ALL.get(code as usize).copied()
    }

    /// Whether the code describes an interpolated value rather than a macro.
    pub fn is_interpolation(self) -> bool {
        matches!(
            self,
            FormatCode::StringifyWithArticle | FormatCode::StringifyNoArticle | FormatCode::ReferenceOfValue
        )
    }

    fn from_macro(name: &str) -> Option<(FormatCode, MacroPlacement)> {
        use FormatCode::*;
        use MacroPlacement::*;
        Some(match name {
            "The" => (UpperDefiniteArticle, BeforeValue),
            "the" => (LowerDefiniteArticle, BeforeValue),
            "A" | "An" => (UpperIndefiniteArticle, BeforeValue),
            "a" | "an" => (LowerIndefiniteArticle, BeforeValue),
            "proper" => (Proper, BeforeValue),
            "improper" => (Improper, BeforeValue),
            "roman" => (LowerRoman, BeforeValue),
            "Roman" => (UpperRoman, BeforeValue),
            "icon" => (Icon, BeforeValue),
            "ref" => (ReferenceOfValue, BeforeValue),
            "He" | "She" => (UpperSubjectPronoun, AfterValue),
            "he" | "she" => (LowerSubjectPronoun, AfterValue),
            "His" => (UpperPossessiveAdjective, AfterValue),
            "his" => (LowerPossessiveAdjective, AfterValue),
            "him" | "Him" => (ObjectPronoun, AfterValue),
            "himself" | "herself" => (ReflexivePronoun, AfterValue),
            "Hers" => (UpperPossessivePronoun, AfterValue),
            "hers" => (LowerPossessivePronoun, AfterValue),
            "th" => (OrdinalIndicator, AfterValue),
            "s" => (PluralSuffix, AfterValue),
            "red" => (ColorRed, Standalone),
            "blue" => (ColorBlue, Standalone),
            "green" => (ColorGreen, Standalone),
            "black" => (ColorBlack, Standalone),
            "yellow" => (ColorYellow, Standalone),
            "navy" => (ColorNavy, Standalone),
            "teal" => (ColorTeal, Standalone),
            "cyan" => (ColorCyan, Standalone),
            "bold" | "b" => (Bold, Standalone),
            "italic" => (Italic, Standalone),
            _ => return None,
        })
    }
}

/// Where a macro's value comes from.
#[derive(Clone, Copy, PartialEq, Eq)]
enum MacroPlacement {
    /// Applies to the next `[]`
    BeforeValue,
    /// Applies to the previous `[]`
    AfterValue,
    /// Needs no value
    Standalone,
}

/// Accumulates a string value and its holes.
struct FormatBuilder {
    value: String,
    holes: Vec<Option<Expr>>,
    next_hole: FormatCode,
    last_hole: Option<FormatCode>,
}

impl FormatBuilder {
    fn new() -> Self {
        Self {
            value: String::new(),
            holes: Vec::new(),
            next_hole: FormatCode::StringifyWithArticle,
            last_hole: None,
        }
    }

    /// Append literal text, decoding escapes and macros.
    fn text(&mut self, text: &str, span: Span, diagnostics: &mut Diagnostics) {
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            i += 1;
            if c != '\\' {
                self.value.push(c);
                continue;
            }
            let Some(&next) = chars.get(i) else {
                self.value.push('\\');
                break;
            };

            if next == 'u' {
                let hex: String = chars.iter().skip(i + 1).take(4).collect();
                if hex.len() == 4 {
                    if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        self.value.push(decoded);
                        i += 5;
                        continue;
                    }
                }
            }

            if chars[i..].starts_with(&['.', '.', '.']) {
                i += 3;
                continue;
            }

            let word: String = chars[i..].iter().take_while(|c| c.is_ascii_alphabetic()).collect();
            if let Some((code, placement)) = FormatCode::from_macro(&word) {
                i += word.len();
                self.apply_macro(code, placement, span, diagnostics);
                continue;
            }

            i += 1;
            self.value.push(match next {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
        }
    }

    fn apply_macro(&mut self, code: FormatCode, placement: MacroPlacement, span: Span, diagnostics: &mut Diagnostics) {
        match placement {
            MacroPlacement::BeforeValue if code == FormatCode::ReferenceOfValue => {
                self.next_hole = FormatCode::ReferenceOfValue;
            }
            MacroPlacement::BeforeValue => {
                self.value.push(code.marker());
                self.next_hole = FormatCode::StringifyNoArticle;
            }
            MacroPlacement::AfterValue => {
                if !matches!(self.last_hole, Some(hole) if hole != FormatCode::ReferenceOfValue) {
                    diagnostics.emit(
                        ErrorCode::MissingInterpolatedExpression,
                        span,
                        format!("Macro \"{:?}\" requires a preceding interpolated expression", code),
                    );
                }
                self.value.push(code.marker());
            }
            MacroPlacement::Standalone => self.value.push(code.marker()),
        }
    }

    fn hole(&mut self, expr: Option<Expr>) {
        let code = std::mem::replace(&mut self.next_hole, FormatCode::StringifyWithArticle);
        self.value.push(code.marker());
        self.holes.push(expr);
        self.last_hole = Some(code);
    }

    fn finish(self, span: Span) -> Expr {
        if self.holes.is_empty() {
            Expr::string_lit(self.value, span)
        } else {
            Expr::new(ExprKind::StringFormat { value: self.value, holes: self.holes }, span)
        }
    }
}

/// Index of the `]` closing the hole opened just before `start`.
fn hole_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut quote: Option<char> = None;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(_) if c == '\\' => i += 1,
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

impl<I: Iterator<Item = RawToken>> Parser<I> {
    /// Build the expression for a complete string token.
    pub(super) fn string_literal(&mut self, token: &Token) -> Expr {
        let body = token.string_value().unwrap_or_default();
        let span = token.span;
        let chars: Vec<char> = body.chars().collect();
        let mut builder = FormatBuilder::new();
        let mut run = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '\\' {
                run.push(c);
                if let Some(&escaped) = chars.get(i + 1) {
                    run.push(escaped);
                }
                i += 2;
                continue;
            }
            if c != '[' {
                run.push(c);
                i += 1;
                continue;
            }

            let Some(end) = hole_end(&chars, i + 1) else {
                self.diagnostics.emit(ErrorCode::BadToken, span, "Expected ']'");
                break;
            };
            builder.text(&std::mem::take(&mut run), span, &mut self.diagnostics);
            let inner: String = chars[i + 1..end].iter().collect();
            let expr = self.embedded_expression(inner.trim(), span);
            builder.hole(expr);
            i = end + 1;
        }
        builder.text(&run, span, &mut self.diagnostics);
        builder.finish(span)
    }

    /// Parse the text of one `[...]` with its own lexer, reporting into
    /// this parser's diagnostics.
    fn embedded_expression(&mut self, text: &str, span: Span) -> Option<Expr> {
        if text.is_empty() {
            return None;
        }
        let lexer = Lexer::new(Scanner::anchored(text, span));
        let mut inner = Parser::with_diagnostics(lexer, self.diagnostics.fork());
        let result = inner.parse_expression();
        self.diagnostics.append(inner.into_diagnostics());
        match result {
            Ok(expr) => Some(expr),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    /// A string pre-split into `StringBegin expr (StringMiddle expr)* StringEnd`.
    pub(super) fn string_segments(&mut self) -> ParseResult<Expr> {
        let start = self.current.span;
        let mut builder = FormatBuilder::new();
        let first = self.current.clone();
        self.advance();
        builder.text(first.string_value().unwrap_or_default(), first.span, &mut self.diagnostics);

        loop {
            let hole = self.expression_opt()?;
            builder.hole(hole);

            let segment = self.current.clone();
            match segment.kind {
                TokenKind::StringMiddle | TokenKind::StringEnd => {
                    self.advance();
                    builder.text(segment.string_value().unwrap_or_default(), segment.span, &mut self.diagnostics);
                    if segment.kind == TokenKind::StringEnd {
                        break;
                    }
                }
                _ => return Err(self.error(ParseErrorKind::ExpectedToken, "Expected end of string")),
            }
        }
        Ok(builder.finish(start.merge(&self.previous.span)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::location::FileId;

    fn parse(source: &str) -> (Expr, Diagnostics) {
        let mut parser = Parser::from_source(source, FileId(0));
        let expr = match parser.parse_expression() {
            Ok(expr) => expr,
            Err(error) => panic!("failed to parse {:?}: {}", source, error),
        };
        (expr, parser.into_diagnostics())
    }

    fn markers(value: &str) -> Vec<FormatCode> {
        value.chars().filter_map(FormatCode::from_marker).collect()
    }

    #[test]
    fn test_marker_round_trip() {
        assert_eq!(FormatCode::from_marker(FormatCode::Icon.marker()), Some(FormatCode::Icon));
        assert_eq!(FormatCode::from_marker('a'), None);
        assert!(FormatCode::ReferenceOfValue.is_interpolation());
        assert!(!FormatCode::Bold.is_interpolation());
    }

    #[test]
    fn test_plain_string_and_escapes() {
        let (expr, _) = parse(r#""a\tb\n\"c\" \[x\] \u00e9""#);
        assert_eq!(expr.kind, ExprKind::String("a\tb\n\"c\" [x] é".to_string()));
    }

    #[test]
    fn test_ellipsis_escape_is_dropped() {
        let (expr, _) = parse(r#""wait\...""#);
        assert_eq!(expr.kind, ExprKind::String("wait".to_string()));
    }

    #[test]
    fn test_interpolation() {
        let (expr, diagnostics) = parse(r#""Hello [usr.name], you have [count + 1] items[]""#);
        assert!(diagnostics.is_empty());
        match expr.kind {
            ExprKind::StringFormat { value, holes } => {
                assert_eq!(holes.len(), 3);
                assert!(matches!(holes[0].as_ref().map(|e| &e.kind), Some(ExprKind::Dereference { .. })));
                assert!(matches!(holes[1].as_ref().map(|e| &e.kind), Some(ExprKind::Binary { .. })));
                assert!(holes[2].is_none());
                assert_eq!(markers(&value), vec![FormatCode::StringifyWithArticle; 3]);
                assert!(value.starts_with("Hello "));
            }
            other => panic!("Expected string format, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_string_in_hole() {
        let (expr, _) = parse(r#""[list("a]", "b")[1]]!""#);
        match expr.kind {
            ExprKind::StringFormat { holes, .. } => {
                assert!(matches!(holes[0].as_ref().map(|e| &e.kind), Some(ExprKind::Dereference { .. })));
            }
            other => panic!("Expected string format, got {:?}", other),
        }
    }

    #[test]
    fn test_article_and_ref_macros() {
        let (expr, _) = parse(r#""\The [src] hits \ref[target].""#);
        match expr.kind {
            ExprKind::StringFormat { value, .. } => {
                assert_eq!(
                    markers(&value),
                    vec![
                        FormatCode::UpperDefiniteArticle,
                        FormatCode::StringifyNoArticle,
                        FormatCode::ReferenceOfValue
                    ]
                );
            }
            other => panic!("Expected string format, got {:?}", other),
        }
    }

    #[test]
    fn test_suffix_macros_need_a_value() {
        let (_, diagnostics) = parse(r#""[count] apple\s""#);
        assert!(diagnostics.is_empty());

        let (_, diagnostics) = parse(r#""\he waves""#);
        assert!(diagnostics.contains(ErrorCode::MissingInterpolatedExpression));

        let (_, diagnostics) = parse(r#""\ref[x]\s""#);
        assert!(diagnostics.contains(ErrorCode::MissingInterpolatedExpression));
    }

    #[test]
    fn test_bad_hole_expression_is_reported() {
        let mut parser = Parser::from_source(r#""total: [1 +]""#, FileId(0));
        let expr = parser.parse_expression().unwrap();
        assert!(matches!(expr.kind, ExprKind::StringFormat { ref holes, .. } if holes[0].is_none()));
        assert!(parser.diagnostics().contains(ErrorCode::MissingExpression));
    }

    #[test]
    fn test_raw_string_is_not_decoded() {
        let (expr, _) = parse(r#"@"C:\new[x]""#);
        assert_eq!(expr.kind, ExprKind::String(r"C:\new[x]".to_string()));
    }
}
