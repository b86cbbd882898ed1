//! Token types for the DM language.
//!
//! This module defines all token types produced by the lexer.

use crate::utils::location::Span;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Decoded literal value carried by a token.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum TokenValue {
    /// No value
    #[default]
    None,
    /// Integer literal value
    Integer(i64),
    /// Float literal value
    Float(f64),
    /// String body or error message
    String(String),
}

/// A token in the source code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The source span
    pub span: Span,
    /// The raw text
    pub text: String,
    /// Decoded literal value
    pub value: TokenValue,
    /// Whether whitespace separated this token from the previous one
    pub space_before: bool,
}

impl Token {
    /// Create a new token with no value.
    pub fn new(kind: TokenKind, span: Span, text: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            text: text.into(),
            value: TokenValue::None,
            space_before: false,
        }
    }

    /// Attach a decoded value.
    pub fn with_value(mut self, value: TokenValue) -> Self {
        self.value = value;
        self
    }

    /// Indentation width of the line a newline token starts. `None` for
    /// newlines that do not start a line, such as the one before `}`.
    pub fn line_indentation(&self) -> Option<usize> {
        match (self.kind, &self.value) {
            (TokenKind::Newline, TokenValue::Integer(level)) => usize::try_from(*level).ok(),
            _ => None,
        }
    }

    /// Check if this is an EOF token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// Check if this token is a keyword.
    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }

    /// The string value, if any.
    pub fn string_value(&self) -> Option<&str> {
        match &self.value {
            TokenValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.text)
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Structure
    /// Deeper indentation after a newline
    Indent,
    /// Shallower indentation after a newline
    Dedent,
    /// End of line
    Newline,
    /// End of file
    Eof,
    /// Unlexable input; the value holds the message
    Error,

    // Literals
    /// Integer literal
    Integer,
    /// Floating-point literal
    Float,
    /// String literal which may contain interpolations
    String,
    /// Resource literal `'file.dmi'`
    Resource,
    /// Raw string literal `@"..."`
    RawString,
    /// Start of a pre-split interpolated string
    StringBegin,
    /// Text between interpolations of a pre-split string
    StringMiddle,
    /// End of a pre-split interpolated string
    StringEnd,

    // Identifiers
    /// Identifier
    Identifier,

    // Keywords
    /// `null`
    Null,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `if`
    If,
    /// `else`
    Else,
    /// `for`
    For,
    /// `switch`
    Switch,
    /// `while`
    While,
    /// `do`
    Do,
    /// `var`
    Var,
    /// `proc`
    Proc,
    /// `new`
    New,
    /// `del`
    Del,
    /// `return`
    Return,
    /// `in`
    In,
    /// `to`
    To,
    /// `as`
    As,
    /// `set`
    Set,
    /// `call` or `call_ext`
    Call,
    /// `spawn`
    Spawn,
    /// `goto`
    Goto,
    /// `step`
    Step,
    /// `try`
    Try,
    /// `catch`
    Catch,
    /// `throw`
    Throw,

    // Arithmetic
    /// `+`
    Plus,
    /// `++`
    PlusPlus,
    /// `+=`
    PlusEquals,
    /// `-`
    Minus,
    /// `--`
    MinusMinus,
    /// `-=`
    MinusEquals,
    /// `*`
    Star,
    /// `**`
    StarStar,
    /// `*=`
    StarEquals,
    /// `/`
    Slash,
    /// `/=`
    SlashEquals,
    /// `%`
    Modulus,
    /// `%=`
    ModulusEquals,
    /// `%%`
    ModulusModulus,
    /// `%%=`
    ModulusModulusEquals,

    // Comparison
    /// `==`
    EqualsEquals,
    /// `!=` or `<>`
    ExclamationEquals,
    /// `~=`
    TildeEquals,
    /// `~!`
    TildeExclamation,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEquals,

    // Bitwise and logical
    /// `!`
    Exclamation,
    /// `~`
    Tilde,
    /// `&`
    And,
    /// `&&`
    AndAnd,
    /// `&=`
    AndEquals,
    /// `&&=`
    AndAndEquals,
    /// `|`
    Bar,
    /// `||`
    BarBar,
    /// `|=`
    BarEquals,
    /// `||=`
    BarBarEquals,
    /// `^`
    Xor,
    /// `^=`
    XorEquals,
    /// `<<`
    LeftShift,
    /// `<<=`
    LeftShiftEquals,
    /// `>>`
    RightShift,
    /// `>>=`
    RightShiftEquals,

    // Assignment
    /// `=`
    Equals,
    /// `:=`
    AssignInto,

    // Delimiters
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftCurly,
    /// `}`
    RightCurly,
    /// `[]`
    DoubleSquareBracket,
    /// `[]=`
    DoubleSquareBracketEquals,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `:`
    Colon,
    /// `::`
    DoubleColon,
    /// `.`
    Period,
    /// `..`
    SuperProc,
    /// `...`
    IndeterminateArgs,
    /// `?`
    Question,
    /// `?.`
    QuestionPeriod,
    /// `?:`
    QuestionColon,
    /// `?[`
    QuestionLeftBracket,
}

impl TokenKind {
    /// Check if this is a keyword.
    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Null | Break | Continue | If | Else | For | Switch | While | Do | Var | Proc | New |
            Del | Return | In | To | As | Set | Call | Spawn | Goto | Step | Try | Catch | Throw
        )
    }

    /// Check if this is an assignment operator.
    pub fn is_assignment(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Equals | PlusEquals | MinusEquals | StarEquals | SlashEquals | ModulusEquals |
            ModulusModulusEquals | BarEquals | BarBarEquals | AndEquals | AndAndEquals |
            XorEquals | LeftShiftEquals | RightShiftEquals | AssignInto
        )
    }

    /// Check if this token ends a statement.
    pub fn is_statement_end(&self) -> bool {
        matches!(self, TokenKind::Newline | TokenKind::Semicolon | TokenKind::Dedent | TokenKind::Eof | TokenKind::RightCurly)
    }

    /// Get the keyword for a string, if it is a keyword.
    pub fn keyword(s: &str) -> Option<TokenKind> {
        use TokenKind::*;
        match s {
            "null" => Some(Null),
            "break" => Some(Break),
            "continue" => Some(Continue),
            "if" => Some(If),
            "else" => Some(Else),
            "for" => Some(For),
            "switch" => Some(Switch),
            "while" => Some(While),
            "do" => Some(Do),
            "var" => Some(Var),
            "proc" => Some(Proc),
            "new" => Some(New),
            "del" => Some(Del),
            "return" => Some(Return),
            "in" => Some(In),
            "to" => Some(To),
            "as" => Some(As),
            "set" => Some(Set),
            "call" | "call_ext" => Some(Call),
            "spawn" => Some(Spawn),
            "goto" => Some(Goto),
            "step" => Some(Step),
            "try" => Some(Try),
            "catch" => Some(Catch),
            "throw" => Some(Throw),
            _ => None,
        }
    }

    /// Get the punctuator for its text, if it is one.
    pub fn punctuator(s: &str) -> Option<TokenKind> {
        use TokenKind::*;
        let kind = match s {
            "{" => LeftCurly,
            "}" => RightCurly,
            "/" => Slash,
            "/=" => SlashEquals,
            "=" => Equals,
            "==" => EqualsEquals,
            "!" => Exclamation,
            "!=" | "<>" => ExclamationEquals,
            "^" => Xor,
            "^=" => XorEquals,
            "%" => Modulus,
            "%=" => ModulusEquals,
            "%%" => ModulusModulus,
            "%%=" => ModulusModulusEquals,
            "~" => Tilde,
            "~=" => TildeEquals,
            "~!" => TildeExclamation,
            "&" => And,
            "&&" => AndAnd,
            "&&=" => AndAndEquals,
            "&=" => AndEquals,
            "+" => Plus,
            "++" => PlusPlus,
            "+=" => PlusEquals,
            "-" => Minus,
            "--" => MinusMinus,
            "-=" => MinusEquals,
            "*" => Star,
            "**" => StarStar,
            "*=" => StarEquals,
            "|" => Bar,
            "||" => BarBar,
            "||=" => BarBarEquals,
            "|=" => BarEquals,
            "<" => LessThan,
            "<<" => LeftShift,
            "<=" => LessThanEquals,
            "<<=" => LeftShiftEquals,
            ">" => GreaterThan,
            ">>" => RightShift,
            ">=" => GreaterThanEquals,
            ">>=" => RightShiftEquals,
            ":=" => AssignInto,
            "[]" => DoubleSquareBracket,
            "[]=" => DoubleSquareBracketEquals,
            "::" => DoubleColon,
            _ => return None,
        };
        Some(kind)
    }

    /// Get a human-readable name for this token kind.
    pub fn name(&self) -> &'static str {
        use TokenKind::*;
        match self {
            Indent => "indent",
            Dedent => "dedent",
            Newline => "newline",
            Eof => "end of file",
            Error => "error",
            Integer => "integer",
            Float => "float",
            String => "string",
            Resource => "resource",
            RawString => "raw string",
            StringBegin | StringMiddle | StringEnd => "string",
            Identifier => "identifier",
            Null => "null",
            Break => "break",
            Continue => "continue",
            If => "if",
            Else => "else",
            For => "for",
            Switch => "switch",
            While => "while",
            Do => "do",
            Var => "var",
            Proc => "proc",
            New => "new",
            Del => "del",
            Return => "return",
            In => "in",
            To => "to",
            As => "as",
            Set => "set",
            Call => "call",
            Spawn => "spawn",
            Goto => "goto",
            Step => "step",
            Try => "try",
            Catch => "catch",
            Throw => "throw",
            Plus => "+",
            PlusPlus => "++",
            PlusEquals => "+=",
            Minus => "-",
            MinusMinus => "--",
            MinusEquals => "-=",
            Star => "*",
            StarStar => "**",
            StarEquals => "*=",
            Slash => "/",
            SlashEquals => "/=",
            Modulus => "%",
            ModulusEquals => "%=",
            ModulusModulus => "%%",
            ModulusModulusEquals => "%%=",
            EqualsEquals => "==",
            ExclamationEquals => "!=",
            TildeEquals => "~=",
            TildeExclamation => "~!",
            LessThan => "<",
            LessThanEquals => "<=",
            GreaterThan => ">",
            GreaterThanEquals => ">=",
            Exclamation => "!",
            Tilde => "~",
            And => "&",
            AndAnd => "&&",
            AndEquals => "&=",
            AndAndEquals => "&&=",
            Bar => "|",
            BarBar => "||",
            BarEquals => "|=",
            BarBarEquals => "||=",
            Xor => "^",
            XorEquals => "^=",
            LeftShift => "<<",
            LeftShiftEquals => "<<=",
            RightShift => ">>",
            RightShiftEquals => ">>=",
            Equals => "=",
            AssignInto => ":=",
            LeftParen => "(",
            RightParen => ")",
            LeftBracket => "[",
            RightBracket => "]",
            LeftCurly => "{",
            RightCurly => "}",
            DoubleSquareBracket => "[]",
            DoubleSquareBracketEquals => "[]=",
            Comma => ",",
            Semicolon => ";",
            Colon => ":",
            DoubleColon => "::",
            Period => ".",
            SuperProc => "..",
            IndeterminateArgs => "...",
            Question => "?",
            QuestionPeriod => "?.",
            QuestionColon => "?:",
            QuestionLeftBracket => "?[",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
