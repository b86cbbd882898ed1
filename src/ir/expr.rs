//! Resolved expressions.
//!
//! The resolver turns AST expressions into this smaller tree. Every name has
//! been bound to a local, field, global or proc, built-ins are collapsed into
//! [`ExprKind::Builtin`], and every node carries the type path it is known to
//! have, if any.

use crate::frontend::ast::{AssignOp, BinaryOp, UnaryOp, ValueTypes};
use crate::frontend::path::TypePath;
use crate::utils::location::Span;
use serde::{Serialize, Deserialize};
use std::fmt;

/// A resolved expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// The kind of expression
    pub kind: ExprKind,
    /// Statically known type of the value
    pub path: Option<TypePath>,
    /// The type of the value cannot be checked at compile time
    pub fuzzy: bool,
    /// Source span
    pub span: Span,
}

impl Expr {
    /// Create an expression with no known type.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, path: None, fuzzy: false, span }
    }

    /// Attach a statically known type.
    pub fn with_path(mut self, path: Option<TypePath>) -> Self {
        self.path = path;
        self
    }

    /// Mark the type as unknowable.
    pub fn into_fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    /// `null`
    pub fn null(span: Span) -> Self {
        Self::new(ExprKind::Null, span)
    }

    /// A number constant.
    pub fn number(value: f64, span: Span) -> Self {
        Self::new(ExprKind::Number(value), span)
    }

    /// A string constant.
    pub fn string(value: impl Into<String>, span: Span) -> Self {
        Self::new(ExprKind::String(value.into()), span)
    }

    /// Check if this is a compile-time constant.
    pub fn is_constant(&self) -> bool {
        match &self.kind {
            ExprKind::Null
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Resource(_)
            | ExprKind::Path(_)
            | ExprKind::ProcReference(_) => true,
            ExprKind::List(entries) => entries
                .iter()
                .all(|e| e.value.is_constant() && e.key.as_ref().map_or(true, Expr::is_constant)),
            _ => false,
        }
    }

    /// Truthiness of a constant, `None` when unknown at compile time.
    pub fn truthiness(&self) -> Option<bool> {
        match &self.kind {
            ExprKind::Null => Some(false),
            ExprKind::Number(v) => Some(*v != 0.0),
            ExprKind::String(s) => Some(!s.is_empty()),
            ExprKind::Resource(_) | ExprKind::Path(_) | ExprKind::ProcReference(_) => Some(true),
            _ => None,
        }
    }

    /// The value of a number constant.
    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            ExprKind::Number(v) => Some(v),
            _ => None,
        }
    }

    /// Check whether a value can be stored into this expression.
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Local { .. }
            | ExprKind::Field { .. }
            | ExprKind::GlobalField { .. }
            | ExprKind::SelfValue
            | ExprKind::ScopeField { .. } => true,
            ExprKind::Dereference { ops, .. } => {
                matches!(ops.last(), Some(DerefOp { kind: DerefKind::Field { .. } | DerefKind::Index(_), .. }))
            }
            _ => false,
        }
    }
}

/// A call argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Name for `name = value`
    pub name: Option<String>,
    /// The value
    pub value: Expr,
}

/// One `key = value` entry of `list()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    /// Association key
    pub key: Option<Expr>,
    /// The value
    pub value: Expr,
}

/// One entry of `pick()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickEntry {
    /// Relative weight
    pub weight: Option<Expr>,
    /// The value
    pub value: Expr,
}

/// Resolved link of a dereference chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerefOp {
    /// What the link does
    pub kind: DerefKind,
    /// Evaluates to null instead of failing on a null value
    pub safe: bool,
    /// Type of the value this link produces, if known
    pub path: Option<TypePath>,
    /// Source span
    pub span: Span,
}

/// The kind of a resolved dereference link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DerefKind {
    /// Field access; `search` links are looked up at runtime
    Field { name: String, search: bool },
    /// `[index]`
    Index(Box<Expr>),
    /// Proc call; `search` links are looked up at runtime
    Call { name: String, search: bool, args: Vec<Argument> },
}

/// Who a direct proc call goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcTarget {
    /// A proc of `src`
    Src(String),
    /// A global proc
    Global(String),
    /// `.()`, the current proc
    SelfProc,
    /// `..()`, the parent's version of the current proc
    SuperProc,
}

/// Built-in procs with positional arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    Sin,
    Cos,
    Tan,
    ArcSin,
    ArcCos,
    ArcTan,
    ArcTan2,
    Sqrt,
    Abs,
    Log,
    IsType,
    Length,
    GetStep,
    GetDir,
    LocateCoordinates,
    Gradient,
    Rgb,
    Prob,
}

impl Builtin {
    /// The name the built-in is called by.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::ArcSin => "arcsin",
            Builtin::ArcCos => "arccos",
            Builtin::ArcTan | Builtin::ArcTan2 => "arctan",
            Builtin::Sqrt => "sqrt",
            Builtin::Abs => "abs",
            Builtin::Log => "log",
            Builtin::IsType => "istype",
            Builtin::Length => "length",
            Builtin::GetStep => "get_step",
            Builtin::GetDir => "get_dir",
            Builtin::LocateCoordinates => "locate",
            Builtin::Gradient => "gradient",
            Builtin::Rgb => "rgb",
            Builtin::Prob => "prob",
        }
    }
}

/// The kind of a resolved expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Null,
    Number(f64),
    String(String),
    Resource(String),
    /// Constant type path
    Path(TypePath),
    /// Constant reference to a proc, e.g. `/mob/proc/attack`
    ProcReference(TypePath),
    /// Interpolated string; holes for `[]` resolve to `null`
    StringFormat { value: String, holes: Vec<Expr> },

    Src,
    Usr,
    Args,
    World,
    /// `.`
    SelfValue,
    /// A local variable or parameter
    Local { name: String, id: usize },
    /// An instance var of `src`
    Field { name: String },
    /// A global or static var
    GlobalField { name: String, id: usize },
    /// `global.vars`
    GlobalVars,
    /// `/type::name` on a type's instance var default
    ScopeField { owner: TypePath, name: String },

    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    /// `isnull(x)`, also produced from `x == null`
    IsNull(Box<Expr>),
    Assign { op: AssignOp, target: Box<Expr>, value: Box<Expr> },
    Ternary { condition: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    In { value: Box<Expr>, container: Box<Expr> },
    InRange { value: Box<Expr>, start: Box<Expr>, end: Box<Expr>, step: Option<Box<Expr>> },

    /// `new /type(args)`
    NewPath { path: TypePath, args: Vec<Argument> },
    /// `new expr(args)`
    New { ty: Box<Expr>, args: Vec<Argument> },
    Dereference { base: Box<Expr>, ops: Vec<DerefOp> },
    ProcCall { target: ProcTarget, args: Vec<Argument> },
    /// `call(...)(...)`
    DynamicCall { callee: Vec<Expr>, args: Vec<Argument> },

    List(Vec<ListEntry>),
    NewList(Vec<Expr>),
    AddText(Vec<Expr>),
    Pick(Vec<PickEntry>),
    Input { args: Vec<Expr>, types: ValueTypes, list: Option<Box<Expr>> },
    Initial(Box<Expr>),
    IsSaved(Box<Expr>),
    Locate { ty: Box<Expr>, container: Option<Box<Expr>> },
    Builtin { func: Builtin, args: Vec<Expr> },
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} = {}", name, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ExprKind::*;

        match &self.kind {
            Null => write!(f, "null"),
            Number(v) => write!(f, "{}", v),
            String(s) => write!(f, "{:?}", s),
            Resource(r) => write!(f, "'{}'", r),
            Path(p) | ProcReference(p) => write!(f, "{}", p),
            StringFormat { value, holes } => {
                write!(f, "format({:?}", value)?;
                for hole in holes {
                    write!(f, ", {}", hole)?;
                }
                write!(f, ")")
            }
            Src => write!(f, "src"),
            Usr => write!(f, "usr"),
            Args => write!(f, "args"),
            World => write!(f, "world"),
            SelfValue => write!(f, "."),
            Local { name, id } => write!(f, "{}#{}", name, id),
            Field { name } => write!(f, "src.{}", name),
            GlobalField { name, .. } => write!(f, "global.{}", name),
            GlobalVars => write!(f, "global.vars"),
            ScopeField { owner, name } => write!(f, "{}::{}", owner, name),
            Unary { op, operand } => match op {
                UnaryOp::PostIncrement | UnaryOp::PostDecrement => write!(f, "({}{})", operand, op),
                _ => write!(f, "({}{})", op, operand),
            },
            Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            IsNull(value) => write!(f, "isnull({})", value),
            Assign { op, target, value } => write!(f, "({} {} {})", target, op, value),
            Ternary { condition, then_expr, else_expr } => {
                write!(f, "({} ? {} : {})", condition, then_expr, else_expr)
            }
            In { value, container } => write!(f, "({} in {})", value, container),
            InRange { value, start, end, step } => {
                write!(f, "({} in {} to {}", value, start, end)?;
                if let Some(step) = step {
                    write!(f, " step {}", step)?;
                }
                write!(f, ")")
            }
            NewPath { path, args } => {
                write!(f, "new {}(", path)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            New { ty, args } => {
                write!(f, "new {}(", ty)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Dereference { base, ops } => {
                write!(f, "{}", base)?;
                for op in ops {
                    let safe = if op.safe { "?" } else { "" };
                    match &op.kind {
                        DerefKind::Field { name, search } => {
                            write!(f, "{}{}{}", safe, if *search { ":" } else { "." }, name)?
                        }
                        DerefKind::Index(index) => write!(f, "{}[{}]", safe, index)?,
                        DerefKind::Call { name, search, args } => {
                            write!(f, "{}{}{}(", safe, if *search { ":" } else { "." }, name)?;
                            write_list(f, args)?;
                            write!(f, ")")?;
                        }
                    }
                }
                Ok(())
            }
            ProcCall { target, args } => {
                match target {
                    ProcTarget::Src(name) => write!(f, "{}(", name)?,
                    ProcTarget::Global(name) => write!(f, "global.{}(", name)?,
                    ProcTarget::SelfProc => write!(f, ".(")?,
                    ProcTarget::SuperProc => write!(f, "..(")?,
                }
                write_list(f, args)?;
                write!(f, ")")
            }
            DynamicCall { callee, args } => {
                write!(f, "call(")?;
                write_list(f, callee)?;
                write!(f, ")(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            List(entries) => {
                write!(f, "list(")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &entry.key {
                        Some(key) => write!(f, "{} = {}", key, entry.value)?,
                        None => write!(f, "{}", entry.value)?,
                    }
                }
                write!(f, ")")
            }
            NewList(values) => {
                write!(f, "newlist(")?;
                write_list(f, values)?;
                write!(f, ")")
            }
            AddText(values) => {
                write!(f, "addtext(")?;
                write_list(f, values)?;
                write!(f, ")")
            }
            Pick(entries) => {
                write!(f, "pick(")?;
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(weight) = &entry.weight {
                        write!(f, "prob({}); ", weight)?;
                    }
                    write!(f, "{}", entry.value)?;
                }
                write!(f, ")")
            }
            Input { args, list, .. } => {
                write!(f, "input(")?;
                write_list(f, args)?;
                write!(f, ")")?;
                if let Some(list) = list {
                    write!(f, " in {}", list)?;
                }
                Ok(())
            }
            Initial(value) => write!(f, "initial({})", value),
            IsSaved(value) => write!(f, "issaved({})", value),
            Locate { ty, container } => {
                write!(f, "locate({})", ty)?;
                if let Some(container) = container {
                    write!(f, " in {}", container)?;
                }
                Ok(())
            }
            Builtin { func, args } => {
                write!(f, "{}(", func.name())?;
                write_list(f, args)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        let span = Span::dummy();
        assert!(Expr::null(span).is_constant());
        assert_eq!(Expr::string("", span).truthiness(), Some(false));
        assert_eq!(Expr::number(2.0, span).truthiness(), Some(true));
        assert_eq!(Expr::new(ExprKind::Usr, span).truthiness(), None);

        let list = Expr::new(
            ExprKind::List(vec![ListEntry { key: Some(Expr::string("a", span)), value: Expr::number(1.0, span) }]),
            span,
        );
        assert!(list.is_constant());
    }

    #[test]
    fn test_lvalues() {
        let span = Span::dummy();
        let local = Expr::new(ExprKind::Local { name: "x".to_string(), id: 0 }, span);
        assert!(local.is_lvalue());
        assert!(!Expr::number(1.0, span).is_lvalue());

        let call = Expr::new(
            ExprKind::Dereference {
                base: Box::new(local.clone()),
                ops: vec![DerefOp {
                    kind: DerefKind::Call { name: "f".to_string(), search: true, args: Vec::new() },
                    safe: false,
                    path: None,
                    span,
                }],
            },
            span,
        );
        assert!(!call.is_lvalue());
    }

    #[test]
    fn test_display() {
        let span = Span::dummy();
        let expr = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::new(ExprKind::Field { name: "health".to_string() }, span)),
                right: Box::new(Expr::number(1.0, span)),
            },
            span,
        );
        assert_eq!(expr.to_string(), "(src.health + 1)");
    }
}
