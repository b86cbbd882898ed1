//! Abstract Syntax Tree (AST) for DM.
//!
//! Two families of nodes exist. Object-level [`Statement`]s describe the
//! type tree: object, var and proc definitions. Proc-level
//! [`ProcStatement`]s make up proc bodies and hold [`Expr`] trees.
//!
//! Every node owns its children and carries the [`Span`] it was parsed from.

use crate::frontend::path::TypePath;
use crate::utils::location::Span;
use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A parsed source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct File {
    /// Top-level statements in source order
    pub statements: Vec<Statement>,
    /// Source span
    pub span: Span,
}

impl File {
    /// Iterate over every statement, flattening aggregates and object bodies.
    pub fn flatten(&self) -> Vec<&Statement> {
        fn walk<'a>(statements: &'a [Statement], out: &mut Vec<&'a Statement>) {
            for statement in statements {
                match &statement.kind {
                    StatementKind::Aggregate(inner) => walk(inner, out),
                    StatementKind::ObjectDefinition { body, .. } => {
                        out.push(statement);
                        walk(body, out);
                    }
                    _ => out.push(statement),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.statements, &mut out);
        out
    }

    /// All proc definitions in the file.
    pub fn procs(&self) -> impl Iterator<Item = &ProcDefinition> {
        self.flatten().into_iter().filter_map(|s| match &s.kind {
            StatementKind::ProcDefinition(def) => Some(def.as_ref()),
            _ => None,
        })
    }
}

/// An object-level statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// The kind of statement
    pub kind: StatementKind,
    /// Source span
    pub span: Span,
}

impl Statement {
    /// Create a new statement.
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of an object-level statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    /// A type with a body, or an empty type declaration
    ObjectDefinition {
        /// Absolute type path
        path: TypePath,
        /// Nested statements
        body: Vec<Statement>,
    },
    /// A proc or verb definition
    ProcDefinition(Box<ProcDefinition>),
    /// A var definition
    VarDefinition(Box<VarDefinition>),
    /// `name = value` overriding an inherited var's default
    VarOverride {
        /// Type whose default changes
        object_path: TypePath,
        /// Name of the var
        name: String,
        /// New default value
        value: Expr,
    },
    /// Several statements written as one, e.g. `var/a, b`
    Aggregate(Vec<Statement>),
}

/// A proc or verb definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcDefinition {
    /// The owning type
    pub object_path: TypePath,
    /// Proc name
    pub name: String,
    /// Written without a `proc`/`verb` segment
    pub is_override: bool,
    /// Written with a `verb` segment
    pub is_verb: bool,
    /// Parameters
    pub parameters: Vec<ProcParameter>,
    /// Body, absent for declarations without one
    pub body: Option<ProcBlock>,
    /// Declared return types, from `as`
    pub return_types: Option<ValueTypes>,
    /// Source span
    pub span: Span,
}

impl ProcDefinition {
    /// Full path of the proc, e.g. `/mob/proc/attack`.
    pub fn path(&self) -> TypePath {
        let marker = if self.is_verb { "verb" } else { "proc" };
        self.object_path.add_to_path(marker).add_to_path(&self.name)
    }
}

/// A proc parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcParameter {
    /// Parameter name
    pub name: String,
    /// Declared type path, e.g. `/mob` for `mob/M`
    pub ty: Option<TypePath>,
    /// Default value
    pub default: Option<Expr>,
    /// Accepted values, from `in`
    pub possible_values: Option<Expr>,
    /// Accepted value kinds, from `as`
    pub types: ValueTypes,
    /// Source span
    pub span: Span,
}

/// Modifiers split out of a var path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarModifiers {
    /// `global` or `static`
    pub is_static: bool,
    /// `const`
    pub is_const: bool,
    /// `tmp`
    pub is_tmp: bool,
    /// `final`
    pub is_final: bool,
}

impl VarModifiers {
    /// Remove modifier segments from a var type path.
    pub fn split(elements: &[String]) -> (VarModifiers, Vec<String>) {
        let mut modifiers = VarModifiers::default();
        let mut rest = Vec::new();
        for element in elements {
            match element.as_str() {
                "global" | "static" => modifiers.is_static = true,
                "const" => modifiers.is_const = true,
                "tmp" => modifiers.is_tmp = true,
                "final" => modifiers.is_final = true,
                _ => rest.push(element.clone()),
            }
        }
        (modifiers, rest)
    }
}

/// An object-level var definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDefinition {
    /// The owning type
    pub object_path: TypePath,
    /// Var name
    pub name: String,
    /// Declared type, e.g. `/obj/item`
    pub ty: Option<TypePath>,
    /// Modifiers
    pub modifiers: VarModifiers,
    /// Default value
    pub value: Option<Expr>,
    /// Accepted value kinds, from `as`
    pub types: ValueTypes,
    /// Source span
    pub span: Span,
}

/// A block of proc statements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcBlock {
    /// Statements in source order
    pub statements: Vec<ProcStatement>,
    /// Source span
    pub span: Span,
}

impl ProcBlock {
    /// Create a block.
    pub fn new(statements: Vec<ProcStatement>, span: Span) -> Self {
        Self { statements, span }
    }

    /// A block holding one statement.
    pub fn single(statement: ProcStatement) -> Self {
        let span = statement.span;
        Self { statements: vec![statement], span }
    }

    /// Check if the block is empty.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// A statement inside a proc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcStatement {
    /// The kind of statement
    pub kind: ProcStatementKind,
    /// Source span
    pub span: Span,
}

impl ProcStatement {
    /// Create a new statement.
    pub fn new(kind: ProcStatementKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Check whether this is a `set` statement, possibly aggregated.
    pub fn is_set(&self) -> bool {
        match &self.kind {
            ProcStatementKind::Set { .. } => true,
            ProcStatementKind::Aggregate(inner) => !inner.is_empty() && inner.iter().all(ProcStatement::is_set),
            _ => false,
        }
    }
}

/// A local var declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVar {
    /// Var name
    pub name: String,
    /// Declared type
    pub ty: Option<TypePath>,
    /// Initial value
    pub value: Option<Expr>,
    /// Modifiers
    pub modifiers: VarModifiers,
    /// Accepted value kinds, from `as`
    pub types: ValueTypes,
    /// Source span
    pub span: Span,
}

/// The kind of a proc statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcStatementKind {
    /// An expression evaluated for effect
    Expression(Expr),
    /// `var/x = value`
    VarDeclaration(Box<LocalVar>),
    /// Several statements written as one
    Aggregate(Vec<ProcStatement>),
    /// `set attribute = value`
    Set {
        /// Attribute name
        attribute: String,
        /// Attribute value
        value: Expr,
        /// Written with `in` instead of `=`
        was_in: bool,
    },
    /// `return [value]`
    Return(Option<Expr>),
    /// `break [label]`
    Break(Option<String>),
    /// `continue [label]`
    Continue(Option<String>),
    /// `goto label`
    Goto(String),
    /// `label:` with an optional body
    Label {
        /// Label name
        name: String,
        /// Labelled block
        body: Option<ProcBlock>,
    },
    /// `del value`
    Del(Expr),
    /// `throw value`
    Throw(Expr),
    /// `if (condition) body else else_body`
    If {
        /// Condition
        condition: Expr,
        /// Taken branch
        body: ProcBlock,
        /// Else branch
        else_body: Option<ProcBlock>,
    },
    /// `for (init; condition; increment)`
    ForStandard {
        /// Initializer
        init: Option<Box<Expr>>,
        /// Loop condition
        condition: Option<Expr>,
        /// Increment step
        increment: Option<Expr>,
        /// Body
        body: ProcBlock,
    },
    /// `for (var/x in list)`
    ForIn {
        /// Loop variable, an identifier or [`ExprKind::VarDecl`]
        variable: Box<Expr>,
        /// Explicit `as` filter
        types: Option<ValueTypes>,
        /// List to enumerate
        list: Expr,
        /// Body
        body: ProcBlock,
    },
    /// `for (x in start to end step n)` or `for (x = start to end)`
    ForRange {
        /// Loop variable
        variable: Box<Expr>,
        /// First value
        start: Expr,
        /// Last value
        end: Expr,
        /// Increment
        step: Option<Expr>,
        /// Body
        body: ProcBlock,
    },
    /// `for (var/obj/o)` enumerating every instance of a type
    ForType {
        /// Loop variable, always a typed declaration
        variable: Box<Expr>,
        /// Body
        body: ProcBlock,
    },
    /// `for ()` or `while (TRUE)` style loop
    InfLoop(ProcBlock),
    /// `while (condition) body`
    While {
        /// Condition
        condition: Expr,
        /// Body
        body: ProcBlock,
    },
    /// `do body while (condition)`
    DoWhile {
        /// Body
        body: ProcBlock,
        /// Condition
        condition: Expr,
    },
    /// `switch (value)`
    Switch {
        /// Scrutinee
        value: Expr,
        /// Cases in source order
        cases: Vec<SwitchCase>,
    },
    /// `spawn (delay) body`
    Spawn {
        /// Delay before running
        delay: Option<Expr>,
        /// Spawned body
        body: ProcBlock,
    },
    /// `try body catch (var/e) catch_body`
    TryCatch {
        /// Protected body
        try_body: ProcBlock,
        /// Variable bound to the thrown value
        catch_variable: Option<Box<LocalVar>>,
        /// Handler
        catch_body: Option<ProcBlock>,
    },
    /// `receiver << message`
    Output {
        /// Receiver
        receiver: Expr,
        /// Message
        message: Expr,
    },
    /// `source >> target`
    Input {
        /// Source
        source: Expr,
        /// Assignment target
        target: Expr,
    },
    /// `receiver << browse(body, options)`
    Browse {
        /// Receiver
        receiver: Expr,
        /// Page body
        body: Expr,
        /// Window options
        options: Expr,
    },
    /// `receiver << browse_rsc(file, filename)`
    BrowseResource {
        /// Receiver
        receiver: Expr,
        /// Resource
        file: Expr,
        /// File name on the client
        filename: Expr,
    },
    /// `receiver << output(message, control)`
    OutputControl {
        /// Receiver
        receiver: Expr,
        /// Message
        message: Expr,
        /// Interface control
        control: Expr,
    },
    /// `receiver << ftp(file, name)`
    Ftp {
        /// Receiver
        receiver: Expr,
        /// File
        file: Expr,
        /// Suggested name
        name: Expr,
    },
    /// `receiver << link(url)`
    Link {
        /// Receiver
        receiver: Expr,
        /// Url
        url: Expr,
    },
}

/// One case of a `switch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    /// What the case matches
    pub kind: SwitchCaseKind,
    /// Case body
    pub body: ProcBlock,
    /// Source span
    pub span: Span,
}

/// What a switch case matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwitchCaseKind {
    /// `if (a, b to c)`
    Values(Vec<SwitchValue>),
    /// `else`
    Default,
}

/// A single switch case value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwitchValue {
    /// Matches one value
    Single(Expr),
    /// Matches values in `start to end`
    Range {
        /// Lower bound
        start: Expr,
        /// Upper bound
        end: Expr,
    },
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// The kind of expression
    pub kind: ExprKind,
    /// Source span
    pub span: Span,
}

impl Expr {
    /// Create a new expression.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// `null`
    pub fn null(span: Span) -> Self {
        Self::new(ExprKind::Null, span)
    }

    /// An integer literal.
    pub fn int_lit(value: i64, span: Span) -> Self {
        Self::new(ExprKind::Integer(value), span)
    }

    /// A float literal.
    pub fn float_lit(value: f64, span: Span) -> Self {
        Self::new(ExprKind::Float(value), span)
    }

    /// A string literal.
    pub fn string_lit(value: impl Into<String>, span: Span) -> Self {
        Self::new(ExprKind::String(value.into()), span)
    }

    /// An identifier.
    pub fn ident(name: impl Into<String>, span: Span) -> Self {
        Self::new(ExprKind::Identifier(name.into()), span)
    }

    /// Check if this is a literal constant.
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Null
                | ExprKind::Integer(_)
                | ExprKind::Float(_)
                | ExprKind::String(_)
                | ExprKind::Resource(_)
                | ExprKind::Path(_)
        )
    }

    /// The numeric value of a number literal.
    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            ExprKind::Integer(v) => Some(v as f64),
            ExprKind::Float(v) => Some(v),
            _ => None,
        }
    }

    /// The identifier name, if this is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// A call argument, optionally keyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParameter {
    /// `key = value` key
    pub key: Option<Expr>,
    /// The value
    pub value: Expr,
}

impl CallParameter {
    /// A positional argument.
    pub fn positional(value: Expr) -> Self {
        Self { key: None, value }
    }
}

/// One entry of `pick()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickValue {
    /// `prob(weight)` prefix
    pub weight: Option<Expr>,
    /// The value
    pub value: Expr,
}

/// What `new` instantiates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NewTarget {
    /// `new /obj/item`
    Path(TypePath),
    /// `new type_var`
    Expr(Box<Expr>),
    /// `new()` using the inferred type
    Inferred,
}

/// Target of a direct proc call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallTarget {
    /// `name(...)`
    Named(String),
    /// `.(...)`
    SelfProc,
    /// `..(...)`
    SuperProc,
}

/// One link of a dereference chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerefOp {
    /// What the link does
    pub kind: DerefKind,
    /// `?.`, `?:` or `?[`
    pub safe: bool,
    /// Source span
    pub span: Span,
}

/// The kind of a dereference link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DerefKind {
    /// `.name` or `:name`
    Field {
        /// Field name
        name: String,
        /// `:` runtime lookup
        search: bool,
    },
    /// `[index]`
    Index(Box<Expr>),
    /// `.name(args)` or `:name(args)`
    Call {
        /// Proc name
        name: String,
        /// `:` runtime lookup
        search: bool,
        /// Arguments
        args: Vec<CallParameter>,
    },
}

/// Built-in maths functions with one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathFn {
    /// `sin`
    Sin,
    /// `cos`
    Cos,
    /// `tan`
    Tan,
    /// `arcsin`
    ArcSin,
    /// `arccos`
    ArcCos,
    /// `arctan`
    ArcTan,
    /// `sqrt`
    Sqrt,
    /// `abs`
    Abs,
}

impl MathFn {
    /// Look up a function by name.
    pub fn from_name(name: &str) -> Option<MathFn> {
        Some(match name {
            "sin" => MathFn::Sin,
            "cos" => MathFn::Cos,
            "tan" => MathFn::Tan,
            "arcsin" => MathFn::ArcSin,
            "arccos" => MathFn::ArcCos,
            "arctan" => MathFn::ArcTan,
            "sqrt" => MathFn::Sqrt,
            "abs" => MathFn::Abs,
            _ => return None,
        })
    }
}

/// The kind of an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// `null`
    Null,
    /// Integer literal
    Integer(i64),
    /// Floating-point literal
    Float(f64),
    /// String literal without interpolations
    String(String),
    /// Resource literal `'icon.dmi'`
    Resource(String),
    /// Constant type path `/obj/item`
    Path(TypePath),
    /// `/obj.proc/foo` style upward search from a path
    UpwardPathSearch {
        /// Starting path
        base: TypePath,
        /// Path searched for
        search: TypePath,
    },
    /// Interpolated string; each `[]` hole becomes one entry
    StringFormat {
        /// Text with hole markers and macro bytes
        value: String,
        /// Embedded expressions, `None` for `[]`
        holes: Vec<Option<Expr>>,
    },
    /// Identifier
    Identifier(String),
    /// `.`, the proc's return value
    SelfValue,
    /// `var/x` inside a `for` header
    VarDecl {
        /// Var name
        name: String,
        /// Declared type
        ty: Option<TypePath>,
    },

    /// Unary operation: `op operand`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Binary operation: `left op right`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Assignment: `target op value`
    Assign {
        /// Operator
        op: AssignOp,
        /// Assigned reference
        target: Box<Expr>,
        /// Value
        value: Box<Expr>,
    },
    /// Ternary conditional: `cond ? then : else`
    Ternary {
        /// Condition
        condition: Box<Expr>,
        /// Value when true
        then_expr: Box<Expr>,
        /// Value when false
        else_expr: Box<Expr>,
    },
    /// `value in container`
    In {
        /// Searched value
        value: Box<Expr>,
        /// Container
        container: Box<Expr>,
    },
    /// `value in start to end [step n]`
    InRange {
        /// Tested value
        value: Box<Expr>,
        /// Lower bound
        start: Box<Expr>,
        /// Upper bound
        end: Box<Expr>,
        /// Step
        step: Option<Box<Expr>>,
    },

    /// `new target(args)`
    New {
        /// Type to instantiate
        target: NewTarget,
        /// Constructor arguments
        args: Vec<CallParameter>,
    },
    /// Postfix chain `base.a[1]:b()`
    Dereference {
        /// First value of the chain
        base: Box<Expr>,
        /// Links, left to right
        ops: Vec<DerefOp>,
    },
    /// `name(args)`, `.(args)` or `..(args)`
    ProcCall {
        /// What is called
        target: CallTarget,
        /// Arguments
        args: Vec<CallParameter>,
    },
    /// `call(proc)(args)` or `call(object, name)(args)`
    DynamicCall {
        /// Arguments to `call()`
        callee: Vec<CallParameter>,
        /// Arguments to the called proc
        args: Vec<CallParameter>,
    },
    /// `base::name` or `base::name()`
    Scope {
        /// Type or value being scoped, `None` for a leading `::`
        base: Option<Box<Expr>>,
        /// Var or proc name
        name: String,
        /// Arguments when called
        call: Option<Vec<CallParameter>>,
    },

    /// `list(...)`
    List(Vec<CallParameter>),
    /// `newlist(...)`
    NewList(Vec<CallParameter>),
    /// `addtext(...)`
    AddText(Vec<CallParameter>),
    /// `pick(...)`
    Pick(Vec<PickValue>),
    /// `input(...) as types in list`
    Input {
        /// Arguments
        args: Vec<CallParameter>,
        /// Accepted types
        types: Option<ValueTypes>,
        /// Choice list
        list: Option<Box<Expr>>,
    },
    /// `initial(x)`
    Initial(Box<Expr>),
    /// `nameof(x)`
    NameOf(Box<Expr>),
    /// `issaved(x)`
    IsSaved(Box<Expr>),
    /// One-argument maths built-in
    Math {
        /// Function
        func: MathFn,
        /// Argument
        arg: Box<Expr>,
    },
    /// `arctan(x, y)`
    ArcTan2 {
        /// X component
        x: Box<Expr>,
        /// Y component
        y: Box<Expr>,
    },
    /// `log(value)` or `log(base, value)`
    Log {
        /// Argument
        value: Box<Expr>,
        /// Base, natural log when absent
        base: Option<Box<Expr>>,
    },
    /// `istype(value[, type])`
    IsType {
        /// Tested value
        value: Box<Expr>,
        /// Type, implied by the value's declared type when absent
        ty: Option<Box<Expr>>,
    },
    /// `isnull(value)`
    IsNull(Box<Expr>),
    /// `length(value)`
    Length(Box<Expr>),
    /// `get_step(ref, dir)`
    GetStep {
        /// Starting atom
        reference: Box<Expr>,
        /// Direction
        dir: Box<Expr>,
    },
    /// `get_dir(from, to)`
    GetDir {
        /// Origin
        from: Box<Expr>,
        /// Destination
        to: Box<Expr>,
    },
    /// `locate(type) in container`
    Locate {
        /// Type or tag, inferred when absent
        ty: Option<Box<Expr>>,
        /// Container searched
        container: Option<Box<Expr>>,
    },
    /// `locate(x, y, z)`
    LocateCoordinates {
        /// X
        x: Box<Expr>,
        /// Y
        y: Box<Expr>,
        /// Z
        z: Box<Expr>,
    },
    /// `gradient(...)`
    Gradient(Vec<CallParameter>),
    /// `rgb(...)`
    Rgb(Vec<CallParameter>),
    /// `prob(p)`
    Prob(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `~=`
    Equivalent,
    /// `~!`
    NotEquivalent,
    /// `<<`
    LeftShift,
    /// `>>`
    RightShift,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `%%`
    ModMod,
    /// `**`
    Power,
}

impl BinaryOp {
    /// Check if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        use BinaryOp::*;
        matches!(self, Equal | NotEqual | Equivalent | NotEquivalent | Less | LessEqual | Greater | GreaterEqual)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOp::*;
        let s = match self {
            Or => "||",
            And => "&&",
            BitOr => "|",
            BitXor => "^",
            BitAnd => "&",
            Equal => "==",
            NotEqual => "!=",
            Equivalent => "~=",
            NotEquivalent => "~!",
            LeftShift => "<<",
            RightShift => ">>",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            ModMod => "%%",
            Power => "**",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `-`
    Neg,
    /// `++x`
    PreIncrement,
    /// `--x`
    PreDecrement,
    /// `x++`
    PostIncrement,
    /// `x--`
    PostDecrement,
}

impl UnaryOp {
    /// Whether the operator writes to its operand.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, UnaryOp::Not | UnaryOp::BitNot | UnaryOp::Neg)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Neg => "-",
            UnaryOp::PreIncrement | UnaryOp::PostIncrement => "++",
            UnaryOp::PreDecrement | UnaryOp::PostDecrement => "--",
        };
        write!(f, "{}", s)
    }
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `:=`
    AssignInto,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Mod,
    /// `%%=`
    ModMod,
    /// `|=`
    BitOr,
    /// `&=`
    BitAnd,
    /// `^=`
    BitXor,
    /// `||=`
    LogicalOr,
    /// `&&=`
    LogicalAnd,
    /// `<<=`
    LeftShift,
    /// `>>=`
    RightShift,
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AssignOp::*;
        let s = match self {
            Assign => "=",
            AssignInto => ":=",
            Add => "+=",
            Sub => "-=",
            Mul => "*=",
            Div => "/=",
            Mod => "%=",
            ModMod => "%%=",
            BitOr => "|=",
            BitAnd => "&=",
            BitXor => "^=",
            LogicalOr => "||=",
            LogicalAnd => "&&=",
            LeftShift => "<<=",
            RightShift => ">>=",
        };
        write!(f, "{}", s)
    }
}

/// Set of value kinds accepted by a var, parameter or `input()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueTypes(pub u32);

impl ValueTypes {
    /// No restriction
    pub const ANYTHING: ValueTypes = ValueTypes(0);
    /// `null`
    pub const NULL: ValueTypes = ValueTypes(1 << 0);
    /// `text`
    pub const TEXT: ValueTypes = ValueTypes(1 << 1);
    /// `obj`
    pub const OBJ: ValueTypes = ValueTypes(1 << 2);
    /// `mob`
    pub const MOB: ValueTypes = ValueTypes(1 << 3);
    /// `turf`
    pub const TURF: ValueTypes = ValueTypes(1 << 4);
    /// `num`
    pub const NUM: ValueTypes = ValueTypes(1 << 5);
    /// `message`
    pub const MESSAGE: ValueTypes = ValueTypes(1 << 6);
    /// `area`
    pub const AREA: ValueTypes = ValueTypes(1 << 7);
    /// `color`
    pub const COLOR: ValueTypes = ValueTypes(1 << 8);
    /// `file`
    pub const FILE: ValueTypes = ValueTypes(1 << 9);
    /// `command_text`
    pub const COMMAND_TEXT: ValueTypes = ValueTypes(1 << 10);
    /// `sound`
    pub const SOUND: ValueTypes = ValueTypes(1 << 11);
    /// `icon`
    pub const ICON: ValueTypes = ValueTypes(1 << 12);
    /// `opendream_unimplemented`
    pub const UNIMPLEMENTED: ValueTypes = ValueTypes(1 << 13);
    /// `opendream_compiletimereadonly`
    pub const COMPILE_TIME_READONLY: ValueTypes = ValueTypes(1 << 14);

    /// Look up a type keyword.
    pub fn from_name(name: &str) -> Option<ValueTypes> {
        Some(match name {
            "anything" => Self::ANYTHING,
            "null" => Self::NULL,
            "text" => Self::TEXT,
            "obj" => Self::OBJ,
            "mob" => Self::MOB,
            "turf" => Self::TURF,
            "num" => Self::NUM,
            "message" => Self::MESSAGE,
            "area" => Self::AREA,
            "color" => Self::COLOR,
            "file" => Self::FILE,
            "command_text" => Self::COMMAND_TEXT,
            "sound" => Self::SOUND,
            "icon" => Self::ICON,
            "opendream_unimplemented" => Self::UNIMPLEMENTED,
            "opendream_compiletimereadonly" => Self::COMPILE_TIME_READONLY,
            _ => return None,
        })
    }

    /// Check whether every flag of `other` is set.
    pub fn contains(&self, other: ValueTypes) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether no restriction applies.
    pub fn is_anything(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ValueTypes {
    type Output = ValueTypes;

    fn bitor(self, rhs: ValueTypes) -> ValueTypes {
        ValueTypes(self.0 | rhs.0)
    }
}

impl BitOrAssign for ValueTypes {
    fn bitor_assign(&mut self, rhs: ValueTypes) {
        self.0 |= rhs.0;
    }
}
