//! Expression resolution.
//!
//! Turns AST expressions into [`ir::Expr`] trees by binding every name to a
//! local, field, global or proc. What is visible depends on the
//! [`ScopeMode`]:
//!
//! | mode              | locals | fields | globals | global procs |
//! |-------------------|--------|--------|---------|--------------|
//! | `Normal`          | yes    | yes    | yes     | yes          |
//! | `Static`          | no     | no     | yes     | yes          |
//! | `FirstPassStatic` | no     | no     | no      | yes          |
//!
//! Dereference chains are checked against the type tree as long as the type
//! of each step is statically known. Once a step's type cannot be known
//! (after an index, a call or a `:` link) every later link becomes a runtime
//! search.

use crate::compile::scope::ProcFrame;
use crate::compile::tree::ObjectTree;
use crate::frontend::ast::{self, BinaryOp, CallParameter, CallTarget, MathFn, NewTarget, UnaryOp, ValueTypes};
use crate::frontend::path::{PathKind, TypePath};
use crate::ir::{self, Argument, Builtin, DerefKind, DerefOp, ExprKind, ListEntry, PickEntry, ProcTarget};
use crate::utils::diagnostics::Diagnostics;
use crate::utils::errors::{ErrorCode, SemanticError, SemanticErrorKind, SemanticResult};
use crate::utils::location::Span;

/// Which names an expression may refer to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScopeMode {
    /// Proc bodies and instance var initializers
    #[default]
    Normal,
    /// Initializers of global and static vars
    Static,
    /// Early pass over global initializers; only global procs are visible
    FirstPassStatic,
}

impl ScopeMode {
    fn sees_instance(self) -> bool {
        self == ScopeMode::Normal
    }

    fn sees_globals(self) -> bool {
        self != ScopeMode::FirstPassStatic
    }
}

/// Resolves expressions in one context.
pub struct Resolver<'a> {
    tree: &'a dyn ObjectTree,
    owner: &'a TypePath,
    frame: Option<&'a ProcFrame>,
    mode: ScopeMode,
    diagnostics: &'a mut Diagnostics,
}

fn unknown_identifier(name: &str, span: Span) -> SemanticError {
    SemanticError::new(SemanticErrorKind::UnknownIdentifier, format!("Unknown identifier \"{}\"", name), span)
}

impl<'a> Resolver<'a> {
    /// A resolver for code owned by `owner`, inside `frame` when compiling a
    /// proc body.
    pub fn new(
        tree: &'a dyn ObjectTree,
        owner: &'a TypePath,
        frame: Option<&'a ProcFrame>,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self { tree, owner, frame, mode: ScopeMode::Normal, diagnostics }
    }

    /// Switch the scope mode.
    pub fn with_mode(mut self, mode: ScopeMode) -> Self {
        self.mode = mode;
        self
    }

    /// The current scope mode.
    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    /// Resolve an expression. `inferred` is the type expected by the
    /// context, used by `new()` and `locate()` without an explicit type.
    pub fn resolve(&mut self, expr: &ast::Expr, inferred: Option<&TypePath>) -> SemanticResult<ir::Expr> {
        use ast::ExprKind as A;

        let span = expr.span;
        let resolved = match &expr.kind {
            A::Null => ir::Expr::null(span),
            A::Integer(v) => ir::Expr::number(*v as f64, span),
            A::Float(v) => ir::Expr::number(*v, span),
            A::String(s) => ir::Expr::string(s.clone(), span),
            A::Resource(r) => ir::Expr::new(ExprKind::Resource(r.clone()), span),
            A::Path(path) => self.constant_path(path, span)?,
            A::UpwardPathSearch { base, search } => match self.tree.upward_search(base, search) {
                Some(found) => self.constant_path(&found, span)?,
                None => {
                    return Err(SemanticError::new(
                        SemanticErrorKind::UnknownType,
                        format!("Could not find path {}.{}", base, search),
                        span,
                    ))
                }
            },
            A::StringFormat { value, holes } => {
                let holes = holes
                    .iter()
                    .map(|hole| match hole {
                        Some(hole) => self.resolve(hole, None),
                        None => Ok(ir::Expr::null(span)),
                    })
                    .collect::<SemanticResult<Vec<_>>>()?;
                ir::Expr::new(ExprKind::StringFormat { value: value.clone(), holes }, span)
            }
            A::Identifier(name) => self.identifier(name, span, inferred)?,
            A::VarDecl { name, .. } => self.identifier(name, span, inferred)?,
            A::SelfValue => ir::Expr::new(ExprKind::SelfValue, span),

            A::Unary { op, operand } => {
                let resolved = self.resolve(operand, None)?;
                if op.is_mutating() && !self.check_writable(operand, &resolved)? {
                    return Ok(resolved);
                }
                ir::Expr::new(ExprKind::Unary { op: *op, operand: Box::new(resolved) }, span)
            }
            A::Binary { op, left, right } => self.binary(*op, left, right, span)?,
            A::Assign { op, target, value } => {
                let target_expr = self.resolve(target, None)?;
                let value = self.resolve(value, target_expr.path.as_ref())?;
                if !self.check_writable(target, &target_expr)? {
                    return Ok(value);
                }
                let path = target_expr.path.clone();
                ir::Expr::new(
                    ExprKind::Assign { op: *op, target: Box::new(target_expr), value: Box::new(value) },
                    span,
                )
                .with_path(path)
            }
            A::Ternary { condition, then_expr, else_expr } => {
                let condition = self.resolve(condition, None)?;
                let then_expr = self.resolve(then_expr, inferred)?;
                let else_expr = self.resolve(else_expr, inferred)?;
                let path = if then_expr.path == else_expr.path { then_expr.path.clone() } else { None };
                ir::Expr::new(
                    ExprKind::Ternary {
                        condition: Box::new(condition),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    },
                    span,
                )
                .with_path(path)
            }
            A::In { value, container } => ir::Expr::new(
                ExprKind::In {
                    value: Box::new(self.resolve(value, None)?),
                    container: Box::new(self.resolve(container, None)?),
                },
                span,
            ),
            A::InRange { value, start, end, step } => ir::Expr::new(
                ExprKind::InRange {
                    value: Box::new(self.resolve(value, None)?),
                    start: Box::new(self.resolve(start, None)?),
                    end: Box::new(self.resolve(end, None)?),
                    step: self.resolve_boxed(step.as_deref())?,
                },
                span,
            ),

            A::New { target, args } => self.new_instance(target, args, span, inferred)?,
            A::Dereference { base, ops } => self.dereference(base, ops, span)?,
            A::ProcCall { target, args } => self.proc_call(target, args, span)?,
            A::DynamicCall { callee, args } => {
                let callee = callee
                    .iter()
                    .map(|param| self.resolve(&param.value, None))
                    .collect::<SemanticResult<Vec<_>>>()?;
                let args = self.arguments(args)?;
                ir::Expr::new(ExprKind::DynamicCall { callee, args }, span).into_fuzzy()
            }
            A::Scope { base, name, call } => self.scope(base.as_deref(), name, call.as_deref(), span)?,

            A::List(params) => {
                let entries = params
                    .iter()
                    .map(|param| {
                        Ok(ListEntry {
                            key: match &param.key {
                                Some(key) => Some(self.resolve(key, None)?),
                                None => None,
                            },
                            value: self.resolve(&param.value, None)?,
                        })
                    })
                    .collect::<SemanticResult<Vec<_>>>()?;
                ir::Expr::new(ExprKind::List(entries), span).with_path(Some(TypePath::parse("/list")))
            }
            A::NewList(params) => ir::Expr::new(ExprKind::NewList(self.values(params)?), span)
                .with_path(Some(TypePath::parse("/list"))),
            A::AddText(params) => ir::Expr::new(ExprKind::AddText(self.values(params)?), span),
            A::Pick(values) => {
                let entries = values
                    .iter()
                    .map(|entry| {
                        Ok(PickEntry {
                            weight: match &entry.weight {
                                Some(weight) => Some(self.resolve(weight, None)?),
                                None => None,
                            },
                            value: self.resolve(&entry.value, None)?,
                        })
                    })
                    .collect::<SemanticResult<Vec<_>>>()?;
                ir::Expr::new(ExprKind::Pick(entries), span).into_fuzzy()
            }
            A::Input { args, types, list } => ir::Expr::new(
                ExprKind::Input {
                    args: self.values(args)?,
                    types: types.unwrap_or(ValueTypes::ANYTHING),
                    list: self.resolve_boxed(list.as_deref())?,
                },
                span,
            ),
            A::Initial(value) => {
                let value = self.lvalue_argument("initial", value)?;
                let path = value.path.clone();
                ir::Expr::new(ExprKind::Initial(Box::new(value)), span).with_path(path)
            }
            A::IsSaved(value) => {
                let value = self.lvalue_argument("issaved", value)?;
                ir::Expr::new(ExprKind::IsSaved(Box::new(value)), span)
            }
            A::NameOf(value) => self.name_of(value, span)?,
            A::Math { func, arg } => {
                let func = match func {
                    MathFn::Sin => Builtin::Sin,
                    MathFn::Cos => Builtin::Cos,
                    MathFn::Tan => Builtin::Tan,
                    MathFn::ArcSin => Builtin::ArcSin,
                    MathFn::ArcCos => Builtin::ArcCos,
                    MathFn::ArcTan => Builtin::ArcTan,
                    MathFn::Sqrt => Builtin::Sqrt,
                    MathFn::Abs => Builtin::Abs,
                };
                self.builtin(func, &[arg], span)?
            }
            A::ArcTan2 { x, y } => self.builtin(Builtin::ArcTan2, &[x, y], span)?,
            A::Log { value, base } => match base {
                Some(base) => self.builtin(Builtin::Log, &[base, value], span)?,
                None => self.builtin(Builtin::Log, &[value], span)?,
            },
            A::IsType { value, ty } => {
                let value = self.resolve(value, None)?;
                let ty = match ty {
                    Some(ty) => self.resolve(ty, None)?,
                    None => match &value.path {
                        Some(path) => ir::Expr::new(ExprKind::Path(path.clone()), span).with_path(Some(path.clone())),
                        None => {
                            return Err(SemanticError::new(
                                SemanticErrorKind::BadArgument,
                                "istype() with one argument requires a var with a declared type",
                                span,
                            ))
                        }
                    },
                };
                ir::Expr::new(ExprKind::Builtin { func: Builtin::IsType, args: vec![value, ty] }, span)
            }
            A::IsNull(value) => ir::Expr::new(ExprKind::IsNull(Box::new(self.resolve(value, None)?)), span),
            A::Length(value) => self.builtin(Builtin::Length, &[value], span)?,
            A::GetStep { reference, dir } => self.builtin(Builtin::GetStep, &[reference, dir], span)?,
            A::GetDir { from, to } => self.builtin(Builtin::GetDir, &[from, to], span)?,
            A::Locate { ty, container } => {
                let ty = match ty {
                    Some(ty) => self.resolve(ty, None)?,
                    None => {
                        let path = self.require_inferred(inferred, span)?;
                        ir::Expr::new(ExprKind::Path(path.clone()), span).with_path(Some(path))
                    }
                };
                let path = match &ty.kind {
                    ExprKind::Path(path) => Some(path.clone()),
                    _ => None,
                };
                let container = self.resolve_boxed(container.as_deref())?;
                ir::Expr::new(ExprKind::Locate { ty: Box::new(ty), container }, span).with_path(path)
            }
            A::LocateCoordinates { x, y, z } => {
                self.builtin(Builtin::LocateCoordinates, &[x, y, z], span)?
                    .with_path(Some(TypePath::parse("/turf")))
            }
            A::Gradient(params) => {
                let args = self.values(params)?;
                ir::Expr::new(ExprKind::Builtin { func: Builtin::Gradient, args }, span)
            }
            A::Rgb(params) => {
                let args = self.values(params)?;
                ir::Expr::new(ExprKind::Builtin { func: Builtin::Rgb, args }, span)
            }
            A::Prob(value) => self.builtin(Builtin::Prob, &[value], span)?,
        };
        Ok(resolved)
    }

    /// Resolve an expression that must be a compile-time constant.
    pub fn resolve_constant(&mut self, expr: &ast::Expr, inferred: Option<&TypePath>) -> SemanticResult<ir::Expr> {
        let resolved = self.resolve(expr, inferred)?;
        if resolved.is_constant() {
            Ok(resolved)
        } else {
            Err(SemanticError::new(SemanticErrorKind::ConstantRequired, "Expected a constant", expr.span))
        }
    }

    /// Resolve call arguments. String keys become argument names.
    pub fn arguments(&mut self, params: &[CallParameter]) -> SemanticResult<Vec<Argument>> {
        params
            .iter()
            .map(|param| {
                let name = match &param.key {
                    None => None,
                    Some(key) => match &key.kind {
                        ast::ExprKind::String(name) => Some(name.clone()),
                        _ => {
                            self.diagnostics.emit(
                                ErrorCode::InvalidArgumentKey,
                                key.span,
                                "Invalid argument key, only named arguments are supported here",
                            );
                            None
                        }
                    },
                };
                Ok(Argument { name, value: self.resolve(&param.value, None)? })
            })
            .collect()
    }

    fn values(&mut self, params: &[CallParameter]) -> SemanticResult<Vec<ir::Expr>> {
        params.iter().map(|param| self.resolve(&param.value, None)).collect()
    }

    fn resolve_boxed(&mut self, expr: Option<&ast::Expr>) -> SemanticResult<Option<Box<ir::Expr>>> {
        expr.map(|expr| self.resolve(expr, None).map(Box::new)).transpose()
    }

    fn builtin(&mut self, func: Builtin, args: &[&ast::Expr], span: Span) -> SemanticResult<ir::Expr> {
        let args = args
            .iter()
            .map(|arg| self.resolve(arg, None))
            .collect::<SemanticResult<Vec<_>>>()?;
        Ok(ir::Expr::new(ExprKind::Builtin { func, args }, span))
    }

    fn require_inferred(&self, inferred: Option<&TypePath>, span: Span) -> SemanticResult<TypePath> {
        inferred
            .cloned()
            .ok_or_else(|| SemanticError::new(SemanticErrorKind::MissingInferredType, "Could not infer a type", span))
    }

    fn constant_path(&self, path: &TypePath, span: Span) -> SemanticResult<ir::Expr> {
        let path = match path.kind {
            PathKind::Absolute => path.clone(),
            _ => self.owner.combine(&TypePath::new(PathKind::Relative, path.elements.clone())),
        };
        let proc_marker = path.find_element("proc").or_else(|| path.find_element("verb"));
        if let Some(index) = proc_marker {
            let owner = path.from_elements(0, index);
            let exists = match path.last_element() {
                Some(name) if index + 1 < path.elements.len() => {
                    if owner.is_root() { self.tree.global_proc(name) } else { self.tree.has_proc(&owner, name) }
                }
                _ => false,
            };
            if !exists {
                return Err(SemanticError::new(
                    SemanticErrorKind::UnknownProc,
                    format!("Proc {} does not exist", path),
                    span,
                ));
            }
            return Ok(ir::Expr::new(ExprKind::ProcReference(path), span));
        }
        if !self.tree.type_exists(&path) {
            return Err(SemanticError::new(
                SemanticErrorKind::UnknownType,
                format!("Type {} does not exist", path),
                span,
            ));
        }
        Ok(ir::Expr::new(ExprKind::Path(path.clone()), span).with_path(Some(path)))
    }

    fn identifier(&mut self, name: &str, span: Span, inferred: Option<&TypePath>) -> SemanticResult<ir::Expr> {
        let special = match name {
            "src" => Some(ir::Expr::new(ExprKind::Src, span).with_path(Some(self.owner.clone()))),
            "usr" => Some(ir::Expr::new(ExprKind::Usr, span).with_path(Some(TypePath::parse("/mob")))),
            "args" => Some(ir::Expr::new(ExprKind::Args, span).with_path(Some(TypePath::parse("/list")))),
            "world" if self.mode.sees_globals() => {
                Some(ir::Expr::new(ExprKind::World, span).with_path(Some(TypePath::parse("/world"))))
            }
            "global" => {
                return Err(SemanticError::new(
                    SemanticErrorKind::InvalidContext,
                    "\"global\" can only be used to access a global var or proc",
                    span,
                ))
            }
            "__TYPE__" => Some(ir::Expr::new(ExprKind::Path(self.owner.clone()), span).with_path(Some(self.owner.clone()))),
            "__PROC__" => match self.frame {
                Some(frame) => Some(ir::Expr::new(ExprKind::ProcReference(frame.path()), span)),
                None => {
                    return Err(SemanticError::new(
                        SemanticErrorKind::InvalidContext,
                        "__PROC__ can only be used inside a proc",
                        span,
                    ))
                }
            },
            "__IMPLIED_TYPE__" => {
                let path = self.require_inferred(inferred, span)?;
                Some(ir::Expr::new(ExprKind::Path(path.clone()), span).with_path(Some(path)))
            }
            _ => None,
        };
        if let Some(special) = special {
            return Ok(special);
        }

        let tree = self.tree;
        if self.mode.sees_instance() {
            if let Some(local) = self.frame.and_then(|frame| frame.local(name)) {
                if let Some(constant) = &local.constant {
                    let mut constant = constant.clone();
                    constant.span = span;
                    return Ok(constant);
                }
                return Ok(ir::Expr::new(ExprKind::Local { name: name.to_string(), id: local.id }, span)
                    .with_path(local.ty.clone()));
            }

            if let Some(var) = tree.field(self.owner, name) {
                if var.types.contains(ValueTypes::UNIMPLEMENTED) {
                    self.unimplemented(self.owner, name, span);
                }
                return Ok(ir::Expr::new(ExprKind::Field { name: name.to_string() }, span).with_path(var.ty.clone()));
            }
        }

        if self.mode.sees_globals() {
            let declared_in_proc = self.frame.and_then(|frame| frame.global(name));
            let global = match declared_in_proc {
                Some(id) => tree.global_by_id(id),
                None => tree.global_var(self.owner, name),
            };
            if let Some(global) = global {
                return Ok(ir::Expr::new(ExprKind::GlobalField { name: name.to_string(), id: global.id }, span)
                    .with_path(global.ty.clone()));
            }
        }

        Err(unknown_identifier(name, span))
    }

    fn unimplemented(&mut self, owner: &TypePath, name: &str, span: Span) {
        self.diagnostics.emit(ErrorCode::UnimplementedAccess, span, format!("{}.{} is not implemented", owner, name));
    }

    fn is_const_local(&self, expr: &ast::Expr) -> bool {
        match &expr.kind {
            ast::ExprKind::Identifier(name) => {
                self.mode.sees_instance()
                    && self
                        .frame
                        .and_then(|frame| frame.local(name))
                        .is_some_and(|local| local.constant.is_some())
            }
            _ => false,
        }
    }

    /// Check that a resolved target can be written to. Constants report
    /// `WriteToConstant` and return `false`; other non-l-values are errors.
    fn check_writable(&mut self, target: &ast::Expr, resolved: &ir::Expr) -> SemanticResult<bool> {
        let const_field = match &resolved.kind {
            ExprKind::Field { name } => self.tree.field(self.owner, name).is_some_and(|var| var.is_const),
            _ => false,
        };
        if self.is_const_local(target) || const_field {
            self.diagnostics.emit(ErrorCode::WriteToConstant, target.span, "Cannot change constant value");
            return Ok(false);
        }
        if !resolved.is_lvalue() {
            return Err(SemanticError::new(SemanticErrorKind::InvalidReference, "Expected an l-value", target.span));
        }
        Ok(true)
    }

    fn lvalue_argument(&mut self, builtin: &str, value: &ast::Expr) -> SemanticResult<ir::Expr> {
        let resolved = self.resolve(value, None)?;
        if resolved.is_lvalue() {
            Ok(resolved)
        } else {
            Err(SemanticError::new(
                SemanticErrorKind::BadArgument,
                format!("{}() requires a var as its argument", builtin),
                value.span,
            ))
        }
    }

    fn name_of(&mut self, value: &ast::Expr, span: Span) -> SemanticResult<ir::Expr> {
        let resolved = self.resolve(value, None)?;
        let name = match &resolved.kind {
            ExprKind::Local { name, .. } | ExprKind::Field { name } | ExprKind::GlobalField { name, .. } => {
                Some(name.clone())
            }
            ExprKind::ScopeField { name, .. } => Some(name.clone()),
            ExprKind::Path(path) | ExprKind::ProcReference(path) => path.last_element().map(str::to_string),
            ExprKind::Dereference { ops, .. } => ops.last().and_then(|op| match &op.kind {
                DerefKind::Field { name, .. } | DerefKind::Call { name, .. } => Some(name.clone()),
                DerefKind::Index(_) => None,
            }),
            ExprKind::ProcCall { target: ProcTarget::Src(name) | ProcTarget::Global(name), .. } => Some(name.clone()),
            _ => None,
        };
        match name {
            Some(name) => Ok(ir::Expr::string(name, span)),
            None => Err(SemanticError::new(
                SemanticErrorKind::BadArgument,
                "nameof() requires a var, proc reference or type",
                value.span,
            )),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &ast::Expr, right: &ast::Expr, span: Span) -> SemanticResult<ir::Expr> {
        let is_null = |e: &ast::Expr| matches!(e.kind, ast::ExprKind::Null);
        if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) && (is_null(left) || is_null(right)) {
            let other = if is_null(left) { right } else { left };
            let test = ir::Expr::new(ExprKind::IsNull(Box::new(self.resolve(other, None)?)), span);
            return Ok(match op {
                BinaryOp::Equal => test,
                _ => ir::Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: Box::new(test) }, span),
            });
        }

        let left = self.resolve(left, None)?;
        let right = self.resolve(right, None)?;
        Ok(ir::Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span))
    }

    fn new_instance(
        &mut self,
        target: &NewTarget,
        args: &[CallParameter],
        span: Span,
        inferred: Option<&TypePath>,
    ) -> SemanticResult<ir::Expr> {
        let args = self.arguments(args)?;
        match target {
            NewTarget::Path(path) => {
                let constant = self.constant_path(path, span)?;
                match constant.kind {
                    ExprKind::Path(path) => {
                        Ok(ir::Expr::new(ExprKind::NewPath { path: path.clone(), args }, span).with_path(Some(path)))
                    }
                    _ => Err(SemanticError::new(SemanticErrorKind::BadArgument, "Cannot instantiate a proc", span)),
                }
            }
            NewTarget::Inferred => {
                let path = self.require_inferred(inferred, span)?;
                Ok(ir::Expr::new(ExprKind::NewPath { path: path.clone(), args }, span).with_path(Some(path)))
            }
            NewTarget::Expr(ty) => {
                let ty = self.resolve(ty, None)?;
                Ok(ir::Expr::new(ExprKind::New { ty: Box::new(ty), args }, span).into_fuzzy())
            }
        }
    }

    fn proc_call(&mut self, target: &CallTarget, args: &[CallParameter], span: Span) -> SemanticResult<ir::Expr> {
        let target = match target {
            CallTarget::Named(name) => {
                if self.mode.sees_instance() && self.tree.has_proc(self.owner, name) {
                    ProcTarget::Src(name.clone())
                } else if self.tree.global_proc(name) {
                    ProcTarget::Global(name.clone())
                } else {
                    return Err(SemanticError::new(
                        SemanticErrorKind::UnknownProc,
                        format!("Proc \"{}\" does not exist", name),
                        span,
                    ));
                }
            }
            CallTarget::SelfProc | CallTarget::SuperProc if self.frame.is_none() => {
                return Err(SemanticError::new(
                    SemanticErrorKind::InvalidContext,
                    "Cannot call the current proc outside of a proc",
                    span,
                ))
            }
            CallTarget::SelfProc => ProcTarget::SelfProc,
            CallTarget::SuperProc => ProcTarget::SuperProc,
        };
        let args = self.arguments(args)?;
        Ok(ir::Expr::new(ExprKind::ProcCall { target, args }, span).into_fuzzy())
    }

    fn scope(
        &mut self,
        base: Option<&ast::Expr>,
        name: &str,
        call: Option<&[CallParameter]>,
        span: Span,
    ) -> SemanticResult<ir::Expr> {
        let owner = match base {
            // `::name(args)` calls a global proc, `::vars` is the global vars list
            None => {
                if let Some(args) = call {
                    if !self.tree.global_proc(name) {
                        return Err(SemanticError::new(
                            SemanticErrorKind::UnknownProc,
                            format!("No global proc named \"{}\"", name),
                            span,
                        ));
                    }
                    let args = self.arguments(args)?;
                    let target = ProcTarget::Global(name.to_string());
                    return Ok(ir::Expr::new(ExprKind::ProcCall { target, args }, span).into_fuzzy());
                }
                if name == "vars" {
                    return Ok(ir::Expr::new(ExprKind::GlobalVars, span).with_path(Some(TypePath::parse("/list"))));
                }
                TypePath::root()
            }
            Some(base) => {
                let resolved = self.resolve(base, None)?;
                match (&resolved.kind, resolved.path) {
                    (ExprKind::Path(path), _) => path.clone(),
                    (_, Some(path)) => path,
                    _ => {
                        return Err(SemanticError::new(
                            SemanticErrorKind::InvalidReference,
                            "The left side of :: must have a known type",
                            base.span,
                        ))
                    }
                }
            }
        };

        if let Some(args) = call {
            if !args.is_empty() {
                return Err(SemanticError::new(
                    SemanticErrorKind::BadArgument,
                    "A :: proc reference takes no arguments",
                    span,
                ));
            }
            let path = owner.add_to_path("proc").add_to_path(name);
            return self.constant_path(&path, span);
        }

        if !owner.is_root() {
            if let Some(var) = self.tree.field(&owner, name) {
                let ty = var.ty.clone();
                return Ok(ir::Expr::new(ExprKind::ScopeField { owner, name: name.to_string() }, span).with_path(ty));
            }
        }
        match self.tree.global_var(&owner, name) {
            Some(global) => Ok(ir::Expr::new(ExprKind::GlobalField { name: name.to_string(), id: global.id }, span)
                .with_path(global.ty.clone())),
            None => Err(SemanticError::new(
                SemanticErrorKind::UnknownField,
                format!("{} has no var named \"{}\"", owner, name),
                span,
            )),
        }
    }

    fn dereference(&mut self, base: &ast::Expr, ops: &[ast::DerefOp], span: Span) -> SemanticResult<ir::Expr> {
        if matches!(&base.kind, ast::ExprKind::Identifier(name) if name == "global") {
            let Some((first, rest)) = ops.split_first() else {
                return Err(unknown_identifier("global", base.span));
            };
            let root_span = base.span.merge(&first.span);
            let root = match &first.kind {
                ast::DerefKind::Field { name, .. } if name == "vars" => {
                    ir::Expr::new(ExprKind::GlobalVars, root_span).with_path(Some(TypePath::parse("/list")))
                }
                ast::DerefKind::Field { name, .. } => match self.tree.global_var(&TypePath::root(), name) {
                    Some(global) if self.mode.sees_globals() => {
                        ir::Expr::new(ExprKind::GlobalField { name: name.clone(), id: global.id }, root_span)
                            .with_path(global.ty.clone())
                    }
                    _ => return Err(unknown_identifier(&format!("global.{}", name), root_span)),
                },
                ast::DerefKind::Call { name, args, .. } => {
                    if !self.tree.global_proc(name) {
                        return Err(SemanticError::new(
                            SemanticErrorKind::UnknownProc,
                            format!("Global proc \"{}\" does not exist", name),
                            root_span,
                        ));
                    }
                    let args = self.arguments(args)?;
                    ir::Expr::new(ExprKind::ProcCall { target: ProcTarget::Global(name.clone()), args }, root_span)
                        .into_fuzzy()
                }
                ast::DerefKind::Index(_) => {
                    return Err(SemanticError::new(
                        SemanticErrorKind::InvalidContext,
                        "\"global\" cannot be indexed",
                        root_span,
                    ))
                }
            };
            return self.chain(root, rest, span);
        }

        let base = self.resolve(base, None)?;
        self.chain(base, ops, span)
    }

    fn chain(&mut self, mut base: ir::Expr, ops: &[ast::DerefOp], span: Span) -> SemanticResult<ir::Expr> {
        let tree = self.tree;
        let mut prev_path = base.path.clone();
        let mut fuzzy = base.fuzzy;
        let mut links: Vec<DerefOp> = Vec::new();

        for op in ops {
            match &op.kind {
                ast::DerefKind::Field { name, search } if *search || fuzzy => {
                    links.push(DerefOp {
                        kind: DerefKind::Field { name: name.clone(), search: true },
                        safe: op.safe,
                        path: None,
                        span: op.span,
                    });
                    prev_path = None;
                    fuzzy = true;
                }
                ast::DerefKind::Field { name, .. } => {
                    let owner = self.known_type(prev_path.as_ref(), name, op.span)?;
                    match tree.field(&owner, name) {
                        Some(var) => {
                            let ty = var.ty.clone();
                            if var.types.contains(ValueTypes::UNIMPLEMENTED) {
                                self.unimplemented(&owner, name, op.span);
                            }
                            links.push(DerefOp {
                                kind: DerefKind::Field { name: name.clone(), search: false },
                                safe: op.safe,
                                path: ty.clone(),
                                span: op.span,
                            });
                            prev_path = ty;
                        }
                        None => match tree.global_var(&owner, name) {
                            Some(global) => {
                                // A static reached through an instance; the
                                // chain so far is irrelevant
                                base = ir::Expr::new(ExprKind::GlobalField { name: name.clone(), id: global.id }, op.span)
                                    .with_path(global.ty.clone());
                                prev_path = global.ty.clone();
                                fuzzy = false;
                                links.clear();
                            }
                            None => {
                                return Err(SemanticError::new(
                                    SemanticErrorKind::UnknownField,
                                    format!("Unknown identifier \"{}\" on type {}", name, owner),
                                    op.span,
                                ))
                            }
                        },
                    }
                }
                ast::DerefKind::Index(index) => {
                    let index = self.resolve(index, None)?;
                    links.push(DerefOp { kind: DerefKind::Index(Box::new(index)), safe: op.safe, path: None, span: op.span });
                    prev_path = None;
                    fuzzy = true;
                }
                ast::DerefKind::Call { name, search, args } => {
                    let search = *search || fuzzy;
                    if !search {
                        let owner = self.known_type(prev_path.as_ref(), name, op.span)?;
                        if !self.tree.has_proc(&owner, name) {
                            return Err(SemanticError::new(
                                SemanticErrorKind::UnknownProc,
                                format!("Type {} does not have a proc named \"{}\"", owner, name),
                                op.span,
                            ));
                        }
                    }
                    let args = self.arguments(args)?;
                    links.push(DerefOp {
                        kind: DerefKind::Call { name: name.clone(), search, args },
                        safe: op.safe,
                        path: None,
                        span: op.span,
                    });
                    prev_path = None;
                    fuzzy = true;
                }
            }
        }

        if links.is_empty() {
            return Ok(base);
        }
        let expr = ir::Expr::new(ExprKind::Dereference { base: Box::new(base), ops: links }, span).with_path(prev_path);
        Ok(if fuzzy { expr.into_fuzzy() } else { expr })
    }

    fn known_type(&self, path: Option<&TypePath>, name: &str, span: Span) -> SemanticResult<TypePath> {
        let path = path.ok_or_else(|| {
            SemanticError::new(
                SemanticErrorKind::UnknownIdentifier,
                format!("Cannot access \"{}\" on a value without a declared type, use \":\" instead", name),
                span,
            )
        })?;
        if !self.tree.type_exists(path) {
            return Err(SemanticError::new(
                SemanticErrorKind::UnknownType,
                format!("Type {} does not exist", path),
                span,
            ));
        }
        Ok(path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::tree::MemoryTree;
    use crate::frontend::parser::Parser;
    use crate::utils::location::FileId;

    const SOURCE: &str = "/obj/item\n\tvar/weight = 1\n\tvar/obj/item/inner\n\tvar/list/stuff\n\tvar/static/count = 0\n\tvar/const/MAX = 5\n\tproc/use()\n\t\treturn\nvar/round_number = 1\n/proc/helper()\n\treturn\n/datum/proc/A()\n\treturn\n/proc/A(x)\n\treturn x\n";

    fn expr(source: &str) -> ast::Expr {
        Parser::from_source(source, FileId(0)).parse_expression().unwrap()
    }

    struct Fixture {
        tree: MemoryTree,
        owner: TypePath,
        frame: ProcFrame,
        diagnostics: Diagnostics,
    }

    impl Fixture {
        fn new() -> Self {
            let file = Parser::from_source(SOURCE, FileId(0)).parse_file();
            let owner = TypePath::parse("/obj/item");
            let mut frame = ProcFrame::new(owner.clone(), "use");
            frame.declare("list_var", Some(TypePath::parse("/list")), None);
            frame.declare("other", Some(TypePath::parse("/obj/item")), None);
            frame.declare("LIMIT", None, Some(ir::Expr::number(3.0, Span::dummy())));
            Self { tree: MemoryTree::from_file(&file), owner, frame, diagnostics: Diagnostics::new() }
        }

        fn resolve_in(&mut self, mode: ScopeMode, source: &str) -> SemanticResult<ir::Expr> {
            let mut resolver =
                Resolver::new(&self.tree, &self.owner, Some(&self.frame), &mut self.diagnostics).with_mode(mode);
            resolver.resolve(&expr(source), None)
        }

        fn resolve(&mut self, source: &str) -> SemanticResult<ir::Expr> {
            self.resolve_in(ScopeMode::Normal, source)
        }
    }

    #[test]
    fn test_lookup_order() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.resolve("list_var").unwrap().kind, ExprKind::Local { id: 0, .. }));
        assert!(matches!(fx.resolve("weight").unwrap().kind, ExprKind::Field { .. }));
        assert!(matches!(fx.resolve("count").unwrap().kind, ExprKind::GlobalField { .. }));
        assert!(matches!(fx.resolve("round_number").unwrap().kind, ExprKind::GlobalField { .. }));
        assert_eq!(fx.resolve("LIMIT").unwrap().as_number(), Some(3.0));
        assert_eq!(fx.resolve("nothing").unwrap_err().kind, SemanticErrorKind::UnknownIdentifier);
    }

    #[test]
    fn test_static_mode_hides_instance_state() {
        let mut fx = Fixture::new();
        let err = fx.resolve_in(ScopeMode::Static, "list_var").unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::UnknownIdentifier);
        assert!(fx.resolve_in(ScopeMode::Static, "weight").is_err());
        assert!(fx.resolve_in(ScopeMode::Static, "round_number").is_ok());

        assert!(fx.resolve_in(ScopeMode::FirstPassStatic, "round_number").is_err());
        assert!(fx.resolve_in(ScopeMode::FirstPassStatic, "world").is_err());
        assert!(fx.resolve_in(ScopeMode::FirstPassStatic, "helper()").is_ok());
        assert!(fx.resolve_in(ScopeMode::FirstPassStatic, "use()").is_err());
    }

    #[test]
    fn test_index_makes_chain_fuzzy() {
        let mut fx = Fixture::new();
        let resolved = fx.resolve("list_var[1].whatever").unwrap();
        assert!(resolved.fuzzy);
        match resolved.kind {
            ExprKind::Dereference { ops, .. } => {
                assert!(matches!(ops[0].kind, DerefKind::Index(_)));
                assert!(matches!(&ops[1].kind, DerefKind::Field { name, search: true } if name == "whatever"));
            }
            other => panic!("expected a dereference, got {:?}", other),
        }
    }

    #[test]
    fn test_static_chain_is_checked() {
        let mut fx = Fixture::new();
        let resolved = fx.resolve("other.inner.weight").unwrap();
        assert!(!resolved.fuzzy);
        assert_eq!(resolved.path, None);

        let err = fx.resolve("other.missing").unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::UnknownField);
        assert_eq!(fx.resolve("other.fly()").unwrap_err().kind, SemanticErrorKind::UnknownProc);
        assert!(fx.resolve("other.use().anything").unwrap().fuzzy);
        assert!(fx.resolve("other:missing").is_ok());
    }

    #[test]
    fn test_static_through_instance_becomes_global() {
        let mut fx = Fixture::new();
        let resolved = fx.resolve("other.count").unwrap();
        assert!(matches!(resolved.kind, ExprKind::GlobalField { ref name, .. } if name == "count"));
    }

    #[test]
    fn test_global_root() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.resolve("global.round_number").unwrap().kind, ExprKind::GlobalField { .. }));
        assert!(matches!(fx.resolve("global.vars").unwrap().kind, ExprKind::GlobalVars));
        assert!(matches!(
            fx.resolve("global.helper()").unwrap().kind,
            ExprKind::ProcCall { target: ProcTarget::Global(_), .. }
        ));
        assert_eq!(fx.resolve("global").unwrap_err().kind, SemanticErrorKind::InvalidContext);
    }

    #[test]
    fn test_null_comparisons() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.resolve("weight == null").unwrap().kind, ExprKind::IsNull(_)));
        assert!(matches!(
            fx.resolve("null != weight").unwrap().kind,
            ExprKind::Unary { op: UnaryOp::Not, .. }
        ));
    }

    #[test]
    fn test_inferred_types() {
        let mut fx = Fixture::new();
        let resolved = fx.resolve("inner = new()").unwrap();
        match resolved.kind {
            ExprKind::Assign { value, .. } => {
                assert!(matches!(&value.kind, ExprKind::NewPath { path, .. } if path.to_string() == "/obj/item"));
            }
            other => panic!("expected an assignment, got {:?}", other),
        }
        assert_eq!(fx.resolve("new()").unwrap_err().kind, SemanticErrorKind::MissingInferredType);
        assert_eq!(fx.resolve("locate()").unwrap_err().message, "Could not infer a type");
    }

    #[test]
    fn test_assignment_targets() {
        let mut fx = Fixture::new();
        assert_eq!(fx.resolve("1 = 2").unwrap_err().kind, SemanticErrorKind::InvalidReference);
        fx.resolve("LIMIT = 4").unwrap();
        assert!(fx.diagnostics.contains(ErrorCode::WriteToConstant));
    }

    #[test]
    fn test_special_names() {
        let mut fx = Fixture::new();
        let ty = fx.resolve("__TYPE__").unwrap();
        assert!(matches!(ty.kind, ExprKind::Path(ref p) if p.to_string() == "/obj/item"));
        let proc_ref = fx.resolve("__PROC__").unwrap();
        assert!(matches!(proc_ref.kind, ExprKind::ProcReference(ref p) if p.to_string() == "/obj/item/proc/use"));
        assert_eq!(fx.resolve("nameof(weight)").unwrap().kind, ExprKind::String("weight".to_string()));
        assert!(fx.resolve("initial(weight)").is_ok());
        assert!(fx.resolve("initial(1)").is_err());
    }

    #[test]
    fn test_unimplemented_field_warns() {
        let mut fx = Fixture::new();
        fx.resolve("world.cache_lifespan").unwrap();
        assert!(fx.diagnostics.contains(ErrorCode::UnimplementedAccess));
        assert!(!fx.diagnostics.has_errors());
    }

    #[test]
    fn test_istype_uses_declared_type() {
        let mut fx = Fixture::new();
        match fx.resolve("istype(other)").unwrap().kind {
            ExprKind::Builtin { func: Builtin::IsType, args } => {
                assert!(matches!(&args[1].kind, ExprKind::Path(p) if p.to_string() == "/obj/item"));
            }
            other => panic!("expected istype, got {:?}", other),
        }
        assert!(fx.resolve("istype(weight)").is_err());
    }

    #[test]
    fn test_scope_without_base() {
        let mut fx = Fixture::new();
        match fx.resolve("::A(1)").unwrap().kind {
            ExprKind::ProcCall { target: ProcTarget::Global(name), args } => {
                assert_eq!(name, "A");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected a global proc call, got {:?}", other),
        }
        assert_eq!(fx.resolve("::missing()").unwrap_err().kind, SemanticErrorKind::UnknownProc);
        assert!(matches!(fx.resolve("::vars").unwrap().kind, ExprKind::GlobalVars));
        assert!(matches!(fx.resolve("::round_number").unwrap().kind, ExprKind::GlobalField { .. }));
    }

    #[test]
    fn test_scope_proc_reference() {
        let mut fx = Fixture::new();
        let resolved = fx.resolve("/datum::A()").unwrap();
        assert!(matches!(resolved.kind, ExprKind::ProcReference(ref p) if p.to_string() == "/datum/proc/A"));
        assert_eq!(fx.resolve("/datum::A(1)").unwrap_err().kind, SemanticErrorKind::BadArgument);
    }
}
