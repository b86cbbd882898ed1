//! Proc body compilation.
//!
//! [`ProcCompiler`] walks a proc's statements and drives a [`ProcEmitter`].
//! Each block is compiled in two passes: `set` statements first, wherever
//! they appear, then everything else in order. Every statement yields a
//! [`Termination`] fact; statements after an unconditional one are reported
//! and skipped.

use crate::compile::attributes::{ProcAttributes, ProcFlags};
use crate::compile::emitter::{EnumeratorKind, Label, Op, ProcEmitter};
use crate::compile::resolve::Resolver;
use crate::compile::scope::ProcFrame;
use crate::compile::termination::Termination;
use crate::compile::tree::ObjectTree;
use crate::frontend::ast::{
    self, AssignOp, ProcBlock, ProcDefinition, ProcStatement, ProcStatementKind, SwitchCase, SwitchCaseKind,
    SwitchValue, ValueTypes,
};
use crate::frontend::path::TypePath;
use crate::ir::{self, Argument, ExprKind, ProcTarget};
use crate::utils::diagnostics::Diagnostics;
use crate::utils::errors::{
    Diagnostic, DiagnosticSeverity, ErrorCode, SemanticError, SemanticErrorKind, SemanticResult,
};
use crate::utils::location::Span;
use std::collections::HashMap;

/// Result of compiling one proc.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProc {
    /// Full proc path, e.g. `/mob/proc/attack`
    pub path: TypePath,
    /// Attributes fixed by `set` statements
    pub attributes: ProcAttributes,
    /// How the body ends
    pub termination: Termination,
    /// Number of local slots, parameters included
    pub local_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct LoopContext {
    continue_label: Label,
    end_label: Label,
    /// Something inside jumps out of the loop
    escaped: bool,
}

#[derive(Debug, Clone)]
struct LabelInfo {
    start: Label,
    end: Option<Label>,
    /// Continue label and loop depth of the first loop inside the label
    continue_target: Option<(Label, usize)>,
    /// Loop depth when the label was placed
    loop_depth: usize,
    defined: bool,
    broken: bool,
    first_use: Span,
}

/// Compiles the body of one proc.
pub struct ProcCompiler<'a> {
    tree: &'a mut dyn ObjectTree,
    emitter: &'a mut dyn ProcEmitter,
    diagnostics: &'a mut Diagnostics,
    frame: ProcFrame,
    attributes: ProcAttributes,
    /// Last accepted value of each `set` attribute
    set_values: HashMap<String, ir::Expr>,
    loops: Vec<LoopContext>,
    labels: HashMap<String, LabelInfo>,
    /// Labels whose body is being compiled, innermost last
    active_labels: Vec<String>,
}

impl<'a> ProcCompiler<'a> {
    pub fn new(
        tree: &'a mut dyn ObjectTree,
        frame: ProcFrame,
        emitter: &'a mut dyn ProcEmitter,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            tree,
            emitter,
            diagnostics,
            frame,
            attributes: ProcAttributes::default(),
            set_values: HashMap::new(),
            loops: Vec::new(),
            labels: HashMap::new(),
            active_labels: Vec::new(),
        }
    }

    /// Attributes collected so far.
    pub fn attributes(&self) -> &ProcAttributes {
        &self.attributes
    }

    pub fn frame(&self) -> &ProcFrame {
        &self.frame
    }

    /// Compile a whole definition: parameters, defaults and body.
    pub fn compile_definition(mut self, definition: &ProcDefinition) -> CompiledProc {
        log::debug!("compiling {}", definition.path());
        if definition.is_verb {
            self.tree.register_verb(&definition.object_path, definition.path());
        }

        for parameter in &definition.parameters {
            let id = match self.frame.declare(&parameter.name, parameter.ty.clone(), None) {
                Some(local) => local.id,
                None => {
                    self.diagnostics.emit(
                        ErrorCode::DuplicateVariable,
                        parameter.span,
                        format!("Duplicate parameter {}", parameter.name),
                    );
                    continue;
                }
            };
            if let Some(default) = &parameter.default {
                let local = ir::Expr::new(ExprKind::Local { name: parameter.name.clone(), id }, parameter.span)
                    .with_path(parameter.ty.clone());
                if let Err(error) = self.default_parameter(local, default, parameter.ty.as_ref()) {
                    self.report(error);
                }
            }
        }

        let termination = match &definition.body {
            Some(body) if !body.is_empty() => self.compile_body(body),
            _ => {
                if self.diagnostics.config().report_empty_procs {
                    self.diagnostics.emit(
                        ErrorCode::EmptyProc,
                        definition.span,
                        "Empty proc detected - add an explicit \"return\" statement",
                    );
                }
                Termination::NONE
            }
        };

        CompiledProc {
            path: definition.path(),
            attributes: self.attributes,
            termination,
            local_count: self.frame.local_count(),
        }
    }

    /// Compile the top-level block of a proc and check that every `goto`
    /// found its label.
    pub fn compile_body(&mut self, body: &ProcBlock) -> Termination {
        let termination = self.compile_block(body, true);

        let mut missing: Vec<(&String, Span)> = self
            .labels
            .iter()
            .filter(|(_, info)| !info.defined)
            .map(|(name, info)| (name, info.first_use))
            .collect();
        missing.sort_by(|a, b| a.0.cmp(b.0));
        for (name, span) in missing {
            self.diagnostics.emit(ErrorCode::ItemDoesntExist, span, format!("Unknown label {}", name));
        }

        log::trace!("{} ends with {}", self.frame.path(), termination);
        termination
    }

    fn emit(&mut self, op: Op, span: Span) {
        self.emitter.emit(op, span);
    }

    fn report(&mut self, error: SemanticError) {
        log::debug!("abandoning statement: {}", error);
        self.diagnostics.push(error.into());
    }

    fn resolve(&mut self, expr: &ast::Expr, inferred: Option<&TypePath>) -> SemanticResult<ir::Expr> {
        Resolver::new(&*self.tree, &self.frame.owner, Some(&self.frame), self.diagnostics).resolve(expr, inferred)
    }

    fn resolve_constant(&mut self, expr: &ast::Expr) -> SemanticResult<ir::Expr> {
        Resolver::new(&*self.tree, &self.frame.owner, Some(&self.frame), self.diagnostics).resolve_constant(expr, None)
    }

    fn push(&mut self, expr: &ast::Expr, inferred: Option<&TypePath>) -> SemanticResult<()> {
        let value = self.resolve(expr, inferred)?;
        self.emit(Op::Push(value), expr.span);
        Ok(())
    }

    fn default_parameter(&mut self, local: ir::Expr, default: &ast::Expr, ty: Option<&TypePath>) -> SemanticResult<()> {
        let value = self.resolve(default, ty)?;
        let skip = self.emitter.new_label();
        let span = default.span;
        self.emit(Op::Push(local.clone()), span);
        self.emit(Op::IsNull, span);
        self.emit(Op::JumpIfFalse(skip), span);
        self.emit(Op::Push(value), span);
        self.emit(Op::Assign(local), span);
        self.emit(Op::Pop, span);
        self.emit(Op::Mark(skip), span);
        Ok(())
    }

    fn compile_block(&mut self, block: &ProcBlock, is_proc_body: bool) -> Termination {
        for statement in &block.statements {
            self.collect_sets(statement);
        }

        if !is_proc_body {
            if block.is_empty() {
                self.diagnostics.emit(ErrorCode::EmptyBlock, block.span, "Empty block detected");
            } else if block.statements.iter().all(ProcStatement::is_set) {
                self.diagnostics.emit(
                    ErrorCode::EmptyBlock,
                    block.span,
                    "Empty block detected - set statements are executed outside of, before, and unconditional to, this block",
                );
            }
        }

        let mut termination = Termination::NONE;
        for statement in block.statements.iter().filter(|s| !s.is_set()) {
            if termination.is_unconditional() {
                if self.diagnostics.config().report_unreachable_code {
                    self.diagnostics.emit(ErrorCode::UnreachableCode, statement.span, "Unreachable code detected");
                }
                break;
            }
            termination |= self.compile_statement(statement);
        }
        termination
    }

    /// Open a scope, compile `block` and close the scope.
    fn compile_scoped(&mut self, block: &ProcBlock) -> Termination {
        self.emit(Op::EnterScope, block.span);
        self.frame.push_scope();
        let termination = self.compile_block(block, false);
        self.frame.pop_scope();
        self.emit(Op::ExitScope, block.span);
        termination
    }

    fn discard(&mut self, block: &ProcBlock, reason: &str) {
        if self.diagnostics.config().report_constant_conditions {
            self.diagnostics.emit(ErrorCode::UnreachableCode, block.span, format!("Unreachable code: {}", reason));
        }
    }

    fn collect_sets(&mut self, statement: &ProcStatement) {
        match &statement.kind {
            ProcStatementKind::Set { attribute, value, was_in } => {
                self.compile_set(attribute, value, *was_in, statement.span)
            }
            ProcStatementKind::Aggregate(inner) => inner.iter().for_each(|s| self.collect_sets(s)),
            _ => {}
        }
    }

    fn compile_set(&mut self, attribute: &str, value: &ast::Expr, was_in: bool, span: Span) {
        if attribute == "src" {
            self.diagnostics.emit(ErrorCode::UnimplementedAccess, span, "'set src' is unimplemented");
            return;
        }
        if was_in {
            self.diagnostics.push(
                Diagnostic::new(ErrorCode::InvalidSetStatement, "Use of 'in' keyword is illegal here. Did you mean '='?")
                    .with_span(span)
                    .with_severity(DiagnosticSeverity::Warning),
            );
        }

        let resolved = match self.resolve(value, None) {
            Ok(resolved) => resolved,
            Err(error) => return self.report(error),
        };
        let value = if resolved.is_constant() {
            resolved
        } else {
            self.diagnostics.emit(
                ErrorCode::InvalidSetStatement,
                value.span,
                format!("'{}' attribute should be a constant", attribute),
            );
            if self.diagnostics.severity_of(ErrorCode::InvalidSetStatement) == Some(DiagnosticSeverity::Error) {
                return;
            }
            match self.set_values.get(attribute) {
                Some(previous) => previous.clone(),
                None => {
                    self.diagnostics.push(
                        Diagnostic::new(
                            ErrorCode::InvalidSetStatement,
                            format!("'{}' attribute must be a constant", attribute),
                        )
                        .with_span(value.span)
                        .with_severity(DiagnosticSeverity::Error),
                    );
                    return;
                }
            }
        };

        match self.attributes.apply(attribute, &value, span, self.diagnostics) {
            Ok(()) => {
                self.set_values.insert(attribute.to_string(), value);
            }
            Err(error) => self.report(error),
        }
    }

    fn compile_statement(&mut self, statement: &ProcStatement) -> Termination {
        match self.try_statement(statement) {
            Ok(termination) => termination,
            Err(error) => {
                self.report(error);
                Termination::NONE
            }
        }
    }

    fn try_statement(&mut self, statement: &ProcStatement) -> SemanticResult<Termination> {
        use ProcStatementKind as S;

        let span = statement.span;
        let termination = match &statement.kind {
            S::Expression(expr) => {
                self.push(expr, None)?;
                self.emit(Op::Pop, span);
                Termination::NONE
            }
            S::VarDeclaration(var) => {
                self.compile_var(var)?;
                Termination::NONE
            }
            S::Aggregate(inner) => {
                let mut termination = Termination::NONE;
                for statement in inner.iter().filter(|s| !s.is_set()) {
                    termination |= self.compile_statement(statement);
                }
                termination
            }
            // Handled by the first pass
            S::Set { .. } => Termination::NONE,
            S::Return(value) => {
                match value {
                    Some(value) => self.push(value, None)?,
                    None => self.emit(Op::Push(ir::Expr::new(ExprKind::SelfValue, span)), span),
                }
                self.emit(Op::Return, span);
                Termination::PROC_RETURN
            }
            S::Break(label) => self.compile_break(label.as_deref(), span)?,
            S::Continue(label) => self.compile_continue(label.as_deref(), span)?,
            S::Goto(label) => self.compile_goto(label, span),
            S::Label { name, body } => self.compile_label(name, body.as_ref(), span),
            S::Del(value) => {
                self.push(value, None)?;
                self.emit(Op::Delete, span);
                Termination::NONE
            }
            S::Throw(value) => {
                self.push(value, None)?;
                self.emit(Op::Throw, span);
                Termination::NONE
            }
            S::If { condition, body, else_body } => self.compile_if(condition, body, else_body.as_ref())?,
            S::ForStandard { init, condition, increment, body } => {
                self.compile_for_standard(init.as_deref(), condition.as_ref(), increment.as_ref(), body, span)?
            }
            S::ForIn { variable, types, list, body } => self.compile_for_in(variable, *types, list, body, span)?,
            S::ForRange { variable, start, end, step, body } => {
                self.compile_for_range(variable, start, end, step.as_ref(), body, span)?
            }
            S::ForType { variable, body } => self.compile_for_type(variable, body, span)?,
            S::InfLoop(body) => self.compile_infinite_loop(body, span),
            S::While { condition, body } => self.compile_while(condition, body, span)?,
            S::DoWhile { body, condition } => self.compile_do_while(body, condition, span)?,
            S::Switch { value, cases } => self.compile_switch(value, cases, span)?,
            S::Spawn { delay, body } => self.compile_spawn(delay.as_ref(), body, span)?,
            S::TryCatch { try_body, catch_variable, catch_body } => {
                self.compile_try(try_body, catch_variable.as_deref(), catch_body.as_ref(), span)?
            }
            S::Output { receiver, message } => {
                self.push(receiver, None)?;
                self.push(message, None)?;
                self.emit(Op::Output, span);
                Termination::NONE
            }
            S::Input { source, target } => {
                let source_expr = self.resolve(source, None)?;
                let target_expr = self.resolve(target, None)?;
                if !source_expr.is_lvalue() {
                    return Err(SemanticError::new(
                        SemanticErrorKind::InvalidReference,
                        "Left side must be an l-value",
                        source.span,
                    ));
                }
                if !target_expr.is_lvalue() {
                    return Err(SemanticError::new(
                        SemanticErrorKind::InvalidReference,
                        "Right side must be an l-value",
                        target.span,
                    ));
                }
                self.emit(Op::Input { source: source_expr, target: target_expr }, span);
                Termination::NONE
            }
            S::Browse { receiver, body, options } => self.io(&[receiver, body, options], Op::Browse, span)?,
            S::BrowseResource { receiver, file, filename } => {
                self.io(&[receiver, file, filename], Op::BrowseResource, span)?
            }
            S::OutputControl { receiver, message, control } => {
                self.io(&[receiver, message, control], Op::OutputControl, span)?
            }
            S::Ftp { receiver, file, name } => self.io(&[receiver, file, name], Op::Ftp, span)?,
            S::Link { receiver, url } => self.io(&[receiver, url], Op::Link, span)?,
        };
        Ok(termination)
    }

    fn io(&mut self, operands: &[&ast::Expr], op: Op, span: Span) -> SemanticResult<Termination> {
        for operand in operands {
            self.push(operand, None)?;
        }
        self.emit(op, span);
        Ok(Termination::NONE)
    }

    fn local(&self, name: &str, span: Span) -> Option<ir::Expr> {
        let local = self.frame.local(name)?;
        Some(ir::Expr::new(ExprKind::Local { name: name.to_string(), id: local.id }, span).with_path(local.ty.clone()))
    }

    fn compile_var(&mut self, var: &ast::LocalVar) -> SemanticResult<()> {
        if var.modifiers.is_static {
            let id = self.tree.register_global(&self.frame.path(), &var.name, var.ty.clone(), var.value.clone());
            self.frame.add_global(&var.name, id);
            return Ok(());
        }

        let value = match &var.value {
            Some(value) => Some(self.resolve(value, var.ty.as_ref())?),
            None => None,
        };

        if var.modifiers.is_const {
            let constant = match value {
                Some(value) if value.is_constant() => value,
                _ => {
                    return Err(SemanticError::new(
                        SemanticErrorKind::ConstantRequired,
                        "Const var must be set to a constant",
                        var.span,
                    ))
                }
            };
            if self.frame.declare(&var.name, var.ty.clone(), Some(constant)).is_none() {
                self.duplicate_var(&var.name, var.span);
            }
            return Ok(());
        }

        let id = match self.frame.declare(&var.name, var.ty.clone(), None) {
            Some(local) => local.id,
            None => {
                self.duplicate_var(&var.name, var.span);
                return Ok(());
            }
        };
        let target = ir::Expr::new(ExprKind::Local { name: var.name.clone(), id }, var.span).with_path(var.ty.clone());
        self.emit(Op::Push(value.unwrap_or_else(|| ir::Expr::null(var.span))), var.span);
        self.emit(Op::Assign(target), var.span);
        self.emit(Op::Pop, var.span);
        Ok(())
    }

    fn duplicate_var(&mut self, name: &str, span: Span) {
        self.diagnostics.emit(ErrorCode::DuplicateVariable, span, format!("Duplicate var {}", name));
    }

    /// Bind the variable of a `for` header, declaring it when written as
    /// `var/x`.
    fn loop_variable(&mut self, variable: &ast::Expr) -> SemanticResult<ir::Expr> {
        match &variable.kind {
            ast::ExprKind::VarDecl { name, ty } => match self.frame.declare(name, ty.clone(), None) {
                Some(local) => Ok(ir::Expr::new(ExprKind::Local { name: name.clone(), id: local.id }, variable.span)
                    .with_path(ty.clone())),
                None => {
                    self.duplicate_var(name, variable.span);
                    self.local(name, variable.span).ok_or_else(|| {
                        SemanticError::new(SemanticErrorKind::InvalidReference, "Invalid loop variable", variable.span)
                    })
                }
            },
            _ => {
                let target = self.resolve(variable, None)?;
                if target.is_lvalue() {
                    Ok(target)
                } else {
                    Err(SemanticError::new(
                        SemanticErrorKind::InvalidReference,
                        "Loop variable must be an l-value",
                        variable.span,
                    ))
                }
            }
        }
    }

    fn enter_loop(&mut self, continue_label: Label, end_label: Label) {
        let depth = self.loops.len();
        for name in &self.active_labels {
            if let Some(info) = self.labels.get_mut(name) {
                if info.continue_target.is_none() {
                    info.continue_target = Some((continue_label, depth));
                }
            }
        }
        self.loops.push(LoopContext { continue_label, end_label, escaped: false });
    }

    /// Pop the innermost loop and report whether anything jumped out of it.
    fn leave_loop(&mut self) -> bool {
        self.loops.pop().is_some_and(|context| context.escaped)
    }

    /// Jump back to the loop start, yielding first in background procs.
    fn jump_to_start(&mut self, start: Label, span: Span) {
        if self.attributes.flags.contains(ProcFlags::BACKGROUND) {
            let sleep = ir::Expr::new(
                ExprKind::ProcCall {
                    target: ProcTarget::Global("sleep".to_string()),
                    args: vec![Argument { name: None, value: ir::Expr::number(-1.0, span) }],
                },
                span,
            );
            self.emit(Op::Push(sleep), span);
            self.emit(Op::Pop, span);
        }
        self.emit(Op::Jump(start), span);
    }

    /// Compile a loop body between the loop's continue and end markers.
    fn loop_body(&mut self, body: &ProcBlock, continue_label: Label, end_label: Label) -> (Termination, bool) {
        self.enter_loop(continue_label, end_label);
        let termination = self.compile_scoped(body);
        let escaped = self.leave_loop();
        (termination, escaped)
    }

    fn compile_if(
        &mut self,
        condition: &ast::Expr,
        body: &ProcBlock,
        else_body: Option<&ProcBlock>,
    ) -> SemanticResult<Termination> {
        let condition = self.resolve(condition, None)?;
        if condition.is_constant() {
            if let Some(truth) = condition.truthiness() {
                return Ok(if truth {
                    if let Some(else_body) = else_body {
                        self.discard(else_body, "the condition is always true");
                    }
                    self.compile_scoped(body)
                } else {
                    self.discard(body, "the condition is always false");
                    match else_body {
                        Some(else_body) => self.compile_scoped(else_body),
                        None => Termination::NONE,
                    }
                });
            }
        }

        let span = condition.span;
        let end = self.emitter.new_label();
        let else_label = match else_body {
            Some(_) => self.emitter.new_label(),
            None => end,
        };
        self.emit(Op::Push(condition), span);
        self.emit(Op::JumpIfFalse(else_label), span);
        let then_termination = self.compile_scoped(body);
        let else_termination = match else_body {
            Some(else_body) => {
                self.emit(Op::Jump(end), body.span);
                self.emit(Op::Mark(else_label), else_body.span);
                self.compile_scoped(else_body)
            }
            None => Termination::NONE,
        };
        self.emit(Op::Mark(end), span);
        Ok(then_termination.branch(else_termination))
    }

    fn compile_for_standard(
        &mut self,
        init: Option<&ast::Expr>,
        condition: Option<&ast::Expr>,
        increment: Option<&ast::Expr>,
        body: &ProcBlock,
        span: Span,
    ) -> SemanticResult<Termination> {
        self.emit(Op::EnterScope, span);
        self.frame.push_scope();
        let result = self.for_standard_inner(init, condition, increment, body, span);
        self.frame.pop_scope();
        self.emit(Op::ExitScope, span);
        result
    }

    fn for_standard_inner(
        &mut self,
        init: Option<&ast::Expr>,
        condition: Option<&ast::Expr>,
        increment: Option<&ast::Expr>,
        body: &ProcBlock,
        span: Span,
    ) -> SemanticResult<Termination> {
        if let Some(init) = init {
            match &init.kind {
                ast::ExprKind::Assign { op: AssignOp::Assign, target, value }
                    if matches!(target.kind, ast::ExprKind::VarDecl { .. }) =>
                {
                    let ty = match &target.kind {
                        ast::ExprKind::VarDecl { ty, .. } => ty.clone(),
                        _ => None,
                    };
                    let value = self.resolve(value, ty.as_ref())?;
                    let local = self.loop_variable(target)?;
                    self.emit(Op::Push(value), init.span);
                    self.emit(Op::Assign(local), init.span);
                }
                ast::ExprKind::VarDecl { .. } => {
                    let local = self.loop_variable(init)?;
                    self.emit(Op::Push(ir::Expr::null(init.span)), init.span);
                    self.emit(Op::Assign(local), init.span);
                }
                _ => self.push(init, None)?,
            }
            self.emit(Op::Pop, init.span);
        }

        let condition = match condition {
            Some(condition) => Some(self.resolve(condition, None)?),
            None => None,
        };
        let always = match &condition {
            None => true,
            Some(condition) => condition.is_constant() && condition.truthiness() == Some(true),
        };
        if let Some(condition) = &condition {
            if condition.is_constant() && condition.truthiness() == Some(false) {
                self.discard(body, "the loop condition is always false");
                return Ok(Termination::NONE);
            }
        }
        let increment = match increment {
            Some(increment) => Some(self.resolve(increment, None)?),
            None => None,
        };

        let start = self.emitter.new_label();
        let continue_label = self.emitter.new_label();
        let end = self.emitter.new_label();
        self.emit(Op::LoopStart(start), span);
        if let Some(condition) = condition.filter(|_| !always) {
            let condition_span = condition.span;
            self.emit(Op::Push(condition), condition_span);
            self.emit(Op::JumpIfFalse(end), condition_span);
        }
        let (termination, escaped) = self.loop_body(body, continue_label, end);
        self.emit(Op::LoopContinue(continue_label), span);
        if let Some(increment) = increment {
            let increment_span = increment.span;
            self.emit(Op::Push(increment), increment_span);
            self.emit(Op::Pop, increment_span);
        }
        self.jump_to_start(start, span);
        self.emit(Op::LoopEnd(end), span);
        Ok(termination.leave_loop(always && !escaped))
    }

    /// Shared tail of the enumerator loops: the enumerator has been created
    /// and the loop scope is open.
    fn enumerate(&mut self, target: ir::Expr, body: &ProcBlock, span: Span) -> Termination {
        let start = self.emitter.new_label();
        let continue_label = self.emitter.new_label();
        let end = self.emitter.new_label();
        self.emit(Op::LoopStart(start), span);
        self.emit(Op::LoopContinue(continue_label), span);
        self.emit(Op::Enumerate { target, exit: end }, span);
        let (termination, _) = self.loop_body(body, continue_label, end);
        self.jump_to_start(start, span);
        self.emit(Op::LoopEnd(end), span);
        termination.leave_loop(false)
    }

    fn enumerator_loop(&mut self, variable: &ast::Expr, body: &ProcBlock, span: Span) -> SemanticResult<Termination> {
        self.emit(Op::EnterScope, span);
        self.frame.push_scope();
        let result = self.loop_variable(variable).map(|target| self.enumerate(target, body, span));
        self.frame.pop_scope();
        self.emit(Op::ExitScope, span);
        self.emit(Op::DestroyEnumerator, span);
        result
    }

    fn compile_for_in(
        &mut self,
        variable: &ast::Expr,
        types: Option<ValueTypes>,
        list: &ast::Expr,
        body: &ProcBlock,
        span: Span,
    ) -> SemanticResult<Termination> {
        self.push(list, None)?;
        // An `as` clause replaces the filter implied by the var's type
        let filter = match types {
            None => match &variable.kind {
                ast::ExprKind::VarDecl { ty: Some(ty), .. } => Some(ty.clone()),
                _ => None,
            },
            Some(types) => self.as_clause_filter(types, variable.span),
        };
        let kind = match filter {
            Some(ty) if self.tree.type_exists(&ty) => EnumeratorKind::FilteredList(ty),
            Some(ty) => {
                self.diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::ItemDoesntExist,
                        format!("Cannot filter enumeration by type {}, it does not exist", ty),
                    )
                    .with_span(variable.span)
                    .with_severity(DiagnosticSeverity::Warning),
                );
                EnumeratorKind::List
            }
            None => EnumeratorKind::List,
        };
        self.emit(Op::CreateEnumerator(kind), span);
        self.enumerator_loop(variable, body, span)
    }

    fn as_clause_filter(&mut self, types: ValueTypes, span: Span) -> Option<TypePath> {
        let path = match types {
            t if t.is_anything() => return None,
            ValueTypes::OBJ => "/obj",
            ValueTypes::MOB => "/mob",
            ValueTypes::TURF => "/turf",
            ValueTypes::AREA => "/area",
            _ => {
                self.diagnostics.push(
                    Diagnostic::new(
                        ErrorCode::UnimplementedAccess,
                        "This \"as\" filter is not supported in for loops, no type check will be performed",
                    )
                    .with_span(span),
                );
                return None;
            }
        };
        Some(TypePath::parse(path))
    }

    fn compile_for_range(
        &mut self,
        variable: &ast::Expr,
        start: &ast::Expr,
        end: &ast::Expr,
        step: Option<&ast::Expr>,
        body: &ProcBlock,
        span: Span,
    ) -> SemanticResult<Termination> {
        self.push(start, None)?;
        self.push(end, None)?;
        match step {
            Some(step) => self.push(step, None)?,
            None => self.emit(Op::Push(ir::Expr::number(1.0, span)), span),
        }
        self.emit(Op::CreateEnumerator(EnumeratorKind::Range), span);
        self.enumerator_loop(variable, body, span)
    }

    fn compile_for_type(&mut self, variable: &ast::Expr, body: &ProcBlock, span: Span) -> SemanticResult<Termination> {
        let ty = match &variable.kind {
            ast::ExprKind::VarDecl { ty: Some(ty), .. } => ty.clone(),
            _ => {
                return Err(SemanticError::new(
                    SemanticErrorKind::InvalidReference,
                    "Type enumeration requires a typed var",
                    variable.span,
                ))
            }
        };
        if !self.tree.type_exists(&ty) {
            return Err(SemanticError::new(
                SemanticErrorKind::UnknownType,
                format!("Type {} does not exist", ty),
                variable.span,
            ));
        }
        self.emit(Op::CreateEnumerator(EnumeratorKind::Type(ty)), span);
        self.enumerator_loop(variable, body, span)
    }

    fn compile_infinite_loop(&mut self, body: &ProcBlock, span: Span) -> Termination {
        self.emit(Op::EnterScope, span);
        self.frame.push_scope();
        let start = self.emitter.new_label();
        let continue_label = self.emitter.new_label();
        let end = self.emitter.new_label();
        self.emit(Op::LoopStart(start), span);
        self.emit(Op::LoopContinue(continue_label), span);
        let (termination, escaped) = self.loop_body(body, continue_label, end);
        self.jump_to_start(start, span);
        self.emit(Op::LoopEnd(end), span);
        self.frame.pop_scope();
        self.emit(Op::ExitScope, span);
        termination.leave_loop(!escaped)
    }

    fn compile_while(&mut self, condition: &ast::Expr, body: &ProcBlock, span: Span) -> SemanticResult<Termination> {
        let condition = self.resolve(condition, None)?;
        if condition.is_constant() {
            match condition.truthiness() {
                Some(true) => return Ok(self.compile_infinite_loop(body, span)),
                Some(false) => {
                    self.discard(body, "the loop condition is always false");
                    return Ok(Termination::NONE);
                }
                None => {}
            }
        }

        let start = self.emitter.new_label();
        let continue_label = self.emitter.new_label();
        let end = self.emitter.new_label();
        let condition_span = condition.span;
        self.emit(Op::LoopStart(start), span);
        self.emit(Op::LoopContinue(continue_label), span);
        self.emit(Op::Push(condition), condition_span);
        self.emit(Op::JumpIfFalse(end), condition_span);
        let (termination, _) = self.loop_body(body, continue_label, end);
        self.jump_to_start(start, span);
        self.emit(Op::LoopEnd(end), span);
        Ok(termination.leave_loop(false))
    }

    fn compile_do_while(&mut self, body: &ProcBlock, condition: &ast::Expr, span: Span) -> SemanticResult<Termination> {
        let start = self.emitter.new_label();
        let continue_label = self.emitter.new_label();
        let end = self.emitter.new_label();
        self.emit(Op::LoopStart(start), span);
        let (termination, escaped) = self.loop_body(body, continue_label, end);
        self.emit(Op::LoopContinue(continue_label), span);
        let condition = self.resolve(condition, None);
        let condition = match condition {
            Ok(condition) => condition,
            Err(error) => {
                self.emit(Op::LoopEnd(end), span);
                return Err(error);
            }
        };
        let condition_span = condition.span;
        self.emit(Op::Push(condition), condition_span);
        self.emit(Op::JumpIfFalse(end), condition_span);
        self.jump_to_start(start, span);
        self.emit(Op::LoopEnd(end), span);
        Ok(termination.leave_loop(!escaped))
    }

    fn compile_break(&mut self, label: Option<&str>, span: Span) -> SemanticResult<Termination> {
        let target = match label {
            None => {
                let context = self.loops.last_mut().ok_or_else(|| {
                    SemanticError::new(SemanticErrorKind::InvalidContext, "Cannot break outside of a loop", span)
                })?;
                context.escaped = true;
                context.end_label
            }
            Some(name) => {
                let info = self.active_label(name, span)?;
                let Some(end) = info.end else {
                    return Err(SemanticError::new(
                        SemanticErrorKind::InvalidContext,
                        format!("Label {} has no block to break out of", name),
                        span,
                    ));
                };
                let depth = info.loop_depth;
                if let Some(info) = self.labels.get_mut(name) {
                    info.broken = true;
                }
                self.loops.iter_mut().skip(depth).for_each(|context| context.escaped = true);
                end
            }
        };
        self.emit(Op::Jump(target), span);
        Ok(Termination::LOOP_EXIT)
    }

    fn compile_continue(&mut self, label: Option<&str>, span: Span) -> SemanticResult<Termination> {
        let target = match label {
            None => {
                self.loops
                    .last()
                    .ok_or_else(|| {
                        SemanticError::new(SemanticErrorKind::InvalidContext, "Cannot continue outside of a loop", span)
                    })?
                    .continue_label
            }
            Some(name) => {
                let info = self.active_label(name, span)?;
                match info.continue_target {
                    Some((continue_label, depth)) if depth < self.loops.len() => {
                        self.loops.iter_mut().skip(depth + 1).for_each(|context| context.escaped = true);
                        continue_label
                    }
                    _ => {
                        self.diagnostics.emit(ErrorCode::BadLabel, span, format!("Label {} does not label a loop", name));
                        return Ok(Termination::NONE);
                    }
                }
            }
        };
        self.emit(Op::Jump(target), span);
        Ok(Termination::LOOP_EXIT)
    }

    /// A label whose body is being compiled.
    fn active_label(&self, name: &str, span: Span) -> SemanticResult<LabelInfo> {
        self.labels
            .get(name)
            .filter(|info| info.defined && self.active_labels.iter().any(|active| active == name))
            .cloned()
            .ok_or_else(|| SemanticError::new(SemanticErrorKind::UnknownIdentifier, format!("Unknown label {}", name), span))
    }

    fn compile_goto(&mut self, name: &str, span: Span) -> Termination {
        let start = match self.labels.get(name) {
            Some(info) => info.start,
            None => {
                let start = self.emitter.new_label();
                self.labels.insert(
                    name.to_string(),
                    LabelInfo {
                        start,
                        end: None,
                        continue_target: None,
                        loop_depth: 0,
                        defined: false,
                        broken: false,
                        first_use: span,
                    },
                );
                start
            }
        };
        self.loops.iter_mut().for_each(|context| context.escaped = true);
        self.emit(Op::Jump(start), span);
        Termination::NONE
    }

    fn compile_label(&mut self, name: &str, body: Option<&ProcBlock>, span: Span) -> Termination {
        let depth = self.loops.len();
        let start = match self.labels.get_mut(name) {
            Some(info) if info.defined => {
                self.diagnostics.emit(
                    ErrorCode::DuplicateVariable,
                    span,
                    format!("A label with the name \"{}\" already exists", name),
                );
                return Termination::NONE;
            }
            Some(info) => {
                info.defined = true;
                info.loop_depth = depth;
                info.start
            }
            None => {
                let start = self.emitter.new_label();
                self.labels.insert(
                    name.to_string(),
                    LabelInfo {
                        start,
                        end: None,
                        continue_target: None,
                        loop_depth: depth,
                        defined: true,
                        broken: false,
                        first_use: span,
                    },
                );
                start
            }
        };
        self.emit(Op::Mark(start), span);

        let Some(body) = body else {
            return Termination::NONE;
        };
        let end = self.emitter.new_label();
        if let Some(info) = self.labels.get_mut(name) {
            info.end = Some(end);
        }
        self.active_labels.push(name.to_string());
        let termination = self.compile_scoped(body);
        self.active_labels.pop();
        self.emit(Op::Mark(end), body.span);

        if self.labels.get(name).is_some_and(|info| info.broken) {
            termination.leave_loop(false)
        } else {
            termination
        }
    }

    fn compile_switch(&mut self, value: &ast::Expr, cases: &[SwitchCase], span: Span) -> SemanticResult<Termination> {
        let value = self.resolve(value, None)?;
        if value.is_constant() {
            return Ok(self.compile_constant_switch(&value, cases));
        }

        self.emit(Op::Push(value), span);
        let mut labels = Vec::with_capacity(cases.len());
        let mut default = None;
        for case in cases {
            match &case.kind {
                SwitchCaseKind::Values(values) => {
                    let label = self.emitter.new_label();
                    for switch_value in values {
                        self.switch_test(switch_value, label);
                    }
                    labels.push((label, case));
                }
                SwitchCaseKind::Default => default = Some(case),
            }
        }
        self.emit(Op::Pop, span);

        let end = self.emitter.new_label();
        let mut termination = match default {
            Some(case) => self.compile_scoped(&case.body),
            None => Termination::NONE,
        };
        self.emit(Op::Jump(end), span);

        let mut first = default.is_none();
        for (label, case) in labels {
            self.emit(Op::Mark(label), case.span);
            let case_termination = self.compile_scoped(&case.body);
            termination = if first { case_termination.branch(Termination::NONE) } else { termination.branch(case_termination) };
            first = false;
            self.emit(Op::Jump(end), case.span);
        }
        self.emit(Op::Mark(end), span);
        Ok(termination)
    }

    fn switch_test(&mut self, switch_value: &SwitchValue, label: Label) {
        match switch_value {
            SwitchValue::Single(expr) => {
                let constant = self.case_constant(expr);
                self.emit(Op::Push(constant), expr.span);
                self.emit(Op::SwitchCase(label), expr.span);
            }
            SwitchValue::Range { start, end } => {
                let lower = self.range_bound(start, "lower");
                let upper = self.range_bound(end, "upper");
                self.emit(Op::Push(lower), start.span);
                self.emit(Op::Push(upper), end.span);
                self.emit(Op::SwitchCaseRange(label), start.span.merge(&end.span));
            }
        }
    }

    fn case_constant(&mut self, expr: &ast::Expr) -> ir::Expr {
        match self.resolve_constant(expr) {
            Ok(constant) => constant,
            Err(error) => {
                self.report(error);
                ir::Expr::number(0.0, expr.span)
            }
        }
    }

    fn range_bound(&mut self, expr: &ast::Expr, which: &str) -> ir::Expr {
        let constant = self.case_constant(expr);
        match constant.kind {
            ExprKind::Number(_) => constant,
            ExprKind::Null => {
                self.diagnostics.emit(
                    ErrorCode::MalformedRange,
                    expr.span,
                    format!("Malformed range, {} bound is coerced from null to 0", which),
                );
                ir::Expr::number(0.0, expr.span)
            }
            _ => {
                self.diagnostics.emit(
                    ErrorCode::InvalidRange,
                    expr.span,
                    format!("Invalid range, {} bound is not a number", which),
                );
                ir::Expr::number(0.0, expr.span)
            }
        }
    }

    /// A switch on a constant: only the matching case is compiled.
    fn compile_constant_switch(&mut self, value: &ir::Expr, cases: &[SwitchCase]) -> Termination {
        let mut selected = None;
        for (index, case) in cases.iter().enumerate() {
            let SwitchCaseKind::Values(values) = &case.kind else {
                continue;
            };
            let mut matched = false;
            for switch_value in values {
                matched |= self.constant_matches(value, switch_value);
            }
            if matched {
                selected = Some(index);
                break;
            }
        }
        if selected.is_none() {
            selected = cases.iter().position(|case| matches!(case.kind, SwitchCaseKind::Default));
        }

        let mut termination = Termination::NONE;
        for (index, case) in cases.iter().enumerate() {
            if Some(index) == selected {
                termination = self.compile_scoped(&case.body);
            } else {
                self.discard(&case.body, "the switch value never matches this case");
            }
        }
        termination
    }

    fn constant_matches(&mut self, value: &ir::Expr, switch_value: &SwitchValue) -> bool {
        match switch_value {
            SwitchValue::Single(expr) => self.case_constant(expr).kind == value.kind,
            SwitchValue::Range { start, end } => {
                let lower = self.range_bound(start, "lower").as_number();
                let upper = self.range_bound(end, "upper").as_number();
                match (value.as_number(), lower, upper) {
                    (Some(v), Some(lower), Some(upper)) => lower <= v && v <= upper,
                    _ => false,
                }
            }
        }
    }

    fn compile_spawn(&mut self, delay: Option<&ast::Expr>, body: &ProcBlock, span: Span) -> SemanticResult<Termination> {
        match delay {
            Some(delay) => self.push(delay, None)?,
            None => self.emit(Op::Push(ir::Expr::null(span)), span),
        }
        let after = self.emitter.new_label();
        self.emit(Op::Spawn(after), span);

        // The spawned body cannot break out of the enclosing loops
        let loops = std::mem::take(&mut self.loops);
        let active_labels = std::mem::take(&mut self.active_labels);
        self.compile_scoped(body);
        self.loops = loops;
        self.active_labels = active_labels;

        self.emit(Op::Push(ir::Expr::null(span)), span);
        self.emit(Op::Return, span);
        self.emit(Op::Mark(after), span);
        Ok(Termination::NONE)
    }

    fn compile_try(
        &mut self,
        try_body: &ProcBlock,
        catch_variable: Option<&ast::LocalVar>,
        catch_body: Option<&ProcBlock>,
        span: Span,
    ) -> SemanticResult<Termination> {
        let variable = match catch_variable {
            Some(var) => Some(match self.frame.declare(&var.name, var.ty.clone(), None).map(|local| local.id) {
                Some(id) => ir::Expr::new(ExprKind::Local { name: var.name.clone(), id }, var.span)
                    .with_path(var.ty.clone()),
                None => {
                    self.duplicate_var(&var.name, var.span);
                    self.local(&var.name, var.span).ok_or_else(|| {
                        SemanticError::new(SemanticErrorKind::InvalidReference, "Invalid catch variable", var.span)
                    })?
                }
            }),
            None => None,
        };

        let catch = self.emitter.new_label();
        let end = self.emitter.new_label();
        self.emit(Op::TryStart { catch, variable }, span);
        let try_termination = self.compile_scoped(try_body);
        self.emit(Op::TryEnd, span);
        self.emit(Op::Jump(end), span);
        self.emit(Op::Mark(catch), span);
        let catch_termination = match catch_body {
            Some(catch_body) => self.compile_scoped(catch_body),
            None => Termination::NONE,
        };
        self.emit(Op::Mark(end), span);
        Ok(try_termination.branch(catch_termination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::emitter::RecordingEmitter;
    use crate::compile::tree::MemoryTree;
    use crate::frontend::parser::Parser;
    use crate::utils::location::FileId;

    struct Compiled {
        proc: CompiledProc,
        ops: Vec<Op>,
        diagnostics: Diagnostics,
        tree: MemoryTree,
    }

    fn compile(source: &str) -> Compiled {
        let file = Parser::from_source(source, FileId(0)).parse_file();
        let mut tree = MemoryTree::from_file(&file);
        let definition = file.procs().next().expect("source has a proc").clone();
        let mut emitter = RecordingEmitter::new();
        let mut diagnostics = Diagnostics::new();
        let frame = ProcFrame::new(definition.object_path.clone(), definition.name.clone());
        let proc = ProcCompiler::new(&mut tree, frame, &mut emitter, &mut diagnostics).compile_definition(&definition);
        Compiled { proc, ops: emitter.into_ops(), diagnostics, tree }
    }

    fn count(ops: &[Op], predicate: impl Fn(&Op) -> bool) -> usize {
        ops.iter().filter(|op| predicate(op)).count()
    }

    #[test]
    fn test_constant_if_returns_unconditionally() {
        let compiled = compile("/proc/f()\n\tif (1)\n\t\treturn 1\n\treturn 2\n");
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);
        assert!(compiled.diagnostics.contains(ErrorCode::UnreachableCode));
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::Return)), 1);
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::JumpIfFalse(_))), 0);
    }

    #[test]
    fn test_if_else_merges_returns() {
        let compiled = compile("/proc/f(x)\n\tif (x)\n\t\treturn 1\n\telse\n\t\treturn 2\n");
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);

        let compiled = compile("/proc/f(x)\n\tif (x)\n\t\treturn 1\n\tx = 2\n");
        assert_eq!(compiled.proc.termination, Termination::POTENTIAL_RETURN);
        assert!(!compiled.diagnostics.contains(ErrorCode::UnreachableCode));
    }

    #[test]
    fn test_constant_switch_selects_one_case() {
        let compiled = compile("/proc/f()\n\tswitch (1)\n\t\tif (1)\n\t\t\treturn 1\n\t\telse\n\t\t\treturn 2\n");
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);
        assert!(compiled.diagnostics.contains(ErrorCode::UnreachableCode));
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::SwitchCase(_))), 0);
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::Return)), 1);
    }

    #[test]
    fn test_runtime_switch() {
        let compiled = compile(
            "/proc/f(x)\n\tswitch (x)\n\t\tif (1, 2)\n\t\t\treturn 1\n\t\tif (3 to 5)\n\t\t\treturn 2\n\t\telse\n\t\t\treturn 3\n",
        );
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::SwitchCase(_))), 2);
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::SwitchCaseRange(_))), 1);

        let compiled = compile("/proc/f(x)\n\tswitch (x)\n\t\tif (1)\n\t\t\treturn 1\n");
        assert_eq!(compiled.proc.termination, Termination::POTENTIAL_RETURN);
    }

    #[test]
    fn test_switch_range_bounds() {
        let compiled = compile("/proc/f(x)\n\tswitch (x)\n\t\tif (null to 5)\n\t\t\treturn 1\n\t\tif (\"a\" to 5)\n\t\t\treturn 2\n");
        assert!(compiled.diagnostics.contains(ErrorCode::MalformedRange));
        assert!(compiled.diagnostics.contains(ErrorCode::InvalidRange));
    }

    #[test]
    fn test_loops_absorb_breaks() {
        let compiled = compile("/proc/f(x)\n\twhile (x)\n\t\tbreak\n\treturn 1\n");
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);
        assert!(!compiled.diagnostics.contains(ErrorCode::UnreachableCode));

        let compiled = compile("/proc/f(x)\n\tdo\n\t\treturn 1\n\twhile (x)\n");
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);

        let compiled = compile("/proc/f(x)\n\tfor (var/i in x)\n\t\treturn i\n");
        assert_eq!(compiled.proc.termination, Termination::POTENTIAL_RETURN);
    }

    #[test]
    fn test_for_list_lowering() {
        let compiled = compile("/proc/f(list/L)\n\tfor (var/obj/o in L)\n\t\tdel o\n");
        let ops = &compiled.ops;
        let create = ops.iter().position(|op| matches!(op, Op::CreateEnumerator(EnumeratorKind::FilteredList(_))));
        let destroy = ops.iter().position(|op| matches!(op, Op::DestroyEnumerator));
        assert!(create.is_some() && destroy.is_some());
        assert!(create < destroy);
        assert_eq!(count(ops, |op| matches!(op, Op::Enumerate { .. })), 1);
        assert_eq!(count(ops, |op| matches!(op, Op::LoopStart(_))), 1);
        assert_eq!(count(ops, |op| matches!(op, Op::LoopEnd(_))), 1);
    }

    #[test]
    fn test_for_list_unknown_filter_warns() {
        let compiled = compile("/proc/f(list/L)\n\tfor (var/nothing/o in L)\n\t\tdel o\n");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::CreateEnumerator(EnumeratorKind::List))));
        assert!(compiled.diagnostics.contains(ErrorCode::ItemDoesntExist));
        assert!(!compiled.diagnostics.has_errors());
    }

    #[test]
    fn test_for_list_as_clause_replaces_var_type() {
        let compiled = compile("/proc/f(list/L)\n\tfor (var/obj/o as mob in L)\n\t\tdel o\n");
        assert!(compiled.ops.iter().any(|op| matches!(
            op,
            Op::CreateEnumerator(EnumeratorKind::FilteredList(path)) if path.to_string() == "/mob"
        )));

        let compiled = compile("/proc/f(list/L)\n\tfor (var/obj/o as anything in L)\n\t\tdel o\n");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::CreateEnumerator(EnumeratorKind::List))));
        assert!(compiled.diagnostics.is_empty());

        let compiled = compile("/proc/f(list/L)\n\tfor (var/obj/o as num|text in L)\n\t\tdel o\n");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::CreateEnumerator(EnumeratorKind::List))));
        assert!(compiled.diagnostics.contains(ErrorCode::UnimplementedAccess));
    }

    #[test]
    fn test_standard_for_loop_order() {
        let compiled = compile("/proc/f()\n\tfor (var/i = 1, i <= 3, i++)\n\t\tsleep(1)\n");
        let ops = &compiled.ops;
        let position = |predicate: fn(&Op) -> bool| ops.iter().position(predicate);
        let start = position(|op| matches!(op, Op::LoopStart(_)));
        let test = position(|op| matches!(op, Op::JumpIfFalse(_)));
        let cont = position(|op| matches!(op, Op::LoopContinue(_)));
        let end = position(|op| matches!(op, Op::LoopEnd(_)));
        assert!(start < test && test < cont && cont < end);
        assert_eq!(compiled.proc.local_count, 1);
    }

    #[test]
    fn test_background_loops_yield() {
        let compiled = compile("/proc/f(x)\n\tset background = 1\n\twhile (x)\n\t\tx--\n");
        assert!(compiled.proc.attributes.flags.contains(ProcFlags::BACKGROUND));
        let sleeps = count(&compiled.ops, |op| {
            matches!(op, Op::Push(ir::Expr { kind: ExprKind::ProcCall { target: ProcTarget::Global(name), .. }, .. }) if name == "sleep")
        });
        assert_eq!(sleeps, 1);
    }

    #[test]
    fn test_set_statements_run_first() {
        let compiled = compile("/mob/verb/say()\n\tusr << \"hi\"\n\tset name = \"Say\"\n\tset category = null\n");
        assert_eq!(compiled.proc.attributes.verb_name.as_deref(), Some("Say"));
        assert_eq!(compiled.proc.attributes.verb_category, Some(None));
        assert_eq!(compiled.tree.verbs(&TypePath::parse("/mob")).len(), 1);
    }

    #[test]
    fn test_set_with_in_warns() {
        let compiled = compile("/proc/f()\n\tset waitfor in 0\n\treturn\n");
        assert!(compiled.diagnostics.contains(ErrorCode::InvalidSetStatement));
        assert!(!compiled.diagnostics.has_errors());
        assert!(!compiled.proc.attributes.wait_for);
    }

    #[test]
    fn test_non_constant_set_is_an_error() {
        let compiled = compile("/proc/f(x)\n\tset name = x\n\treturn\n");
        assert!(compiled.diagnostics.has_errors());
        assert_eq!(compiled.proc.attributes.verb_name, None);
    }

    #[test]
    fn test_empty_blocks() {
        let compiled = compile("/proc/f(x)\n\tif (x)\n\t\tset hidden = 1\n\treturn\n");
        let messages: Vec<_> = compiled.diagnostics.iter().map(|d| d.message.clone()).collect();
        assert!(messages.iter().any(|m| m.starts_with("Empty block detected - set statements")));

        let compiled = compile("/proc/f()\n");
        assert!(compiled.diagnostics.contains(ErrorCode::EmptyProc));
    }

    #[test]
    fn test_var_declarations() {
        let compiled = compile("/proc/f()\n\tvar/a = 1\n\tvar/a = 2\n\tvar/const/b = 3\n\treturn a + b\n");
        assert!(compiled.diagnostics.contains(ErrorCode::DuplicateVariable));
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::Assign(_))), 1);
        let returned = compiled.ops.iter().rev().find_map(|op| match op {
            Op::Push(value) => Some(value.clone()),
            _ => None,
        });
        match returned.map(|value| value.kind) {
            Some(ExprKind::Binary { right, .. }) => assert_eq!(right.as_number(), Some(3.0)),
            other => panic!("expected a binary expression, got {:?}", other),
        }

        let compiled = compile("/proc/f(x)\n\tvar/const/c = x\n\treturn\n");
        assert!(compiled.diagnostics.contains(ErrorCode::HardConstContext));
    }

    #[test]
    fn test_proc_globals_are_registered() {
        let compiled = compile("/proc/f()\n\tvar/global/calls = 0\n\tcalls++\n");
        assert!(compiled.tree.globals().iter().any(|g| g.name == "calls"));
        assert!(!compiled.diagnostics.has_errors());
    }

    #[test]
    fn test_default_parameters() {
        let compiled = compile("/proc/f(a = 5, b)\n\treturn a\n");
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::IsNull)), 1);
        assert_eq!(compiled.proc.local_count, 2);
    }

    #[test]
    fn test_labels_and_goto() {
        let compiled = compile("/proc/f()\n\tgoto done\n\tdone\n\treturn\n");
        assert!(!compiled.diagnostics.contains(ErrorCode::ItemDoesntExist));

        let compiled = compile("/proc/f()\n\tgoto nowhere\n");
        assert!(compiled.diagnostics.contains(ErrorCode::ItemDoesntExist));

        let compiled = compile("/proc/f(x)\n\touter:\n\t\tfor (var/i in x)\n\t\t\tfor (var/j in x)\n\t\t\t\tcontinue outer\n\treturn\n");
        assert!(!compiled.diagnostics.has_errors());
    }

    #[test]
    fn test_break_outside_loop() {
        let compiled = compile("/proc/f()\n\tbreak\n");
        assert!(compiled.diagnostics.has_errors());
    }

    #[test]
    fn test_try_catch() {
        let compiled = compile("/proc/f()\n\ttry\n\t\treturn 1\n\tcatch (var/e)\n\t\treturn e\n");
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);
        assert!(matches!(compiled.ops.first(), Some(Op::TryStart { variable: Some(_), .. })));
    }

    #[test]
    fn test_spawn_returns_do_not_leak() {
        let compiled = compile("/proc/f()\n\tspawn (10)\n\t\treturn 1\n\treturn 2\n");
        assert_eq!(compiled.proc.termination, Termination::PROC_RETURN);
        assert!(!compiled.diagnostics.contains(ErrorCode::UnreachableCode));
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::Spawn(_))), 1);
    }

    #[test]
    fn test_input_requires_lvalues() {
        let compiled = compile("/proc/f(a, b)\n\ta >> b\n\t1 >> b\n");
        assert_eq!(count(&compiled.ops, |op| matches!(op, Op::Input { .. })), 1);
        assert!(compiled.diagnostics.contains(ErrorCode::InvalidReference));
    }
}
