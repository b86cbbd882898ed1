//! Label-based proc assembly interface.
//!
//! The statement compiler never produces bytecode directly. It drives a
//! [`ProcEmitter`], which owns label allocation and turns each [`Op`] into
//! whatever the host's proc format needs. Values are pushed as resolved
//! expressions; evaluating them is the emitter's concern.

use crate::frontend::path::TypePath;
use crate::ir;
use crate::utils::location::Span;
use std::fmt;

/// A jump target. Placed with [`Op::Mark`] or one of the loop markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// What an enumerator walks.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumeratorKind {
    /// The list on top of the stack
    List,
    /// The list on top of the stack, skipping values not of the given type
    FilteredList(TypePath),
    /// Start, end and step on top of the stack
    Range,
    /// Every instance of a type
    Type(TypePath),
}

/// One assembly operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Place a label here
    Mark(Label),
    Jump(Label),
    /// Pop a value and jump when it is false
    JumpIfFalse(Label),
    /// Evaluate and push a value
    Push(ir::Expr),
    Pop,
    /// Pop a value, store it into the target and push the stored value
    Assign(ir::Expr),
    /// Replace the top of the stack with whether it is null
    IsNull,
    /// Pop the return value and leave the proc
    Return,
    EnterScope,
    ExitScope,
    /// Place the loop's start label and open the loop scope
    LoopStart(Label),
    /// Place the loop's continue label
    LoopContinue(Label),
    /// Place the loop's end label and close the loop scope
    LoopEnd(Label),
    CreateEnumerator(EnumeratorKind),
    /// Advance the innermost enumerator into `target`, jumping to `exit`
    /// when it is exhausted
    Enumerate { target: ir::Expr, exit: Label },
    DestroyEnumerator,
    /// Pop a case value and jump when it equals the switch value
    SwitchCase(Label),
    /// Pop a range and jump when the switch value lies inside it
    SwitchCaseRange(Label),
    /// Pop a delay and run the following code in a new thread; the current
    /// thread continues at the label
    Spawn(Label),
    /// Start a protected region whose handler is at `catch`
    TryStart { catch: Label, variable: Option<ir::Expr> },
    TryEnd,
    Throw,
    Delete,
    /// `a << b`
    Output,
    /// `a >> b`
    Input { source: ir::Expr, target: ir::Expr },
    Browse,
    BrowseResource,
    OutputControl,
    Ftp,
    Link,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Mark(label) => write!(f, "{}:", label),
            Op::Jump(label) => write!(f, "  jump {}", label),
            Op::JumpIfFalse(label) => write!(f, "  jump_if_false {}", label),
            Op::Push(value) => write!(f, "  push {}", value),
            Op::Pop => write!(f, "  pop"),
            Op::Assign(target) => write!(f, "  assign {}", target),
            Op::IsNull => write!(f, "  is_null"),
            Op::Return => write!(f, "  return"),
            Op::EnterScope => write!(f, "  enter_scope"),
            Op::ExitScope => write!(f, "  exit_scope"),
            Op::LoopStart(label) => write!(f, "{}:  loop_start", label),
            Op::LoopContinue(label) => write!(f, "{}:  loop_continue", label),
            Op::LoopEnd(label) => write!(f, "{}:  loop_end", label),
            Op::CreateEnumerator(kind) => match kind {
                EnumeratorKind::List => write!(f, "  create_list_enumerator"),
                EnumeratorKind::FilteredList(path) => write!(f, "  create_filtered_list_enumerator {}", path),
                EnumeratorKind::Range => write!(f, "  create_range_enumerator"),
                EnumeratorKind::Type(path) => write!(f, "  create_type_enumerator {}", path),
            },
            Op::Enumerate { target, exit } => write!(f, "  enumerate {} else {}", target, exit),
            Op::DestroyEnumerator => write!(f, "  destroy_enumerator"),
            Op::SwitchCase(label) => write!(f, "  switch_case {}", label),
            Op::SwitchCaseRange(label) => write!(f, "  switch_case_range {}", label),
            Op::Spawn(label) => write!(f, "  spawn {}", label),
            Op::TryStart { catch, variable } => match variable {
                Some(variable) => write!(f, "  try {} catch {}", catch, variable),
                None => write!(f, "  try {}", catch),
            },
            Op::TryEnd => write!(f, "  try_end"),
            Op::Throw => write!(f, "  throw"),
            Op::Delete => write!(f, "  delete"),
            Op::Output => write!(f, "  output"),
            Op::Input { source, target } => write!(f, "  input {} >> {}", source, target),
            Op::Browse => write!(f, "  browse"),
            Op::BrowseResource => write!(f, "  browse_rsc"),
            Op::OutputControl => write!(f, "  output_control"),
            Op::Ftp => write!(f, "  ftp"),
            Op::Link => write!(f, "  link"),
        }
    }
}

/// Receives the operations of one proc.
pub trait ProcEmitter {
    /// Allocate a fresh label.
    fn new_label(&mut self) -> Label;

    /// Append an operation.
    fn emit(&mut self, op: Op, span: Span);
}

/// Emitter that keeps every operation in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    ops: Vec<(Op, Span)>,
    next_label: u32,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded operations.
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter().map(|(op, _)| op)
    }

    /// Recorded operations with their spans.
    pub fn spanned_ops(&self) -> &[(Op, Span)] {
        &self.ops
    }

    /// Number of labels allocated so far.
    pub fn label_count(&self) -> u32 {
        self.next_label
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<Op> {
        self.ops.into_iter().map(|(op, _)| op).collect()
    }
}

impl ProcEmitter for RecordingEmitter {
    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn emit(&mut self, op: Op, span: Span) {
        log::trace!("{}", op);
        self.ops.push((op, span));
    }
}

impl fmt::Display for RecordingEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (op, _) in &self.ops {
            writeln!(f, "{}", op)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_fresh() {
        let mut emitter = RecordingEmitter::new();
        let a = emitter.new_label();
        let b = emitter.new_label();
        assert_ne!(a, b);
        assert_eq!(emitter.label_count(), 2);
    }

    #[test]
    fn test_listing() {
        let mut emitter = RecordingEmitter::new();
        let end = emitter.new_label();
        emitter.emit(Op::Push(ir::Expr::number(1.0, Span::dummy())), Span::dummy());
        emitter.emit(Op::JumpIfFalse(end), Span::dummy());
        emitter.emit(Op::Mark(end), Span::dummy());
        assert_eq!(emitter.to_string(), "  push 1\n  jump_if_false L0\nL0:\n");
    }
}
