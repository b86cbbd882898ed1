//! Lexical state of the proc being compiled.

use crate::frontend::path::TypePath;
use crate::ir;
use std::collections::HashMap;

/// A local variable or parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    /// Var name
    pub name: String,
    /// Slot id, unique within the proc
    pub id: usize,
    /// Declared type path
    pub ty: Option<TypePath>,
    /// Value of a `const` local
    pub constant: Option<ir::Expr>,
}

/// The proc a statement or expression belongs to.
///
/// Holds the stack of lexical scopes and the ids of globals declared with
/// `var/global` inside the proc body.
#[derive(Debug, Clone)]
pub struct ProcFrame {
    /// Type the proc is defined on
    pub owner: TypePath,
    /// Proc name
    pub name: String,
    scopes: Vec<HashMap<String, LocalVar>>,
    globals: HashMap<String, usize>,
    next_id: usize,
}

impl ProcFrame {
    /// A frame with one open scope.
    pub fn new(owner: TypePath, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
            scopes: vec![HashMap::new()],
            globals: HashMap::new(),
            next_id: 0,
        }
    }

    /// Full path of the proc.
    pub fn path(&self) -> TypePath {
        self.owner.add_to_path("proc").add_to_path(&self.name)
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope. The outermost scope is never closed.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Declare a local in the innermost scope; `None` if the name is
    /// already declared there.
    pub fn declare(&mut self, name: &str, ty: Option<TypePath>, constant: Option<ir::Expr>) -> Option<&LocalVar> {
        let id = self.next_id;
        let scope = self.scopes.last_mut()?;
        if scope.contains_key(name) {
            return None;
        }
        self.next_id += 1;
        let var = LocalVar { name: name.to_string(), id, ty, constant };
        Some(scope.entry(name.to_string()).or_insert(var))
    }

    /// Look up a local, innermost scope first.
    pub fn local(&self, name: &str) -> Option<&LocalVar> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Remember that `name` refers to the global `id` inside this proc.
    pub fn add_global(&mut self, name: &str, id: usize) {
        self.globals.insert(name.to_string(), id);
    }

    /// Global declared inside this proc.
    pub fn global(&self, name: &str) -> Option<usize> {
        self.globals.get(name).copied()
    }

    /// Number of local slots allocated.
    pub fn local_count(&self) -> usize {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_and_duplicates() {
        let mut frame = ProcFrame::new(TypePath::parse("/mob"), "attack");
        assert!(frame.declare("x", None, None).is_some());
        assert!(frame.declare("x", None, None).is_none());

        frame.push_scope();
        let inner = frame.declare("x", Some(TypePath::parse("/obj")), None).map(|v| v.id);
        assert_eq!(inner, Some(1));
        assert_eq!(frame.local("x").map(|v| v.id), Some(1));
        frame.pop_scope();

        assert_eq!(frame.local("x").map(|v| v.id), Some(0));
        assert_eq!(frame.local_count(), 2);
    }

    #[test]
    fn test_outer_scope_survives() {
        let mut frame = ProcFrame::new(TypePath::root(), "helper");
        frame.declare("a", None, None);
        frame.pop_scope();
        assert!(frame.local("a").is_some());
        assert_eq!(frame.path().to_string(), "/proc/helper");
    }
}
