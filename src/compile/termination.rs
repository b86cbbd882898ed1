//! Control-flow termination facts.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// How a statement or block leaves the surrounding code.
///
/// A 3-bit set: [`LOOP_EXIT`](Self::LOOP_EXIT) and
/// [`PROC_RETURN`](Self::PROC_RETURN) are unconditional,
/// [`POTENTIAL_RETURN`](Self::POTENTIAL_RETURN) records that some path
/// returns while another falls through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Termination(u8);

impl Termination {
    /// Falls through
    pub const NONE: Termination = Termination(0);
    /// Always leaves the innermost loop (`break`, `continue`)
    pub const LOOP_EXIT: Termination = Termination(1);
    /// Always returns from the proc
    pub const PROC_RETURN: Termination = Termination(2);
    /// Returns on some paths only
    pub const POTENTIAL_RETURN: Termination = Termination(4);

    /// Check whether every flag of `other` is set.
    pub fn contains(self, other: Termination) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Code after this never runs.
    pub fn is_unconditional(self) -> bool {
        self.contains(Self::LOOP_EXIT) || self.contains(Self::PROC_RETURN)
    }

    /// Some path returns from the proc.
    pub fn may_return(self) -> bool {
        self.contains(Self::PROC_RETURN) || self.contains(Self::POTENTIAL_RETURN)
    }

    /// Merge two alternative paths, such as the arms of an `if`.
    pub fn branch(self, other: Termination) -> Termination {
        if self.contains(Self::PROC_RETURN) && other.contains(Self::PROC_RETURN) {
            Self::PROC_RETURN
        } else if self.is_unconditional() && other.is_unconditional() {
            let mut merged = Self::LOOP_EXIT;
            if self.may_return() || other.may_return() {
                merged |= Self::POTENTIAL_RETURN;
            }
            merged
        } else if self.may_return() || other.may_return() {
            Self::POTENTIAL_RETURN
        } else {
            Self::NONE
        }
    }

    /// The fact seen from outside a loop whose body produced `self`.
    ///
    /// `certain` is set when the body runs at least once and nothing in it
    /// jumps out of the loop.
    pub fn leave_loop(self, certain: bool) -> Termination {
        if certain && self.contains(Self::PROC_RETURN) {
            Self::PROC_RETURN
        } else if self.may_return() {
            Self::POTENTIAL_RETURN
        } else {
            Self::NONE
        }
    }
}

impl BitOr for Termination {
    type Output = Termination;

    fn bitor(self, rhs: Termination) -> Termination {
        Termination(self.0 | rhs.0)
    }
}

impl BitOrAssign for Termination {
    fn bitor_assign(&mut self, rhs: Termination) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::LOOP_EXIT) {
            parts.push("loop-exit");
        }
        if self.contains(Self::PROC_RETURN) {
            parts.push("return");
        }
        if self.contains(Self::POTENTIAL_RETURN) {
            parts.push("potential-return");
        }
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branches() {
        let ret = Termination::PROC_RETURN;
        let none = Termination::NONE;
        assert_eq!(ret.branch(ret), ret);
        assert_eq!(ret.branch(none), Termination::POTENTIAL_RETURN);
        assert_eq!(none.branch(none), none);
        assert_eq!(
            Termination::LOOP_EXIT.branch(ret),
            Termination::LOOP_EXIT | Termination::POTENTIAL_RETURN
        );
        assert!(Termination::LOOP_EXIT.branch(ret).is_unconditional());
    }

    #[test]
    fn test_loops_absorb_exits() {
        assert_eq!(Termination::LOOP_EXIT.leave_loop(true), Termination::NONE);
        assert_eq!(Termination::PROC_RETURN.leave_loop(true), Termination::PROC_RETURN);
        assert_eq!(Termination::PROC_RETURN.leave_loop(false), Termination::POTENTIAL_RETURN);
    }

    #[test]
    fn test_display() {
        assert_eq!(Termination::NONE.to_string(), "none");
        assert_eq!((Termination::PROC_RETURN | Termination::POTENTIAL_RETURN).to_string(), "return|potential-return");
    }
}
