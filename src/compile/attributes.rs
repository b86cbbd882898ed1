//! Proc attributes fixed by `set` statements.

use crate::ir::{self, ExprKind};
use crate::utils::diagnostics::Diagnostics;
use crate::utils::errors::{ErrorCode, SemanticError, SemanticErrorKind, SemanticResult};
use crate::utils::location::Span;
use std::ops::{BitOr, BitOrAssign};

/// Boolean proc flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProcFlags(pub u8);

impl ProcFlags {
    pub const NONE: ProcFlags = ProcFlags(0);
    /// `set opendream_unimplemented = 1`
    pub const UNIMPLEMENTED: ProcFlags = ProcFlags(1 << 0);
    /// `set hidden = 1`
    pub const HIDDEN: ProcFlags = ProcFlags(1 << 1);
    /// `set popup_menu = 0`
    pub const HIDE_POPUP_MENU: ProcFlags = ProcFlags(1 << 2);
    /// `set instant = 1`
    pub const INSTANT: ProcFlags = ProcFlags(1 << 3);
    /// `set background = 1`
    pub const BACKGROUND: ProcFlags = ProcFlags(1 << 4);

    pub fn contains(self, other: ProcFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set or clear `flag`.
    pub fn set(&mut self, flag: ProcFlags, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl BitOr for ProcFlags {
    type Output = ProcFlags;

    fn bitor(self, rhs: ProcFlags) -> ProcFlags {
        ProcFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProcFlags {
    fn bitor_assign(&mut self, rhs: ProcFlags) {
        self.0 |= rhs.0;
    }
}

/// Attributes of one proc.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcAttributes {
    pub flags: ProcFlags,
    /// Callers wait for the proc to finish (`set waitfor`)
    pub wait_for: bool,
    /// Verb display name
    pub verb_name: Option<String>,
    /// Verb description
    pub verb_desc: Option<String>,
    /// Verb category; `Some(None)` when explicitly set to null
    pub verb_category: Option<Option<String>>,
    /// Verb invisibility, 0 to 100
    pub invisibility: Option<u8>,
}

impl Default for ProcAttributes {
    fn default() -> Self {
        Self {
            flags: ProcFlags::NONE,
            wait_for: true,
            verb_name: None,
            verb_desc: None,
            verb_category: None,
            invisibility: None,
        }
    }
}

impl ProcAttributes {
    /// Apply one `set attribute = value` with an already constant value.
    ///
    /// Unknown attributes are ignored. A value of the wrong kind aborts the
    /// statement.
    pub fn apply(
        &mut self,
        attribute: &str,
        value: &ir::Expr,
        span: Span,
        diagnostics: &mut Diagnostics,
    ) -> SemanticResult<()> {
        let truthy = value.truthiness().unwrap_or(false);
        match attribute {
            "waitfor" => self.wait_for = truthy,
            "opendream_unimplemented" => self.flags.set(ProcFlags::UNIMPLEMENTED, truthy),
            "hidden" => self.flags.set(ProcFlags::HIDDEN, truthy),
            "popup_menu" => {
                self.flags.set(ProcFlags::HIDE_POPUP_MENU, !truthy);
                diagnostics.emit(ErrorCode::UnimplementedAccess, span, "set popup_menu is not implemented");
            }
            "instant" => {
                self.flags.set(ProcFlags::INSTANT, truthy);
                diagnostics.emit(ErrorCode::UnimplementedAccess, span, "set instant is not implemented");
            }
            "background" => self.flags.set(ProcFlags::BACKGROUND, truthy),
            "name" => self.verb_name = Some(expect_string(attribute, value, span)?),
            "desc" => self.verb_desc = Some(expect_string(attribute, value, span)?),
            "category" => {
                self.verb_category = Some(match &value.kind {
                    ExprKind::String(s) => Some(s.clone()),
                    ExprKind::Null => None,
                    _ => {
                        return Err(SemanticError::new(
                            SemanticErrorKind::BadArgument,
                            "category attribute must be a string or null",
                            span,
                        ))
                    }
                });
            }
            "invisibility" => {
                let number = value.as_number().ok_or_else(|| {
                    SemanticError::new(SemanticErrorKind::BadArgument, "invisibility attribute must be an int", span)
                })?;
                self.invisibility = Some(number.floor().clamp(0.0, 100.0) as u8);
            }
            other => log::debug!("ignoring unknown proc attribute '{}'", other),
        }
        Ok(())
    }
}

fn expect_string(attribute: &str, value: &ir::Expr, span: Span) -> SemanticResult<String> {
    match &value.kind {
        ExprKind::String(s) => Ok(s.clone()),
        _ => Err(SemanticError::new(
            SemanticErrorKind::BadArgument,
            format!("{} attribute must be a string", attribute),
            span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(attrs: &mut ProcAttributes, attribute: &str, value: ir::Expr) -> (SemanticResult<()>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let result = attrs.apply(attribute, &value, Span::dummy(), &mut diagnostics);
        (result, diagnostics)
    }

    #[test]
    fn test_flags() {
        let mut attrs = ProcAttributes::default();
        assert!(attrs.wait_for);
        apply(&mut attrs, "waitfor", ir::Expr::number(0.0, Span::dummy())).0.unwrap();
        apply(&mut attrs, "hidden", ir::Expr::number(1.0, Span::dummy())).0.unwrap();
        assert!(!attrs.wait_for);
        assert!(attrs.flags.contains(ProcFlags::HIDDEN));

        let (_, diagnostics) = apply(&mut attrs, "popup_menu", ir::Expr::number(0.0, Span::dummy()));
        assert!(attrs.flags.contains(ProcFlags::HIDE_POPUP_MENU));
        assert!(diagnostics.contains(ErrorCode::UnimplementedAccess));
    }

    #[test]
    fn test_verb_metadata() {
        let mut attrs = ProcAttributes::default();
        apply(&mut attrs, "name", ir::Expr::string("Say", Span::dummy())).0.unwrap();
        apply(&mut attrs, "category", ir::Expr::null(Span::dummy())).0.unwrap();
        assert_eq!(attrs.verb_name.as_deref(), Some("Say"));
        assert_eq!(attrs.verb_category, Some(None));

        let (result, _) = apply(&mut attrs, "desc", ir::Expr::number(3.0, Span::dummy()));
        assert_eq!(result.unwrap_err().message, "desc attribute must be a string");
    }

    #[test]
    fn test_invisibility_is_clamped() {
        let mut attrs = ProcAttributes::default();
        apply(&mut attrs, "invisibility", ir::Expr::number(250.7, Span::dummy())).0.unwrap();
        assert_eq!(attrs.invisibility, Some(100));
        apply(&mut attrs, "invisibility", ir::Expr::number(-3.0, Span::dummy())).0.unwrap();
        assert_eq!(attrs.invisibility, Some(0));
        apply(&mut attrs, "invisibility", ir::Expr::number(40.9, Span::dummy())).0.unwrap();
        assert_eq!(attrs.invisibility, Some(40));
    }
}
