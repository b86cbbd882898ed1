//! Front-end configuration.

use crate::utils::errors::{DiagnosticSeverity, ErrorCode};
use std::collections::HashMap;

/// Settings shared by every stage of one compilation.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    /// Promote every warning to an error
    pub warnings_as_errors: bool,
    /// Per-code severity; `None` disables the code entirely
    pub severity_overrides: HashMap<ErrorCode, Option<DiagnosticSeverity>>,
    /// Report statements that follow an unconditional return or loop exit
    pub report_unreachable_code: bool,
    /// Report constant `if`/`while` conditions that discard a branch
    pub report_constant_conditions: bool,
    /// Report procs whose body has no statements
    pub report_empty_procs: bool,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            warnings_as_errors: false,
            severity_overrides: HashMap::new(),
            report_unreachable_code: true,
            report_constant_conditions: true,
            report_empty_procs: true,
        }
    }
}

impl FrontendConfig {
    /// Override the severity of one code.
    ///
    /// Forced errors (codes below 1000) cannot be demoted; the override is
    /// ignored for them.
    pub fn set_severity(&mut self, code: ErrorCode, severity: Option<DiagnosticSeverity>) {
        if code.is_forced_error() {
            log::warn!("{} cannot be reconfigured", code);
            return;
        }
        self.severity_overrides.insert(code, severity);
    }

    /// Disable one code.
    pub fn suppress(&mut self, code: ErrorCode) {
        self.set_severity(code, None);
    }

    /// Effective severity for a diagnostic, or `None` when it is disabled.
    pub fn severity_for(&self, code: ErrorCode, requested: DiagnosticSeverity) -> Option<DiagnosticSeverity> {
        let severity = match self.severity_overrides.get(&code) {
            Some(overridden) => (*overridden)?,
            None => requested,
        };
        if self.warnings_as_errors && severity == DiagnosticSeverity::Warning {
            Some(DiagnosticSeverity::Error)
        } else {
            Some(severity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppress_and_werror() {
        let mut config = FrontendConfig::default();
        config.suppress(ErrorCode::EmptyBlock);
        assert_eq!(config.severity_for(ErrorCode::EmptyBlock, DiagnosticSeverity::Warning), None);

        config.warnings_as_errors = true;
        assert_eq!(
            config.severity_for(ErrorCode::UnreachableCode, DiagnosticSeverity::Warning),
            Some(DiagnosticSeverity::Error)
        );
    }

    #[test]
    fn test_forced_errors_cannot_be_demoted() {
        let mut config = FrontendConfig::default();
        config.suppress(ErrorCode::ItemDoesntExist);
        assert_eq!(
            config.severity_for(ErrorCode::ItemDoesntExist, DiagnosticSeverity::Error),
            Some(DiagnosticSeverity::Error)
        );
    }
}
