//! Pre-execution checks on rule text.
//!
//! These are cheap gate checks for better error messages; the interpreter
//! itself is the capability boundary (names resolve only against the
//! explicitly installed globals), so no pattern scanning is needed.

use crate::error::RuleError;

/// Validate rule text before spawning an interpreter.
pub fn validate_program(code: &str, max_size: usize) -> Result<(), RuleError> {
    if code.len() > max_size {
        return Err(RuleError::CodeTooLarge {
            max: max_size,
            actual: code.len(),
        });
    }

    if code.trim().is_empty() {
        return Err(RuleError::ValidationFailed {
            reason: "rule is empty — define `function main(patches, metadata) { ... }`".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_rule_text() {
        let code = "function main(patches, metadata) { return patches.length === 1; }";
        assert!(validate_program(code, 64 * 1024).is_ok());
    }

    #[test]
    fn rejects_empty_rule() {
        let err = validate_program("   \n\t", 64 * 1024).unwrap_err();
        assert!(matches!(err, RuleError::ValidationFailed { .. }));
        assert!(err.to_string().contains("main"));
    }

    #[test]
    fn rejects_oversized_rule() {
        let big = "x".repeat(100);
        let err = validate_program(&big, 50).unwrap_err();
        assert!(matches!(
            err,
            RuleError::CodeTooLarge {
                max: 50,
                actual: 100
            }
        ));
    }
}
