//! Validation module for ensuring edit safety.
//!
//! This module provides:
//! - Parse validation (tree-sitter ERROR/MISSING node detection)
//! - Selector uniqueness checks
//!
//! # Hard Rules (Never Violate)
//!
//! 1. **Parse validation**: After editing, re-parse the page as TSX.
//!    If the edit raised the number of ERROR nodes, roll back.
//! 2. **Selector uniqueness**: A rule marked `unique` that matches more than
//!    one location is refused. No guessing.

use crate::pool;
use crate::ts::{ParsedSource, TreeSitterError};
use thiserror::Error;

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Parse error introduced: {before} syntax errors before the edit, {after} after")]
    ParseErrorIntroduced {
        before: usize,
        after: usize,
        errors: Vec<ErrorLocation>,
    },

    #[error("Selector matched {count} locations, expected exactly 1")]
    SelectorNotUnique { count: usize, pattern: String },

    #[error("Tree-sitter error: {0}")]
    TreeSitter(#[from] TreeSitterError),
}

/// Location of an error node in the source.
#[derive(Debug, Clone)]
pub struct ErrorLocation {
    pub byte_start: usize,
    pub byte_end: usize,
    pub line: usize,
    pub column: usize,
    pub context: String,
}

/// Check that `edited` has no more parse errors than `original`.
///
/// Pages that were already broken stay patchable; an edit is only refused
/// when it makes things worse. Error counts are compared rather than
/// positions because every insertion shifts later offsets.
pub fn validate_edit(original: &str, edited: &str) -> Result<(), ValidationError> {
    pool::with_parser(|parser| {
        let original_parsed = parser.parse_with_source(original)?;
        let edited_parsed = parser.parse_with_source(edited)?;
        compare(&original_parsed, &edited_parsed)
    })?
}

fn compare(original: &ParsedSource<'_>, edited: &ParsedSource<'_>) -> Result<(), ValidationError> {
    let before = original.error_nodes().len();
    let errors = collect_errors(edited);

    if errors.len() > before {
        return Err(ValidationError::ParseErrorIntroduced {
            before,
            after: errors.len(),
            errors,
        });
    }
    Ok(())
}

/// Collect all error nodes from a parsed source, with line/column and context.
fn collect_errors(parsed: &ParsedSource<'_>) -> Vec<ErrorLocation> {
    let source = parsed.source;
    parsed
        .error_nodes()
        .into_iter()
        .map(|node| {
            // Extract context (up to 20 bytes either side of the error)
            let context_start = floor_char_boundary(source, node.byte_start.saturating_sub(20));
            let context_end = floor_char_boundary(source, (node.byte_end + 20).min(source.len()));
            let context = source
                .get(context_start..context_end)
                .unwrap_or("")
                .replace('\n', "\\n");

            ErrorLocation {
                byte_start: node.byte_start,
                byte_end: node.byte_end,
                line: node.start_point.row + 1,
                column: node.start_point.column + 1,
                context,
            }
        })
        .collect()
}

fn floor_char_boundary(source: &str, mut index: usize) -> usize {
    while index > 0 && !source.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Selector uniqueness checker.
pub struct SelectorValidator;

impl SelectorValidator {
    /// Refuse a selector that matched more than one location.
    ///
    /// Callers handle the zero-match case before asking.
    pub fn check_unique(count: usize, pattern: &str) -> Result<(), ValidationError> {
        if count > 1 {
            return Err(ValidationError::SelectorNotUnique {
                count,
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_introduces_error() {
        let original = "export function Foo() { const x = 1; return x; }";
        let edited = "export function Foo( { const x = 1; return x; }";

        let result = validate_edit(original, edited);
        assert!(matches!(
            result,
            Err(ValidationError::ParseErrorIntroduced { before: 0, .. })
        ));
    }

    #[test]
    fn test_edit_preserves_existing_error() {
        let original = "export function Foo( { }\nconst a = 1;\n";
        let edited = "export function Foo( { }\nconst b = 2;\n";

        assert!(validate_edit(original, edited).is_ok());
    }

    #[test]
    fn test_binding_insertion_is_clean() {
        let original = "export function Foo() {\n  return <div />;\n}\n";
        let inserted = "export function Foo() {\n  const navigate = useNavigate();\n  return <div />;\n}\n";
        let broken = "export function Foo() {\n  return <div>;\n}\n";

        assert!(validate_edit(original, inserted).is_ok());
        assert!(validate_edit(original, broken).is_err());
    }

    #[test]
    fn error_location_has_context() {
        let err = validate_edit("const a = 1;\n", "const a = (;\n").unwrap_err();
        match err {
            ValidationError::ParseErrorIntroduced { errors, .. } => {
                assert!(!errors.is_empty());
                assert_eq!(errors[0].line, 1);
                assert!(!errors[0].context.contains('\n'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_selector_validator_unique() {
        assert!(SelectorValidator::check_unique(1, "test").is_ok());
        assert!(matches!(
            SelectorValidator::check_unique(2, "test"),
            Err(ValidationError::SelectorNotUnique { count: 2, .. })
        ));
    }
}
