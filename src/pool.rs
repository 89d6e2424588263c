//! Thread-local parser pooling.
//!
//! The normalizer and the syntax validator parse every buffer several times
//! per rule; one parser per thread is created on first use and reused.

use crate::ts::{TreeSitterError, TsxParser};
use std::cell::RefCell;

thread_local! {
    static TSX_PARSER: RefCell<Option<TsxParser>> = const { RefCell::new(None) };
}

/// Execute function with pooled parser instance.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use navpatch::pool::with_parser;
///
/// let has_errors = with_parser(|parser| {
///     parser
///         .parse_with_source("export function Foo() { return <div />; }")
///         .map(|parsed| parsed.has_errors())
/// })??;
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut TsxParser) -> R,
{
    TSX_PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let parser = match slot.as_mut() {
            Some(parser) => parser,
            None => slot.insert(TsxParser::new()?),
        };
        Ok(f(parser))
    })
}
