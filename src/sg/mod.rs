//! ast-grep integration for pattern-based TSX matching.
//!
//! Rules may use ast-grep's metavariable syntax ($NAME, $$$BODY, etc.) instead
//! of a regular expression when the anchor is better expressed structurally.

pub mod errors;
pub mod lang;
pub mod matcher;

pub use errors::AstGrepError;
pub use lang::{tsx, SupportLang};
pub use matcher::{PatternMatch, PatternMatcher};
