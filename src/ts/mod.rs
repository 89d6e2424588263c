//! Tree-sitter integration for structural TSX queries.
//!
//! This module provides CST-based span location using tree-sitter, enabling
//! precise byte-span extraction for imports and component functions without
//! losing comments or formatting.

pub mod errors;
pub mod locator;
pub mod parser;

pub use errors::TreeSitterError;
pub use locator::{Export, FunctionScope, ImportStatement, NamedImports};
pub use parser::{ErrorNode, ParsedSource, TsxParser};
