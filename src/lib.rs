//! navpatch: idempotent navigation fix-ups for React (TSX) page files
//!
//! A declarative patch configuration maps page files to ordered rules. Each
//! rule locates an anchor (regex, literal text or ast-grep pattern) and
//! rewrites it, after making sure the imports and local bindings it relies on
//! are present. A read-only verifier audits the result.
//!
//! # Architecture
//!
//! Every change compiles down to a single primitive: [`Edit`], a verified
//! byte-span replacement applied to an in-memory [`SourceBuffer`]. Anchors are
//! found with regexes, ast-grep patterns, or the tree-sitter TSX grammar (for
//! imports and component bodies); the application logic itself is generic.
//!
//! # Safety
//!
//! - Edits verify their expected before-text before applying
//! - A rule that is not idempotent, or that adds TSX parse errors, is rolled back
//! - Files are written at most once per run, atomically, and only if changed
//! - Targets must stay inside the pages directory and out of `node_modules`
//!
//! # Example
//!
//! ```no_run
//! use navpatch::config::{apply_patches, load_builtin};
//! use std::path::Path;
//!
//! let config = load_builtin()?;
//! for report in apply_patches(&config, Path::new("src/pages"))? {
//!     println!("{}: {}", report.file, report.status);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod config;
pub mod discover;
pub mod edit;
pub mod normalize;
pub mod pool;
pub mod safety;
pub mod sg;
pub mod ts;
pub mod validate;
pub mod verify;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_builtin, load_from_path, load_from_str, ApplicationError,
    ConfigError, FileReport, FileStatus, PatchConfig, PatchResult,
};
pub use edit::{Edit, EditError, EditResult, EditVerification, SourceBuffer};
pub use normalize::{ensure_binding, ensure_dependency, ensure_import, NormalizeError};
pub use safety::{PagesGuard, SafetyError};
pub use ts::{TreeSitterError, TsxParser};
pub use validate::{validate_edit, ErrorLocation, SelectorValidator, ValidationError};
pub use verify::{verify, CheckReport, VerifyError};
