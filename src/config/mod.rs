pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_patches, apply_rule, check_patches, ApplicationError, FileReport, FileStatus,
    PatchResult, RuleOutcome,
};
pub use loader::{
    config_files_in, load_builtin, load_from_path, load_from_str, ConfigError, BUILTIN_CONFIG,
};
pub use schema::{
    Check, Constraints, Dependency, Metadata, Operation, PatchConfig, PatchDefinition, Query,
    ValidationError, ValidationIssue,
};
