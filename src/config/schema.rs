use crate::cache;
use crate::sg::{tsx, AstGrepError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Prefix marking a `files` entry as a reference to a named set.
pub const SET_PREFIX: char = '@';

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    /// Named file lists, referenced from `files` as `@name`
    #[serde(default)]
    pub sets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl PatchConfig {
    pub fn dependency(&self, id: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|dep| dep.id == id)
    }

    /// Files a patch targets, relative to the pages directory, with `@set`
    /// references expanded and duplicates removed (first occurrence wins).
    ///
    /// `None` means the patch applies to every discovered file.
    pub fn target_files(&self, patch: &PatchDefinition) -> Option<Vec<String>> {
        if patch.files.is_empty() {
            return None;
        }
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for entry in &patch.files {
            let expanded: Vec<&String> = match entry.strip_prefix(SET_PREFIX) {
                Some(set) => self.sets.get(set).map(|s| s.iter().collect()).unwrap_or_default(),
                None => vec![entry],
            };
            for file in expanded {
                if seen.insert(file.as_str()) {
                    files.push(file.clone());
                }
            }
        }
        Some(files)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() && self.checks.is_empty() {
            issues.push(ValidationIssue::EmptyConfig);
        }
        if self.meta.extension.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                entry: None,
                field: "meta.extension",
            });
        }

        self.validate_dependencies(&mut issues);
        self.validate_patches(&mut issues);
        self.validate_checks(&mut issues);

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    fn validate_dependencies(&self, issues: &mut Vec<ValidationIssue>) {
        let mut ids = HashSet::new();
        for dep in &self.dependencies {
            let entry = Some(format!("dependency '{}'", dep.id));
            if dep.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    entry: None,
                    field: "dependencies.id",
                });
            } else if !ids.insert(dep.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    kind: "dependency",
                    id: dep.id.clone(),
                });
            }
            if dep.module.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    entry: entry.clone(),
                    field: "module",
                });
            }
            if dep.import.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    entry: entry.clone(),
                    field: "import",
                });
            }
            if dep.binding.is_some() && dep.binds.as_deref().unwrap_or("").trim().is_empty() {
                issues.push(ValidationIssue::InvalidCombo {
                    entry,
                    message: "a binding requires `binds` (the identifier it declares)"
                        .to_string(),
                });
            }
        }
    }

    fn validate_patches(&self, issues: &mut Vec<ValidationIssue>) {
        let set_names: Vec<&str> = self.sets.keys().map(String::as_str).collect();
        let dep_ids: Vec<&str> = self.dependencies.iter().map(|d| d.id.as_str()).collect();
        let mut ids = HashSet::new();

        for patch in &self.patches {
            let entry = Some(format!("patch '{}'", patch.id));
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    entry: None,
                    field: "patches.id",
                });
            } else if !ids.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    kind: "patch",
                    id: patch.id.clone(),
                });
            }

            for file in &patch.files {
                if let Some(set) = file.strip_prefix(SET_PREFIX) {
                    if !self.sets.contains_key(set) {
                        issues.push(ValidationIssue::UnknownReference {
                            entry: entry.clone(),
                            kind: "set",
                            name: set.to_string(),
                            suggestion: suggest(set, &set_names),
                        });
                    }
                }
            }
            for dep in &patch.requires {
                if self.dependency(dep).is_none() {
                    issues.push(ValidationIssue::UnknownReference {
                        entry: entry.clone(),
                        kind: "dependency",
                        name: dep.clone(),
                        suggestion: suggest(dep, &dep_ids),
                    });
                }
            }

            match &patch.query {
                Some(Query::Regex { pattern }) => {
                    if pattern.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            entry: entry.clone(),
                            field: "query.pattern",
                        });
                    } else {
                        check_regex(&entry, pattern, issues);
                    }
                }
                Some(Query::AstGrep { pattern }) => {
                    if pattern.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            entry: entry.clone(),
                            field: "query.pattern",
                        });
                    } else {
                        check_ast_grep(&entry, pattern, issues);
                    }
                }
                Some(Query::Text { search }) => {
                    if search.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            entry: entry.clone(),
                            field: "query.search",
                        });
                    }
                }
                None => {
                    if !matches!(patch.operation, Operation::Require) {
                        issues.push(ValidationIssue::MissingField {
                            entry: entry.clone(),
                            field: "query",
                        });
                    }
                }
            }

            match &patch.operation {
                Operation::InsertBefore { text } | Operation::InsertAfter { text } => {
                    if text.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            entry: entry.clone(),
                            field: "operation.text",
                        });
                    }
                }
                Operation::Require => {
                    if patch.requires.is_empty() {
                        issues.push(ValidationIssue::InvalidCombo {
                            entry: entry.clone(),
                            message: "require operation needs at least one entry in `requires`"
                                .to_string(),
                        });
                    }
                }
                Operation::Replace { .. } | Operation::Delete => {}
            }

            if let Some(constraint) = &patch.constraint {
                for pattern in constraint.skip_if.iter().chain(&constraint.only_if) {
                    check_regex(&entry, pattern, issues);
                }
            }
        }
    }

    fn validate_checks(&self, issues: &mut Vec<ValidationIssue>) {
        let mut ids = HashSet::new();
        for check in &self.checks {
            let entry = Some(format!("check '{}'", check.id));
            if check.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    entry: None,
                    field: "checks.id",
                });
            } else if !ids.insert(check.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    kind: "check",
                    id: check.id.clone(),
                });
            }
            if check.all.is_empty() && check.any.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    entry: entry.clone(),
                    field: "all/any",
                });
            }
            for pattern in check.when.iter().chain(&check.all).chain(&check.any) {
                check_regex(&entry, pattern, issues);
            }
        }
    }
}

fn check_regex(entry: &Option<String>, pattern: &str, issues: &mut Vec<ValidationIssue>) {
    if let Err(err) = cache::get_or_compile_regex(pattern) {
        issues.push(ValidationIssue::InvalidRegex {
            entry: entry.clone(),
            pattern: pattern.to_string(),
            message: err.to_string(),
        });
    }
}

fn check_ast_grep(entry: &Option<String>, pattern: &str, issues: &mut Vec<ValidationIssue>) {
    if let Err(AstGrepError::InvalidPattern { message }) =
        cache::get_or_compile_pattern(pattern, tsx())
    {
        issues.push(ValidationIssue::InvalidPattern {
            entry: entry.clone(),
            pattern: pattern.to_string(),
            message,
        });
    }
}

/// Closest known name, if it is close enough to be a plausible typo.
fn suggest(name: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|candidate| (strsim::levenshtein(name, candidate), *candidate))
        .filter(|(distance, candidate)| *distance <= 3usize.max(candidate.len() / 3))
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.to_string())
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Extension (without dot) of the files that are discovered
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Descend into subdirectories during discovery
    #[serde(default)]
    pub recursive: bool,
    /// Reject edits that introduce TSX parse errors
    #[serde(default = "default_true")]
    pub validate_syntax: bool,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            extension: default_extension(),
            recursive: false,
            validate_syntax: true,
        }
    }
}

fn default_extension() -> String {
    "tsx".to_string()
}

fn default_true() -> bool {
    true
}

/// An import plus an optional local binding derived from it, e.g.
/// `useNavigate` from `react-router-dom` and `const navigate = useNavigate();`.
#[derive(Debug, Deserialize, Clone)]
pub struct Dependency {
    pub id: String,
    pub module: String,
    /// Name imported from `module`
    pub import: String,
    /// Statement inserted at the top of the host component
    #[serde(default)]
    pub binding: Option<String>,
    /// Identifier declared by `binding`
    #[serde(default)]
    pub binds: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target files relative to the pages directory; `@name` expands a set
    #[serde(default)]
    pub files: Vec<String>,
    /// Dependency ids ensured before the edit is applied
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub query: Option<Query>,
    pub operation: Operation,
    #[serde(default)]
    pub constraint: Option<Constraints>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Query {
    /// Regular expression; replacements may use `$1` / `${name}`
    Regex { pattern: String },
    /// Exact string match
    Text { search: String },
    /// ast-grep pattern over TSX; replacements may use `$NAME`
    AstGrep { pattern: String },
}

impl Query {
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Regex { .. } => "regex",
            Query::Text { .. } => "text",
            Query::AstGrep { .. } => "ast-grep",
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Query::Regex { pattern } | Query::AstGrep { pattern } => pattern,
            Query::Text { search } => search,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    Replace { text: String },
    InsertBefore { text: String },
    InsertAfter { text: String },
    Delete,
    /// Only ensure the patch's `requires`
    Require,
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Replace { .. } => "replace",
            Operation::InsertBefore { .. } => "insert-before",
            Operation::InsertAfter { .. } => "insert-after",
            Operation::Delete => "delete",
            Operation::Require => "require",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Constraints {
    /// Any match means the patch is already satisfied
    #[serde(default)]
    pub skip_if: Vec<String>,
    /// Every pattern must match for the patch to apply
    #[serde(default)]
    pub only_if: Vec<String>,
    /// More than one match of the query is an error
    #[serde(default)]
    pub unique: bool,
    /// Apply to every non-overlapping match instead of the first one
    #[serde(default)]
    pub global: bool,
}

/// A read-only audit over every discovered file.
#[derive(Debug, Deserialize, Clone)]
pub struct Check {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Only files matching this pattern are evaluated
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub all: Vec<String>,
    #[serde(default)]
    pub any: Vec<String>,
    /// Files that should pass; failures among them are flagged
    #[serde(default)]
    pub expected: Vec<String>,
}

impl Check {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyConfig,
    MissingField {
        entry: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        kind: &'static str,
        id: String,
    },
    UnknownReference {
        entry: Option<String>,
        kind: &'static str,
        name: String,
        suggestion: Option<String>,
    },
    InvalidRegex {
        entry: Option<String>,
        pattern: String,
        message: String,
    },
    /// An ast-grep pattern that does not compile to a single node
    InvalidPattern {
        entry: Option<String>,
        pattern: String,
        message: String,
    },
    InvalidCombo {
        entry: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyConfig => {
                write!(f, "patch config contains no patches and no checks")
            }
            ValidationIssue::MissingField { entry, field } => match entry {
                Some(entry) => write!(f, "{entry} missing required field '{field}'"),
                None => write!(f, "missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} id '{id}'")
            }
            ValidationIssue::UnknownReference {
                entry,
                kind,
                name,
                suggestion,
            } => {
                match entry {
                    Some(entry) => write!(f, "{entry} references unknown {kind} '{name}'")?,
                    None => write!(f, "unknown {kind} '{name}'")?,
                }
                if let Some(suggestion) = suggestion {
                    write!(f, " (did you mean '{suggestion}'?)")?;
                }
                Ok(())
            }
            ValidationIssue::InvalidRegex {
                entry,
                pattern,
                message,
            } => match entry {
                Some(entry) => write!(f, "{entry} has invalid regex '{pattern}': {message}"),
                None => write!(f, "invalid regex '{pattern}': {message}"),
            },
            ValidationIssue::InvalidPattern {
                entry,
                pattern,
                message,
            } => match entry {
                Some(entry) => {
                    write!(f, "{entry} has invalid ast-grep pattern '{pattern}': {message}")
                }
                None => write!(f, "invalid ast-grep pattern '{pattern}': {message}"),
            },
            ValidationIssue::InvalidCombo { entry, message } => match entry {
                Some(entry) => write!(f, "{entry} has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_names() {
        assert_eq!(
            suggest("navigte", &["navigate", "arrow-left"]).as_deref(),
            Some("navigate")
        );
        assert_eq!(suggest("something-else", &["navigate"]), None);
    }

    #[test]
    fn target_files_expand_sets_in_order() {
        let mut config = PatchConfig::default();
        config
            .sets
            .insert("info".into(), vec!["A.tsx".into(), "B.tsx".into()]);
        let patch = PatchDefinition {
            id: "p".into(),
            description: None,
            files: vec!["Z.tsx".into(), "@info".into(), "A.tsx".into()],
            requires: vec![],
            query: None,
            operation: Operation::Require,
            constraint: None,
        };

        assert_eq!(
            config.target_files(&patch).unwrap(),
            vec!["Z.tsx", "A.tsx", "B.tsx"]
        );
    }

    #[test]
    fn empty_files_means_all() {
        let config = PatchConfig::default();
        let patch = PatchDefinition {
            id: "p".into(),
            description: None,
            files: vec![],
            requires: vec![],
            query: None,
            operation: Operation::Delete,
            constraint: None,
        };
        assert!(config.target_files(&patch).is_none());
    }
}
