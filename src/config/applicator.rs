//! Patch applicator - applies patch definitions to page files with
//! idempotency checks.
//!
//! This module provides high-level patch application that:
//! - Groups patches by target file, keeping rule order within each file
//! - Evaluates `only_if` / `skip_if` guards before locating an anchor
//! - Ensures required imports and bindings before an edit lands
//! - Re-evaluates every applied rule to prove it is idempotent
//! - Rolls a rule back if it introduced TSX parse errors
//! - Writes each file at most once, and only if its content changed

use crate::cache;
use crate::config::schema::{Operation, PatchConfig, PatchDefinition, Query};
use crate::discover::discover;
use crate::edit::{Edit, EditError, SourceBuffer};
use crate::normalize::{ensure_dependency, NormalizeError};
use crate::safety::{PagesGuard, SafetyError};
use crate::sg::PatternMatcher;
use crate::ts::TreeSitterError;
use crate::validate::{validate_edit, SelectorValidator, ValidationError};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Result of applying a single patch to a single file
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Patch changed the buffer
    Applied,
    /// Target state already present (idempotent check passed)
    AlreadyApplied,
    /// An `only_if` guard did not match
    Skipped { reason: String },
    /// Anchor not found; file left alone for this rule
    NotFound,
    /// Patch was rolled back
    Failed { reason: String },
}

impl PatchResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, PatchResult::Failed { .. })
    }
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied => write!(f, "applied"),
            PatchResult::AlreadyApplied => write!(f, "already applied"),
            PatchResult::Skipped { reason } => write!(f, "skipped: {reason}"),
            PatchResult::NotFound => write!(f, "pattern not found"),
            PatchResult::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of one patch on one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub patch_id: String,
    pub result: PatchResult,
}

/// Overall status of one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Content changed (and was written unless this is a dry run)
    Patched,
    /// Every rule was already satisfied or not applicable
    Unchanged,
    /// Unchanged, and at least one rule could not find its anchor
    NotFound,
    /// Listed file does not exist
    Missing,
    /// Listed path escapes the pages directory or sits in a forbidden directory
    Rejected { reason: String },
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Patched => write!(f, "patched"),
            FileStatus::Unchanged => write!(f, "unchanged"),
            FileStatus::NotFound => write!(f, "pattern not found"),
            FileStatus::Missing => write!(f, "file not found"),
            FileStatus::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}

/// Everything that happened to one target file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Path relative to the pages directory, as listed
    pub file: String,
    pub status: FileStatus,
    pub rules: Vec<RuleOutcome>,
    /// Content before and after, when the file changed
    pub change: Option<(String, String)>,
}

impl FileReport {
    pub fn has_failures(&self) -> bool {
        self.rules.iter().any(|rule| rule.result.is_failure())
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    /// The pages directory itself is unusable
    Root(SafetyError),
    /// Listing the pages directory failed
    Discovery(walkdir::Error),
    /// Reading or writing a page failed
    Edit(EditError),
    /// A pattern that passed validation still failed to compile
    InvalidPattern { patch_id: String, message: String },
    /// Tree-sitter could not parse a page
    TreeSitter(TreeSitterError),
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Root(e) => write!(f, "invalid pages directory: {}", e),
            ApplicationError::Discovery(e) => write!(f, "failed to list pages: {}", e),
            ApplicationError::Edit(e) => write!(f, "edit error: {}", e),
            ApplicationError::InvalidPattern { patch_id, message } => {
                write!(f, "invalid pattern in patch '{}': {}", patch_id, message)
            }
            ApplicationError::TreeSitter(e) => write!(f, "parse error: {}", e),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Root(e) => Some(e),
            ApplicationError::Discovery(e) => Some(e),
            ApplicationError::Edit(e) => Some(e),
            ApplicationError::TreeSitter(e) => Some(e),
            ApplicationError::InvalidPattern { .. } => None,
        }
    }
}

impl From<EditError> for ApplicationError {
    fn from(e: EditError) -> Self {
        ApplicationError::Edit(e)
    }
}

impl From<TreeSitterError> for ApplicationError {
    fn from(e: TreeSitterError) -> Self {
        ApplicationError::TreeSitter(e)
    }
}

/// Apply a patch configuration to the pages under `pages_dir`, writing every
/// file whose content changed.
pub fn apply_patches(
    config: &PatchConfig,
    pages_dir: &Path,
) -> Result<Vec<FileReport>, ApplicationError> {
    run(config, pages_dir, true)
}

/// Compute the same reports as [`apply_patches`] without touching disk.
///
/// `Patched` here means "would be patched".
pub fn check_patches(
    config: &PatchConfig,
    pages_dir: &Path,
) -> Result<Vec<FileReport>, ApplicationError> {
    run(config, pages_dir, false)
}

fn run(
    config: &PatchConfig,
    pages_dir: &Path,
    write: bool,
) -> Result<Vec<FileReport>, ApplicationError> {
    let guard = PagesGuard::new(pages_dir).map_err(ApplicationError::Root)?;
    let discovered = discover(guard.root(), &config.meta.extension, config.meta.recursive)
        .map_err(ApplicationError::Discovery)?;

    let mut reports = Vec::new();
    for (file, patches) in plan_by_file(config, &discovered) {
        reports.push(process_file(config, &guard, file, &patches, write)?);
    }
    Ok(reports)
}

/// Target files in order of first appearance, each with its patches in
/// configuration order.
fn plan_by_file<'c>(
    config: &'c PatchConfig,
    discovered: &[String],
) -> Vec<(String, Vec<&'c PatchDefinition>)> {
    let mut order: Vec<(String, Vec<&PatchDefinition>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for patch in &config.patches {
        let files = config
            .target_files(patch)
            .unwrap_or_else(|| discovered.to_vec());
        for file in files {
            let slot = *index.entry(file.clone()).or_insert_with(|| {
                order.push((file, Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(patch);
        }
    }
    order
}

fn process_file(
    config: &PatchConfig,
    guard: &PagesGuard,
    file: String,
    patches: &[&PatchDefinition],
    write: bool,
) -> Result<FileReport, ApplicationError> {
    let candidate = guard.root().join(&file);
    if !candidate.exists() {
        debug!(file = %file, "target file missing");
        return Ok(FileReport {
            file,
            status: FileStatus::Missing,
            rules: Vec::new(),
            change: None,
        });
    }
    let path = match guard.validate_path(&candidate) {
        Ok(path) => path,
        Err(err) => {
            debug!(file = %file, error = %err, "target file rejected");
            return Ok(FileReport {
                file,
                status: FileStatus::Rejected {
                    reason: err.to_string(),
                },
                rules: Vec::new(),
                change: None,
            });
        }
    };

    let mut buffer = SourceBuffer::load(path)?;
    let mut rules = Vec::with_capacity(patches.len());
    for patch in patches {
        let result = apply_rule(config, patch, &mut buffer)?;
        debug!(file = %file, patch = %patch.id, result = %result, "rule evaluated");
        rules.push(RuleOutcome {
            patch_id: patch.id.clone(),
            result,
        });
    }

    let status = if buffer.is_modified() {
        if write {
            buffer.persist()?;
        }
        FileStatus::Patched
    } else if rules.iter().any(|r| r.result == PatchResult::NotFound) {
        FileStatus::NotFound
    } else {
        FileStatus::Unchanged
    };
    let change = buffer
        .is_modified()
        .then(|| (buffer.original().to_string(), buffer.text().to_string()));

    Ok(FileReport {
        file,
        status,
        rules,
        change,
    })
}

/// What a rule would do to the current buffer.
enum Plan {
    /// Apply these edits (after the rule's requirements)
    Edit(Vec<Edit>),
    /// Only ensure the rule's requirements
    Require,
    /// Target state already present
    Satisfied,
    /// `only_if` guard did not match
    NotApplicable(String),
    NotFound,
    /// More matches than a `unique` rule allows
    Ambiguous(String),
}

/// Evaluate one rule against the buffer, applying it if needed.
///
/// On any rule-level failure the buffer is restored to its state before the
/// rule, so later rules see consistent content.
pub fn apply_rule(
    config: &PatchConfig,
    patch: &PatchDefinition,
    buffer: &mut SourceBuffer,
) -> Result<PatchResult, ApplicationError> {
    let edits = match plan(patch, buffer.text())? {
        Plan::Satisfied => return Ok(PatchResult::AlreadyApplied),
        Plan::NotFound => return Ok(PatchResult::NotFound),
        Plan::NotApplicable(reason) => return Ok(PatchResult::Skipped { reason }),
        Plan::Ambiguous(reason) => return Ok(PatchResult::Failed { reason }),
        Plan::Require => None,
        Plan::Edit(edits) => Some(edits),
    };

    let checkpoint = buffer.checkpoint();
    match transact(config, patch, buffer, edits, &checkpoint)? {
        Ok(()) if buffer.text() == checkpoint => Ok(PatchResult::AlreadyApplied),
        Ok(()) => Ok(PatchResult::Applied),
        Err(reason) => {
            debug!(patch = %patch.id, reason = %reason, "rolling back rule");
            buffer.restore(checkpoint);
            Ok(PatchResult::Failed { reason })
        }
    }
}

/// Requirements, edits, idempotence and syntax checks. The inner `Err` is a
/// rule failure that the caller rolls back.
fn transact(
    config: &PatchConfig,
    patch: &PatchDefinition,
    buffer: &mut SourceBuffer,
    edits: Option<Vec<Edit>>,
    checkpoint: &str,
) -> Result<Result<(), String>, ApplicationError> {
    for id in &patch.requires {
        let Some(dependency) = config.dependency(id) else {
            return Ok(Err(format!("unknown dependency '{id}'")));
        };
        match ensure_dependency(buffer, dependency) {
            Ok(_) => {}
            Err(NormalizeError::Edit(err)) => return Err(err.into()),
            Err(NormalizeError::Parse(err)) => return Err(err.into()),
            Err(err @ NormalizeError::NoHost { .. }) => return Ok(Err(err.to_string())),
        }
    }

    if let Some(mut edits) = edits {
        // Requirements shift offsets; locate the anchor again.
        if buffer.text() != checkpoint {
            match plan(patch, buffer.text())? {
                Plan::Edit(relocated) => edits = relocated,
                Plan::Satisfied | Plan::Require => edits = Vec::new(),
                _ => return Ok(Err("anchor lost after inserting requirements".to_string())),
            }
        }
        buffer.apply_batch(edits)?;
    }

    if let Plan::Edit(_) = plan(patch, buffer.text())? {
        return Ok(Err("rule is not idempotent".to_string()));
    }

    if config.meta.validate_syntax {
        match validate_edit(checkpoint, buffer.text()) {
            Ok(()) => {}
            Err(ValidationError::TreeSitter(err)) => return Err(err.into()),
            Err(err) => return Ok(Err(err.to_string())),
        }
    }
    Ok(Ok(()))
}

/// Decide what `patch` would do to `text`, without changing anything.
fn plan(patch: &PatchDefinition, text: &str) -> Result<Plan, ApplicationError> {
    let constraint = patch.constraint.clone().unwrap_or_default();
    for pattern in &constraint.only_if {
        if !regex_matches(patch, pattern, text)? {
            return Ok(Plan::NotApplicable(format!("`{pattern}` not present")));
        }
    }
    for pattern in &constraint.skip_if {
        if regex_matches(patch, pattern, text)? {
            return Ok(Plan::Satisfied);
        }
    }

    let Some(query) = &patch.query else {
        return Ok(Plan::Require);
    };
    let template = match &patch.operation {
        Operation::Replace { text }
        | Operation::InsertBefore { text }
        | Operation::InsertAfter { text } => Some(text.as_str()),
        Operation::Delete | Operation::Require => None,
    };

    let anchors = locate(patch, query, template, text)?;
    if anchors.is_empty() {
        return Ok(match (&patch.operation, query) {
            (Operation::Replace { text: replacement }, Query::Text { .. })
                if text.contains(replacement.as_str()) =>
            {
                Plan::Satisfied
            }
            (Operation::Delete, _) => Plan::Satisfied,
            _ => Plan::NotFound,
        });
    }

    if constraint.unique {
        if let Err(err) = SelectorValidator::check_unique(anchors.len(), query.pattern()) {
            return Ok(Plan::Ambiguous(err.to_string()));
        }
    }
    if let Operation::Require = patch.operation {
        return Ok(Plan::Require);
    }

    let selected = if constraint.global {
        &anchors[..]
    } else {
        &anchors[..1]
    };
    let edits: Vec<Edit> = selected
        .iter()
        .filter_map(|anchor| edit_at(&patch.operation, anchor, text))
        .collect();

    if edits.is_empty() {
        Ok(Plan::Satisfied)
    } else {
        Ok(Plan::Edit(edits))
    }
}

/// The edit an operation makes at one anchor, or `None` if its target state
/// is already there.
fn edit_at(operation: &Operation, anchor: &Anchor, text: &str) -> Option<Edit> {
    let matched = &text[anchor.start..anchor.end];
    let expanded = anchor.expanded.clone().unwrap_or_default();
    let edit = match operation {
        Operation::Require => return None,
        Operation::Replace { .. } => Edit::new(anchor.start, anchor.end, expanded, matched),
        Operation::Delete => Edit::new(anchor.start, anchor.end, "", matched),
        Operation::InsertBefore { .. } => {
            if text[..anchor.start].ends_with(expanded.as_str()) {
                return None;
            }
            Edit::insert(anchor.start, expanded)
        }
        Operation::InsertAfter { .. } => {
            if text[anchor.end..].starts_with(expanded.as_str()) {
                return None;
            }
            Edit::insert(anchor.end, expanded)
        }
    };
    (!edit.is_noop(text)).then_some(edit)
}

/// One match of a query.
struct Anchor {
    start: usize,
    end: usize,
    /// Operation text with captures substituted
    expanded: Option<String>,
}

/// Every non-overlapping match of a query, in source order.
fn locate(
    patch: &PatchDefinition,
    query: &Query,
    template: Option<&str>,
    text: &str,
) -> Result<Vec<Anchor>, ApplicationError> {
    match query {
        Query::Regex { pattern } => {
            let re = compile(patch, pattern)?;
            let anchors = re
                .captures_iter(text)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let expanded = template.map(|template| {
                        let mut out = String::new();
                        caps.expand(template, &mut out);
                        out
                    });
                    Some(Anchor {
                        start: whole.start(),
                        end: whole.end(),
                        expanded,
                    })
                })
                .collect();
            Ok(anchors)
        }
        Query::Text { search } => Ok(text
            .match_indices(search.as_str())
            .map(|(start, _)| Anchor {
                start,
                end: start + search.len(),
                expanded: template.map(str::to_string),
            })
            .collect()),
        Query::AstGrep { pattern } => {
            let matcher = PatternMatcher::new(text);
            let matches = matcher
                .find_all(pattern)
                .map_err(|err| ApplicationError::InvalidPattern {
                    patch_id: patch.id.clone(),
                    message: err.to_string(),
                })?;
            // Nested matches are dropped; the outermost one wins.
            let mut anchors: Vec<Anchor> = Vec::with_capacity(matches.len());
            for m in matches {
                if anchors.last().is_some_and(|prev| m.byte_start < prev.end) {
                    continue;
                }
                anchors.push(Anchor {
                    start: m.byte_start,
                    end: m.byte_end,
                    expanded: template.map(|template| m.expand(template)),
                });
            }
            Ok(anchors)
        }
    }
}

fn compile(patch: &PatchDefinition, pattern: &str) -> Result<regex::Regex, ApplicationError> {
    cache::get_or_compile_regex(pattern).map_err(|err| ApplicationError::InvalidPattern {
        patch_id: patch.id.clone(),
        message: err.to_string(),
    })
}

fn regex_matches(
    patch: &PatchDefinition,
    pattern: &str,
    text: &str,
) -> Result<bool, ApplicationError> {
    Ok(compile(patch, pattern)?.is_match(text))
}
