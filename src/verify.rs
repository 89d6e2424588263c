//! Read-only audit of the pages against the configuration's checks.
//!
//! Every discovered file is read once and evaluated against every check. A
//! file lands in exactly one bucket per check: passed, failed (with the
//! patterns it lacks) or not applicable (its `when` pattern did not match).

use crate::cache;
use crate::config::{Check, PatchConfig};
use crate::discover::discover;
use crate::safety::{PagesGuard, SafetyError};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Root(#[from] SafetyError),

    #[error("failed to list pages: {0}")]
    Discovery(#[from] walkdir::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("check '{check_id}' has an invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        check_id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A file that did not satisfy a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub file: String,
    /// `all` patterns that did not match
    pub missing: Vec<String>,
    /// True when `any` was non-empty and none of its patterns matched
    pub any_unmatched: bool,
    /// The file is listed in the check's `expected`
    pub expected: bool,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub id: String,
    pub title: String,
    /// The check's `any` patterns, for rendering `any_unmatched` failures
    pub any: Vec<String>,
    pub passed: Vec<String>,
    pub failed: Vec<Failure>,
    pub not_applicable: Vec<String>,
    /// Files in `expected` that were not found at all
    pub absent: Vec<String>,
}

impl CheckReport {
    /// Failures among the files the check expects to pass.
    pub fn warnings(&self) -> impl Iterator<Item = &Failure> {
        self.failed.iter().filter(|failure| failure.expected)
    }

    pub fn evaluated(&self) -> usize {
        self.passed.len() + self.failed.len()
    }
}

struct CompiledCheck<'a> {
    check: &'a Check,
    when: Option<Regex>,
    all: Vec<(String, Regex)>,
    any: Vec<Regex>,
}

impl<'a> CompiledCheck<'a> {
    fn new(check: &'a Check) -> Result<Self, VerifyError> {
        let compile = |pattern: &String| {
            cache::get_or_compile_regex(pattern).map_err(|source| VerifyError::InvalidPattern {
                check_id: check.id.clone(),
                pattern: pattern.clone(),
                source,
            })
        };
        Ok(Self {
            check,
            when: check.when.as_ref().map(compile).transpose()?,
            all: check
                .all
                .iter()
                .map(|pattern| compile(pattern).map(|re| (pattern.clone(), re)))
                .collect::<Result<_, _>>()?,
            any: check.any.iter().map(compile).collect::<Result<_, _>>()?,
        })
    }

    fn evaluate(&self, file: &str, content: &str) -> Outcome {
        if let Some(when) = &self.when {
            if !when.is_match(content) {
                return Outcome::NotApplicable;
            }
        }
        let missing: Vec<String> = self
            .all
            .iter()
            .filter(|(_, re)| !re.is_match(content))
            .map(|(pattern, _)| pattern.clone())
            .collect();
        let any_unmatched = !self.any.is_empty() && !self.any.iter().any(|re| re.is_match(content));

        if missing.is_empty() && !any_unmatched {
            Outcome::Passed
        } else {
            Outcome::Failed(Failure {
                file: file.to_string(),
                missing,
                any_unmatched,
                expected: self.check.expected.iter().any(|f| f == file),
            })
        }
    }
}

enum Outcome {
    Passed,
    Failed(Failure),
    NotApplicable,
}

/// Run every check of `config` over the pages under `pages_dir`.
///
/// Never writes. A failing check is a finding, not an error.
pub fn verify(config: &PatchConfig, pages_dir: &Path) -> Result<Vec<CheckReport>, VerifyError> {
    let guard = PagesGuard::new(pages_dir)?;
    let files = discover(guard.root(), &config.meta.extension, config.meta.recursive)?;

    let compiled = config
        .checks
        .iter()
        .map(CompiledCheck::new)
        .collect::<Result<Vec<_>, _>>()?;

    let mut reports: Vec<CheckReport> = config
        .checks
        .iter()
        .map(|check| CheckReport {
            id: check.id.clone(),
            title: check.title().to_string(),
            any: check.any.clone(),
            passed: Vec::new(),
            failed: Vec::new(),
            not_applicable: Vec::new(),
            absent: check
                .expected
                .iter()
                .filter(|file| !files.contains(file))
                .cloned()
                .collect(),
        })
        .collect();

    for file in &files {
        let path = guard.root().join(file);
        let content = fs::read_to_string(&path).map_err(|source| VerifyError::Io {
            path: path.clone(),
            source,
        })?;

        for (check, report) in compiled.iter().zip(reports.iter_mut()) {
            match check.evaluate(file, &content) {
                Outcome::Passed => report.passed.push(file.clone()),
                Outcome::Failed(failure) => {
                    debug!(check = %report.id, file = %file, missing = ?failure.missing, "check failed");
                    report.failed.push(failure);
                }
                Outcome::NotApplicable => report.not_applicable.push(file.clone()),
            }
        }
    }

    Ok(reports)
}
