//! Precondition insertion: make sure a page imports a capability and binds a
//! local name from it before a rule that uses that name is applied.
//!
//! Both insertions are located on the tree-sitter CST, so they land in the
//! right place regardless of formatting, multi-line signatures or
//! destructured parameters. Each is a no-op when already satisfied.

use crate::config::Dependency;
use crate::edit::{Edit, EditError, SourceBuffer};
use crate::pool;
use crate::ts::{locator, TreeSitterError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error(transparent)]
    Parse(#[from] TreeSitterError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("no component function found to declare `{binds}` in")]
    NoHost { binds: String },
}

/// What [`ensure_dependency`] had to insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalized {
    pub import_added: bool,
    pub binding_added: bool,
}

impl Normalized {
    pub fn changed(&self) -> bool {
        self.import_added || self.binding_added
    }
}

/// Ensure the dependency's import and then its binding, in that order.
///
/// A page that already declares the bound name some other way (for example
/// `const { navigate } = useRouter()`) needs neither.
pub fn ensure_dependency(
    buffer: &mut SourceBuffer,
    dependency: &Dependency,
) -> Result<Normalized, NormalizeError> {
    if let Some(binding) = &dependency.binding {
        let binds = dependency.binds.as_deref().unwrap_or(&dependency.import);
        if declared_elsewhere(buffer.text(), binding, binds)? {
            debug!(file = %buffer.path().display(), binds, "name declared by the page itself");
            return Ok(Normalized::default());
        }
    }

    let import_added = ensure_import(buffer, &dependency.module, &dependency.import)?;
    let binding_added = match &dependency.binding {
        Some(binding) => {
            let binds = dependency.binds.as_deref().unwrap_or(&dependency.import);
            ensure_binding(buffer, binding, binds)?
        }
        None => false,
    };
    Ok(Normalized {
        import_added,
        binding_added,
    })
}

/// Ensure `name` is imported from `module`. Returns whether an edit was made.
///
/// An existing value import from the same module is extended in place. A
/// name bound by any import, whatever its module, is left alone.
pub fn ensure_import(
    buffer: &mut SourceBuffer,
    module: &str,
    name: &str,
) -> Result<bool, NormalizeError> {
    let edit = {
        let text = buffer.text();
        let parsed = pool::with_parser(|parser| parser.parse_with_source(text))??;
        let imports = locator::imports(&parsed);

        if let Some(existing) = imports.iter().find(|import| import.binds(name)) {
            if existing.module != module {
                warn!(
                    file = %buffer.path().display(),
                    name,
                    expected = module,
                    found = %existing.module,
                    "name already imported from a different module"
                );
            }
            return Ok(false);
        }

        let target = imports
            .iter()
            .find(|import| import.module == module && !import.type_only && !import.namespace);

        match target {
            Some(import) => match &import.named {
                Some(named) => match named.last_specifier_end {
                    Some(end) => Edit::insert(end, format!(", {name}")),
                    None => Edit::new(
                        named.open_end,
                        named.close_start,
                        format!(" {name} "),
                        &text[named.open_end..named.close_start],
                    ),
                },
                None => match &import.default_import {
                    Some((_, end)) => Edit::insert(*end, format!(", {{ {name} }}")),
                    None => new_import_statement(&imports, module, name),
                },
            },
            None => new_import_statement(&imports, module, name),
        }
    };

    buffer.apply(&edit)?;
    debug!(file = %buffer.path().display(), name, module, "import ensured");
    Ok(true)
}

fn new_import_statement(imports: &[locator::ImportStatement], module: &str, name: &str) -> Edit {
    match imports.first() {
        Some(first) => {
            let q = first.quote;
            Edit::insert(
                first.byte_end,
                format!("\nimport {{ {name} }} from {q}{module}{q};"),
            )
        }
        None => Edit::insert(0, format!("import {{ {name} }} from '{module}';\n")),
    }
}

/// Ensure `binding` (which declares `binds`) sits at the top of the component
/// that uses `binds`. Returns whether an edit was made.
pub fn ensure_binding(
    buffer: &mut SourceBuffer,
    binding: &str,
    binds: &str,
) -> Result<bool, NormalizeError> {
    let edit = {
        let text = buffer.text();
        if text.contains(binding.trim()) {
            return Ok(false);
        }
        let parsed = pool::with_parser(|parser| parser.parse_with_source(text))??;
        if locator::declares(&parsed, binds) {
            return Ok(false);
        }

        let host = locator::host_function(&parsed, binds).ok_or_else(|| NormalizeError::NoHost {
            binds: binds.to_string(),
        })?;
        let offset = host.body_open + 1;
        let indent = host
            .first_statement
            .and_then(|stmt| statement_indent(text, host.body_open, stmt))
            .unwrap_or("  ");
        Edit::insert(offset, format!("\n{indent}{}", binding.trim()))
    };

    buffer.apply(&edit)?;
    debug!(file = %buffer.path().display(), binds, "binding ensured");
    Ok(true)
}

fn declared_elsewhere(text: &str, binding: &str, binds: &str) -> Result<bool, NormalizeError> {
    if text.contains(binding.trim()) {
        return Ok(false);
    }
    let parsed = pool::with_parser(|parser| parser.parse_with_source(text))??;
    Ok(locator::declares(&parsed, binds))
}

/// Leading whitespace of the statement's line, when it starts on a line of its
/// own after the body's opening brace.
fn statement_indent(text: &str, body_open: usize, statement: usize) -> Option<&str> {
    let line_start = text[..statement].rfind('\n')? + 1;
    if line_start <= body_open {
        return None;
    }
    let prefix = &text[line_start..statement];
    prefix.chars().all(char::is_whitespace).then_some(prefix)
}
