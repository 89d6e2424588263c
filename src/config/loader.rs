use crate::config::schema::{PatchConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read patch config from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch config ({}): {}", path.display(), source),
                None => write!(f, "invalid patch config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

/// Rules reproducing the navigation fix-ups, shipped inside the binary.
pub const BUILTIN_CONFIG: &str = include_str!("../../patches/navigation.toml");

pub fn load_builtin() -> Result<PatchConfig, ConfigError> {
    load_from_str(BUILTIN_CONFIG)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Every `*.toml` file directly inside `dir`, sorted by name.
pub fn config_files_in(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_is_valid() {
        let config = load_builtin().unwrap();
        assert_eq!(config.meta.name, "navigation");
        assert!(!config.patches.is_empty());
        assert!(!config.checks.is_empty());
        assert!(config.dependency("navigate").is_some());
    }

    #[test]
    fn parse_error_mentions_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[[patches]\nid = ").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn validation_collects_every_issue() {
        let err = load_from_str(
            r#"
[sets]
info = ["A.tsx"]

[[dependencies]]
id = "navigate"
module = "react-router-dom"
import = "useNavigate"
binding = "const navigate = useNavigate();"

[[patches]]
id = "a"
files = ["@infos"]
requires = ["navigat"]
[patches.query]
type = "regex"
pattern = "(unclosed"
[patches.operation]
type = "replace"
text = "x"

[[patches]]
id = "a"
[patches.operation]
type = "require"
"#,
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("unknown set 'infos' (did you mean 'info'?)"));
        assert!(message.contains("unknown dependency 'navigat' (did you mean 'navigate'?)"));
        assert!(message.contains("invalid regex '(unclosed'"));
        assert!(message.contains("duplicate patch id 'a'"));
        assert!(message.contains("require operation needs"));
        assert!(message.contains("binds"));
    }

    #[test]
    fn multi_statement_ast_grep_pattern_is_rejected_at_load() {
        let err = load_from_str(
            r#"
[[patches]]
id = "two-calls"
[patches.query]
type = "ast-grep"
pattern = "foo(); bar();"
[patches.operation]
type = "delete"
"#,
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(
            message.contains("patch 'two-calls' has invalid ast-grep pattern 'foo(); bar();'")
        );
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = load_from_str("[meta]\nname = \"empty\"\n").unwrap_err();
        assert!(err.to_string().contains("no patches and no checks"));
    }

    #[test]
    fn finds_config_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.toml"), "").unwrap();
        fs::write(dir.path().join("a.toml"), "").unwrap();
        fs::write(dir.path().join("notes.md"), "").unwrap();

        let files = config_files_in(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.toml", "b.toml"]);
    }
}
