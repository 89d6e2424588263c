//! Thread-local compilation caches for regexes and ast-grep patterns.
//!
//! The same rule patterns are evaluated against every target file (and again
//! for the idempotence re-check), so compiled forms are kept per thread.
//! Each cache is capped at 256 entries; when full it is cleared and rebuilt on
//! demand.

use crate::sg::errors::AstGrepError;
use ast_grep_core::Pattern;
use ast_grep_language::SupportLang;
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static REGEX_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());

    // Key is "<lang_debug>:<pattern_str>" so a TSX pattern never collides with
    // the same text compiled for another grammar.
    static PATTERN_CACHE: RefCell<HashMap<String, Pattern>> = RefCell::new(HashMap::new());
}

/// Get a compiled regex from cache, or compile and cache it.
pub fn get_or_compile_regex(pattern: &str) -> Result<Regex, regex::Error> {
    REGEX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Regex::new(pattern)?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Get a compiled ast-grep pattern from cache, or compile and cache it.
///
/// A pattern must parse to a single node; `foo(); bar();` is rejected.
pub fn get_or_compile_pattern(
    pattern_str: &str,
    lang: SupportLang,
) -> Result<Pattern, AstGrepError> {
    let cache_key = format!("{lang:?}:{pattern_str}");

    PATTERN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(p) = cache.get(&cache_key) {
            return Ok(p.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Pattern::try_new(pattern_str, lang).map_err(|e| {
            AstGrepError::InvalidPattern {
                message: e.to_string(),
            }
        })?;
        cache.insert(cache_key, compiled.clone());
        Ok(compiled)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached_regexes() -> usize {
        REGEX_CACHE.with(|cache| cache.borrow().len())
    }

    fn cached_patterns() -> usize {
        PATTERN_CACHE.with(|cache| cache.borrow().len())
    }

    #[test]
    fn regex_is_compiled_once() {
        let before = cached_regexes();
        let a = get_or_compile_regex(r"navigate\(-1\)").unwrap();
        let b = get_or_compile_regex(r"navigate\(-1\)").unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert_eq!(cached_regexes(), before + 1);
    }

    #[test]
    fn invalid_regex_is_not_cached() {
        let before = cached_regexes();
        assert!(get_or_compile_regex("(unclosed").is_err());
        assert_eq!(cached_regexes(), before);
    }

    #[test]
    fn multi_statement_pattern_is_an_error_not_cached() {
        let before = cached_patterns();
        let err = get_or_compile_pattern("foo(); bar();", SupportLang::Tsx).unwrap_err();
        assert!(matches!(err, AstGrepError::InvalidPattern { .. }));
        assert_eq!(cached_patterns(), before);

        assert!(get_or_compile_pattern("navigate($P)", SupportLang::Tsx).is_ok());
        assert_eq!(cached_patterns(), before + 1);
    }
}
