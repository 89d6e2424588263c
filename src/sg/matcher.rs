use crate::cache;
use crate::sg::errors::AstGrepError;
use crate::sg::lang::tsx;
use ast_grep_core::tree_sitter::StrDoc;
use ast_grep_core::{AstGrep, NodeMatch};
use ast_grep_language::SupportLang;
use std::collections::HashMap;

/// A match from an ast-grep pattern with captured metavariables.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    /// Byte range of the entire match
    pub byte_start: usize,
    pub byte_end: usize,
    /// The matched text
    pub text: String,
    /// Captured metavariables: name -> text
    pub captures: HashMap<String, String>,
}

impl PatternMatch {
    /// Substitute `$NAME` / `$$$NAME` placeholders in `template` with captured text.
    ///
    /// Longer names are substituted first so `$AB` is never clobbered by `$A`.
    pub fn expand(&self, template: &str) -> String {
        let mut names: Vec<_> = self.captures.keys().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut out = template.to_string();
        for name in names {
            let value = &self.captures[name];
            out = out.replace(&format!("$$${name}"), value);
            out = out.replace(&format!("${name}"), value);
        }
        out
    }
}

/// Pattern matcher over TSX using ast-grep's metavariable syntax.
///
/// # Metavariable Syntax
///
/// - `$NAME` - Matches a single node and captures it
/// - `$$$NAME` - Matches zero or more nodes (variadic)
/// - `$_` - Matches any single node (anonymous)
///
/// # Example Patterns
///
/// ```text
/// console.log($A)                       // any single-argument log call
/// navigate($PATH)                       // call with one argument
/// export function $NAME($$$PARAMS) { $$$BODY }
/// ```
pub struct PatternMatcher {
    source: String,
    sg: AstGrep<StrDoc<SupportLang>>,
}

impl PatternMatcher {
    /// Create a new pattern matcher for the given source code.
    pub fn new(source: &str) -> Self {
        let sg = AstGrep::new(source, tsx());
        Self {
            source: source.to_string(),
            sg,
        }
    }

    /// Find all matches for a pattern, in source order.
    pub fn find_all(&self, pattern: &str) -> Result<Vec<PatternMatch>, AstGrepError> {
        if pattern.trim().is_empty() {
            return Err(AstGrepError::InvalidPattern {
                message: "pattern is empty".to_string(),
            });
        }
        let pat = cache::get_or_compile_pattern(pattern, tsx())?;
        let root = self.sg.root();
        let mut results: Vec<_> = root
            .find_all(&pat)
            .map(|m| self.node_match_to_pattern_match(m))
            .collect();
        results.sort_by_key(|m| m.byte_start);

        Ok(results)
    }

    fn node_match_to_pattern_match(&self, m: NodeMatch<StrDoc<SupportLang>>) -> PatternMatch {
        let node = m.get_node();
        let range = node.range();
        let byte_start = range.start;
        let byte_end = range.end;
        let text = self.source[byte_start..byte_end].to_string();

        let env = m.get_env().clone();
        let captures: HashMap<String, String> = env.into();

        PatternMatch {
            byte_start,
            byte_end,
            text,
            captures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"import { ArrowLeft } from 'lucide-react';

export function PressPage({ onBack }: PressPageProps) {
  console.log('press');
  return (
    <div>
      <button onClick={() => navigate(-1)}>back</button>
      <button onClick={() => navigate('/')}>home</button>
    </div>
  );
}
"#;

    #[test]
    fn finds_calls_with_capture() {
        let matcher = PatternMatcher::new(PAGE);
        let matches = matcher.find_all("console.log($A)").unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].captures.get("A").map(String::as_str), Some("'press'"));
    }

    #[test]
    fn matches_are_in_source_order() {
        let matcher = PatternMatcher::new(PAGE);
        let matches = matcher.find_all("navigate($P)").unwrap();

        assert_eq!(matches.len(), 2);
        assert!(matches[0].byte_start < matches[1].byte_start);
        assert_eq!(matches[0].text, "navigate(-1)");
        assert_eq!(matches[1].text, "navigate('/')");
    }

    #[test]
    fn no_match_is_empty() {
        let matcher = PatternMatcher::new(PAGE);
        assert!(matcher.find_all("history.back()").unwrap().is_empty());
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let matcher = PatternMatcher::new(PAGE);
        assert!(matches!(
            matcher.find_all("  "),
            Err(AstGrepError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn multi_node_pattern_is_rejected() {
        let matcher = PatternMatcher::new(PAGE);
        assert!(matches!(
            matcher.find_all("foo(); bar();"),
            Err(AstGrepError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn byte_spans_accurate() {
        let matcher = PatternMatcher::new(PAGE);
        let m = &matcher.find_all("console.log($A)").unwrap()[0];

        assert_eq!(&PAGE[m.byte_start..m.byte_end], "console.log('press')");
    }

    #[test]
    fn expand_substitutes_captures() {
        let matcher = PatternMatcher::new(PAGE);
        let m = &matcher.find_all("console.log($A)").unwrap()[0];

        assert_eq!(m.expand("console.info($A)"), "console.info('press')");
        assert_eq!(m.expand("no placeholders"), "no placeholders");
    }
}
