//! TSX language support via ast-grep-language.
//!
//! Pages are React components written in TypeScript with JSX, so every
//! structural query runs against the built-in `SupportLang::Tsx` grammar.

pub use ast_grep_language::SupportLang;

/// Get the TSX language for ast-grep operations.
pub fn tsx() -> SupportLang {
    SupportLang::Tsx
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast_grep_core::AstGrep;

    #[test]
    fn tsx_lang_parses() {
        let sg = AstGrep::new("export function Foo() { return <div />; }", tsx());
        assert_eq!(sg.root().kind(), "program");
    }

    #[test]
    fn tsx_lang_single_metavar() {
        let sg = AstGrep::new("navigate('/contact');", tsx());
        let root = sg.root();

        assert!(root.find("navigate('/contact')").is_some(), "exact match");
        assert!(root.find("navigate($PATH)").is_some(), "single metavar");
        assert!(root.find("$FN('/contact')").is_some(), "callee metavar");
    }

    #[test]
    fn tsx_lang_variadic_metavar() {
        let sg = AstGrep::new(
            "function Foo() { const a = 1; return <div>{a}</div>; }",
            tsx(),
        );
        let root = sg.root();

        assert!(
            root.find("function $NAME() { $$$BODY }").is_some(),
            "name + captured variadic"
        );
    }

    #[test]
    fn tsx_lang_finds_all_calls() {
        let sg = AstGrep::new(
            "const a = () => navigate(-1); const b = () => navigate('/');",
            tsx(),
        );
        let root = sg.root();

        let calls: Vec<_> = root.find_all("navigate($P)").collect();
        assert_eq!(calls.len(), 2);
    }
}
