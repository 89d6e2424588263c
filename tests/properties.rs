//! Property tests: every rule and precondition is idempotent.

use navpatch::config::{apply_rule, load_builtin, PatchResult};
use navpatch::edit::SourceBuffer;
use navpatch::normalize::ensure_import;
use navpatch::validate::validate_edit;
use proptest::prelude::*;

const EXISTING: &[&str] = &["Link", "NavLink", "Outlet", "useParams"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ensure_import_is_idempotent(
        name in "[A-Z][a-zA-Z]{0,8}",
        existing in proptest::sample::subsequence(EXISTING, 0..=EXISTING.len()),
        double_quotes in any::<bool>(),
    ) {
        let q = if double_quotes { '"' } else { '\'' };
        let mut source = format!("import React from {q}react{q};\n");
        if !existing.is_empty() {
            source.push_str(&format!(
                "import {{ {} }} from {q}react-router-dom{q};\n",
                existing.join(", ")
            ));
        }
        source.push_str("\nexport function Page() {\n  return <div />;\n}\n");

        let mut buffer = SourceBuffer::from_parts("Page.tsx", source.as_str());
        ensure_import(&mut buffer, "react-router-dom", &name).unwrap();
        let once = buffer.text().to_string();

        prop_assert!(!ensure_import(&mut buffer, "react-router-dom", &name).unwrap());
        prop_assert_eq!(buffer.text(), once.as_str());
        prop_assert!(validate_edit(&source, &once).is_ok());
        prop_assert!(once.matches("react-router-dom").count() <= 1);
    }

    #[test]
    fn builtin_logo_rule_is_idempotent(
        body in "[a-zA-Z0-9 ]{0,30}",
        tag in prop_oneof![Just("div"), Just("main"), Just("section")],
    ) {
        let config = load_builtin().unwrap();
        let patch = config.patches.iter().find(|p| p.id == "logo-button").unwrap();
        let source = format!(
            "export function Page() {{\n  return (\n    <{tag} className=\"p-4\">{body}</{tag}>\n  );\n}}\n"
        );

        let mut buffer = SourceBuffer::from_parts("Page.tsx", source.as_str());
        prop_assert_eq!(apply_rule(&config, patch, &mut buffer).unwrap(), PatchResult::Applied);
        let once = buffer.text().to_string();

        prop_assert_eq!(
            apply_rule(&config, patch, &mut buffer).unwrap(),
            PatchResult::AlreadyApplied
        );
        prop_assert_eq!(buffer.text(), once.as_str());
        prop_assert_eq!(once.matches("const navigate = useNavigate();").count(), 1);
        prop_assert!(once.contains(body.as_str()));
    }
}
