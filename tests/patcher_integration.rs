//! Integration tests for the patcher: whole configurations against a
//! temporary pages directory.

use filetime::FileTime;
use navpatch::config::{
    apply_patches, check_patches, load_builtin, load_from_str, FileReport, FileStatus,
    PatchResult,
};
use navpatch::verify::verify;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const BACK_BUTTON_CONFIG: &str = r#"
[meta]
name = "back"

[[dependencies]]
id = "navigate"
module = "react-router-dom"
import = "useNavigate"
binding = "const navigate = useNavigate();"
binds = "navigate"

[[patches]]
id = "back-button"
requires = ["navigate"]
[patches.query]
type = "regex"
pattern = 'return \(\s*<div[^>]*>'
[patches.operation]
type = "insert-after"
text = '<button onClick={() => navigate(-1)}>Back</button>'
[patches.constraint]
skip_if = ['navigate\(-1\)']
"#;

fn pages(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn read(dir: &TempDir, file: &str) -> String {
    fs::read_to_string(dir.path().join(file)).unwrap()
}

fn report<'a>(reports: &'a [FileReport], file: &str) -> &'a FileReport {
    reports
        .iter()
        .find(|r| r.file == file)
        .unwrap_or_else(|| panic!("no report for {file}"))
}

#[test]
fn inserts_import_binding_and_button_once() {
    let dir = pages(&[(
        "Foo.tsx",
        "export function Foo() { return (<div>...</div>); }\n",
    )]);
    let config = load_from_str(BACK_BUTTON_CONFIG).unwrap();

    let reports = apply_patches(&config, dir.path()).unwrap();
    assert_eq!(report(&reports, "Foo.tsx").status, FileStatus::Patched);

    let patched = read(&dir, "Foo.tsx");
    assert_eq!(
        patched
            .matches("import { useNavigate } from 'react-router-dom';")
            .count(),
        1
    );
    assert_eq!(patched.matches("const navigate = useNavigate();").count(), 1);
    assert_eq!(patched.matches("navigate(-1)").count(), 1);

    let import = patched.find("import { useNavigate }").unwrap();
    let binding = patched.find("const navigate").unwrap();
    let button = patched.find("<button").unwrap();
    assert!(import < binding && binding < button);

    let reports = apply_patches(&config, dir.path()).unwrap();
    assert_eq!(report(&reports, "Foo.tsx").status, FileStatus::Unchanged);
    assert_eq!(read(&dir, "Foo.tsx"), patched);
}

#[test]
fn marker_present_leaves_file_untouched() {
    let source = "export function Foo() { return (<div><button onClick={() => navigate(-1)} /></div>); }\n";
    let dir = pages(&[("Foo.tsx", source)]);
    let path = dir.path().join("Foo.tsx");
    let old = FileTime::from_unix_time(1_000_000_000, 0);
    filetime::set_file_mtime(&path, old).unwrap();

    let config = load_from_str(BACK_BUTTON_CONFIG).unwrap();
    let reports = apply_patches(&config, dir.path()).unwrap();

    let foo = report(&reports, "Foo.tsx");
    assert_eq!(foo.status, FileStatus::Unchanged);
    assert_eq!(foo.rules[0].result, PatchResult::AlreadyApplied);
    assert_eq!(read(&dir, "Foo.tsx"), source);
    let mtime = FileTime::from_last_modification_time(&fs::metadata(&path).unwrap());
    assert_eq!(mtime, old);
}

#[test]
fn only_files_with_the_anchor_are_modified() {
    let config = load_from_str(
        r#"
[sets]
pages = ["A.tsx", "B.tsx", "C.tsx", "D.tsx"]

[[patches]]
id = "logo"
files = ["@pages"]
[patches.query]
type = "regex"
pattern = '<main>'
[patches.operation]
type = "insert-after"
text = "<Logo />"
[patches.constraint]
skip_if = ['<Logo />']
"#,
    )
    .unwrap();

    let without = "export function X() { return <section />; }\n";
    let dir = pages(&[
        ("A.tsx", "export function A() { return <main></main>; }\n"),
        ("B.tsx", without),
        ("C.tsx", "export function C() { return <main>c</main>; }\n"),
        ("D.tsx", without),
    ]);

    let reports = apply_patches(&config, dir.path()).unwrap();
    let statuses: Vec<_> = reports.iter().map(|r| (r.file.as_str(), &r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("A.tsx", &FileStatus::Patched),
            ("B.tsx", &FileStatus::NotFound),
            ("C.tsx", &FileStatus::Patched),
            ("D.tsx", &FileStatus::NotFound),
        ]
    );
    assert_eq!(
        read(&dir, "A.tsx"),
        "export function A() { return <main><Logo /></main>; }\n"
    );
    assert_eq!(read(&dir, "B.tsx"), without);
    assert_eq!(read(&dir, "D.tsx"), without);
}

#[test]
fn missing_file_does_not_stop_the_run() {
    let config = load_from_str(
        r#"
[[patches]]
id = "rename"
files = ["Gone.tsx", "Here.tsx"]
[patches.query]
type = "text"
search = "onClick={onContinue}"
[patches.operation]
type = "replace"
text = "onClick={() => go()}"
"#,
    )
    .unwrap();
    let dir = pages(&[(
        "Here.tsx",
        "export function Here() { return <button onClick={onContinue} />; }\n",
    )]);

    let reports = apply_patches(&config, dir.path()).unwrap();
    assert_eq!(report(&reports, "Gone.tsx").status, FileStatus::Missing);
    assert_eq!(report(&reports, "Here.tsx").status, FileStatus::Patched);
    assert!(read(&dir, "Here.tsx").contains("onClick={() => go()}"));
}

#[test]
fn paths_outside_the_pages_dir_are_rejected() {
    let root = TempDir::new().unwrap();
    let pages_dir = root.path().join("pages");
    fs::create_dir(&pages_dir).unwrap();
    let outside = "export function App() { return <div>x</div>; }\n";
    fs::write(root.path().join("App.tsx"), outside).unwrap();

    let config = load_from_str(
        r#"
[[patches]]
id = "escape"
files = ["../App.tsx"]
[patches.query]
type = "text"
search = "x"
[patches.operation]
type = "replace"
text = "y"
"#,
    )
    .unwrap();

    let reports = apply_patches(&config, &pages_dir).unwrap();
    assert!(matches!(
        report(&reports, "../App.tsx").status,
        FileStatus::Rejected { .. }
    ));
    assert_eq!(
        fs::read_to_string(root.path().join("App.tsx")).unwrap(),
        outside
    );
}

#[test]
fn dry_run_reports_without_writing() {
    let source = "export function Foo() { return (<div>...</div>); }\n";
    let dir = pages(&[("Foo.tsx", source)]);
    let config = load_from_str(BACK_BUTTON_CONFIG).unwrap();

    let reports = check_patches(&config, dir.path()).unwrap();
    let foo = report(&reports, "Foo.tsx");
    assert_eq!(foo.status, FileStatus::Patched);
    let (before, after) = foo.change.as_ref().unwrap();
    assert_eq!(before, source);
    assert!(after.contains("navigate(-1)"));
    assert_eq!(read(&dir, "Foo.tsx"), source);
}

const ABOUT_PAGE: &str = r#"import React from 'react';
import { Users } from 'lucide-react';

export function AboutUsPage() {
  return (
    <div className="min-h-screen bg-gray-50">
      <div className="relative max-w-4xl mx-auto px-4 py-16">
        <h1>À propos</h1>
        <Users className="w-6 h-6" />
      </div>
    </div>
  );
}
"#;

const FORGOT_PAGE: &str = r#"import { useState } from 'react';

type ForgotPasswordPageProps = {
  onBack: () => void;
};

export default function ForgotPasswordPage({ onBack }: ForgotPasswordPageProps) {
  const [email, setEmail] = useState('');
  return (
    <main className="p-8">
      <button onClick={onBack}>Retour</button>
      <input value={email} onChange={(e) => setEmail(e.target.value)} />
    </main>
  );
}
"#;

#[test]
fn builtin_rules_fix_an_information_page() {
    let dir = pages(&[("AboutUsPage.tsx", ABOUT_PAGE)]);
    let config = load_builtin().unwrap();

    let reports = apply_patches(&config, dir.path()).unwrap();
    let about = report(&reports, "AboutUsPage.tsx");
    assert_eq!(about.status, FileStatus::Patched);
    assert!(!about.has_failures(), "{:?}", about.rules);

    let patched = read(&dir, "AboutUsPage.tsx");
    assert!(patched.starts_with(
        "import React from 'react';\nimport { useNavigate } from 'react-router-dom';\nimport { Users, ArrowLeft } from 'lucide-react';\n"
    ));
    assert!(patched.contains("export function AboutUsPage() {\n  const navigate = useNavigate();\n  return ("));
    assert_eq!(patched.matches("capture_d'écran_2026-01-20_à_12.07.10.png").count(), 1);
    assert_eq!(patched.matches("<ArrowLeft").count(), 1);
    assert!(patched.find("navigate('/')").unwrap() < patched.find("navigate(-1)").unwrap());

    let again = apply_patches(&config, dir.path()).unwrap();
    let about = report(&again, "AboutUsPage.tsx");
    assert_eq!(about.status, FileStatus::Unchanged);
    assert!(about.rules.iter().all(|r| r.result != PatchResult::Applied));
    assert_eq!(read(&dir, "AboutUsPage.tsx"), patched);

    let checks = verify(&config, dir.path()).unwrap();
    for check in &checks {
        assert!(
            check.failed.iter().all(|f| f.file != "AboutUsPage.tsx"),
            "{} failed",
            check.id
        );
    }
}

#[test]
fn builtin_rules_replace_on_back_props() {
    let dir = pages(&[("ForgotPasswordPage.tsx", FORGOT_PAGE)]);
    let config = load_builtin().unwrap();

    let reports = apply_patches(&config, dir.path()).unwrap();
    let page = report(&reports, "ForgotPasswordPage.tsx");
    assert_eq!(page.status, FileStatus::Patched);
    assert!(!page.has_failures(), "{:?}", page.rules);

    let patched = read(&dir, "ForgotPasswordPage.tsx");
    assert!(!patched.contains("onBack"));
    assert!(!patched.contains("ForgotPasswordPageProps"));
    assert!(patched.contains(
        "export default function ForgotPasswordPage() {\n  const navigate = useNavigate();\n  const [email, setEmail]"
    ));
    assert!(patched.contains("<button onClick={() => navigate(-1)}>Retour</button>"));
    assert_eq!(
        patched
            .matches("import { useNavigate } from 'react-router-dom';")
            .count(),
        1
    );

    let again = apply_patches(&config, dir.path()).unwrap();
    assert_eq!(
        report(&again, "ForgotPasswordPage.tsx").status,
        FileStatus::Unchanged
    );
    assert_eq!(read(&dir, "ForgotPasswordPage.tsx"), patched);
}

#[test]
fn builtin_rules_report_missing_listed_pages() {
    let dir = pages(&[("AboutUsPage.tsx", ABOUT_PAGE)]);
    let config = load_builtin().unwrap();

    let reports = check_patches(&config, dir.path()).unwrap();
    assert_eq!(report(&reports, "BlogPage.tsx").status, FileStatus::Missing);
    assert!(!Path::new(&dir.path().join("BlogPage.tsx")).exists());
}

const PRICING_PAGE: &str = r#"import React from 'react';

function formatPrice(n: number) {
  return n.toFixed(2);
}

export function PricingPage() {
  return (
    <div className="min-h-screen bg-gray-50">
      <p>{formatPrice(49)}</p>
    </div>
  );
}
"#;

#[test]
fn builtin_rules_bind_navigate_in_the_page_not_a_helper() {
    let dir = pages(&[("PricingPage.tsx", PRICING_PAGE)]);
    let config = load_builtin().unwrap();

    let reports = apply_patches(&config, dir.path()).unwrap();
    let pricing = report(&reports, "PricingPage.tsx");
    assert_eq!(pricing.status, FileStatus::Patched);
    assert!(!pricing.has_failures(), "{:?}", pricing.rules);

    let patched = read(&dir, "PricingPage.tsx");
    assert!(patched.contains("function formatPrice(n: number) {\n  return n.toFixed(2);\n}"));
    assert!(patched.contains("export function PricingPage() {\n  const navigate = useNavigate();\n  return ("));
    assert_eq!(patched.matches("const navigate = useNavigate();").count(), 1);
    assert!(patched.contains(
        "<div className=\"min-h-screen bg-gray-50\">\n      <button\n        onClick={() => navigate('/')}"
    ));
    assert!(patched.contains("      </button>\n      <p>{formatPrice(49)}</p>"));
}
