use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use navpatch::config::{
    apply_patches, check_patches, config_files_in, load_builtin, load_from_path, FileReport,
    FileStatus, PatchConfig, PatchResult,
};
use navpatch::verify::{verify, CheckReport};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "navpatch")]
#[command(about = "Idempotent navigation fix-ups for React page files", long_about = None)]
#[command(version)]
struct Cli {
    /// Log rule decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patches to the pages directory
    Apply {
        /// Pages directory (defaults to $NAVPATCH_DIR, then ./src/pages)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Patch file to apply (otherwise every file in ./patches, or the built-in rules)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(long)]
        diff: bool,
    },

    /// Show which files would change, without writing
    Status {
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// Audit pages against the configured checks (read-only)
    Verify {
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// List rules, dependencies and checks
    List {
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            dir,
            patches,
            dry_run,
            diff,
        } => cmd_apply(dir, patches, dry_run, diff),

        Commands::Status { dir, patches } => cmd_status(dir, patches),

        Commands::Verify { dir, patches } => cmd_verify(dir, patches),

        Commands::List { patches } => cmd_list(patches),
    }
}

/// Diagnostics go to stderr so the report on stdout stays clean.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("navpatch=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the pages directory.
///
/// Priority order:
/// 1. Explicit --dir flag
/// 2. NAVPATCH_DIR environment variable
/// 3. ./src/pages
fn resolve_dir(cli_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_dir {
        if !path.is_dir() {
            anyhow::bail!("Pages directory does not exist: {}", path.display());
        }
        return Ok(path);
    }

    if let Ok(env_dir) = env::var("NAVPATCH_DIR") {
        let path = PathBuf::from(&env_dir);
        if path.is_dir() {
            return Ok(path);
        }
        eprintln!(
            "{}",
            format!("Warning: NAVPATCH_DIR is set but is not a directory: {env_dir}").yellow()
        );
    }

    let default = PathBuf::from("src/pages");
    if default.is_dir() {
        println!(
            "{}",
            format!("Using pages directory: {}", default.display()).dimmed()
        );
        return Ok(default);
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}\n  {}",
        "Could not find the pages directory.".red(),
        "Try one of:".bold(),
        "1. Run from the project root, next to src/pages",
        "2. Specify explicitly: navpatch apply --dir path/to/pages",
        "3. Set environment variable: export NAVPATCH_DIR=path/to/pages"
    )
}

/// Load the configurations to run, each with a label for the report.
///
/// Priority order: --patches file, every `*.toml` in ./patches, built-in rules.
fn load_configs(patches: Option<PathBuf>) -> Result<Vec<(String, PatchConfig)>> {
    if let Some(path) = patches {
        let config = load_from_path(&path)?;
        return Ok(vec![(path.display().to_string(), config)]);
    }

    let patches_dir = Path::new("patches");
    if patches_dir.is_dir() {
        let files = config_files_in(patches_dir)?;
        if !files.is_empty() {
            return files
                .into_iter()
                .map(|path| -> Result<(String, PatchConfig)> {
                    let config = load_from_path(&path)?;
                    Ok((path.display().to_string(), config))
                })
                .collect();
        }
    }

    let config = load_builtin().context("built-in configuration is invalid")?;
    Ok(vec![("built-in rules".to_string(), config)])
}

fn display_diff(file: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {file} (original)").dimmed());
    println!("{}", format!("+++ {file} (patched)").dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            println!("{}", "...".dimmed());
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{change}").red(),
                    ChangeTag::Insert => format!("+{change}").green(),
                    ChangeTag::Equal => format!(" {change}").normal(),
                };
                print!("{line}");
                if change.missing_newline() {
                    println!();
                }
            }
        }
    }
}

#[derive(Default)]
struct Totals {
    patched: usize,
    unchanged: usize,
    not_found: usize,
    missing: usize,
    rejected: usize,
    failed_rules: usize,
}

impl Totals {
    fn record(&mut self, report: &FileReport) {
        match report.status {
            FileStatus::Patched => self.patched += 1,
            FileStatus::Unchanged => self.unchanged += 1,
            FileStatus::NotFound => self.not_found += 1,
            FileStatus::Missing => self.missing += 1,
            FileStatus::Rejected { .. } => self.rejected += 1,
        }
        self.failed_rules += report
            .rules
            .iter()
            .filter(|rule| rule.result.is_failure())
            .count();
    }
}

fn print_file_report(report: &FileReport, dry_run: bool) {
    let file = &report.file;
    match &report.status {
        FileStatus::Patched if dry_run => println!("{} {file}: Would patch", "✓".green()),
        FileStatus::Patched => println!("{} {file}: Patched", "✓".green()),
        FileStatus::Unchanged => println!("{} {file}: Already up to date", "⊙".yellow()),
        FileStatus::NotFound => println!("{} {file}: Pattern not found", "⊘".cyan()),
        FileStatus::Missing => eprintln!("{} {file}: File not found", "✗".red()),
        FileStatus::Rejected { reason } => eprintln!("{} {file}: Rejected ({reason})", "✗".red()),
    }

    for rule in &report.rules {
        match &rule.result {
            PatchResult::Applied => println!("    {} {}", "+".green(), rule.patch_id),
            PatchResult::NotFound => {
                println!("    {} {}: {}", "?".cyan(), rule.patch_id, "pattern not found".dimmed())
            }
            PatchResult::Failed { reason } => {
                eprintln!("    {} {}: Failed - {}", "✗".red(), rule.patch_id, reason)
            }
            PatchResult::AlreadyApplied | PatchResult::Skipped { .. } => {}
        }
    }
}

fn cmd_apply(
    dir: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let pages_dir = resolve_dir(dir)?;
    let configs = load_configs(patches)?;

    println!("Pages: {}", pages_dir.display());
    println!();

    let mut totals = Totals::default();
    for (label, config) in &configs {
        println!("Loading patches from {label}...");
        if config.patches.is_empty() {
            println!("{}", "  No patches found in file".yellow());
            continue;
        }

        let reports = if dry_run {
            println!("{}", "  [DRY RUN - nothing is written]".cyan());
            check_patches(config, &pages_dir)?
        } else {
            apply_patches(config, &pages_dir)?
        };

        for report in &reports {
            print_file_report(report, dry_run);
            if show_diff {
                if let Some((before, after)) = &report.change {
                    display_diff(&report.file, before, after);
                }
            }
            totals.record(report);
        }
        println!();
    }

    println!("{}", "Summary:".bold());
    let verb = if dry_run { "would be patched" } else { "patched" };
    println!("  {} {verb}", totals.patched.to_string().green());
    println!("  {} already up to date", totals.unchanged.to_string().yellow());
    println!("  {} pattern not found", totals.not_found.to_string().cyan());
    println!("  {} missing", totals.missing.to_string().red());
    if totals.rejected > 0 {
        println!("  {} rejected", totals.rejected.to_string().red());
    }
    println!("  {} failed rules", totals.failed_rules.to_string().red());

    if totals.failed_rules > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(dir: Option<PathBuf>, patches: Option<PathBuf>) -> Result<()> {
    let pages_dir = resolve_dir(dir)?;
    let configs = load_configs(patches)?;

    println!("{}", "Patch Status Report".bold());
    println!("Pages: {}", pages_dir.display());
    println!();

    let mut pending = Vec::new();
    let mut up_to_date = Vec::new();
    let mut problems = Vec::new();

    // Read-only; does not touch the pages
    for (_, config) in &configs {
        for report in check_patches(config, &pages_dir)? {
            let applying: Vec<&str> = report
                .rules
                .iter()
                .filter(|rule| rule.result == PatchResult::Applied)
                .map(|rule| rule.patch_id.as_str())
                .collect();
            match &report.status {
                FileStatus::Patched => pending.push((report.file.clone(), applying.join(", "))),
                FileStatus::Unchanged => up_to_date.push(report.file.clone()),
                other => problems.push((report.file.clone(), other.to_string())),
            }
        }
    }

    if !up_to_date.is_empty() {
        println!(
            "{} {} ({} files)",
            "✓".green(),
            "UP TO DATE".green().bold(),
            up_to_date.len()
        );
        for file in &up_to_date {
            println!("  - {file}");
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} files)",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for (file, rules) in &pending {
            println!("  - {} ({})", file, rules.dimmed());
        }
        println!();
    }

    if !problems.is_empty() {
        println!(
            "{} {} ({} files)",
            "⊘".cyan(),
            "NEEDS ATTENTION".cyan().bold(),
            problems.len()
        );
        for (file, reason) in &problems {
            println!("  - {} ({})", file, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn print_check_report(report: &CheckReport) {
    let evaluated = report.evaluated();
    println!(
        "{} ({}/{} files)",
        report.title.bold(),
        report.passed.len(),
        evaluated
    );
    if !report.not_applicable.is_empty() {
        println!(
            "  {}",
            format!("{} files not applicable", report.not_applicable.len()).dimmed()
        );
    }

    for failure in &report.failed {
        let mut missing: Vec<String> = failure.missing.iter().map(|p| format!("`{p}`")).collect();
        if failure.any_unmatched {
            missing.push(format!("one of `{}`", report.any.join("`, `")));
        }
        println!(
            "  {} {}: missing {}",
            "✗".red(),
            failure.file,
            missing.join(", ").dimmed()
        );
    }

    for failure in report.warnings() {
        println!(
            "  {} {} should have: {}",
            "⚠".yellow(),
            failure.file,
            report.title
        );
    }
    for file in &report.absent {
        println!("  {} {}: expected file not found", "⚠".yellow(), file);
    }
    println!();
}

fn cmd_verify(dir: Option<PathBuf>, patches: Option<PathBuf>) -> Result<()> {
    let pages_dir = resolve_dir(dir)?;
    let configs = load_configs(patches)?;

    println!("{}", "Verifying pages...".bold());
    println!("Pages: {}", pages_dir.display());
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut warnings = 0;

    for (_, config) in &configs {
        for report in verify(config, &pages_dir)? {
            print_check_report(&report);
            passed += report.passed.len();
            failed += report.failed.len();
            warnings += report.warnings().count() + report.absent.len();
        }
    }

    println!("{}", "Summary:".bold());
    println!("  {} passed", passed.to_string().green());
    println!("  {} failed", failed.to_string().red());
    println!("  {} warnings", warnings.to_string().yellow());

    // Informational only
    Ok(())
}

fn cmd_list(patches: Option<PathBuf>) -> Result<()> {
    for (label, config) in load_configs(patches)? {
        println!("{} ({})", config.meta.name.bold(), label.dimmed());
        if let Some(description) = &config.meta.description {
            println!("  {description}");
        }
        println!();

        if !config.dependencies.is_empty() {
            println!("{}", "Dependencies:".bold());
            for dep in &config.dependencies {
                let binding = dep.binding.as_deref().unwrap_or("-");
                println!(
                    "  {:<16} {} from '{}'  {}",
                    dep.id,
                    dep.import,
                    dep.module,
                    binding.dimmed()
                );
            }
            println!();
        }

        println!("{}", "Patches:".bold());
        for patch in &config.patches {
            let query = patch
                .query
                .as_ref()
                .map(|q| q.kind())
                .unwrap_or("-");
            let targets = if patch.files.is_empty() {
                "all files".to_string()
            } else {
                patch.files.join(", ")
            };
            println!(
                "  {:<24} {:<8} {:<14} {}",
                patch.id.cyan(),
                query,
                patch.operation.kind(),
                targets
            );
            if !patch.requires.is_empty() {
                println!("  {:<24} requires {}", "", patch.requires.join(", ").dimmed());
            }
        }
        println!();

        if !config.checks.is_empty() {
            println!("{}", "Checks:".bold());
            for check in &config.checks {
                println!("  {:<24} {}", check.id.cyan(), check.title());
            }
            println!();
        }
    }
    Ok(())
}
