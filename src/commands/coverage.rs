//! Coverage gates: run suites, locate their reports, compare with the threshold.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context as _, Result, anyhow};

use crate::Context;
use crate::error::DeckError;
use crate::interpret::{evaluate, merge, parse_coverage_file};
use crate::models::{CoverageSummary, Severity};
use crate::output::Output;
use crate::report::ExitStatus;
use crate::runner::{CommandRunner, Invocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Both,
    Backend,
    Frontend,
}

impl Scope {
    pub fn from_flags(backend_only: bool, frontend_only: bool) -> Self {
        match (backend_only, frontend_only) {
            (true, _) => Self::Backend,
            (_, true) => Self::Frontend,
            _ => Self::Both,
        }
    }
}

struct Suite<'a> {
    label: &'static str,
    command: &'a [String],
    report: Option<&'a str>,
    dir: PathBuf,
}

/// Evaluates an existing report. A missing or unreadable report is fatal.
pub fn check(report: &Path, threshold: f64, out: &Output) -> Result<ExitStatus> {
    if !report.is_file() {
        return Err(anyhow!("no coverage report found at {}", report.display()));
    }
    let summary = parse_coverage_file(report)?;
    let verdict = evaluate(&summary, threshold);
    out.coverage(&report.display().to_string(), &summary, &verdict)?;
    out.record("passed", &verdict.passed())?;
    Ok(ExitStatus::from_passed(verdict.passed()))
}

/// Newest file matching `pattern`, relative to `root`.
pub fn find_report(root: &Path, pattern: &str) -> Result<PathBuf> {
    let full = root.join(pattern);
    let full = full.to_string_lossy();
    let newest = glob::glob(&full)
        .with_context(|| format!("Invalid report pattern: {pattern}"))?
        .filter_map(std::result::Result::ok)
        .filter(|p| p.is_file())
        .max_by_key(|p| {
            p.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        });

    newest.ok_or_else(|| {
        DeckError::parse(
            "coverage output",
            format!("no coverage report found matching {pattern}"),
        )
        .into()
    })
}

fn run_suite(
    runner: &dyn CommandRunner,
    root: &Path,
    suite: &Suite<'_>,
    out: &Output,
) -> Result<CoverageSummary> {
    let (program, args) = suite
        .command
        .split_first()
        .ok_or_else(|| anyhow!("no {} coverage command configured", suite.label))?;
    let pattern = suite
        .report
        .ok_or_else(|| anyhow!("no {} coverage report pattern configured", suite.label))?;

    let invocation = Invocation::new(program.as_str())
        .args(args.iter().cloned())
        .current_dir(&suite.dir);
    out.status(Severity::Info, &format!("running {invocation}"))?;
    runner
        .run(&invocation)?
        .require_success(&format!("{} tests", suite.label))?;

    let path = find_report(root, pattern)?;
    out.status(Severity::Info, &format!("found {}", path.display()))?;
    Ok(parse_coverage_file(&path)?)
}

pub fn run(
    ctx: &Context,
    runner: &dyn CommandRunner,
    scope: Scope,
    threshold: f64,
    out: &Output,
) -> Result<ExitStatus> {
    let cfg = &ctx.config.coverage;
    let mut suites = Vec::new();
    if scope != Scope::Frontend {
        suites.push(Suite {
            label: "backend",
            command: &cfg.backend_command,
            report: cfg.backend_report.as_deref(),
            dir: ctx.root.clone(),
        });
    }
    if scope != Scope::Backend {
        suites.push(Suite {
            label: "frontend",
            command: &cfg.frontend_command,
            report: cfg.frontend_report.as_deref(),
            dir: cfg
                .frontend_dir
                .as_ref()
                .map_or_else(|| ctx.root.clone(), |d| ctx.root.join(d)),
        });
    }

    let mut summaries = Vec::new();
    let mut all_passed = true;
    for suite in &suites {
        let summary = run_suite(runner, &ctx.root, suite, out)?;
        let verdict = evaluate(&summary, threshold);
        out.coverage(suite.label, &summary, &verdict)?;
        all_passed &= verdict.passed();
        summaries.push(summary);
    }

    if summaries.len() > 1 {
        if let Some(combined) = merge(&summaries) {
            let verdict = evaluate(&combined, threshold);
            out.coverage("combined", &combined, &verdict)?;
        }
    }

    out.record("passed", &all_passed)?;
    Ok(ExitStatus::from_passed(all_passed))
}
