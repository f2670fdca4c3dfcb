//! CI/CD pipeline validation: files, tools, and an optional template build.

use std::path::PathBuf;

use anyhow::Result;
use jiff::Timestamp;

use crate::Context;
use crate::id::generate_id;
use crate::models::{DeploymentReport, ReportKind, ReportStatus, Severity, ValidationIssue};
use crate::output::Output;
use crate::preflight::{Check, Preflight};
use crate::report::{ExitStatus, write_report};
use crate::runner::{CommandRunner, Invocation};

pub fn run(
    ctx: &Context,
    runner: &dyn CommandRunner,
    environment: Option<&str>,
    report_dir: Option<PathBuf>,
    out: &Output,
) -> Result<ExitStatus> {
    let pipeline = &ctx.config.pipeline;
    let mut report = DeploymentReport::new(
        generate_id(),
        ReportKind::Validation,
        ReportStatus::Succeeded,
        Timestamp::now(),
        environment.unwrap_or("all"),
    );

    out.heading("Pipeline files and tools")?;
    let checks: Vec<Check> = pipeline
        .files
        .iter()
        .map(|f| Check::path(ctx.root.join(f)))
        .chain(pipeline.tools.iter().map(|t| Check::tool(t)))
        .collect();
    let preflight = Preflight::new(runner, ctx.path_var.clone(), &ctx.root).evaluate(&checks, out)?;
    let mut issues: Vec<ValidationIssue> = preflight.issues().to_vec();

    for file in &pipeline.files {
        let path = ctx.root.join(file);
        let state = match std::fs::metadata(&path) {
            Ok(meta) if meta.len() == 0 => {
                let issue = ValidationIssue::new(format!("pipeline file is empty: {}", file.display()));
                out.status(Severity::Error, issue.message())?;
                issues.push(issue);
                "empty"
            }
            Ok(_) => "present",
            Err(_) => "missing",
        };
        report.set("pipeline", &file.display().to_string(), state);
    }
    for tool in &pipeline.tools {
        let found = !preflight
            .issues()
            .iter()
            .any(|i| i.message() == format!("{tool} not found on PATH"));
        report.set("tools", tool, if found { "found" } else { "missing" });
    }

    if let Some(name) = environment {
        let env_config = ctx.config.environment(name)?;
        out.heading(&format!("Infrastructure template: {name}"))?;
        let template = ctx.root.join(&env_config.template);
        let build = Invocation::new("az")
            .args(["bicep", "build", "--stdout", "--file"])
            .arg(template.display().to_string());
        let compiled = match runner.run(&build) {
            Ok(output) if output.success() => {
                out.status(Severity::Success, &format!("{} compiles", template.display()))?;
                "compiles"
            }
            Ok(output) => {
                let issue = ValidationIssue::new(format!(
                    "template {} does not compile: {}",
                    template.display(),
                    output.error_text()
                ));
                out.status(Severity::Error, issue.message())?;
                issues.push(issue);
                "error"
            }
            Err(e) => {
                let issue = ValidationIssue::new(format!("template check could not run: {e}"));
                out.status(Severity::Error, issue.message())?;
                issues.push(issue);
                "unchecked"
            }
        };
        report.set("template", &env_config.template.display().to_string(), compiled);
    }

    if !issues.is_empty() {
        report.status = ReportStatus::Failed;
        for (i, issue) in issues.iter().enumerate() {
            report.set("issues", &format!("{:02}", i + 1), issue.message());
        }
    }

    let path = write_report(&ctx.reports_dir(report_dir), &report)?;
    out.report_written(&path)?;

    if issues.is_empty() {
        out.status(Severity::Success, "pipeline validation passed")?;
    } else {
        out.status(
            Severity::Error,
            &format!("pipeline validation failed with {} issue(s)", issues.len()),
        )?;
    }
    Ok(ExitStatus::from_passed(issues.is_empty()))
}
