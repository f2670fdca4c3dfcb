use std::cell::RefCell;
use std::path::Path;

use anyhow::Result;
use console::{Term, style};
use jiff::Timestamp;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::interpret::BackupOutputs;
use crate::jwt::Claims;
use crate::models::{
    CoverageSummary, CoverageVerdict, DeploymentReport, DeploymentResult, Metric, PlanSummary,
    Severity,
};
use crate::preflight::PreflightReport;

enum Sink {
    Term(Term),
    #[cfg(test)]
    Buffer(RefCell<Vec<String>>),
}

/// Console renderer. In JSON mode nothing is printed until [`Output::finish`],
/// which writes every recorded section as a single document.
pub struct Output {
    sink: Sink,
    json: bool,
    document: RefCell<Map<String, Value>>,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self {
            sink: Sink::Term(Term::stdout()),
            json,
            document: RefCell::default(),
        }
    }

    #[cfg(test)]
    pub fn buffered() -> Self {
        Self {
            sink: Sink::Buffer(RefCell::new(Vec::new())),
            json: false,
            document: RefCell::default(),
        }
    }

    #[cfg(test)]
    pub fn buffered_json() -> Self {
        Self {
            json: true,
            ..Self::buffered()
        }
    }

    #[cfg(test)]
    pub fn lines(&self) -> Vec<String> {
        match &self.sink {
            Sink::Buffer(lines) => lines.borrow().clone(),
            Sink::Term(_) => Vec::new(),
        }
    }

    fn write_line(&self, line: &str) -> Result<()> {
        match &self.sink {
            Sink::Term(term) => term.write_line(line)?,
            #[cfg(test)]
            Sink::Buffer(lines) => lines
                .borrow_mut()
                .push(console::strip_ansi_codes(line).to_string()),
        }
        Ok(())
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let output = serde_json::to_string_pretty(value)?;
        self.write_line(&output)
    }

    /// Sets a top-level field of the JSON document. No-op on the console.
    pub fn record<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        if self.json {
            let value = serde_json::to_value(value)?;
            self.document.borrow_mut().insert(key.to_string(), value);
        }
        Ok(())
    }

    fn append(&self, key: &str, value: Value) {
        let mut document = self.document.borrow_mut();
        let entry = document
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(value);
        }
    }

    /// Prints the recorded JSON document, if any.
    pub fn finish(&self) -> Result<()> {
        let document = std::mem::take(&mut *self.document.borrow_mut());
        if !self.json || document.is_empty() {
            return Ok(());
        }
        self.print_json(&Value::Object(document))
    }

    /// One leveled status line. Suppressed in JSON mode.
    pub fn status(&self, severity: Severity, message: &str) -> Result<()> {
        if self.json {
            return Ok(());
        }
        let tag = match severity {
            Severity::Info => style("[info]").cyan(),
            Severity::Warn => style("[warn]").yellow(),
            Severity::Error => style("[fail]").red().bold(),
            Severity::Success => style("[ ok ]").green(),
        };
        self.write_line(&format!("{tag} {message}"))
    }

    pub fn heading(&self, title: &str) -> Result<()> {
        if self.json {
            return Ok(());
        }
        self.write_line("")?;
        self.write_line(&style(title).bold().underlined().to_string())
    }

    pub fn preflight(&self, report: &PreflightReport) -> Result<()> {
        if self.json {
            return self.record(
                "preflight",
                &serde_json::json!({
                    "ready": report.is_ready(),
                    "checked": report.checked(),
                    "issues": report.issues(),
                }),
            );
        }
        if report.is_ready() {
            self.status(
                Severity::Success,
                &format!("all {} preconditions met", report.checked()),
            )
        } else {
            self.status(
                Severity::Error,
                &format!(
                    "{} of {} preconditions failed",
                    report.issues().len(),
                    report.checked()
                ),
            )
        }
    }

    pub fn plan(&self, plan: &PlanSummary) -> Result<()> {
        if self.json {
            return self.record("plan", plan);
        }

        self.heading("What-if summary")?;
        if plan.is_empty() {
            self.write_line("  No changes.")?;
        }
        for change in &plan.changes {
            let kind = match change.change_type.as_str() {
                "Create" => style(change.change_type.as_str()).green(),
                "Delete" => style(change.change_type.as_str()).red(),
                "Modify" => style(change.change_type.as_str()).yellow(),
                _ => style(change.change_type.as_str()).dim(),
            };
            self.write_line(&format!("  {kind:<10} {}", change.resource_id))?;
        }
        let counts: Vec<String> = plan
            .counts()
            .iter()
            .map(|(kind, n)| format!("{kind}: {n}"))
            .collect();
        if !counts.is_empty() {
            self.write_line(&format!("  {}", style(counts.join(", ")).dim()))?;
        }
        Ok(())
    }

    pub fn deployment(&self, result: &DeploymentResult, outputs: &BackupOutputs) -> Result<()> {
        if self.json {
            return self.record(
                "deployment",
                &serde_json::json!({
                    "result": result,
                    "outputs": outputs,
                    "warnings": outputs.warnings,
                }),
            );
        }

        self.heading("Deployment")?;
        self.write_line(&format!(
            "  Provisioning state: {}",
            style(&result.provisioning_state).cyan().bold()
        ))?;
        let rows = [
            ("Storage account", &outputs.storage_account),
            ("Key vault", &outputs.vault),
            ("Recovery vault", &outputs.recovery_vault),
            ("Log Analytics", &outputs.log_analytics_workspace),
        ];
        for (label, value) in rows {
            let shown = value
                .as_deref()
                .map_or_else(|| style("(not reported)").dim().to_string(), str::to_string);
            self.write_line(&format!("  {label}: {shown}"))?;
        }
        for warning in &outputs.warnings {
            self.status(Severity::Warn, warning)?;
        }
        Ok(())
    }

    fn metric_line(&self, metric: &Metric, threshold: f64) -> Result<()> {
        let verdict = if metric.passed {
            style("pass").green()
        } else {
            style("below threshold").red()
        };
        self.write_line(&format!(
            "  {:<7} {:>6.2}% (min {threshold:.2}%) {verdict}",
            format!("{}:", metric.name),
            metric.value
        ))
    }

    pub fn coverage(
        &self,
        label: &str,
        summary: &CoverageSummary,
        verdict: &CoverageVerdict,
    ) -> Result<()> {
        if self.json {
            self.append(
                "coverage",
                serde_json::json!({
                    "label": label,
                    "summary": summary,
                    "verdict": verdict,
                    "passed": verdict.passed(),
                }),
            );
            return Ok(());
        }

        self.heading(&format!("Coverage: {label}"))?;
        self.metric_line(&verdict.line, verdict.threshold)?;
        self.metric_line(&verdict.branch, verdict.threshold)?;
        if verdict.passed() {
            self.status(Severity::Success, "coverage threshold met")
        } else {
            self.status(Severity::Error, "coverage threshold not met")
        }
    }

    pub fn report_written(&self, path: &Path) -> Result<()> {
        if self.json {
            return self.record("report_path", &path.display().to_string());
        }
        self.status(
            Severity::Info,
            &format!("report written to {}", path.display()),
        )
    }

    pub fn report(&self, report: &DeploymentReport) -> Result<()> {
        if self.json {
            return self.print_json(report);
        }

        let status = style(report.status.as_ref());
        let status = match report.status {
            crate::models::ReportStatus::Failed => status.red(),
            _ => status.green(),
        };
        self.write_line(&format!(
            "{} {} [{}]",
            style(format!("{} report", report.kind.as_ref())).bold(),
            style(&report.run_id).cyan().bold(),
            status
        ))?;
        self.write_line(&format!("  Environment: {}", report.environment))?;
        self.write_line(&format!("  Timestamp: {}", report.timestamp))?;
        if !report.resource_group.is_empty() {
            self.write_line(&format!("  Resource group: {}", report.resource_group))?;
        }
        if !report.location.is_empty() {
            self.write_line(&format!("  Location: {}", report.location))?;
        }
        for (section, values) in &report.sections {
            self.write_line(&format!("  [{section}]"))?;
            if values.is_empty() {
                self.write_line(&format!("    {}", style("(empty)").dim()))?;
            }
            for (key, value) in values {
                self.write_line(&format!("    {key} = {value}"))?;
            }
        }
        Ok(())
    }

    pub fn claims(&self, claims: &Claims, now: Timestamp) -> Result<()> {
        if self.json {
            return self.print_json(claims);
        }

        let none = || style("(none)").dim().to_string();
        let field = |v: &Option<String>| v.clone().unwrap_or_else(none);
        self.write_line(&format!("Subject: {}", field(&claims.subject)))?;
        self.write_line(&format!("Email: {}", field(&claims.email)))?;
        let roles = if claims.roles.is_empty() {
            none()
        } else {
            claims.roles.join(", ")
        };
        self.write_line(&format!("Roles: {roles}"))?;
        self.write_line(&format!("Issuer: {}", field(&claims.issuer)))?;
        self.write_line(&format!("Audience: {}", field(&claims.audience)))?;
        match claims.expires_at {
            Some(exp) if claims.is_expired(now) => self.write_line(&format!(
                "Expires: {exp} {}",
                style("(expired)").red()
            ))?,
            Some(exp) => self.write_line(&format!("Expires: {exp}"))?,
            None => self.write_line(&format!("Expires: {}", none()))?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpret::evaluate;

    #[test]
    fn status_lines_are_tagged_by_severity() {
        let out = Output::buffered();
        out.status(Severity::Info, "starting").unwrap();
        out.status(Severity::Warn, "careful").unwrap();
        out.status(Severity::Error, "broken").unwrap();
        out.status(Severity::Success, "done").unwrap();
        assert_eq!(
            out.lines(),
            vec!["[info] starting", "[warn] careful", "[fail] broken", "[ ok ] done"]
        );
    }

    #[test]
    fn coverage_shows_each_metric_and_overall_result() {
        let out = Output::buffered();
        let summary = CoverageSummary::new(85.0, 72.0);
        out.coverage("backend", &summary, &evaluate(&summary, 80.0))
            .unwrap();
        let text = out.lines().join("\n");
        assert!(text.contains("line:    85.00% (min 80.00%) pass"));
        assert!(text.contains("branch:  72.00% (min 80.00%) below threshold"));
        assert!(text.contains("[fail] coverage threshold not met"));
    }

    // Everything recorded during one command comes out as one document.
    #[test]
    fn json_mode_prints_a_single_document() {
        let out = Output::buffered_json();
        let backend = CoverageSummary::new(85.0, 72.0);
        let frontend = CoverageSummary::new(90.0, 88.0);
        out.status(Severity::Info, "running tests").unwrap();
        out.coverage("backend", &backend, &evaluate(&backend, 80.0)).unwrap();
        out.coverage("frontend", &frontend, &evaluate(&frontend, 80.0)).unwrap();
        out.record("passed", &false).unwrap();
        out.report_written(Path::new("/tmp/r.json")).unwrap();
        assert!(out.lines().is_empty());

        out.finish().unwrap();
        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        let doc: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(doc["coverage"].as_array().unwrap().len(), 2);
        assert_eq!(doc["coverage"][1]["label"], "frontend");
        assert_eq!(doc["passed"], false);
        assert_eq!(doc["report_path"], "/tmp/r.json");
    }

    #[test]
    fn finish_is_silent_on_the_console() {
        let out = Output::buffered();
        out.record("passed", &true).unwrap();
        out.finish().unwrap();
        assert!(out.lines().is_empty());
    }
}
