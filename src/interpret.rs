//! Turns raw provider output and coverage documents into summaries.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DeckError, Result};
use crate::models::{CoverageSummary, CoverageVerdict, DeploymentResult, Metric};

pub const STORAGE_ACCOUNT_OUTPUT: &str = "storageAccountName";
pub const VAULT_OUTPUT: &str = "vaultName";
pub const RECOVERY_VAULT_OUTPUT: &str = "recoveryVaultName";
pub const WORKSPACE_OUTPUT: &str = "logAnalyticsWorkspaceName";

/// Named outputs of the backup/DR template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackupOutputs {
    pub storage_account: Option<String>,
    pub vault: Option<String>,
    pub recovery_vault: Option<String>,
    pub log_analytics_workspace: Option<String>,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl BackupOutputs {
    /// Missing outputs produce warnings; none of them is fatal.
    pub fn from_result(result: &DeploymentResult) -> Self {
        let mut warnings = Vec::new();
        let mut take = |name: &str, optional: bool| {
            let value = result.output(name).map(str::to_string);
            if value.is_none() {
                let kind = if optional { "optional" } else { "expected" };
                warnings.push(format!("{kind} output '{name}' missing from deployment"));
            }
            value
        };

        let storage_account = take(STORAGE_ACCOUNT_OUTPUT, false);
        let vault = take(VAULT_OUTPUT, false);
        let recovery_vault = take(RECOVERY_VAULT_OUTPUT, true);
        let log_analytics_workspace = take(WORKSPACE_OUTPUT, true);

        Self {
            storage_account,
            vault,
            recovery_vault,
            log_analytics_workspace,
            warnings,
        }
    }
}

static COBERTURA_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<coverage\b[^>]*>").expect("static regex"));
static LINE_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bline-rate="([0-9.eE+-]+)""#).expect("static regex"));
static BRANCH_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bbranch-rate="([0-9.eE+-]+)""#).expect("static regex"));

fn percent(fraction: f64) -> f64 {
    (fraction * 10_000.0).round() / 100.0
}

/// Reads a Cobertura XML or Istanbul `coverage-summary.json` document.
pub fn parse_coverage_file(path: &Path) -> Result<CoverageSummary> {
    let content = std::fs::read_to_string(path)?;
    let what = path.display().to_string();
    if path.extension().is_some_and(|e| e == "json") {
        parse_istanbul(&content).map_err(|e| DeckError::parse(what, e))
    } else {
        parse_cobertura(&content).map_err(|e| DeckError::parse(what, e))
    }
}

pub fn parse_cobertura(xml: &str) -> std::result::Result<CoverageSummary, String> {
    let root = COBERTURA_ROOT
        .find(xml)
        .ok_or_else(|| "no <coverage> element".to_string())?
        .as_str();

    let rate = |re: &Regex, name: &str| -> std::result::Result<f64, String> {
        let raw = re
            .captures(root)
            .and_then(|c| c.get(1))
            .ok_or_else(|| format!("missing {name} attribute"))?
            .as_str();
        raw.parse::<f64>()
            .map(percent)
            .map_err(|e| format!("invalid {name} '{raw}': {e}"))
    };

    Ok(CoverageSummary::new(
        rate(&LINE_RATE, "line-rate")?,
        rate(&BRANCH_RATE, "branch-rate")?,
    ))
}

pub fn parse_istanbul(json: &str) -> std::result::Result<CoverageSummary, String> {
    let doc: Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let total = doc
        .get("total")
        .ok_or_else(|| "missing 'total' summary".to_string())?;

    // Istanbul reports "Unknown" when there is nothing to cover.
    let pct = |name: &str| -> std::result::Result<f64, String> {
        match total.get(name).and_then(|m| m.get("pct")) {
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| format!("invalid {name}.pct")),
            Some(Value::String(s)) if s == "Unknown" => Ok(100.0),
            _ => Err(format!("missing total.{name}.pct")),
        }
    };

    Ok(CoverageSummary::new(pct("lines")?, pct("branches")?))
}

/// Both rates must meet or exceed the threshold for the verdict to pass.
pub fn evaluate(summary: &CoverageSummary, threshold: f64) -> CoverageVerdict {
    let metric = |name: &str, value: f64| Metric {
        name: name.to_string(),
        value,
        passed: value >= threshold,
    };
    CoverageVerdict {
        threshold,
        line: metric("line", summary.line_rate),
        branch: metric("branch", summary.branch_rate),
    }
}

/// Averages several summaries into one, e.g. backend and frontend.
pub fn merge(summaries: &[CoverageSummary]) -> Option<CoverageSummary> {
    if summaries.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = summaries.len() as f64;
    let line = summaries.iter().map(|s| s.line_rate).sum::<f64>() / n;
    let branch = summaries.iter().map(|s| s.branch_rate).sum::<f64>() / n;
    Some(CoverageSummary::new(
        (line * 100.0).round() / 100.0,
        (branch * 100.0).round() / 100.0,
    ))
}
