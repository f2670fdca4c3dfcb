//! Persisted run reports and the process exit contract.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::models::DeploymentReport;

/// Atomically write content to a file using a temporary file + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp = path.with_extension("tmp");
    let mut file = File::create(&temp)
        .with_context(|| format!("Failed to create temporary file: {}", temp.display()))?;
    file.lock_exclusive()
        .context("Failed to acquire file lock")?;
    file.write_all(content)
        .context("Failed to write file content")?;
    file.sync_all().context("Failed to sync file")?;
    file.unlock().context("Failed to unlock file")?;
    fs::rename(&temp, path).with_context(|| format!("Failed to rename to {}", path.display()))?;
    Ok(())
}

/// `deployment-report-<env>-<YYYYmmdd-HHMMSS>.json`. A second report in the
/// same second gets its run id appended by [`write_report`].
pub fn report_file_name(report: &DeploymentReport) -> String {
    let stamp = report.timestamp.strftime("%Y%m%d-%H%M%S");
    format!(
        "{}-report-{}-{stamp}.json",
        report.kind.as_ref(),
        report.environment
    )
}

pub fn write_report(dir: &Path, report: &DeploymentReport) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;
    let name = report_file_name(report);
    let mut path = dir.join(&name);
    // Same kind, environment and second: keep both records.
    if path.exists() {
        let stem = name.trim_end_matches(".json");
        path = dir.join(format!("{stem}-{}.json", report.run_id));
    }
    if path.exists() {
        anyhow::bail!("Report already exists: {}", path.display());
    }
    let content = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    atomic_write(&path, content.as_bytes())?;
    tracing::info!(path = %path.display(), "report written");
    Ok(path)
}

pub fn read_report(path: &Path) -> Result<DeploymentReport> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse report: {}", path.display()))
}

/// Strict binary exit contract consumed by CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed { Self::Success } else { Self::Failure }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}
