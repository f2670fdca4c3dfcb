//! Precondition checks run before touching any external system.
//!
//! Every check is evaluated even after one fails, so the user sees the whole
//! list of problems in a single run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::EnvironmentConfig;
use crate::error::DeckError;
use crate::models::{Severity, ValidationIssue};
use crate::output::Output;
use crate::runner::{CommandRunner, Invocation};
use crate::secrets::SecretStore;

#[derive(Debug, Clone)]
pub enum Check {
    /// Executable resolvable on PATH.
    Tool(String),
    /// File or directory that must exist.
    Path(PathBuf),
    /// Secret that must resolve to a non-blank value.
    Secret(String),
    /// A CLI session that must already be authenticated.
    Session { label: String, probe: Invocation },
}

impl Check {
    pub fn tool(name: &str) -> Self {
        Self::Tool(name.to_string())
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn secret(name: &str) -> Self {
        Self::Secret(name.to_string())
    }

    pub fn azure_session() -> Self {
        Self::Session {
            label: "Azure CLI session".to_string(),
            probe: Invocation::new("az").args(["account", "show", "-o", "none"]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    checked: usize,
    issues: Vec<ValidationIssue>,
}

impl PreflightReport {
    pub fn is_ready(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn checked(&self) -> usize {
        self.checked
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_result(self) -> crate::error::Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        Err(DeckError::PreconditionFailure(
            self.issues.into_iter().map(|i| i.message().to_string()).collect(),
        ))
    }
}

pub struct Preflight<'a> {
    runner: &'a dyn CommandRunner,
    store: Option<&'a dyn SecretStore>,
    path_var: Option<OsString>,
    cwd: PathBuf,
}

impl<'a> Preflight<'a> {
    pub fn new(runner: &'a dyn CommandRunner, path_var: Option<OsString>, cwd: &Path) -> Self {
        Self {
            runner,
            store: None,
            path_var,
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn with_store(mut self, store: &'a dyn SecretStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn evaluate(&self, checks: &[Check], out: &Output) -> Result<PreflightReport> {
        let mut report = PreflightReport::default();

        for check in checks {
            report.checked += 1;
            match self.evaluate_one(check) {
                Ok(detail) => out.status(Severity::Success, &detail)?,
                Err(issue) => {
                    out.status(Severity::Error, issue.message())?;
                    report.issues.push(issue);
                }
            }
        }

        tracing::info!(
            checked = report.checked,
            issues = report.issues.len(),
            "preflight finished"
        );
        Ok(report)
    }

    fn evaluate_one(&self, check: &Check) -> std::result::Result<String, ValidationIssue> {
        match check {
            Check::Tool(name) => which::which_in(name, self.path_var.as_ref(), &self.cwd)
                .map(|path| format!("{name} found at {}", path.display()))
                .map_err(|_| ValidationIssue::new(format!("{name} not found on PATH"))),
            Check::Path(path) => {
                if path.exists() {
                    Ok(format!("{} exists", path.display()))
                } else {
                    Err(ValidationIssue::new(format!(
                        "required path missing: {}",
                        path.display()
                    )))
                }
            }
            Check::Secret(name) => {
                let Some(store) = self.store else {
                    return Err(ValidationIssue::new(format!(
                        "secret {name} cannot be checked: no secret store configured"
                    )));
                };
                match store.get(name) {
                    Ok(Some(value)) if !value.is_blank() => {
                        Ok(format!("secret {name} resolvable from {}", store.describe()))
                    }
                    Ok(_) => Err(ValidationIssue::new(format!(
                        "secret {name} not found in {}",
                        store.describe()
                    ))),
                    Err(e) => Err(ValidationIssue::new(format!(
                        "secret {name} could not be read: {e}"
                    ))),
                }
            }
            Check::Session { label, probe } => match self.runner.run(probe) {
                Ok(output) if output.success() => Ok(format!("{label} authenticated")),
                Ok(_) | Err(_) => Err(ValidationIssue::new(format!(
                    "{label} not authenticated (probe: {probe})"
                ))),
            },
        }
    }
}

/// Preconditions for a backup/DR deployment into one environment.
pub fn deploy_checks(config: &EnvironmentConfig, root: &Path) -> Vec<Check> {
    vec![
        Check::tool("az"),
        Check::path(root.join(&config.template)),
        Check::secret(&config.admin_login_secret),
        Check::secret(&config.admin_password_secret),
        Check::azure_session(),
    ]
}
