//! Admin account checks. Only secret names are ever printed.

use anyhow::Result;

use crate::Context;
use crate::models::{Severity, ValidationIssue};
use crate::output::Output;
use crate::report::ExitStatus;
use crate::runner::CommandRunner;
use crate::secrets::require_secret;

const MIN_PASSWORD_LEN: usize = 12;

/// Development defaults that must never reach a deployed environment.
const WEAK_PASSWORDS: &[&str] = &[
    "admin",
    "admin123",
    "admin@123",
    "Admin123!",
    "Admin@123",
    "P@ssw0rd",
    "Password1!",
    "password",
    "changeme",
];

pub fn password_issues(password: &str) -> Vec<String> {
    let mut issues = Vec::new();
    if WEAK_PASSWORDS.iter().any(|w| w.eq_ignore_ascii_case(password)) {
        issues.push("admin password is a well-known development default".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        issues.push(format!(
            "admin password is shorter than {MIN_PASSWORD_LEN} characters"
        ));
    }
    issues
}

pub fn verify(
    ctx: &Context,
    runner: &dyn CommandRunner,
    environment: &str,
    out: &Output,
) -> Result<ExitStatus> {
    let env_config = ctx.config.environment(environment)?;
    let store = ctx.secret_store(runner)?;
    out.heading(&format!("Admin account: {environment}"))?;

    let mut issues = Vec::new();

    match require_secret(store.as_ref(), &env_config.admin_login_secret, environment) {
        Ok(_) => out.status(
            Severity::Success,
            &format!("{} resolved", env_config.admin_login_secret),
        )?,
        Err(e) => {
            out.status(Severity::Error, &e.to_string())?;
            issues.push(ValidationIssue::new(e.to_string()));
        }
    }

    match require_secret(store.as_ref(), &env_config.admin_password_secret, environment) {
        Ok(password) => {
            out.status(
                Severity::Success,
                &format!("{} resolved", env_config.admin_password_secret),
            )?;
            for issue in password_issues(password.expose()) {
                out.status(Severity::Error, &issue)?;
                issues.push(ValidationIssue::new(issue));
            }
        }
        Err(e) => {
            out.status(Severity::Error, &e.to_string())?;
            issues.push(ValidationIssue::new(e.to_string()));
        }
    }

    if issues.is_empty() {
        out.status(Severity::Success, "admin account configuration looks sound")?;
    }
    Ok(ExitStatus::from_passed(issues.is_empty()))
}
