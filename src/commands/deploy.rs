//! Backup / disaster-recovery deployment pipeline:
//! preflight, secret resolution, provider call, interpretation, report.

use std::path::{Path, PathBuf};

use anyhow::Result;
use jiff::Timestamp;

use crate::Context;
use crate::config::EnvironmentConfig;
use crate::id::generate_id;
use crate::interpret::{
    BackupOutputs, RECOVERY_VAULT_OUTPUT, STORAGE_ACCOUNT_OUTPUT, VAULT_OUTPUT, WORKSPACE_OUTPUT,
};
use crate::models::{
    DeploymentReport, DeploymentRequest, DeploymentResult, ReportKind, ReportStatus, Severity,
};
use crate::output::Output;
use crate::preflight::{Preflight, deploy_checks};
use crate::provider::{AzCliProvider, Mode, Outcome, ProvisioningProvider, invoke};
use crate::report::{ExitStatus, write_report};
use crate::runner::SystemRunner;
use crate::secrets::{SecretStore, resolve_request};

pub struct Pipeline<'a> {
    pub environment: &'a str,
    pub config: &'a EnvironmentConfig,
    pub root: &'a Path,
    pub preflight: Preflight<'a>,
    pub store: &'a dyn SecretStore,
    pub provider: &'a dyn ProvisioningProvider,
    pub mode: Mode,
    pub report_dir: PathBuf,
}

#[derive(Debug)]
pub struct DeployOutcome {
    pub status: ExitStatus,
    pub report_path: Option<PathBuf>,
}

pub fn run(
    ctx: &Context,
    environment: &str,
    what_if: bool,
    report_dir: Option<PathBuf>,
    out: &Output,
) -> Result<ExitStatus> {
    let runner = SystemRunner;
    let env_config = ctx.config.environment(environment)?;
    let store = ctx.secret_store(&runner)?;
    let provider = AzCliProvider::new(&runner);

    let pipeline = Pipeline {
        environment,
        config: env_config,
        root: &ctx.root,
        preflight: Preflight::new(&runner, ctx.path_var.clone(), &ctx.root)
            .with_store(store.as_ref()),
        store: store.as_ref(),
        provider: &provider,
        mode: if what_if { Mode::DryRun } else { Mode::Apply },
        report_dir: ctx.reports_dir(report_dir),
    };

    Ok(execute(&pipeline, out)?.status)
}

/// Runs every stage in order. Any stage error aborts the remaining ones.
pub fn execute(pipeline: &Pipeline<'_>, out: &Output) -> Result<DeployOutcome> {
    out.heading(&format!("Preflight: {}", pipeline.environment))?;
    let checks = deploy_checks(pipeline.config, pipeline.root);
    let preflight = pipeline.preflight.evaluate(&checks, out)?;
    out.preflight(&preflight)?;
    preflight.into_result()?;

    let request = resolve_request(
        pipeline.environment,
        pipeline.config,
        pipeline.root,
        pipeline.store,
    )?;
    out.status(
        Severity::Info,
        &format!(
            "resolved {} and {} from {}",
            pipeline.config.admin_login_secret,
            pipeline.config.admin_password_secret,
            pipeline.store.describe()
        ),
    )?;

    let verb = match pipeline.mode {
        Mode::DryRun => "planning",
        Mode::Apply => "deploying",
    };
    out.status(
        Severity::Info,
        &format!(
            "{verb} {} into {} ({})",
            request.deployment_name(),
            request.resource_group(),
            request.location()
        ),
    )?;

    match invoke(pipeline.provider, &request, pipeline.mode)? {
        Outcome::Planned(plan) => {
            out.plan(&plan)?;
            out.status(Severity::Success, "what-if completed; nothing was changed")?;
            Ok(DeployOutcome {
                status: ExitStatus::Success,
                report_path: None,
            })
        }
        Outcome::Applied(result) => {
            let outputs = BackupOutputs::from_result(&result);
            out.deployment(&result, &outputs)?;

            let report = build_report(&request, &result, pipeline.store, Timestamp::now());
            let path = write_report(&pipeline.report_dir, &report)?;
            out.report_written(&path)?;
            out.status(Severity::Success, "deployment succeeded")?;

            Ok(DeployOutcome {
                status: ExitStatus::Success,
                report_path: Some(path),
            })
        }
    }
}

/// Lays provider outputs out in the fixed report sections. Secret values
/// never appear; only where they came from.
pub fn build_report(
    request: &DeploymentRequest,
    result: &DeploymentResult,
    store: &dyn SecretStore,
    timestamp: Timestamp,
) -> DeploymentReport {
    let status = if result.succeeded {
        ReportStatus::Succeeded
    } else {
        ReportStatus::Failed
    };
    let mut report = DeploymentReport::new(
        generate_id(),
        ReportKind::Deployment,
        status,
        timestamp,
        request.environment(),
    )
    .with_resource(request.resource_group(), request.location());

    report.set("security", VAULT_OUTPUT, result.output(VAULT_OUTPUT).unwrap_or(request.vault_name()));
    report.set("security", "adminCredentialsSource", store.describe());
    report.set(
        "backup",
        STORAGE_ACCOUNT_OUTPUT,
        result
            .output(STORAGE_ACCOUNT_OUTPUT)
            .unwrap_or(request.storage_account()),
    );
    if let Some(vault) = result.output(RECOVERY_VAULT_OUTPUT) {
        report.set("backup", RECOVERY_VAULT_OUTPUT, vault);
    }
    if let Some(workspace) = result.output(WORKSPACE_OUTPUT) {
        report.set("monitoring", WORKSPACE_OUTPUT, workspace);
    }
    report.set("monitoring", "provisioningState", result.provisioning_state.clone());
    for (key, value) in request.tags() {
        report.set("security", &format!("tag:{key}"), value.clone());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{DEV_CONFIG, context};
    use crate::error::DeckError;
    use crate::provider::testing::FakeProvider;
    use crate::report::read_report;
    use crate::runner::testing::FakeRunner;
    use crate::secrets::testing::full_store;
    use crate::secrets::MemorySecretStore;

    #[cfg(unix)]
    fn install_fake_az(ctx: &mut Context) {
        use std::os::unix::fs::PermissionsExt;

        let bin = ctx.root.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let az = bin.join("az");
        std::fs::write(&az, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&az, std::fs::Permissions::from_mode(0o755)).unwrap();
        ctx.path_var = Some(bin.into_os_string());
        std::fs::create_dir_all(ctx.root.join("infra")).unwrap();
        std::fs::write(ctx.root.join("infra/backup.bicep"), "param location string").unwrap();
    }

    fn pipeline<'a>(
        ctx: &'a Context,
        runner: &'a FakeRunner,
        store: &'a MemorySecretStore,
        provider: &'a FakeProvider,
        mode: Mode,
    ) -> Pipeline<'a> {
        Pipeline {
            environment: "dev",
            config: ctx.config.environment("dev").unwrap(),
            root: &ctx.root,
            preflight: Preflight::new(runner, ctx.path_var.clone(), &ctx.root).with_store(store),
            store,
            provider,
            mode,
            report_dir: ctx.reports_dir(None),
        }
    }

    // A succeeded apply writes a report carrying the outputs verbatim.
    #[cfg(unix)]
    #[test]
    fn apply_writes_report_with_outputs() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_fake_az(&mut ctx);
        let runner = FakeRunner::new();
        let store = full_store();
        let provider =
            FakeProvider::succeeding(&[("storageAccountName", "stbackup01"), ("vaultName", "kv-backup")]);

        let out = Output::buffered();
        let outcome = execute(&pipeline(&ctx, &runner, &store, &provider, Mode::Apply), &out).unwrap();

        assert_eq!(outcome.status, ExitStatus::Success);
        assert_eq!(outcome.status.code(), 0);
        let report = read_report(&outcome.report_path.unwrap()).unwrap();
        assert_eq!(report.status, ReportStatus::Succeeded);
        assert_eq!(report.get("backup", "storageAccountName"), Some("stbackup01"));
        assert_eq!(report.get("security", "vaultName"), Some("kv-backup"));
        assert_eq!(provider.applies.get(), 1);

        let text = out.lines().join("\n");
        assert!(!text.contains("correct-horse-battery"));
        assert!(text.contains("[warn] optional output 'recoveryVaultName' missing"));
    }

    #[cfg(unix)]
    #[test]
    fn what_if_plans_without_report() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_fake_az(&mut ctx);
        let runner = FakeRunner::new();
        let store = full_store();
        let provider = FakeProvider::succeeding(&[]);

        let outcome = execute(
            &pipeline(&ctx, &runner, &store, &provider, Mode::DryRun),
            &Output::buffered(),
        )
        .unwrap();

        assert!(outcome.report_path.is_none());
        assert_eq!(provider.plans.get(), 1);
        assert_eq!(provider.applies.get(), 0);
        assert!(!ctx.reports_dir(None).exists());
    }

    // Preflight, plan and outcome land in one JSON document.
    #[cfg(unix)]
    #[test]
    fn apply_json_is_one_document() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_fake_az(&mut ctx);
        let runner = FakeRunner::new();
        let store = full_store();
        let provider = FakeProvider::succeeding(&[("storageAccountName", "stbackup01")]);

        let out = Output::buffered_json();
        let outcome = execute(&pipeline(&ctx, &runner, &store, &provider, Mode::Apply), &out).unwrap();
        out.finish().unwrap();

        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        let doc: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(doc["preflight"]["ready"], true);
        assert_eq!(doc["deployment"]["outputs"]["storage_account"], "stbackup01");
        assert_eq!(
            doc["report_path"],
            outcome.report_path.unwrap().display().to_string()
        );
    }

    // Failed preconditions stop the pipeline before the provider is called.
    #[test]
    fn preflight_failure_aborts_before_provider() {
        let (_dir, ctx) = context(DEV_CONFIG, &[]);
        let runner = FakeRunner::new();
        let store = MemorySecretStore::new();
        let provider = FakeProvider::succeeding(&[]);

        let err = execute(
            &pipeline(&ctx, &runner, &store, &provider, Mode::Apply),
            &Output::buffered(),
        )
        .unwrap_err();

        match err.downcast_ref::<DeckError>() {
            Some(DeckError::PreconditionFailure(issues)) => assert_eq!(issues.len(), 4),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.plans.get() + provider.applies.get(), 0);
    }

    // A provider failure aborts report generation.
    #[cfg(unix)]
    #[test]
    fn provider_failure_writes_no_report() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_fake_az(&mut ctx);
        let runner = FakeRunner::new();
        let store = full_store();
        let provider = FakeProvider::with_result(Err("conflict".to_string()));

        let result = execute(
            &pipeline(&ctx, &runner, &store, &provider, Mode::Apply),
            &Output::buffered(),
        );
        assert!(result.is_err());
        assert!(!ctx.reports_dir(None).exists());
    }

    #[test]
    fn report_falls_back_to_requested_names() {
        let request = crate::secrets::testing::request();
        let result = DeploymentResult::new("Succeeded", Default::default());
        let report = build_report(&request, &result, &full_store(), Timestamp::UNIX_EPOCH);
        assert_eq!(report.get("backup", "storageAccountName"), Some("stbackup01"));
        assert_eq!(report.get("security", "vaultName"), Some("kv-backup"));
        assert_eq!(report.get("security", "tag:owner"), Some("platform"));
        assert_eq!(report.get("monitoring", "provisioningState"), Some("Succeeded"));
        assert_eq!(report.resource_group, "rg-app-dev");
    }
}
