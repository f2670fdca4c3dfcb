//! Build the frontend and push it to the static-website container.

use anyhow::{Result, anyhow};

use crate::Context;
use crate::error::DeckError;
use crate::models::Severity;
use crate::output::Output;
use crate::preflight::{Check, Preflight};
use crate::report::ExitStatus;
use crate::runner::{CommandRunner, Invocation};

pub fn run(
    ctx: &Context,
    runner: &dyn CommandRunner,
    environment: &str,
    skip_build: bool,
    out: &Output,
) -> Result<ExitStatus> {
    let env_config = ctx.config.environment(environment)?;
    let publish = ctx.config.publish()?;
    let frontend_dir = ctx.root.join(&publish.frontend_dir);
    let dist_dir = ctx.root.join(&publish.dist_dir);

    out.heading(&format!("Publish frontend: {environment}"))?;
    let mut checks = vec![
        Check::tool("az"),
        Check::path(&frontend_dir),
        Check::azure_session(),
    ];
    if !skip_build {
        if let Some(program) = publish.build_command.first() {
            checks.insert(1, Check::tool(program));
        }
    }
    let preflight = Preflight::new(runner, ctx.path_var.clone(), &ctx.root).evaluate(&checks, out)?;
    out.preflight(&preflight)?;
    preflight.into_result()?;

    if skip_build {
        out.status(Severity::Info, "skipping build")?;
    } else {
        let (program, args) = publish
            .build_command
            .split_first()
            .ok_or_else(|| anyhow!("[publish] build_command is empty"))?;
        let build = Invocation::new(program.as_str())
            .args(args.iter().cloned())
            .current_dir(&frontend_dir)
            .env("NODE_ENV", "production");
        out.status(Severity::Info, &format!("building: {build}"))?;
        runner.run(&build)?.require_success("frontend build")?;
        out.status(Severity::Success, "build finished")?;
    }

    if !dist_dir.is_dir() {
        return Err(DeckError::PreconditionFailure(vec![format!(
            "build output missing: {}",
            dist_dir.display()
        )])
        .into());
    }

    let upload = Invocation::new("az")
        .args(["storage", "blob", "upload-batch"])
        .args(["--account-name", env_config.storage_account.as_str()])
        .args(["--destination", publish.container.as_str()])
        .arg("--source")
        .arg(dist_dir.display().to_string())
        .args(["--overwrite", "--auth-mode", "login", "-o", "none"]);
    out.status(
        Severity::Info,
        &format!(
            "uploading to {}/{}",
            env_config.storage_account, publish.container
        ),
    )?;
    runner.run(&upload)?.require_success("az storage blob upload-batch")?;
    out.status(Severity::Success, "assets uploaded")?;

    if let (Some(profile), Some(endpoint)) = (&env_config.cdn_profile, &env_config.cdn_endpoint) {
        let purge = Invocation::new("az")
            .args(["cdn", "endpoint", "purge"])
            .args(["--resource-group", env_config.resource_group.as_str()])
            .args(["--profile-name", profile.as_str()])
            .args(["--name", endpoint.as_str()])
            .args(["--content-paths", "/*", "-o", "none"]);
        runner.run(&purge)?.require_success("az cdn endpoint purge")?;
        out.status(Severity::Success, &format!("purged CDN endpoint {endpoint}"))?;
    } else {
        out.status(Severity::Warn, "no CDN endpoint configured; cache not purged")?;
    }

    Ok(ExitStatus::Success)
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::commands::testing::{DEV_CONFIG, context};
    use crate::runner::testing::FakeRunner;

    fn install_tools(ctx: &mut Context, tools: &[&str]) {
        let bin = ctx.root.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        for tool in tools {
            let path = bin.join(tool);
            std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        ctx.path_var = Some(bin.into_os_string());
        std::fs::create_dir_all(ctx.root.join("frontend/dist")).unwrap();
    }

    #[test]
    fn builds_uploads_and_purges() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_tools(&mut ctx, &["az", "npm"]);
        let runner = FakeRunner::new();

        run(&ctx, &runner, "dev", false, &Output::buffered()).unwrap();

        let lines = runner.command_lines();
        // session probe, build, upload, purge
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "npm run build");
        assert!(lines[2].starts_with("az storage blob upload-batch --account-name stbackup01 --destination $web"));
        assert!(lines[3].contains("--profile-name cdn-app --name app-dev"));
    }

    #[test]
    fn skip_build_does_not_require_npm() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_tools(&mut ctx, &["az"]);
        let runner = FakeRunner::new();

        run(&ctx, &runner, "dev", true, &Output::buffered()).unwrap();
        assert!(!runner.command_lines().iter().any(|l| l.starts_with("npm")));
    }

    // Without a dist directory nothing is uploaded.
    #[test]
    fn missing_dist_aborts_before_upload() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_tools(&mut ctx, &["az"]);
        std::fs::remove_dir(ctx.root.join("frontend/dist")).unwrap();
        let runner = FakeRunner::new();

        let err = run(&ctx, &runner, "dev", true, &Output::buffered()).unwrap_err();
        assert!(err.to_string().contains("build output missing"));
        assert!(!runner.command_lines().iter().any(|l| l.contains("upload-batch")));
    }

    #[test]
    fn failed_build_is_fatal() {
        let (_dir, mut ctx) = context(DEV_CONFIG, &[]);
        install_tools(&mut ctx, &["az", "npm"]);
        let runner = FakeRunner::new().fail("npm run build", "tsc: 3 errors");

        let err = run(&ctx, &runner, "dev", false, &Output::buffered()).unwrap_err();
        assert!(err.to_string().contains("frontend build failed"));
    }
}
