//! Drop and rebuild a database from its EF Core migrations.

use anyhow::{Result, bail};

use crate::Context;
use crate::config::DatabaseConfig;
use crate::models::Severity;
use crate::output::Output;
use crate::preflight::{Check, Preflight};
use crate::report::ExitStatus;
use crate::runner::{CommandRunner, Invocation};
use crate::secrets::{SecretValue, require_secret};

#[derive(Debug, Clone, Copy, Default)]
pub struct RecreateOptions {
    pub force: bool,
    pub seed: bool,
}

fn is_protected(environment: &str) -> bool {
    environment.to_ascii_lowercase().starts_with("prod")
}

fn ef(ctx: &Context, db: &DatabaseConfig, connection: &SecretValue, verb: &[&str]) -> Invocation {
    let mut invocation = Invocation::new("dotnet")
        .args(["ef", "database"])
        .args(verb.iter().copied())
        .arg("--project")
        .arg(ctx.root.join(&db.project).display().to_string());
    if let Some(startup) = &db.startup_project {
        invocation = invocation
            .arg("--startup-project")
            .arg(ctx.root.join(startup).display().to_string());
    }
    invocation
        .current_dir(&ctx.root)
        .env(&db.connection_env, connection.expose())
}

pub fn recreate(
    ctx: &Context,
    runner: &dyn CommandRunner,
    environment: &str,
    options: RecreateOptions,
    out: &Output,
) -> Result<ExitStatus> {
    let env_config = ctx.config.environment(environment)?;
    let db = ctx.config.database()?;

    if is_protected(environment) && !options.force {
        bail!("Refusing to drop the {environment} database without --force");
    }

    let store = ctx.secret_store(runner)?;
    out.heading(&format!("Database recreate: {environment}"))?;
    let mut checks = vec![
        Check::tool("dotnet"),
        Check::path(ctx.root.join(&db.project)),
        Check::secret(&env_config.connection_string_secret),
    ];
    if options.seed {
        checks.push(Check::tool(
            ctx.config.seed()?.command.first().map_or("", String::as_str),
        ));
    }
    let preflight = Preflight::new(runner, ctx.path_var.clone(), &ctx.root)
        .with_store(store.as_ref())
        .evaluate(&checks, out)?;
    out.preflight(&preflight)?;
    preflight.into_result()?;

    let connection = require_secret(
        store.as_ref(),
        &env_config.connection_string_secret,
        environment,
    )?;

    out.status(Severity::Warn, "dropping database")?;
    runner
        .run(&ef(ctx, db, &connection, &["drop", "--force"]))?
        .require_success("dotnet ef database drop")?;
    out.status(Severity::Success, "database dropped")?;

    out.status(Severity::Info, "applying migrations")?;
    runner
        .run(&ef(ctx, db, &connection, &["update"]))?
        .require_success("dotnet ef database update")?;
    out.status(Severity::Success, "migrations applied")?;

    if options.seed {
        super::seed::run(ctx, runner, out)?;
    }

    Ok(ExitStatus::Success)
}
