use anyhow::Result;

use crate::Context;
use crate::output::Output;
use crate::preflight::{Preflight, deploy_checks};
use crate::report::ExitStatus;
use crate::runner::CommandRunner;

/// Evaluates the deployment preconditions for one environment and reports
/// them; never touches the provider.
pub fn run(
    ctx: &Context,
    runner: &dyn CommandRunner,
    environment: &str,
    out: &Output,
) -> Result<ExitStatus> {
    let env_config = ctx.config.environment(environment)?;
    let store = ctx.secret_store(runner)?;

    out.heading(&format!("Preflight: {environment}"))?;
    let report = Preflight::new(runner, ctx.path_var.clone(), &ctx.root)
        .with_store(store.as_ref())
        .evaluate(&deploy_checks(env_config, &ctx.root), out)?;
    out.preflight(&report)?;

    Ok(ExitStatus::from_passed(report.is_ready()))
}
