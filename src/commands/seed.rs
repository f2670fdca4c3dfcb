use anyhow::Result;

use crate::Context;
use crate::models::Severity;
use crate::output::Output;
use crate::report::ExitStatus;
use crate::runner::CommandRunner;
use crate::seed::{NoProbe, ReadinessProbe, TcpProbe, WaitMode, run_seed, seed_invocation};

pub fn run(ctx: &Context, runner: &dyn CommandRunner, out: &Output) -> Result<ExitStatus> {
    let config = ctx.config.seed()?;
    let invocation = seed_invocation(config, &ctx.root)?;
    let mode = WaitMode::from_config(config);

    let probe: Box<dyn ReadinessProbe> = match config.ready_port {
        Some(port) => Box::new(TcpProbe::localhost(port)),
        None => Box::new(NoProbe),
    };

    match mode {
        WaitMode::Fixed(delay) => out.status(
            Severity::Info,
            &format!("starting {invocation}; stopping it after {}s", delay.as_secs()),
        )?,
        WaitMode::Poll { timeout, .. } => out.status(
            Severity::Info,
            &format!(
                "starting {invocation}; waiting up to {}s for port {}",
                timeout.as_secs(),
                config.ready_port.unwrap_or_default()
            ),
        )?,
    }

    let outcome = run_seed(runner, &invocation, mode, probe.as_ref())?;
    let detail = if outcome.probed_ready {
        "application became ready; seeding complete"
    } else {
        "startup window elapsed; application stopped"
    };
    out.status(Severity::Success, detail)?;
    Ok(ExitStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{DEV_CONFIG, context};
    use crate::runner::testing::FakeRunner;

    #[test]
    fn fixed_wait_starts_and_stops_application() {
        let (_dir, ctx) = context(DEV_CONFIG, &[]);
        let runner = FakeRunner::new();
        let out = Output::buffered();

        assert_eq!(run(&ctx, &runner, &out).unwrap(), ExitStatus::Success);
        assert!(runner.terminated.get());
        assert!(out.lines()[0].contains("stopping it after 0s"));
    }

    #[test]
    fn missing_seed_section_is_an_error() {
        let (_dir, ctx) = context("", &[]);
        assert!(run(&ctx, &FakeRunner::new(), &Output::buffered()).is_err());
    }
}
