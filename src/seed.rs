//! Start the application once so it can run its startup seeding, then stop it.
//!
//! Default behavior is a fixed wait followed by unconditional termination.
//! With a readiness port configured, the wait becomes a bounded TCP poll.

use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use crate::config::SeedConfig;
use crate::error::{DeckError, Result};
use crate::runner::{CommandRunner, Invocation, RunningProcess};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    Fixed(Duration),
    Poll { timeout: Duration, interval: Duration },
}

impl WaitMode {
    pub fn from_config(config: &SeedConfig) -> Self {
        if config.ready_port.is_some() {
            Self::Poll {
                timeout: Duration::from_secs(config.ready_timeout_secs),
                interval: POLL_INTERVAL,
            }
        } else {
            Self::Fixed(Duration::from_secs(config.wait_secs))
        }
    }
}

pub trait ReadinessProbe {
    fn is_ready(&self) -> bool;
}

pub struct TcpProbe {
    addr: SocketAddr,
}

impl TcpProbe {
    pub fn localhost(port: u16) -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }
}

impl ReadinessProbe for TcpProbe {
    fn is_ready(&self) -> bool {
        TcpStream::connect_timeout(&self.addr, Duration::from_secs(1)).is_ok()
    }
}

/// Never ready; used with fixed waits where nothing is probed.
pub struct NoProbe;

impl ReadinessProbe for NoProbe {
    fn is_ready(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOutcome {
    pub waited: Duration,
    pub probed_ready: bool,
}

pub fn seed_invocation(config: &SeedConfig, root: &std::path::Path) -> Result<Invocation> {
    let (program, args) = config
        .command
        .split_first()
        .ok_or_else(|| DeckError::Config("[seed] command is empty".to_string()))?;
    Ok(Invocation::new(program.as_str())
        .args(args.iter().cloned())
        .current_dir(root))
}

fn wait_for_ready(
    process: &mut dyn RunningProcess,
    mode: WaitMode,
    probe: &dyn ReadinessProbe,
    started: Instant,
) -> Result<bool> {
    match mode {
        WaitMode::Fixed(delay) => {
            std::thread::sleep(delay);
            Ok(false)
        }
        WaitMode::Poll { timeout, interval } => loop {
            if probe.is_ready() {
                return Ok(true);
            }
            if process.try_wait()?.is_some() || started.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(interval);
        },
    }
}

/// Launches, waits, terminates. The process is always terminated, even
/// when the readiness poll times out.
pub fn run_seed(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    mode: WaitMode,
    probe: &dyn ReadinessProbe,
) -> Result<SeedOutcome> {
    let started = Instant::now();
    let mut process = runner.spawn(invocation)?;
    tracing::info!(command = %invocation, ?mode, "application started for seeding");

    let waited_ready = wait_for_ready(process.as_mut(), mode, probe, started);
    let early_exit = process.try_wait();
    process.terminate()?;
    let waited = started.elapsed();
    let probed_ready = waited_ready?;
    let early_exit = early_exit?;

    if let Some(code) = early_exit.filter(|c| *c != 0) {
        return Err(DeckError::external(
            invocation.program(),
            format!("exited during startup with code {code}"),
        ));
    }
    if matches!(mode, WaitMode::Poll { .. }) && !probed_ready {
        return Err(DeckError::external(
            invocation.program(),
            format!("not ready after {}s", waited.as_secs()),
        ));
    }

    Ok(SeedOutcome {
        waited,
        probed_ready,
    })
}
