//! External process invocation.
//!
//! Every shell-out goes through a [`CommandRunner`] with a fully described
//! [`Invocation`]: working directory and environment are part of the value,
//! never ambient process state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::{DeckError, Result};

#[derive(Clone, Default, PartialEq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.env);
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// Env values may carry connection strings, so only keys are shown.
impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.to_string())
            .field("cwd", &self.cwd)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Captured result of a finished process. A non-zero exit is data, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        }
    }

    pub fn require_success(self, tool: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let code = self
            .code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        Err(DeckError::external(
            tool,
            format!("exit status {code}: {}", self.error_text()),
        ))
    }
}

/// A long-running child started by [`CommandRunner::spawn`].
pub trait RunningProcess {
    /// Returns the exit code if the process has already exited.
    fn try_wait(&mut self) -> Result<Option<i32>>;

    /// Kills the process and reaps it.
    fn terminate(&mut self) -> Result<()>;
}

pub trait CommandRunner {
    /// Runs to completion and captures output.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Starts the process without waiting for it.
    fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningProcess>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        tracing::debug!(command = %invocation, "running");
        let output = invocation.command().output().map_err(|e| {
            DeckError::external(invocation.program(), format!("failed to start: {e}"))
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningProcess>> {
        tracing::debug!(command = %invocation, "spawning");
        let child = invocation
            .command()
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                DeckError::external(invocation.program(), format!("failed to start: {e}"))
            })?;
        Ok(Box::new(SystemProcess { child }))
    }
}

struct SystemProcess {
    child: Child,
}

impl RunningProcess for SystemProcess {
    fn try_wait(&mut self) -> Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(|s| s.code().unwrap_or(-1)))
    }

    fn terminate(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill()?;
        }
        self.child.wait()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    /// Records every invocation and answers with canned output matched by
    /// command-line prefix. Unmatched commands succeed with empty output.
    #[derive(Default)]
    pub struct FakeRunner {
        responses: RefCell<Vec<(String, CommandOutput)>>,
        calls: RefCell<Vec<Invocation>>,
        pub spawned: RefCell<Vec<Invocation>>,
        pub terminated: Rc<Cell<bool>>,
        exit_code: Option<i32>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, prefix: &str, stdout: &str) -> Self {
            self.responses.borrow_mut().push((
                prefix.to_string(),
                CommandOutput {
                    code: Some(0),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            ));
            self
        }

        pub fn fail(self, prefix: &str, stderr: &str) -> Self {
            self.responses.borrow_mut().push((
                prefix.to_string(),
                CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                },
            ));
            self
        }

        /// Spawned processes report as already exited with `code`.
        pub fn exits_with(mut self, code: i32) -> Self {
            self.exit_code = Some(code);
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.borrow().clone()
        }

        pub fn command_lines(&self) -> Vec<String> {
            self.calls.borrow().iter().map(ToString::to_string).collect()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(invocation.clone());
            let line = std::iter::once(invocation.program.clone())
                .chain(invocation.args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ");
            let responses = self.responses.borrow();
            Ok(responses
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or(CommandOutput {
                    code: Some(0),
                    ..CommandOutput::default()
                }))
        }

        fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningProcess>> {
            self.spawned.borrow_mut().push(invocation.clone());
            Ok(Box::new(FakeProcess {
                terminated: Rc::clone(&self.terminated),
                exit_code: self.exit_code,
            }))
        }
    }

    struct FakeProcess {
        terminated: Rc<Cell<bool>>,
        exit_code: Option<i32>,
    }

    impl RunningProcess for FakeProcess {
        fn try_wait(&mut self) -> Result<Option<i32>> {
            Ok(self.exit_code)
        }

        fn terminate(&mut self) -> Result<()> {
            self.terminated.set(true);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bare(&[], "az")]
    #[case::with_args(&["account", "show"], "az account show")]
    fn display_joins_program_and_args(#[case] args: &[&str], #[case] expected: &str) {
        let inv = Invocation::new("az").args(args.iter().copied());
        assert_eq!(inv.to_string(), expected);
        assert_eq!(inv.get_args().len(), args.len());
    }

    // Debug output must never include env values.
    #[test]
    fn debug_hides_env_values() {
        let inv = Invocation::new("dotnet").env("ConnectionStrings__Default", "Server=x;Password=p");
        let dbg = format!("{inv:?}");
        assert!(dbg.contains("ConnectionStrings__Default"));
        assert!(!dbg.contains("Password=p"));
    }

    #[test]
    fn require_success_prefers_stderr() {
        let out = CommandOutput {
            code: Some(2),
            stdout: "ignored".to_string(),
            stderr: "boom".to_string(),
        };
        let err = out.require_success("az").unwrap_err();
        assert_eq!(err.to_string(), "az failed: exit status 2: boom");
    }

    #[test]
    fn error_text_falls_back_to_stdout() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "  only stdout \n".to_string(),
            stderr: "   ".to_string(),
        };
        assert_eq!(out.error_text(), "only stdout");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_nonzero_exit() {
        let out = SystemRunner
            .run(&Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_passes_explicit_env_and_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = SystemRunner
            .run(
                &Invocation::new("sh")
                    .args(["-c", "echo $DECK_TEST_VALUE; pwd"])
                    .env("DECK_TEST_VALUE", "xyz")
                    .current_dir(dir.path()),
            )
            .unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("xyz"));
        let cwd = std::path::PathBuf::from(lines.next().unwrap());
        assert_eq!(
            cwd.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
