#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod helpers;
pub mod id;
pub mod interpret;
pub mod jwt;
pub mod models;
pub mod output;
pub mod preflight;
pub mod provider;
pub mod report;
pub mod runner;
pub mod secrets;
pub mod seed;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};

use cli::{AdminCommands, Cli, Commands, CoverageCommands, DbCommands, JwtCommands, ReportCommands};
use config::{Config, StoreKind};
use error::DeckError;
use output::Output;
use report::ExitStatus;
use runner::{CommandRunner, SystemRunner};
use secrets::{EnvSecretStore, KeyVaultStore, SecretStore};

pub const DECKHAND_DIR: &str = ".deckhand";
pub const REDIRECT_FILE: &str = "redirect";
pub const REPORTS_DIR: &str = "reports";

/// Finds the `.deckhand/` directory by walking up from `start`.
/// Returns `None` if no `.deckhand/` directory is found.
pub fn find_deckhand_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = start;

    loop {
        let deckhand_path = dir.join(DECKHAND_DIR);
        if deckhand_path.is_dir() {
            return Some(deckhand_path);
        }

        dir = dir.parent()?;
    }
}

/// Resolves the final config directory, following any redirect file.
/// A redirect file contains a path (absolute or relative) to another `.deckhand/` directory.
pub fn resolve_deckhand_dir(start: &Path) -> Option<PathBuf> {
    let deckhand_dir = find_deckhand_dir(start)?;
    let redirect_path = deckhand_dir.join(REDIRECT_FILE);

    if redirect_path.is_file() {
        let target = std::fs::read_to_string(&redirect_path).ok()?;
        let target = target.trim();

        let target_path = if PathBuf::from(target).is_absolute() {
            PathBuf::from(target)
        } else {
            deckhand_dir.parent()?.join(target)
        };

        if target_path.is_dir() {
            return Some(target_path);
        }
    }

    Some(deckhand_dir)
}

/// Everything a command needs from the outside world, captured once at
/// startup so no stage reads ambient process state.
pub struct Context {
    pub root: PathBuf,
    pub deckhand_dir: PathBuf,
    pub config: Config,
    pub path_var: Option<OsString>,
    pub vars: BTreeMap<String, String>,
}

impl Context {
    pub fn load(cwd: &Path, path_var: Option<OsString>, vars: BTreeMap<String, String>) -> Result<Self> {
        let deckhand_dir = resolve_deckhand_dir(cwd)
            .ok_or_else(|| anyhow!("Deckhand not initialized. Run 'dh init' first."))?;
        let config = Config::load(&deckhand_dir).context("Failed to load configuration")?;
        let root = deckhand_dir
            .parent()
            .map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);

        Ok(Self {
            root,
            deckhand_dir,
            config,
            path_var,
            vars,
        })
    }

    pub fn reports_dir(&self, requested: Option<PathBuf>) -> PathBuf {
        requested.unwrap_or_else(|| self.deckhand_dir.join(REPORTS_DIR))
    }

    pub fn secret_store<'a>(&self, runner: &'a dyn CommandRunner) -> Result<Box<dyn SecretStore + 'a>> {
        let secrets = &self.config.secrets;
        match secrets.store {
            StoreKind::Env => Ok(Box::new(EnvSecretStore::new(
                &secrets.env_prefix,
                self.vars.clone(),
            ))),
            StoreKind::Keyvault => {
                let vault = secrets.vault_name.as_deref().ok_or_else(|| {
                    DeckError::Config("secrets.vault_name is required for store = \"keyvault\"".to_string())
                })?;
                Ok(Box::new(KeyVaultStore::new(runner, vault)))
            }
        }
    }
}

fn ensure_initialized() -> Result<Context> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Context::load(&cwd, std::env::var_os("PATH"), std::env::vars().collect())
}

/// Runs a command against a fresh [`Output`] and flushes its JSON document,
/// also when the command fails part way.
fn with_output(
    json: bool,
    command: impl FnOnce(&Output) -> Result<ExitStatus>,
) -> Result<ExitStatus> {
    let out = Output::new(json);
    let result = command(&out);
    out.finish()?;
    result
}

fn run_coverage(cmd: CoverageCommands) -> Result<ExitStatus> {
    match cmd {
        CoverageCommands::Run {
            backend_only,
            frontend_only,
            threshold,
            json,
        } => {
            let ctx = ensure_initialized()?;
            let scope = commands::coverage::Scope::from_flags(backend_only, frontend_only);
            let threshold = threshold.threshold.unwrap_or(ctx.config.coverage.threshold);
            with_output(json, |out| {
                commands::coverage::run(&ctx, &SystemRunner, scope, threshold, out)
            })
        }
        CoverageCommands::Check {
            report,
            threshold,
            json,
        } => {
            // A config is optional here; fall back to the default threshold.
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            let threshold = threshold.threshold.unwrap_or_else(|| {
                resolve_deckhand_dir(&cwd)
                    .and_then(|dir| Config::load(&dir).ok())
                    .unwrap_or_default()
                    .coverage
                    .threshold
            });
            with_output(json, |out| commands::coverage::check(&report, threshold, out))
        }
    }
}

pub fn run(cli: Cli) -> Result<ExitStatus> {
    match cli.command {
        Commands::Init { stealth } => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            commands::init::run(&cwd, stealth)?;
            Ok(ExitStatus::Success)
        }
        Commands::Preflight { environment, json } => {
            let ctx = ensure_initialized()?;
            with_output(json, |out| {
                commands::preflight::run(&ctx, &SystemRunner, &environment, out)
            })
        }
        Commands::Deploy {
            environment,
            what_if,
            report_dir,
            json,
        } => {
            let ctx = ensure_initialized()?;
            with_output(json, |out| {
                commands::deploy::run(&ctx, &environment, what_if, report_dir, out)
            })
        }
        Commands::Coverage(cmd) => run_coverage(cmd),
        Commands::Db(DbCommands::Recreate {
            environment,
            force,
            seed,
        }) => {
            let ctx = ensure_initialized()?;
            let options = commands::db::RecreateOptions { force, seed };
            commands::db::recreate(&ctx, &SystemRunner, &environment, options, &Output::new(false))
        }
        Commands::Publish {
            environment,
            skip_build,
        } => {
            let ctx = ensure_initialized()?;
            commands::publish::run(&ctx, &SystemRunner, &environment, skip_build, &Output::new(false))
        }
        Commands::Validate {
            environment,
            report_dir,
        } => {
            let ctx = ensure_initialized()?;
            commands::validate::run(
                &ctx,
                &SystemRunner,
                environment.as_deref(),
                report_dir,
                &Output::new(false),
            )
        }
        Commands::Seed => {
            let ctx = ensure_initialized()?;
            commands::seed::run(&ctx, &SystemRunner, &Output::new(false))
        }
        Commands::Jwt(JwtCommands::Decode { token, json }) => {
            let claims = jwt::decode(&token)?;
            Output::new(json).claims(&claims, jiff::Timestamp::now())?;
            Ok(ExitStatus::Success)
        }
        Commands::Admin(AdminCommands::Verify { environment }) => {
            let ctx = ensure_initialized()?;
            commands::admin::verify(&ctx, &SystemRunner, &environment, &Output::new(false))
        }
        Commands::Report(ReportCommands::Show { path, json }) => {
            let report = report::read_report(&path)?;
            Output::new(json).report(&report)?;
            Ok(ExitStatus::Success)
        }
    }
}
