use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dh")]
#[command(about = "Deployment lifecycle automation", long_about = None)]
pub struct Cli {
    /// Log diagnostics at info level (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize deckhand in the current project
    Init {
        /// Keep configuration out of the repo (adds .deckhand to .gitignore or .git/info/exclude)
        #[arg(long)]
        stealth: bool,
    },

    /// Check deployment preconditions without deploying
    Preflight {
        /// Target environment
        #[arg(long = "env")]
        environment: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Deploy backup and disaster-recovery infrastructure
    Deploy {
        /// Target environment
        #[arg(long = "env")]
        environment: String,

        /// Preview changes with a what-if call instead of deploying
        #[arg(long, alias = "dry-run")]
        what_if: bool,

        /// Directory for the deployment report (default: .deckhand/reports)
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run or check code coverage
    #[command(subcommand)]
    Coverage(CoverageCommands),

    /// Database maintenance
    #[command(subcommand)]
    Db(DbCommands),

    /// Build the frontend and publish it to the environment's CDN storage
    Publish {
        /// Target environment
        #[arg(long = "env")]
        environment: String,

        /// Upload the existing dist directory without building
        #[arg(long)]
        skip_build: bool,
    },

    /// Validate CI/CD pipeline prerequisites
    Validate {
        /// Also compile the infrastructure template of this environment
        #[arg(long = "env")]
        environment: Option<String>,

        /// Directory for the validation report (default: .deckhand/reports)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Start the application once so it seeds its data, then stop it
    Seed,

    /// Inspect JSON web tokens
    #[command(subcommand)]
    Jwt(JwtCommands),

    /// Administrative account checks
    #[command(subcommand)]
    Admin(AdminCommands),

    /// Persisted reports
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Args, Clone, Copy)]
pub struct ThresholdArg {
    /// Minimum line and branch coverage percentage (default from config)
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Subcommand)]
pub enum CoverageCommands {
    /// Run the configured test suites with coverage and evaluate the result
    Run {
        /// Only run the backend suite
        #[arg(long, conflicts_with = "frontend_only")]
        backend_only: bool,

        /// Only run the frontend suite
        #[arg(long)]
        frontend_only: bool,

        #[command(flatten)]
        threshold: ThresholdArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate an existing coverage report (Cobertura XML or Istanbul JSON summary)
    Check {
        /// Path to the coverage report
        #[arg(long)]
        report: PathBuf,

        #[command(flatten)]
        threshold: ThresholdArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Drop the database and re-apply all migrations
    Recreate {
        /// Target environment
        #[arg(long = "env")]
        environment: String,

        /// Required for production environments
        #[arg(long)]
        force: bool,

        /// Run the startup seeding afterwards
        #[arg(long)]
        seed: bool,
    },
}

#[derive(Subcommand)]
pub enum JwtCommands {
    /// Decode a token's payload and show its main claims
    Decode {
        /// The token (header.payload.signature)
        token: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Verify the admin credentials resolve and are not weak defaults
    Verify {
        /// Target environment
        #[arg(long = "env")]
        environment: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Show a persisted report
    Show {
        /// Path to the report file
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
