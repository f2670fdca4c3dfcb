//! Project configuration stored in `.deckhand/config.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeckError, Result};
use crate::helpers::find_similar_name;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Env,
    Keyvault,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub store: StoreKind,
    /// Key vault holding deployment secrets when `store = "keyvault"`.
    pub vault_name: Option<String>,
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
}

fn default_env_prefix() -> String {
    "DECKHAND".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            vault_name: None,
            env_prefix: default_env_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub resource_group: String,
    pub storage_account: String,
    pub vault_name: String,
    pub location: String,
    pub template: PathBuf,
    #[serde(default = "default_admin_login_secret")]
    pub admin_login_secret: String,
    #[serde(default = "default_admin_password_secret")]
    pub admin_password_secret: String,
    #[serde(default = "default_connection_string_secret")]
    pub connection_string_secret: String,
    pub cdn_profile: Option<String>,
    pub cdn_endpoint: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_admin_login_secret() -> String {
    "sql-admin-login".to_string()
}

fn default_admin_password_secret() -> String {
    "sql-admin-password".to_string()
}

fn default_connection_string_secret() -> String {
    "db-connection-string".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub backend_command: Vec<String>,
    pub backend_report: Option<String>,
    #[serde(default)]
    pub frontend_command: Vec<String>,
    pub frontend_report: Option<String>,
    pub frontend_dir: Option<PathBuf>,
}

fn default_threshold() -> f64 {
    80.0
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            backend_command: Vec::new(),
            backend_report: None,
            frontend_command: Vec::new(),
            frontend_report: None,
            frontend_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    pub command: Vec<String>,
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    pub ready_port: Option<u16>,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

fn default_wait_secs() -> u64 {
    30
}

fn default_ready_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Project containing the EF migrations.
    pub project: PathBuf,
    pub startup_project: Option<PathBuf>,
    #[serde(default = "default_connection_env")]
    pub connection_env: String,
}

fn default_connection_env() -> String {
    "ConnectionStrings__DefaultConnection".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub frontend_dir: PathBuf,
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,
    pub dist_dir: PathBuf,
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_build_command() -> Vec<String> {
    vec!["npm".to_string(), "run".to_string(), "build".to_string()]
}

fn default_container() -> String {
    "$web".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default)]
    pub coverage: CoverageConfig,
    pub seed: Option<SeedConfig>,
    pub database: Option<DatabaseConfig>,
    pub publish: Option<PublishConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            DeckError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        if let Some(env) = self.environments.get(name) {
            return Ok(env);
        }

        let names: Vec<&str> = self.environments.keys().map(String::as_str).collect();
        Err(match find_similar_name(name, &names) {
            Some(suggestion) => DeckError::Config(format!(
                "unknown environment: {name}\nDid you mean: {suggestion}"
            )),
            None if names.is_empty() => DeckError::Config(format!(
                "unknown environment: {name}\nNo environments are configured."
            )),
            None => DeckError::Config(format!(
                "unknown environment: {name}\nConfigured: {}",
                names.join(", ")
            )),
        })
    }

    pub fn seed(&self) -> Result<&SeedConfig> {
        self.seed
            .as_ref()
            .ok_or_else(|| DeckError::Config("no [seed] section configured".to_string()))
    }

    pub fn database(&self) -> Result<&DatabaseConfig> {
        self.database
            .as_ref()
            .ok_or_else(|| DeckError::Config("no [database] section configured".to_string()))
    }

    pub fn publish(&self) -> Result<&PublishConfig> {
        self.publish
            .as_ref()
            .ok_or_else(|| DeckError::Config("no [publish] section configured".to_string()))
    }
}

/// Starter configuration written by `dh init`. Contains no secret values.
pub const STARTER_CONFIG: &str = r#"# deckhand configuration

[secrets]
# "env" reads DECKHAND_<SECRET_NAME>; "keyvault" reads from vault_name via az
store = "env"
env_prefix = "DECKHAND"
# vault_name = "kv-shared-secrets"

[environments.dev]
resource_group = "rg-app-dev"
storage_account = "stbackupdev01"
vault_name = "kv-backup-dev"
location = "eastus"
template = "infra/backup.bicep"
admin_login_secret = "sql-admin-login"
admin_password_secret = "sql-admin-password"

[environments.dev.tags]
environment = "dev"
managed-by = "deckhand"

[coverage]
threshold = 80.0
backend_command = ["dotnet", "test", "--collect", "XPlat Code Coverage"]
backend_report = "**/TestResults/**/coverage.cobertura.xml"
frontend_dir = "frontend"
frontend_command = ["npm", "run", "test:coverage"]
frontend_report = "frontend/coverage/coverage-summary.json"

[pipeline]
files = ["azure-pipelines.yml"]
tools = ["az", "dotnet", "npm"]
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_config_parses() {
        let config = Config::parse(STARTER_CONFIG).unwrap();
        let dev = config.environment("dev").unwrap();
        assert_eq!(dev.resource_group, "rg-app-dev");
        assert_eq!(dev.tags.get("managed-by").map(String::as_str), Some("deckhand"));
        assert_eq!(config.secrets.store, StoreKind::Env);
        assert!((config.coverage.threshold - 80.0).abs() < f64::EPSILON);
        assert!(config.seed.is_none());
    }

    #[test]
    fn unknown_environment_suggests_close_match() {
        let config = Config::parse(STARTER_CONFIG).unwrap();
        let err = config.environment("dve").unwrap_err().to_string();
        assert!(err.contains("unknown environment: dve"));
        assert!(err.contains("Did you mean: dev"));
    }

    #[test]
    fn unknown_environment_lists_configured_names() {
        let config = Config::parse(STARTER_CONFIG).unwrap();
        let err = config.environment("production").unwrap_err().to_string();
        assert!(err.contains("Configured: dev"));
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let config = Config::parse(
            r#"
            [environments.qa]
            resource_group = "rg"
            storage_account = "st"
            vault_name = "kv"
            location = "westeurope"
            template = "main.bicep"

            [seed]
            command = ["dotnet", "run"]
            "#,
        )
        .unwrap();
        let qa = config.environment("qa").unwrap();
        assert_eq!(qa.admin_password_secret, "sql-admin-password");
        assert_eq!(config.secrets.env_prefix, "DECKHAND");
        let seed = config.seed().unwrap();
        assert_eq!(seed.wait_secs, 30);
        assert!(seed.ready_port.is_none());
        assert!(config.publish().is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[environments.dev\nresource_group=").is_err());
    }
}
