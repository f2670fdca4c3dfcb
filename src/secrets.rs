//! Read-only secret lookup and deployment request resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::config::EnvironmentConfig;
use crate::error::{DeckError, Result};
use crate::models::{Credentials, DeploymentRequest};
use crate::runner::{CommandRunner, Invocation};

/// A secret value that refuses to print itself.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for handing to a child process only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

pub trait SecretStore {
    /// Looks a secret up by name. `Ok(None)` means the store answered and
    /// the secret does not exist.
    fn get(&self, name: &str) -> Result<Option<SecretValue>>;

    /// Short description used in status lines.
    fn describe(&self) -> String;
}

/// Secrets taken from a snapshot of environment variables, where secret
/// `sql-admin-login` maps to `<PREFIX>_SQL_ADMIN_LOGIN`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
    vars: BTreeMap<String, String>,
}

impl EnvSecretStore {
    pub fn new<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            prefix: prefix.to_string(),
            vars: vars.into_iter().collect(),
        }
    }

    pub fn key_for(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name.to_uppercase().replace(['-', '.'], "_"))
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Result<Option<SecretValue>> {
        Ok(self.vars.get(&self.key_for(name)).map(SecretValue::new))
    }

    fn describe(&self) -> String {
        format!("environment ({}_*)", self.prefix)
    }
}

/// Secrets read from an Azure Key Vault through the `az` CLI.
pub struct KeyVaultStore<'a> {
    runner: &'a dyn CommandRunner,
    vault: String,
}

impl<'a> KeyVaultStore<'a> {
    pub fn new(runner: &'a dyn CommandRunner, vault: impl Into<String>) -> Self {
        Self {
            runner,
            vault: vault.into(),
        }
    }

    fn invocation(&self, name: &str) -> Invocation {
        Invocation::new("az").args([
            "keyvault",
            "secret",
            "show",
            "--vault-name",
            self.vault.as_str(),
            "--name",
            name,
            "--query",
            "value",
            "-o",
            "tsv",
        ])
    }
}

impl SecretStore for KeyVaultStore<'_> {
    fn get(&self, name: &str) -> Result<Option<SecretValue>> {
        let output = self.runner.run(&self.invocation(name))?;
        if !output.success() && output.stderr.contains("SecretNotFound") {
            return Ok(None);
        }
        let output = output.require_success("az keyvault")?;
        let value = output.stdout.trim_end_matches(['\r', '\n']);
        Ok(Some(SecretValue::new(value)))
    }

    fn describe(&self) -> String {
        format!("key vault {}", self.vault)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    values: BTreeMap<String, String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, name: &str) -> Result<Option<SecretValue>> {
        Ok(self.values.get(name).map(SecretValue::new))
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}

/// Fetches a secret that must be present and non-blank.
pub fn require_secret(
    store: &dyn SecretStore,
    name: &str,
    environment: &str,
) -> Result<SecretValue> {
    match store.get(name)? {
        Some(value) if !value.is_blank() => {
            tracing::info!(secret = name, "resolved secret");
            Ok(value)
        }
        _ => Err(DeckError::SecretResolution {
            name: name.to_string(),
            environment: environment.to_string(),
        }),
    }
}

/// Builds the request for one deployment run. Fails before constructing
/// anything if either admin credential is absent.
pub fn resolve_request(
    environment: &str,
    config: &EnvironmentConfig,
    root: &Path,
    store: &dyn SecretStore,
) -> Result<DeploymentRequest> {
    let login = require_secret(store, &config.admin_login_secret, environment)?;
    let password = require_secret(store, &config.admin_password_secret, environment)?;

    let mut tags = config.tags.clone();
    tags.entry("environment".to_string())
        .or_insert_with(|| environment.to_string());

    Ok(DeploymentRequest::new(
        environment.to_string(),
        config.resource_group.clone(),
        config.storage_account.clone(),
        config.vault_name.clone(),
        config.location.clone(),
        root.join(&config.template),
        Credentials::new(login, password),
        tags,
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    use super::*;

    pub fn env_config() -> EnvironmentConfig {
        EnvironmentConfig {
            resource_group: "rg-app-dev".to_string(),
            storage_account: "stbackup01".to_string(),
            vault_name: "kv-backup".to_string(),
            location: "eastus".to_string(),
            template: PathBuf::from("infra/backup.bicep"),
            admin_login_secret: "sql-admin-login".to_string(),
            admin_password_secret: "sql-admin-password".to_string(),
            connection_string_secret: "db-connection-string".to_string(),
            cdn_profile: None,
            cdn_endpoint: None,
            tags: BTreeMap::from([("owner".to_string(), "platform".to_string())]),
        }
    }

    pub fn full_store() -> MemorySecretStore {
        MemorySecretStore::new()
            .with("sql-admin-login", "deckadmin")
            .with("sql-admin-password", "correct-horse-battery")
    }

    pub fn request() -> DeploymentRequest {
        resolve_request("dev", &env_config(), Path::new("/repo"), &full_store())
            .expect("complete store resolves")
    }
}
