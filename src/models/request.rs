use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::secrets::SecretValue;

/// Admin credential pair passed to the provisioning template.
#[derive(Debug, Clone)]
pub struct Credentials {
    login: SecretValue,
    password: SecretValue,
}

impl Credentials {
    pub(crate) fn new(login: SecretValue, password: SecretValue) -> Self {
        Self { login, password }
    }

    pub fn login(&self) -> &SecretValue {
        &self.login
    }

    pub fn password(&self) -> &SecretValue {
        &self.password
    }
}

/// Everything one deployment run needs. Only the secret resolver builds
/// these, so a request never exists with a missing credential.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    environment: String,
    resource_group: String,
    storage_account: String,
    vault_name: String,
    location: String,
    template: PathBuf,
    credentials: Credentials,
    tags: BTreeMap<String, String>,
}

impl DeploymentRequest {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        environment: String,
        resource_group: String,
        storage_account: String,
        vault_name: String,
        location: String,
        template: PathBuf,
        credentials: Credentials,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Self {
            environment,
            resource_group,
            storage_account,
            vault_name,
            location,
            template,
            credentials,
            tags,
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn storage_account(&self) -> &str {
        &self.storage_account
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Deployment name derived from the environment, stable across reruns
    /// so repeated applies target the same deployment record.
    pub fn deployment_name(&self) -> String {
        format!("backup-dr-{}", self.environment)
    }
}
