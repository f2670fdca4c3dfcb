//! Provisioning calls against the cloud provider.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use strum::{AsRefStr, EnumString};
use tempfile::NamedTempFile;

use crate::error::{DeckError, Result};
use crate::models::{DeploymentRequest, DeploymentResult, PlanSummary, PlannedChange};
use crate::runner::{CommandRunner, Invocation};

const PARAMETERS_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2019-04-01/deploymentParameters.json#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    DryRun,
    Apply,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Planned(PlanSummary),
    Applied(DeploymentResult),
}

pub trait ProvisioningProvider {
    /// Plan-only call. Must never mutate anything.
    fn plan(&self, request: &DeploymentRequest) -> Result<PlanSummary>;

    /// Performs the deployment and blocks until a terminal state.
    fn apply(&self, request: &DeploymentRequest) -> Result<DeploymentResult>;
}

/// Issues exactly one provider call for the given mode. A non-succeeded
/// terminal state is an error; there is no retry.
pub fn invoke(
    provider: &dyn ProvisioningProvider,
    request: &DeploymentRequest,
    mode: Mode,
) -> Result<Outcome> {
    tracing::info!(
        environment = request.environment(),
        mode = mode.as_ref(),
        "invoking provider"
    );
    match mode {
        Mode::DryRun => provider.plan(request).map(Outcome::Planned),
        Mode::Apply => {
            let result = provider.apply(request)?;
            if !result.succeeded {
                return Err(DeckError::external(
                    "deployment",
                    format!("provisioning state {}", result.provisioning_state),
                ));
            }
            Ok(Outcome::Applied(result))
        }
    }
}

/// Resource-group deployments through `az deployment group`.
pub struct AzCliProvider<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> AzCliProvider<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    fn base(&self, verb: &str, request: &DeploymentRequest, parameters: &Path) -> Invocation {
        let tags = serde_json::to_string(request.tags()).unwrap_or_else(|_| "{}".to_string());
        Invocation::new("az")
            .args(["deployment", "group", verb])
            .args(["--resource-group", request.resource_group()])
            .arg("--name")
            .arg(request.deployment_name())
            .arg("--template-file")
            .arg(request.template().display().to_string())
            .arg("--parameters")
            .arg(format!("environmentName={}", request.environment()))
            .arg(format!("location={}", request.location()))
            .arg(format!("storageAccountName={}", request.storage_account()))
            .arg(format!("keyVaultName={}", request.vault_name()))
            .arg(format!("tags={tags}"))
            .arg(format!("@{}", parameters.display()))
    }

    pub fn plan_invocation(&self, request: &DeploymentRequest, parameters: &Path) -> Invocation {
        self.base("what-if", request, parameters)
            .args(["--no-pretty-print", "-o", "json"])
    }

    pub fn apply_invocation(&self, request: &DeploymentRequest, parameters: &Path) -> Invocation {
        self.base("create", request, parameters).args(["-o", "json"])
    }
}

/// Writes the admin credentials to an owner-only ARM parameters file, so
/// they never show up in the process list. The file is removed on drop.
pub fn secure_parameters(request: &DeploymentRequest) -> Result<NamedTempFile> {
    let credentials = request.credentials();
    let document = serde_json::json!({
        "$schema": PARAMETERS_SCHEMA,
        "contentVersion": "1.0.0.0",
        "parameters": {
            "adminLogin": { "value": credentials.login().expose() },
            "adminPassword": { "value": credentials.password().expose() },
        },
    });

    let mut file = tempfile::Builder::new()
        .prefix("deckhand-params-")
        .suffix(".json")
        .tempfile()?;
    serde_json::to_writer(&mut file, &document)?;
    file.flush()?;
    Ok(file)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhatIfResponse {
    #[serde(default)]
    changes: Vec<WhatIfChange>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhatIfChange {
    change_type: String,
    resource_id: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    properties: CreateProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProperties {
    provisioning_state: String,
    #[serde(default)]
    outputs: Option<BTreeMap<String, OutputValue>>,
}

#[derive(Deserialize)]
struct OutputValue {
    value: Value,
}

pub fn parse_what_if(json: &str) -> Result<PlanSummary> {
    let response: WhatIfResponse =
        serde_json::from_str(json).map_err(|e| DeckError::parse("what-if response", e.to_string()))?;
    Ok(PlanSummary {
        changes: response
            .changes
            .into_iter()
            .map(|c| PlannedChange {
                change_type: c.change_type,
                resource_id: c.resource_id,
            })
            .collect(),
    })
}

pub fn parse_create(json: &str) -> Result<DeploymentResult> {
    let response: CreateResponse = serde_json::from_str(json)
        .map_err(|e| DeckError::parse("deployment response", e.to_string()))?;
    let outputs = response
        .properties
        .outputs
        .unwrap_or_default()
        .into_iter()
        .map(|(name, output)| {
            let value = match output.value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect();
    Ok(DeploymentResult::new(
        response.properties.provisioning_state,
        outputs,
    ))
}

impl ProvisioningProvider for AzCliProvider<'_> {
    fn plan(&self, request: &DeploymentRequest) -> Result<PlanSummary> {
        let parameters = secure_parameters(request)?;
        let output = self
            .runner
            .run(&self.plan_invocation(request, parameters.path()))?
            .require_success("az deployment group what-if")?;
        parse_what_if(&output.stdout)
    }

    fn apply(&self, request: &DeploymentRequest) -> Result<DeploymentResult> {
        let parameters = secure_parameters(request)?;
        let output = self
            .runner
            .run(&self.apply_invocation(request, parameters.path()))?
            .require_success("az deployment group create")?;
        parse_create(&output.stdout)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::Cell;

    use super::*;

    /// Provider double that counts calls per operation.
    pub struct FakeProvider {
        pub plans: Cell<usize>,
        pub applies: Cell<usize>,
        plan: PlanSummary,
        result: std::result::Result<DeploymentResult, String>,
    }

    impl FakeProvider {
        pub fn succeeding(outputs: &[(&str, &str)]) -> Self {
            let outputs = outputs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            Self::with_result(Ok(DeploymentResult::new("Succeeded", outputs)))
        }

        pub fn with_result(result: std::result::Result<DeploymentResult, String>) -> Self {
            Self {
                plans: Cell::new(0),
                applies: Cell::new(0),
                plan: PlanSummary {
                    changes: vec![PlannedChange {
                        change_type: "Create".to_string(),
                        resource_id: "/subscriptions/x/storageAccounts/stbackup01".to_string(),
                    }],
                },
                result,
            }
        }
    }

    impl ProvisioningProvider for FakeProvider {
        fn plan(&self, _request: &DeploymentRequest) -> Result<PlanSummary> {
            self.plans.set(self.plans.get() + 1);
            Ok(self.plan.clone())
        }

        fn apply(&self, _request: &DeploymentRequest) -> Result<DeploymentResult> {
            self.applies.set(self.applies.get() + 1);
            self.result
                .clone()
                .map_err(|message| DeckError::external("fake provider", message))
        }
    }
}
