//! Install and eradicate runs.
//!
//! A run probes the provider, applies only the creates or deletes still
//! needed, and reports how many components ended up in the desired state.
//! Nothing is remembered between runs; an incomplete run is finished by
//! running it again.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use strongbox_common::{ActionKind, VaultConfig};

use crate::access_keys::AccessKeyStore;
use crate::credentials::{BackupFile, CredentialStore, ImportSummary};
use crate::decommissioner::{ResourceDecommissioner, TeardownOutcome, GUARDRAIL_PROPAGATION};
use crate::error::{Component, Result, VaultError};
use crate::gateway::CloudGateway;
use crate::infrastructure::{ProvisioningState, VaultInfrastructure};
use crate::probe::{guardrail_policy_name, ResourceProbe};
use crate::provisioner::ResourceProvisioner;

/// Fixed waits between lifecycle steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// After guardrail removal, before the identity and key are deleted
    pub guardrail_propagation: Duration,
    /// After a wipe, before checking that no records remain
    pub wipe_settle: Duration,
    /// After a fresh install, before a backup is imported
    pub import_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            guardrail_propagation: GUARDRAIL_PROPAGATION,
            wipe_settle: Duration::from_secs(5),
            import_settle: Duration::from_secs(15),
        }
    }
}

impl Timings {
    /// No waiting at all.
    pub const fn immediate() -> Self {
        Self {
            guardrail_propagation: Duration::ZERO,
            wipe_settle: Duration::ZERO,
            import_settle: Duration::ZERO,
        }
    }
}

/// Outcome of an install run.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub required: usize,
    pub ready: usize,
    /// Components created by this run
    pub created: Vec<Component>,
    /// Why components are not ready
    pub causes: Vec<String>,
    pub infrastructure: VaultInfrastructure,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.ready == self.required
    }
}

impl fmt::Display for InstallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} Vault components ready", self.ready, self.required)
    }
}

/// Outcome of an eradicate run.
#[derive(Debug, Clone, Serialize)]
pub struct EradicationReport {
    pub total: usize,
    pub destroyed: usize,
    /// Records deleted by the wipe
    pub records_wiped: Option<usize>,
    /// Best-effort steps that failed without blocking teardown
    pub warnings: Vec<String>,
    /// Why components are still in place
    pub causes: Vec<String>,
    /// What is left
    pub infrastructure: VaultInfrastructure,
}

impl EradicationReport {
    pub fn is_complete(&self) -> bool {
        self.destroyed == self.total
    }

    pub fn remaining(&self) -> usize {
        self.total - self.destroyed
    }
}

impl fmt::Display for EradicationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} Vault components destroyed", self.destroyed, self.total)
    }
}

/// Probed state of a vault.
#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    pub infrastructure: VaultInfrastructure,
    pub state: ProvisioningState,
    pub required: Vec<Component>,
    pub active: Vec<Component>,
}

/// Runs install and eradicate against one vault.
pub struct VaultManager<'a> {
    gateway: &'a CloudGateway,
    config: &'a VaultConfig,
    access_keys: &'a dyn AccessKeyStore,
    timings: Timings,
}

impl<'a> VaultManager<'a> {
    pub fn new(
        gateway: &'a CloudGateway,
        config: &'a VaultConfig,
        access_keys: &'a dyn AccessKeyStore,
    ) -> Self {
        Self {
            gateway,
            config,
            access_keys,
            timings: Timings::default(),
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn probe(&self) -> ResourceProbe<'a> {
        ResourceProbe::new(self.gateway)
    }

    pub fn provisioner(&self) -> ResourceProvisioner<'a> {
        ResourceProvisioner::new(self.gateway, self.access_keys)
    }

    pub fn decommissioner(&self) -> ResourceDecommissioner<'a> {
        ResourceDecommissioner::new(self.gateway, self.access_keys)
            .with_propagation_delay(self.timings.guardrail_propagation)
    }

    pub fn credentials(&self) -> CredentialStore<'a> {
        CredentialStore::new(self.gateway, self.config)
    }

    fn validate(&self, kind: ActionKind) -> Result<()> {
        self.config
            .validate_for(kind)
            .map_err(strongbox_common::Error::from)?;
        Ok(())
    }

    /// Probe every component.
    pub async fn status(&self) -> Result<VaultStatus> {
        let infrastructure = self.probe().discover(self.config).await?;
        let enabled = self.config.guardrail_enabled;

        Ok(VaultStatus {
            state: infrastructure.state(enabled),
            required: VaultInfrastructure::required(enabled),
            active: infrastructure.active(),
            infrastructure,
        })
    }

    /// Fail with [`VaultError::NotInstalled`] unless every required
    /// component is active.
    pub async fn ensure_installed(&self) -> Result<VaultInfrastructure> {
        let status = self.status().await?;
        let missing = status.infrastructure.missing(self.config.guardrail_enabled);
        if !missing.is_empty() {
            return Err(VaultError::NotInstalled {
                missing,
                required: status.required.len(),
            });
        }
        Ok(status.infrastructure)
    }

    /// The credential store of a fully installed vault. Entry point for
    /// data actions.
    pub async fn open_credentials(&self) -> Result<CredentialStore<'a>> {
        self.validate(ActionKind::Data)?;
        self.ensure_installed().await?;
        Ok(self.credentials())
    }

    /// Create whatever components are missing, key first, then identity,
    /// then guardrail.
    ///
    /// Probe failures abort the run. Creation failures are recorded in the
    /// report; a component whose dependency is not ready is skipped.
    #[tracing::instrument(skip_all, fields(alias = %self.config.alias_name()))]
    pub async fn install(&self) -> Result<InstallReport> {
        self.validate(ActionKind::Management)?;
        tracing::info!("Installing Vault");

        let probe = self.probe();
        let account_id = probe.account_id().await?;
        let mut infra = probe.discover(self.config).await?;
        if !infra.is_empty() {
            tracing::info!(active = ?infra.active(), "Previous installation detected, resuming");
        }

        let provisioner = self.provisioner();
        let secret_path_arn = self.config.secret_path_arn(&account_id);
        let mut created = Vec::new();
        let mut causes = Vec::new();

        if infra.key.is_none() {
            match provisioner
                .create_key_with_alias(&self.config.alias_name())
                .await
            {
                Ok(key) => {
                    infra.key = Some(key);
                    created.push(Component::Key);
                }
                Err(e) => record_failure(&mut causes, e),
            }
        }

        if infra.identity.is_none() {
            match &infra.key {
                Some(key) => match provisioner
                    .create_identity_with_policy(
                        &self.config.identity_name,
                        &self.config.identity_policy_name,
                        key,
                        &secret_path_arn,
                        &self.config.region,
                    )
                    .await
                {
                    Ok(identity) => {
                        infra.identity = Some(identity);
                        created.push(Component::Identity);
                    }
                    Err(e) => record_failure(&mut causes, e),
                },
                None => causes.push(skipped(Component::Identity, &[Component::Key])),
            }
        }

        if self.config.guardrail_enabled {
            if infra.guardrail_policy.is_none() {
                match (&infra.key, &infra.identity) {
                    (Some(key), Some(identity)) => {
                        let name = guardrail_policy_name(self.config)?;
                        let target_id = probe.guardrail_target(self.config).await?;
                        match provisioner
                            .create_guardrail_policy(
                                name,
                                &secret_path_arn,
                                identity,
                                key,
                                &target_id,
                            )
                            .await
                        {
                            Ok(policy) => {
                                infra.guardrail_policy = Some(policy);
                                created.push(Component::Guardrail);
                            }
                            Err(e) => record_failure(&mut causes, e),
                        }
                    }
                    _ => causes.push(skipped(
                        Component::Guardrail,
                        &[Component::Key, Component::Identity],
                    )),
                }
            }
        } else {
            tracing::info!("Guardrail disabled for Vault installation, skipping setup");
        }

        let required = self.config.required_component_count();
        let report = InstallReport {
            required,
            ready: required - infra.missing(self.config.guardrail_enabled).len(),
            created,
            causes,
            infrastructure: infra,
        };

        if report.is_complete() {
            tracing::info!(%report, "Vault installation completed successfully");
        } else {
            tracing::warn!(
                %report,
                "Vault installation finished but not all components were created, re-run to resume"
            );
        }
        Ok(report)
    }

    /// Install, then import a backup once the new components have settled.
    /// The import is skipped if the install is incomplete.
    pub async fn install_and_import(
        &self,
        backup: &BackupFile,
    ) -> Result<(InstallReport, Option<ImportSummary>)> {
        let report = self.install().await?;
        if !report.is_complete() {
            tracing::warn!("Skipping import until the installation is complete");
            return Ok((report, None));
        }

        tracing::info!(
            seconds = self.timings.import_settle.as_secs(),
            "Pausing for Vault components to become active before importing credentials"
        );
        tokio::time::sleep(self.timings.import_settle).await;

        let summary = self.open_credentials().await?.import(backup).await?;
        Ok((report, Some(summary)))
    }

    /// Tear the vault down: guardrail, then identity, then key.
    ///
    /// With `wipe`, every secret record is deleted first and the run aborts
    /// with [`VaultError::WipeIncomplete`] if any record survives. The key is
    /// kept while the guardrail is still in place.
    #[tracing::instrument(skip_all, fields(alias = %self.config.alias_name(), wipe = wipe))]
    pub async fn eradicate(&self, wipe: bool) -> Result<EradicationReport> {
        self.validate(ActionKind::Management)?;

        let records_wiped = if wipe {
            Some(self.wipe_records().await?)
        } else {
            None
        };

        tracing::info!("Eradicating Vault");
        let probe = self.probe();
        let mut infra = probe.discover(self.config).await?;

        let decommissioner = self.decommissioner();
        let mut warnings = Vec::new();
        let mut causes = Vec::new();

        if self.config.guardrail_enabled {
            let target_id = probe.guardrail_target(self.config).await?;
            match decommissioner
                .delete_guardrail_policy(infra.guardrail_policy.as_ref(), &target_id)
                .await
            {
                Ok(outcome) => {
                    collect_warnings(&mut warnings, outcome);
                    infra.guardrail_policy = None;
                }
                Err(e) => record_failure(&mut causes, e),
            }
        }

        match decommissioner
            .delete_identity_with_policy(infra.identity.as_ref(), &self.config.identity_policy_name)
            .await
        {
            Ok(outcome) => {
                collect_warnings(&mut warnings, outcome);
                infra.identity = None;
            }
            Err(e) => record_failure(&mut causes, e),
        }

        if infra.guardrail_policy.is_some() {
            tracing::warn!("Cannot delete Vault key until the guardrail policy is removed");
            causes.push(skipped(Component::Key, &[Component::Guardrail]));
        } else {
            match decommissioner
                .delete_key_with_alias(infra.key.as_ref(), &self.config.alias_name())
                .await
            {
                Ok(outcome) => {
                    collect_warnings(&mut warnings, outcome);
                    infra.key = None;
                }
                Err(e) => record_failure(&mut causes, e),
            }
        }

        let required = VaultInfrastructure::required(self.config.guardrail_enabled);
        let destroyed = required.iter().filter(|c| !infra.has(**c)).count();
        let report = EradicationReport {
            total: required.len(),
            destroyed,
            records_wiped,
            warnings,
            causes,
            infrastructure: infra,
        };

        if report.is_complete() {
            tracing::info!(%report, "Successfully completed Vault eradication");
        } else {
            tracing::warn!(
                %report,
                "Vault eradication finished but not all components were destroyed, re-run to retry"
            );
        }
        Ok(report)
    }

    async fn wipe_records(&self) -> Result<usize> {
        let store = self.credentials();
        let wiped = store.wipe().await?;

        tokio::time::sleep(self.timings.wipe_settle).await;

        let remaining = store.list_services().await?.len();
        if remaining > 0 {
            tracing::error!(
                remaining,
                "Failed to delete all credentials, aborting eradication"
            );
            return Err(VaultError::WipeIncomplete { remaining });
        }
        Ok(wiped)
    }
}

fn record_failure(causes: &mut Vec<String>, error: VaultError) {
    tracing::warn!(error = %error, "Vault component step failed");
    causes.push(error.to_string());
}

fn skipped(component: Component, dependencies: &[Component]) -> String {
    let names: Vec<&str> = dependencies.iter().map(|c| c.label()).collect();
    format!("{component} skipped: requires {}", names.join(" and "))
}

fn collect_warnings(warnings: &mut Vec<String>, outcome: TeardownOutcome) {
    if let TeardownOutcome::Removed { warnings: found } = outcome {
        warnings.extend(found);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::access_keys::MemoryAccessKeyStore;
    use crate::gateway::{MemoryCloud, Operation};

    fn config(guardrail: bool) -> VaultConfig {
        VaultConfig {
            region: "us-east-1".into(),
            identity_name: "vault-user".into(),
            identity_policy_name: "vault-policy".into(),
            key_alias: "vault-key".into(),
            param_path: "vault".into(),
            guardrail_enabled: guardrail,
            guardrail_policy_name: guardrail.then(|| "vault-guardrail".to_string()),
            member_role: guardrail.then(|| "arn:aws:iam::123456789012:role/vault".to_string()),
            ..VaultConfig::default()
        }
    }

    fn setup() -> (Arc<MemoryCloud>, CloudGateway, MemoryAccessKeyStore) {
        let cloud = Arc::new(MemoryCloud::new());
        let gateway = CloudGateway::from_provider(cloud.clone());
        (cloud, gateway, MemoryAccessKeyStore::new())
    }

    fn immediate<'a>(
        gateway: &'a CloudGateway,
        config: &'a VaultConfig,
        store: &'a MemoryAccessKeyStore,
    ) -> VaultManager<'a> {
        VaultManager::new(gateway, config, store).with_timings(Timings::immediate())
    }

    #[tokio::test]
    async fn test_install_without_guardrail() {
        let (_cloud, gateway, store) = setup();
        let config = config(false);
        let manager = immediate(&gateway, &config, &store);

        let report = manager.install().await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.to_string(), "2/2 Vault components ready");
        assert_eq!(report.created, vec![Component::Key, Component::Identity]);
        let status = manager.status().await.unwrap();
        assert_eq!(status.state, ProvisioningState::FullyProvisioned);
    }

    #[tokio::test]
    async fn test_second_install_creates_nothing() {
        let (cloud, gateway, store) = setup();
        let config = config(true);
        let manager = immediate(&gateway, &config, &store);

        manager.install().await.unwrap();
        let again = manager.install().await.unwrap();

        assert!(again.is_complete());
        assert!(again.created.is_empty());
        assert_eq!(cloud.calls(Operation::CreateKey), 1);
        assert_eq!(cloud.calls(Operation::CreateUser), 1);
        assert_eq!(cloud.calls(Operation::CreatePolicy), 1);
    }

    #[tokio::test]
    async fn test_key_failure_skips_dependents() {
        let (cloud, gateway, store) = setup();
        let config = config(true);
        cloud.fail(Operation::CreateKey);
        let manager = immediate(&gateway, &config, &store);

        let report = manager.install().await.unwrap();

        assert_eq!(report.to_string(), "0/3 Vault components ready");
        assert_eq!(report.causes.len(), 3);
        assert_eq!(cloud.calls(Operation::CreateUser), 0);
        assert_eq!(cloud.calls(Operation::CreatePolicy), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_aborts_install() {
        let (cloud, gateway, store) = setup();
        let config = config(false);
        cloud.fail(Operation::DescribeKey);
        let manager = VaultManager::new(&gateway, &config, &store);

        let err = manager.install().await.unwrap_err();

        assert!(matches!(err, VaultError::Discovery { .. }));
        assert_eq!(cloud.calls(Operation::CreateKey), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let (_cloud, gateway, store) = setup();
        let config = VaultConfig::default();
        let manager = VaultManager::new(&gateway, &config, &store);

        assert!(matches!(
            manager.install().await.unwrap_err(),
            VaultError::Common(_)
        ));
    }

    #[tokio::test]
    async fn test_guardrail_failure_keeps_key() {
        let (cloud, gateway, store) = setup();
        let config = config(true);
        let manager = immediate(&gateway, &config, &store);
        manager.install().await.unwrap();
        cloud.fail(Operation::DetachPolicy);

        let report = manager.eradicate(false).await.unwrap();

        assert_eq!(report.to_string(), "1/3 Vault components destroyed");
        assert_eq!(report.remaining(), 2);
        assert!(report.infrastructure.key.is_some());
        assert!(report.infrastructure.guardrail_policy.is_some());
        assert_eq!(cloud.calls(Operation::ScheduleKeyDeletion), 0);
    }

    #[tokio::test]
    async fn test_data_actions_need_a_vault() {
        let (_cloud, gateway, store) = setup();
        let config = config(true);
        let manager = immediate(&gateway, &config, &store);

        let err = manager.open_credentials().await.err().unwrap();

        assert!(matches!(err, VaultError::NotInstalled { required: 3, .. }));
        assert_eq!(
            err.to_string(),
            "No Vault detected, install before attempting this command"
        );
    }

    #[tokio::test]
    async fn test_data_actions_need_every_component() {
        let (cloud, gateway, store) = setup();
        let config = config(true);
        cloud.fail(Operation::AttachPolicy);
        let manager = immediate(&gateway, &config, &store);
        manager.install().await.unwrap();

        let err = manager.open_credentials().await.err().unwrap();

        match &err {
            VaultError::NotInstalled { missing, .. } => {
                assert_eq!(missing, &vec![Component::Guardrail]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("Vault is not fully set up"));

        cloud.restore(Operation::AttachPolicy);
        manager.install().await.unwrap();
        assert!(manager.open_credentials().await.is_ok());
    }

    #[tokio::test]
    async fn test_import_skipped_when_install_incomplete() {
        let (cloud, gateway, store) = setup();
        let config = config(false);
        cloud.fail(Operation::CreateUser);
        let manager = immediate(&gateway, &config, &store);

        let (report, summary) = manager
            .install_and_import(&BackupFile::default())
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert!(summary.is_none());
    }
}
