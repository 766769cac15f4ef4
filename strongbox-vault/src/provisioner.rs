//! Creation of the vault's backing resources.
//!
//! Each operation first probes for the resource and returns the existing one
//! untouched. A failure part-way through creation rolls back whatever the call
//! created, so the next run starts from a clean slate for that resource.

use crate::access_keys::AccessKeyStore;
use crate::decommissioner::schedule_key_deletion;
use crate::error::{Component, Result, VaultError};
use crate::gateway::CloudGateway;
use crate::infrastructure::{IdentityRef, KeyRef, PolicyId};
use crate::policy::{access_policy_document, guardrail_policy_document};
use crate::probe::ResourceProbe;

const KEY_DESCRIPTION: &str = "Strongbox vault key";
const GUARDRAIL_DESCRIPTION: &str = "Restricts strongbox vault resources to the vault identity";

/// Creates vault resources.
pub struct ResourceProvisioner<'a> {
    gateway: &'a CloudGateway,
    access_keys: &'a dyn AccessKeyStore,
}

impl<'a> ResourceProvisioner<'a> {
    pub fn new(gateway: &'a CloudGateway, access_keys: &'a dyn AccessKeyStore) -> Self {
        Self {
            gateway,
            access_keys,
        }
    }

    fn probe(&self) -> ResourceProbe<'a> {
        ResourceProbe::new(self.gateway)
    }

    /// Create a symmetric key and bind `alias_name` to it.
    ///
    /// If the alias cannot be bound the new key is scheduled for deletion, as
    /// a key without its alias can never be found again.
    #[tracing::instrument(skip_all, fields(alias = %alias_name))]
    pub async fn create_key_with_alias(&self, alias_name: &str) -> Result<KeyRef> {
        if let Some(key) = self.probe().find_key(alias_name).await? {
            tracing::info!(key_id = %key.key_id, "Existing Vault key found");
            return Ok(key);
        }
        tracing::info!("No existing Vault key found, creating");

        let keys = self.gateway.keys();
        let metadata = keys
            .create_symmetric_key(KEY_DESCRIPTION)
            .await
            .map_err(|e| VaultError::creation(Component::Key, "key creation", e))?;

        if let Err(e) = keys.create_alias(alias_name, &metadata.key_id).await {
            tracing::warn!(
                error = %e,
                key_id = %metadata.key_id,
                "Error creating alias, removing key"
            );
            if let Err(rollback) = schedule_key_deletion(self.gateway, &metadata.key_id).await {
                tracing::warn!(
                    error = %rollback,
                    key_id = %metadata.key_id,
                    "Unable to remove unaliased key, it needs manual deletion"
                );
            }
            return Err(VaultError::creation(Component::Key, "alias binding", e));
        }

        tracing::info!(key_id = %metadata.key_id, "Successfully created Vault key");
        Ok(KeyRef {
            key_id: metadata.key_id,
            arn: metadata.arn,
        })
    }

    /// Create the identity with an access policy for `key` and the secret
    /// path, mint its access key, and store that key locally under a profile
    /// named after the identity.
    ///
    /// Any failure removes everything this call created, identity included.
    #[tracing::instrument(skip_all, fields(identity = %name, policy = %policy_name))]
    pub async fn create_identity_with_policy(
        &self,
        name: &str,
        policy_name: &str,
        key: &KeyRef,
        secret_path_arn: &str,
        region: &str,
    ) -> Result<IdentityRef> {
        if let Some(identity) = self.probe().find_identity(name).await? {
            tracing::info!("Existing Vault identity found");
            return Ok(identity);
        }
        tracing::info!("No existing Vault identity found, creating");

        let identities = self.gateway.identities();
        let user = identities
            .create_user(name)
            .await
            .map_err(|e| VaultError::creation(Component::Identity, "identity creation", e))?;

        let document = access_policy_document(secret_path_arn, &key.arn).to_string();
        if let Err(e) = identities.put_user_policy(name, policy_name, &document).await {
            self.roll_back_identity(name, None, None).await;
            return Err(VaultError::creation(Component::Identity, "access policy", e));
        }

        let access_key = match identities.create_access_key(name).await {
            Ok(access_key) => access_key,
            Err(e) => {
                self.roll_back_identity(name, Some(policy_name), None).await;
                return Err(VaultError::creation(Component::Identity, "access key", e));
            }
        };

        if let Err(e) = self.access_keys.save(name, &access_key, region) {
            self.roll_back_identity(name, Some(policy_name), Some(&access_key.access_key_id))
                .await;
            let source = VaultError::LocalCredentials {
                profile: name.to_string(),
                source: e,
            };
            return Err(VaultError::creation(
                Component::Identity,
                "local credential storage",
                source,
            ));
        }

        tracing::info!("Successfully created Vault identity");
        Ok(IdentityRef {
            name: user.name,
            arn: user.arn,
        })
    }

    /// Best-effort removal of a half-created identity.
    async fn roll_back_identity(
        &self,
        name: &str,
        policy_name: Option<&str>,
        access_key_id: Option<&str>,
    ) {
        tracing::warn!(identity = %name, "Rolling back Vault identity");
        let identities = self.gateway.identities();

        if let Some(policy_name) = policy_name {
            if let Err(e) = identities.delete_user_policy(name, policy_name).await {
                tracing::warn!(error = %e, "Rollback could not remove access policy");
            }
        }

        if let Some(access_key_id) = access_key_id {
            if let Err(e) = identities.delete_access_key(name, access_key_id).await {
                tracing::warn!(error = %e, "Rollback could not delete access key");
            }
            if let Err(e) = self.access_keys.remove(name) {
                tracing::warn!(error = %e, "Rollback could not remove local profile");
            }
        }

        if let Err(e) = identities.delete_user(name).await {
            tracing::warn!(error = %e, "Rollback could not delete identity, remove it manually");
        }
    }

    /// Create the guardrail policy and attach it to `target_id`.
    ///
    /// A policy that was created but could not be attached is deleted again.
    #[tracing::instrument(skip_all, fields(policy = %name, target_id = %target_id))]
    pub async fn create_guardrail_policy(
        &self,
        name: &str,
        secret_path_arn: &str,
        identity: &IdentityRef,
        key: &KeyRef,
        target_id: &str,
    ) -> Result<PolicyId> {
        if let Some(policy) = self.probe().find_guardrail_policy(name, target_id).await? {
            tracing::info!("Existing Vault guardrail policy found");
            return Ok(policy);
        }
        tracing::info!("No existing Vault guardrail policy found, creating");

        let policies = self.gateway.policies();
        let document = guardrail_policy_document(secret_path_arn, &key.arn, &identity.arn);
        let policy = policies
            .create_policy(name, GUARDRAIL_DESCRIPTION, &document.to_string())
            .await
            .map_err(|e| VaultError::creation(Component::Guardrail, "policy creation", e))?;

        if let Err(e) = policies.attach_policy(&policy.id, target_id).await {
            tracing::warn!(
                error = %e,
                policy_id = %policy.id,
                "Error attaching guardrail policy, deleting it"
            );
            if let Err(rollback) = policies.delete_policy(&policy.id).await {
                tracing::warn!(
                    error = %rollback,
                    policy_id = %policy.id,
                    "Unable to delete unattached guardrail policy, remove it manually"
                );
            }
            return Err(VaultError::creation(Component::Guardrail, "policy attachment", e));
        }

        tracing::info!(policy_id = %policy.id, "Successfully created Vault guardrail policy");
        Ok(PolicyId(policy.id))
    }
}
