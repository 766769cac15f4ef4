//! Teardown of the vault's backing resources.
//!
//! Every operation takes the identifier found by the probe; `None` means the
//! resource is already gone and the call succeeds without side effects.
//! Resources are removed guardrail first, then identity, then key.

use std::time::Duration;

use crate::access_keys::AccessKeyStore;
use crate::error::{Component, Result, VaultError};
use crate::gateway::{CloudGateway, GatewayResult};
use crate::infrastructure::{IdentityRef, KeyRef, PolicyId};

/// Days a scheduled key stays recoverable before the provider destroys it.
pub const KEY_PENDING_WINDOW_DAYS: u32 = 7;

/// Wait after removing the guardrail before permission checks reflect it.
pub const GUARDRAIL_PROPAGATION: Duration = Duration::from_secs(10);

/// What a teardown call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Nothing to remove
    AlreadyAbsent,
    /// Removed; `warnings` lists best-effort steps that failed
    Removed { warnings: Vec<String> },
}

/// Treat a provider "not found" as already done.
fn ignore_not_found(result: GatewayResult<()>) -> GatewayResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Schedule a key for deletion with the standard pending window.
pub(crate) async fn schedule_key_deletion(
    gateway: &CloudGateway,
    key_id: &str,
) -> GatewayResult<()> {
    gateway
        .keys()
        .schedule_key_deletion(key_id, KEY_PENDING_WINDOW_DAYS)
        .await
}

/// Removes vault resources.
pub struct ResourceDecommissioner<'a> {
    gateway: &'a CloudGateway,
    access_keys: &'a dyn AccessKeyStore,
    propagation_delay: Duration,
}

impl<'a> ResourceDecommissioner<'a> {
    pub fn new(gateway: &'a CloudGateway, access_keys: &'a dyn AccessKeyStore) -> Self {
        Self {
            gateway,
            access_keys,
            propagation_delay: GUARDRAIL_PROPAGATION,
        }
    }

    /// Override the wait after guardrail removal.
    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    /// Detach and delete the guardrail policy, then wait for the change to
    /// propagate before returning.
    #[tracing::instrument(skip_all, fields(target_id = %target_id))]
    pub async fn delete_guardrail_policy(
        &self,
        policy: Option<&PolicyId>,
        target_id: &str,
    ) -> Result<TeardownOutcome> {
        let Some(policy) = policy else {
            tracing::info!("No existing Vault guardrail policy found");
            return Ok(TeardownOutcome::AlreadyAbsent);
        };
        tracing::info!(
            policy_id = %policy.as_str(),
            "Existing Vault guardrail policy found, deleting"
        );

        let policies = self.gateway.policies();

        ignore_not_found(policies.detach_policy(policy.as_str(), target_id).await).map_err(|e| {
            VaultError::deletion(
                Component::Guardrail,
                "policy detachment",
                format!("Detach policy {} from {target_id} manually", policy.as_str()),
                e,
            )
        })?;

        ignore_not_found(policies.delete_policy(policy.as_str()).await).map_err(|e| {
            VaultError::deletion(
                Component::Guardrail,
                "policy deletion",
                format!("Policy {} is detached but must be deleted manually", policy.as_str()),
                e,
            )
        })?;

        tracing::info!(
            seconds = self.propagation_delay.as_secs(),
            "Waiting for guardrail removal to propagate"
        );
        tokio::time::sleep(self.propagation_delay).await;

        tracing::info!("Successfully deleted Vault guardrail policy");
        Ok(TeardownOutcome::Removed {
            warnings: Vec::new(),
        })
    }

    /// Remove the identity with its inline policy, access key, and local
    /// profile.
    ///
    /// Failing to remove the inline policy stops the teardown. The access key
    /// and local profile are removed best-effort; their failures are returned
    /// as warnings, or folded into the error if the identity itself survives.
    /// The local profile is kept while the provider still holds its key.
    #[tracing::instrument(skip_all, fields(policy = %policy_name))]
    pub async fn delete_identity_with_policy(
        &self,
        identity: Option<&IdentityRef>,
        policy_name: &str,
    ) -> Result<TeardownOutcome> {
        let Some(identity) = identity else {
            tracing::info!("No existing Vault identity found");
            return Ok(TeardownOutcome::AlreadyAbsent);
        };
        let name = identity.name.as_str();
        tracing::info!(identity = %name, "Existing Vault identity found, deleting");

        let identities = self.gateway.identities();

        ignore_not_found(identities.delete_user_policy(name, policy_name).await).map_err(|e| {
            VaultError::deletion(
                Component::Identity,
                "access policy removal",
                format!("Remove inline policy {policy_name} from {name} manually"),
                e,
            )
        })?;

        let mut warnings = Vec::new();

        // the local profile is the only record of the key id, keep it until the key is gone
        let key_released = match self.access_keys.access_key_id(name) {
            Ok(Some(access_key_id)) => {
                let deleted = identities.delete_access_key(name, &access_key_id).await;
                match ignore_not_found(deleted) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Error deleting Vault identity access key");
                        warnings.push(format!("access key {access_key_id} was not deleted: {e}"));
                        false
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(identity = %name, "No local access key recorded");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unable to read local Vault access key");
                warnings.push(format!("local access key could not be read: {e}"));
                false
            }
        };

        if key_released {
            if let Err(e) = self.access_keys.remove(name) {
                tracing::warn!(error = %e, "Error deleting local Vault credentials");
                warnings.push(format!(
                    "profile {name} must be removed from the local credential files manually: {e}"
                ));
            }
        }

        if let Err(e) = ignore_not_found(identities.delete_user(name).await) {
            let mut hint = format!("Delete identity {name} manually");
            if !warnings.is_empty() {
                hint = format!("{hint} ({})", warnings.join("; "));
            }
            return Err(VaultError::deletion(
                Component::Identity,
                "identity deletion",
                hint,
                e,
            ));
        }

        tracing::info!("Successfully deleted Vault identity");
        Ok(TeardownOutcome::Removed { warnings })
    }

    /// Delete the alias and schedule the key for deletion.
    ///
    /// A failed alias deletion is reported as a warning and does not stop the
    /// key from being scheduled.
    #[tracing::instrument(skip_all, fields(alias = %alias_name))]
    pub async fn delete_key_with_alias(
        &self,
        key: Option<&KeyRef>,
        alias_name: &str,
    ) -> Result<TeardownOutcome> {
        let Some(key) = key else {
            tracing::info!("No existing Vault key found");
            return Ok(TeardownOutcome::AlreadyAbsent);
        };
        tracing::info!(key_id = %key.key_id, "Existing Vault key found, deleting");

        let mut warnings = Vec::new();
        if let Err(e) = ignore_not_found(self.gateway.keys().delete_alias(alias_name).await) {
            tracing::warn!(error = %e, "Error deleting alias for Vault key");
            warnings.push(format!("alias {alias_name} was not deleted: {e}"));
        }

        schedule_key_deletion(self.gateway, &key.key_id)
            .await
            .map_err(|e| {
                VaultError::deletion(
                    Component::Key,
                    "deletion scheduling",
                    format!("Vault key {} needs to be deleted manually", key.key_id),
                    e,
                )
            })?;

        tracing::info!(
            pending_window_days = KEY_PENDING_WINDOW_DAYS,
            "Successfully scheduled Vault key deletion"
        );
        Ok(TeardownOutcome::Removed { warnings })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::access_keys::MemoryAccessKeyStore;
    use crate::gateway::{
        IdentityManagement, KeyManagement, KeyState, MemoryCloud, Operation, PolicyManagement,
    };

    fn setup() -> (Arc<MemoryCloud>, CloudGateway, MemoryAccessKeyStore) {
        let cloud = Arc::new(MemoryCloud::new());
        let gateway = CloudGateway::from_provider(cloud.clone());
        (cloud, gateway, MemoryAccessKeyStore::new())
    }

    async fn seed_identity(cloud: &MemoryCloud, store: &MemoryAccessKeyStore) -> IdentityRef {
        let user = cloud.create_user("vault-user").await.unwrap();
        cloud
            .put_user_policy("vault-user", "vault-policy", "{}")
            .await
            .unwrap();
        let key = cloud.create_access_key("vault-user").await.unwrap();
        store.save("vault-user", &key, "us-east-1").unwrap();
        IdentityRef {
            name: user.name,
            arn: user.arn,
        }
    }

    #[tokio::test]
    async fn test_absent_resources_are_success() {
        let (_cloud, gateway, store) = setup();
        let decommissioner = ResourceDecommissioner::new(&gateway, &store);

        assert_eq!(
            decommissioner
                .delete_guardrail_policy(None, "123456789012")
                .await
                .unwrap(),
            TeardownOutcome::AlreadyAbsent
        );
        assert_eq!(
            decommissioner
                .delete_identity_with_policy(None, "vault-policy")
                .await
                .unwrap(),
            TeardownOutcome::AlreadyAbsent
        );
        assert_eq!(
            decommissioner
                .delete_key_with_alias(None, "alias/vault")
                .await
                .unwrap(),
            TeardownOutcome::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn test_identity_teardown_removes_everything() {
        let (cloud, gateway, store) = setup();
        let identity = seed_identity(&cloud, &store).await;

        let outcome = ResourceDecommissioner::new(&gateway, &store)
            .delete_identity_with_policy(Some(&identity), "vault-policy")
            .await
            .unwrap();

        assert_eq!(outcome, TeardownOutcome::Removed { warnings: vec![] });
        assert!(cloud.get_user("vault-user").await.unwrap_err().is_not_found());
        assert!(store.access_key_id("vault-user").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_policy_failure_stops_teardown() {
        let (cloud, gateway, store) = setup();
        let identity = seed_identity(&cloud, &store).await;
        cloud.fail(Operation::DeleteUserPolicy);

        let err = ResourceDecommissioner::new(&gateway, &store)
            .delete_identity_with_policy(Some(&identity), "vault-policy")
            .await
            .unwrap_err();

        assert_eq!(err.component(), Some(Component::Identity));
        assert_eq!(cloud.calls(Operation::DeleteAccessKey), 0);
        assert_eq!(cloud.access_key_count("vault-user"), 1);
        assert!(store.access_key_id("vault-user").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_access_key_failure_is_best_effort() {
        let (cloud, gateway, store) = setup();
        let identity = seed_identity(&cloud, &store).await;
        cloud.fail(Operation::DeleteAccessKey);

        let err = ResourceDecommissioner::new(&gateway, &store)
            .delete_identity_with_policy(Some(&identity), "vault-policy")
            .await
            .unwrap_err();

        // identity deletion is still attempted; the user survives because it owns a key
        assert_eq!(cloud.calls(Operation::DeleteUser), 1);
        assert!(store.access_key_id("vault-user").unwrap().is_some());
        assert!(matches!(
            err,
            VaultError::Deletion {
                step: "identity deletion",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_key_alias_failure_still_schedules_deletion() {
        let (cloud, gateway, store) = setup();
        let key = cloud.create_symmetric_key("vault").await.unwrap();
        cloud.create_alias("alias/vault", &key.key_id).await.unwrap();
        cloud.fail(Operation::DeleteAlias);
        let key_ref = KeyRef {
            key_id: key.key_id.clone(),
            arn: key.arn.clone(),
        };

        let outcome = ResourceDecommissioner::new(&gateway, &store)
            .delete_key_with_alias(Some(&key_ref), "alias/vault")
            .await
            .unwrap();

        let TeardownOutcome::Removed { warnings } = outcome else {
            panic!("expected the key to be removed");
        };
        assert_eq!(warnings.len(), 1);
        let described = cloud.describe_key(&key.key_id).await.unwrap();
        assert_eq!(described.state, KeyState::PendingDeletion);
    }

    #[tokio::test]
    async fn test_guardrail_detached_and_deleted() {
        let (cloud, gateway, store) = setup();
        let policy = cloud.create_policy("guard", "", "{}").await.unwrap();
        cloud.attach_policy(&policy.id, "123456789012").await.unwrap();

        let outcome = ResourceDecommissioner::new(&gateway, &store)
            .with_propagation_delay(Duration::ZERO)
            .delete_guardrail_policy(Some(&PolicyId(policy.id)), "123456789012")
            .await
            .unwrap();

        assert_eq!(outcome, TeardownOutcome::Removed { warnings: vec![] });
        assert_eq!(cloud.policy_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guardrail_waits_for_propagation() {
        let (cloud, gateway, store) = setup();
        let policy = cloud.create_policy("guard", "", "{}").await.unwrap();
        cloud.attach_policy(&policy.id, "123456789012").await.unwrap();

        let started = tokio::time::Instant::now();
        ResourceDecommissioner::new(&gateway, &store)
            .delete_guardrail_policy(Some(&PolicyId(policy.id)), "123456789012")
            .await
            .unwrap();

        assert!(started.elapsed() >= GUARDRAIL_PROPAGATION);
    }
}
