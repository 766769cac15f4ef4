//! Read-only discovery of the vault's backing resources.
//!
//! A "not found" answer from the provider means the resource is absent. Any
//! other failure means its state is unknown and is returned as
//! [`VaultError::Discovery`].

use strongbox_common::VaultConfig;

use crate::error::{Result, VaultError};
use crate::gateway::{CloudGateway, GatewayResult, KeyState};
use crate::infrastructure::{IdentityRef, KeyRef, PolicyId, VaultInfrastructure};

/// Map a provider "not found" to `None`.
fn absent_if_not_found<T>(result: GatewayResult<T>) -> GatewayResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Name of the guardrail policy of a guardrail-enabled vault.
pub(crate) fn guardrail_policy_name(config: &VaultConfig) -> Result<&str> {
    config
        .guardrail_policy_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            strongbox_common::Error::Config(
                "guardrail_policy_name is required when the guardrail is enabled".to_string(),
            )
            .into()
        })
}

/// Discovers which vault resources exist.
pub struct ResourceProbe<'a> {
    gateway: &'a CloudGateway,
}

impl<'a> ResourceProbe<'a> {
    pub fn new(gateway: &'a CloudGateway) -> Self {
        Self { gateway }
    }

    /// Account the vault lives in. Guardrail policies are attached to it.
    pub async fn account_id(&self) -> Result<String> {
        self.gateway
            .identities()
            .caller_account_id()
            .await
            .map_err(|e| VaultError::discovery("caller account", e))
    }

    /// Account the guardrail policy is attached to: the member account named
    /// by `member_role`, otherwise the caller's own account.
    pub async fn guardrail_target(&self, config: &VaultConfig) -> Result<String> {
        match config.member_account_id() {
            Some(account_id) => Ok(account_id.to_string()),
            None => self.account_id().await,
        }
    }

    /// Find the key behind an alias such as `alias/strongbox-key`.
    ///
    /// A key pending deletion counts as absent.
    pub async fn find_key(&self, alias_name: &str) -> Result<Option<KeyRef>> {
        let metadata = absent_if_not_found(self.gateway.keys().describe_key(alias_name).await)
            .map_err(|e| VaultError::discovery(format!("key {alias_name}"), e))?;

        Ok(metadata
            .filter(|key| key.state != KeyState::PendingDeletion)
            .map(|key| KeyRef {
                key_id: key.key_id,
                arn: key.arn,
            }))
    }

    pub async fn find_identity(&self, name: &str) -> Result<Option<IdentityRef>> {
        let user = absent_if_not_found(self.gateway.identities().get_user(name).await)
            .map_err(|e| VaultError::discovery(format!("identity {name}"), e))?;

        Ok(user.map(|u| IdentityRef {
            name: u.name,
            arn: u.arn,
        }))
    }

    /// Find a guardrail policy attached to `target_id` by name, paging until a
    /// match is found or the listing is exhausted.
    pub async fn find_guardrail_policy(
        &self,
        name: &str,
        target_id: &str,
    ) -> Result<Option<PolicyId>> {
        let mut next_token: Option<String> = None;

        loop {
            let page = absent_if_not_found(
                self.gateway
                    .policies()
                    .list_policies_for_target(target_id, next_token.as_deref())
                    .await,
            )
            .map_err(|e| VaultError::discovery(format!("guardrail policy {name}"), e))?;

            let Some(page) = page else {
                return Ok(None);
            };

            if let Some(policy) = page.policies.into_iter().find(|p| p.name == name) {
                return Ok(Some(PolicyId(policy.id)));
            }

            match page.next_token {
                Some(token) => {
                    tracing::debug!(target_id = %target_id, "Fetching next page of attached policies");
                    next_token = Some(token);
                }
                None => return Ok(None),
            }
        }
    }

    /// Probe every component the configuration calls for.
    #[tracing::instrument(skip_all, fields(alias = %config.alias_name(), identity = %config.identity_name))]
    pub async fn discover(&self, config: &VaultConfig) -> Result<VaultInfrastructure> {
        let key = self.find_key(&config.alias_name()).await?;
        let identity = self.find_identity(&config.identity_name).await?;

        let guardrail_policy = if config.guardrail_enabled {
            let name = guardrail_policy_name(config)?;
            let target_id = self.guardrail_target(config).await?;
            self.find_guardrail_policy(name, &target_id).await?
        } else {
            None
        };

        let infrastructure = VaultInfrastructure {
            key,
            identity,
            guardrail_policy,
        };
        tracing::debug!(active = ?infrastructure.active(), "Probed vault components");
        Ok(infrastructure)
    }
}
