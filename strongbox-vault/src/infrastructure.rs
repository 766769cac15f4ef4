//! The provisioned state of a vault.
//!
//! Nothing here is persisted. A [`VaultInfrastructure`] is rebuilt from a probe
//! on every run and handed to the provisioner and decommissioner by value.

use serde::Serialize;

use crate::error::Component;

/// Identifiers of the vault key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRef {
    pub key_id: String,
    pub arn: String,
}

/// Identifiers of the vault identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRef {
    pub name: String,
    pub arn: String,
}

/// Identifier of the guardrail policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PolicyId(pub String);

impl PolicyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Where a vault stands relative to its required components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProvisioningState {
    NotStarted,
    PartiallyProvisioned,
    FullyProvisioned,
}

/// Discovered backing resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VaultInfrastructure {
    pub key: Option<KeyRef>,
    pub identity: Option<IdentityRef>,
    /// Only probed when the guardrail is enabled
    pub guardrail_policy: Option<PolicyId>,
}

impl VaultInfrastructure {
    /// Components a complete installation consists of.
    pub fn required(guardrail_enabled: bool) -> Vec<Component> {
        let mut components = vec![Component::Key, Component::Identity];
        if guardrail_enabled {
            components.push(Component::Guardrail);
        }
        components
    }

    pub fn has(&self, component: Component) -> bool {
        match component {
            Component::Key => self.key.is_some(),
            Component::Identity => self.identity.is_some(),
            Component::Guardrail => self.guardrail_policy.is_some(),
        }
    }

    /// Components that currently exist.
    pub fn active(&self) -> Vec<Component> {
        [Component::Key, Component::Identity, Component::Guardrail]
            .into_iter()
            .filter(|c| self.has(*c))
            .collect()
    }

    /// Required components that do not exist.
    pub fn missing(&self, guardrail_enabled: bool) -> Vec<Component> {
        Self::required(guardrail_enabled)
            .into_iter()
            .filter(|c| !self.has(*c))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active().is_empty()
    }

    pub fn state(&self, guardrail_enabled: bool) -> ProvisioningState {
        if self.is_empty() {
            ProvisioningState::NotStarted
        } else if self.missing(guardrail_enabled).is_empty() {
            ProvisioningState::FullyProvisioned
        } else {
            ProvisioningState::PartiallyProvisioned
        }
    }
}
