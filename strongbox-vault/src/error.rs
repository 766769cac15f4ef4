//! Vault error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// One of the backing resources that make up a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Component {
    /// Encryption key and its alias
    Key,
    /// Identity, its inline access policy, and its access key
    Identity,
    /// Organization guardrail policy
    Guardrail,
}

impl Component {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Key => "Vault key",
            Self::Identity => "Vault identity",
            Self::Guardrail => "Vault guardrail policy",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A secret record that cannot be encoded or decoded.
///
/// Messages never include secret values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("entry {index} is not of the form username:secret")]
    Malformed { index: usize },

    #[error("{field} {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("encoded record is {len} bytes, the limit is {max}")]
    Oversize { len: usize, max: usize },

    #[error("record has no credentials")]
    Empty,
}

/// Errors returned by vault components.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The provider failed while probing; the resource state is unknown
    #[error("Unable to determine whether the {resource} exists: {source}")]
    Discovery {
        resource: String,
        #[source]
        source: GatewayError,
    },

    /// A provisioning step failed and the component was rolled back
    #[error("{component} not ready: {step} failed: {source}")]
    Creation {
        component: Component,
        step: &'static str,
        #[source]
        source: Box<VaultError>,
    },

    /// A teardown step failed and the component was left in place
    #[error("{component} not destroyed: {step} failed: {source}. {hint}")]
    Deletion {
        component: Component,
        step: &'static str,
        hint: String,
        #[source]
        source: Box<VaultError>,
    },

    #[error("Invalid secret record for {service}: {source}")]
    Encoding {
        service: String,
        #[source]
        source: EncodingError,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{}", not_installed_message(.missing, *.required))]
    NotInstalled {
        missing: Vec<Component>,
        required: usize,
    },

    #[error("{remaining} secret records remain after wipe")]
    WipeIncomplete { remaining: usize },

    #[error("Credential for {username} already exists in {service}")]
    CredentialExists { service: String, username: String },

    #[error("No credential for {username} in {service}")]
    CredentialMissing { service: String, username: String },

    #[error("Local credentials for profile {profile}: {source}")]
    LocalCredentials {
        profile: String,
        #[source]
        source: strongbox_common::Error,
    },

    #[error(transparent)]
    Common(#[from] strongbox_common::Error),
}

fn not_installed_message(missing: &[Component], required: usize) -> String {
    if missing.len() >= required {
        "No Vault detected, install before attempting this command".to_string()
    } else {
        format!(
            "Vault is not fully set up, complete installation before attempting this command: \
             missing {}",
            join_components(missing)
        )
    }
}

fn join_components(components: &[Component]) -> String {
    components
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ")
}

impl VaultError {
    pub fn discovery(resource: impl Into<String>, source: GatewayError) -> Self {
        Self::Discovery {
            resource: resource.into(),
            source,
        }
    }

    pub fn creation(component: Component, step: &'static str, source: impl Into<VaultError>) -> Self {
        Self::Creation {
            component,
            step,
            source: Box::new(source.into()),
        }
    }

    pub fn deletion(
        component: Component,
        step: &'static str,
        hint: impl Into<String>,
        source: impl Into<VaultError>,
    ) -> Self {
        Self::Deletion {
            component,
            step,
            hint: hint.into(),
            source: Box::new(source.into()),
        }
    }

    pub fn encoding(service: impl Into<String>, source: EncodingError) -> Self {
        Self::Encoding {
            service: service.into(),
            source,
        }
    }

    /// Component the error belongs to, for lifecycle failures.
    pub fn component(&self) -> Option<Component> {
        match self {
            Self::Creation { component, .. } | Self::Deletion { component, .. } => Some(*component),
            _ => None,
        }
    }
}
