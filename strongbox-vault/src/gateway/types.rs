//! Request and response types shared by every gateway capability.

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

/// Result type for gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The provider capability a call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    KeyManagement,
    IdentityManagement,
    PolicyManagement,
    ParameterStore,
}

/// Every provider call the vault makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeKey,
    CreateKey,
    CreateAlias,
    DeleteAlias,
    ScheduleKeyDeletion,
    GetCallerIdentity,
    GetUser,
    CreateUser,
    PutUserPolicy,
    DeleteUserPolicy,
    CreateAccessKey,
    DeleteAccessKey,
    DeleteUser,
    ListPoliciesForTarget,
    CreatePolicy,
    AttachPolicy,
    DetachPolicy,
    DeletePolicy,
    GetParameter,
    PutParameter,
    DeleteParameter,
    GetParametersByPath,
}

impl Operation {
    /// Capability that serves this operation.
    pub const fn capability(self) -> Capability {
        match self {
            Self::DescribeKey
            | Self::CreateKey
            | Self::CreateAlias
            | Self::DeleteAlias
            | Self::ScheduleKeyDeletion => Capability::KeyManagement,
            Self::GetCallerIdentity
            | Self::GetUser
            | Self::CreateUser
            | Self::PutUserPolicy
            | Self::DeleteUserPolicy
            | Self::CreateAccessKey
            | Self::DeleteAccessKey
            | Self::DeleteUser => Capability::IdentityManagement,
            Self::ListPoliciesForTarget
            | Self::CreatePolicy
            | Self::AttachPolicy
            | Self::DetachPolicy
            | Self::DeletePolicy => Capability::PolicyManagement,
            Self::GetParameter
            | Self::PutParameter
            | Self::DeleteParameter
            | Self::GetParametersByPath => Capability::ParameterStore,
        }
    }

    /// Provider API name of the operation.
    pub const fn api_name(self) -> &'static str {
        match self {
            Self::DescribeKey => "DescribeKey",
            Self::CreateKey => "CreateKey",
            Self::CreateAlias => "CreateAlias",
            Self::DeleteAlias => "DeleteAlias",
            Self::ScheduleKeyDeletion => "ScheduleKeyDeletion",
            Self::GetCallerIdentity => "GetCallerIdentity",
            Self::GetUser => "GetUser",
            Self::CreateUser => "CreateUser",
            Self::PutUserPolicy => "PutUserPolicy",
            Self::DeleteUserPolicy => "DeleteUserPolicy",
            Self::CreateAccessKey => "CreateAccessKey",
            Self::DeleteAccessKey => "DeleteAccessKey",
            Self::DeleteUser => "DeleteUser",
            Self::ListPoliciesForTarget => "ListPoliciesForTarget",
            Self::CreatePolicy => "CreatePolicy",
            Self::AttachPolicy => "AttachPolicy",
            Self::DetachPolicy => "DetachPolicy",
            Self::DeletePolicy => "DeletePolicy",
            Self::GetParameter => "GetParameter",
            Self::PutParameter => "PutParameter",
            Self::DeleteParameter => "DeleteParameter",
            Self::GetParametersByPath => "GetParametersByPath",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Uniform failure signal returned by every gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("{operation}: {resource} not found")]
    NotFound {
        operation: Operation,
        resource: String,
    },

    #[error("{operation}: {resource} already exists")]
    AlreadyExists {
        operation: Operation,
        resource: String,
    },

    #[error("{operation}: access denied: {message}")]
    AccessDenied {
        operation: Operation,
        message: String,
    },

    #[error("{operation} failed: {message}")]
    Service {
        operation: Operation,
        message: String,
    },
}

impl GatewayError {
    pub fn not_found(operation: Operation, resource: impl Into<String>) -> Self {
        Self::NotFound {
            operation,
            resource: resource.into(),
        }
    }

    pub fn already_exists(operation: Operation, resource: impl Into<String>) -> Self {
        Self::AlreadyExists {
            operation,
            resource: resource.into(),
        }
    }

    pub fn access_denied(operation: Operation, message: impl Into<String>) -> Self {
        Self::AccessDenied {
            operation,
            message: message.into(),
        }
    }

    pub fn service(operation: Operation, message: impl Into<String>) -> Self {
        Self::Service {
            operation,
            message: message.into(),
        }
    }

    /// The call that failed.
    pub const fn operation(&self) -> Operation {
        match self {
            Self::NotFound { operation, .. }
            | Self::AlreadyExists { operation, .. }
            | Self::AccessDenied { operation, .. }
            | Self::Service { operation, .. } => *operation,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Lifecycle state of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Enabled,
    Disabled,
    PendingDeletion,
}

/// Key description as returned by the key-management service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMetadata {
    pub key_id: String,
    pub arn: String,
    pub state: KeyState,
}

/// An identity (user) in the identity-management service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub arn: String,
}

/// Long-lived access credential minted for an identity.
#[derive(Clone)]
pub struct AccessKey {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKey")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Organization policy summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySummary {
    pub id: String,
    pub name: String,
}

/// One page of policies attached to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyPage {
    pub policies: Vec<PolicySummary>,
    pub next_token: Option<String>,
}

/// A stored secret parameter.
#[derive(Clone)]
pub struct Parameter {
    pub name: String,
    pub value: Zeroizing<String>,
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Upsert request for an encrypted parameter.
pub struct PutParameter {
    pub name: String,
    pub value: Zeroizing<String>,
    /// Key used to encrypt the value at rest
    pub key_id: String,
    pub overwrite: bool,
}

/// One page of parameter names under a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterPage {
    pub names: Vec<String>,
    pub next_token: Option<String>,
}
