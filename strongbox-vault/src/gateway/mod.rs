//! Typed call surface of the cloud provider.
//!
//! Each provider capability is its own trait so components depend only on the
//! calls they make. [`CloudGateway`] bundles one implementation per capability;
//! a single provider type may implement all four and be shared via
//! [`CloudGateway::from_provider`].

mod memory;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use memory::MemoryCloud;
pub use types::{
    AccessKey, Capability, GatewayError, GatewayResult, KeyMetadata, KeyState, Operation,
    Parameter, ParameterPage, PolicyPage, PolicySummary, PutParameter, User,
};

/// Key-management service.
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Describe a key by id, ARN, or `alias/<name>`.
    async fn describe_key(&self, key_id: &str) -> GatewayResult<KeyMetadata>;

    /// Create a symmetric encrypt/decrypt key.
    async fn create_symmetric_key(&self, description: &str) -> GatewayResult<KeyMetadata>;

    async fn create_alias(&self, alias_name: &str, target_key_id: &str) -> GatewayResult<()>;

    async fn delete_alias(&self, alias_name: &str) -> GatewayResult<()>;

    /// Schedule a key for deletion after a pending window.
    async fn schedule_key_deletion(&self, key_id: &str, pending_window_days: u32)
        -> GatewayResult<()>;
}

/// Identity-management service.
#[async_trait]
pub trait IdentityManagement: Send + Sync {
    /// Account the caller's credentials belong to.
    async fn caller_account_id(&self) -> GatewayResult<String>;

    async fn get_user(&self, name: &str) -> GatewayResult<User>;

    async fn create_user(&self, name: &str) -> GatewayResult<User>;

    /// Create or replace an inline policy on a user.
    async fn put_user_policy(&self, user: &str, policy_name: &str, document: &str)
        -> GatewayResult<()>;

    async fn delete_user_policy(&self, user: &str, policy_name: &str) -> GatewayResult<()>;

    async fn create_access_key(&self, user: &str) -> GatewayResult<AccessKey>;

    async fn delete_access_key(&self, user: &str, access_key_id: &str) -> GatewayResult<()>;

    /// Delete a user. Fails while the user still has inline policies or access keys.
    async fn delete_user(&self, name: &str) -> GatewayResult<()>;
}

/// Organization policy-management service.
#[async_trait]
pub trait PolicyManagement: Send + Sync {
    /// List guardrail policies attached to a target, one page at a time.
    async fn list_policies_for_target(
        &self,
        target_id: &str,
        next_token: Option<&str>,
    ) -> GatewayResult<PolicyPage>;

    async fn create_policy(
        &self,
        name: &str,
        description: &str,
        content: &str,
    ) -> GatewayResult<PolicySummary>;

    async fn attach_policy(&self, policy_id: &str, target_id: &str) -> GatewayResult<()>;

    async fn detach_policy(&self, policy_id: &str, target_id: &str) -> GatewayResult<()>;

    /// Delete a policy. Fails while the policy is attached anywhere.
    async fn delete_policy(&self, policy_id: &str) -> GatewayResult<()>;
}

/// Path-addressed secret parameter store.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> GatewayResult<Parameter>;

    async fn put_parameter(&self, request: PutParameter) -> GatewayResult<()>;

    async fn delete_parameter(&self, name: &str) -> GatewayResult<()>;

    /// List parameter names directly under `path`, one page at a time.
    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> GatewayResult<ParameterPage>;
}

/// One implementation per provider capability.
#[derive(Clone)]
pub struct CloudGateway {
    keys: Arc<dyn KeyManagement>,
    identities: Arc<dyn IdentityManagement>,
    policies: Arc<dyn PolicyManagement>,
    parameters: Arc<dyn ParameterStore>,
}

impl CloudGateway {
    pub fn new(
        keys: Arc<dyn KeyManagement>,
        identities: Arc<dyn IdentityManagement>,
        policies: Arc<dyn PolicyManagement>,
        parameters: Arc<dyn ParameterStore>,
    ) -> Self {
        Self {
            keys,
            identities,
            policies,
            parameters,
        }
    }

    /// Use one provider for every capability.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: KeyManagement + IdentityManagement + PolicyManagement + ParameterStore + 'static,
    {
        Self {
            keys: provider.clone(),
            identities: provider.clone(),
            policies: provider.clone(),
            parameters: provider,
        }
    }

    pub fn keys(&self) -> &dyn KeyManagement {
        self.keys.as_ref()
    }

    pub fn identities(&self) -> &dyn IdentityManagement {
        self.identities.as_ref()
    }

    pub fn policies(&self) -> &dyn PolicyManagement {
        self.policies.as_ref()
    }

    pub fn parameters(&self) -> &dyn ParameterStore {
        self.parameters.as_ref()
    }
}
