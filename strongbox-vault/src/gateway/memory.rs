//! In-memory cloud provider.
//!
//! Implements every gateway capability against process-local state with the
//! same observable rules the real services enforce: paginated listings, users
//! that cannot be deleted while they own policies or access keys, policies
//! that cannot be deleted while attached, and parameters that stop decrypting
//! once their key is pending deletion. Any operation can be forced to fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::types::{
    AccessKey, GatewayError, GatewayResult, KeyMetadata, KeyState, Operation, Parameter,
    ParameterPage, PolicyPage, PolicySummary, PutParameter, User,
};
use super::{IdentityManagement, KeyManagement, ParameterStore, PolicyManagement};

/// Largest listing page the provider returns.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Largest parameter value the provider accepts, in bytes.
pub const MAX_PARAMETER_BYTES: usize = 4096;

const DEFAULT_ACCOUNT_ID: &str = "123456789012";
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Default)]
struct UserState {
    arn: String,
    inline_policies: BTreeMap<String, String>,
    access_keys: Vec<String>,
}

struct PolicyState {
    name: String,
    content: String,
}

struct StoredParameter {
    value: Zeroizing<String>,
    key_id: String,
}

#[derive(Default)]
struct CloudState {
    keys: BTreeMap<String, KeyMetadata>,
    aliases: BTreeMap<String, String>,
    users: BTreeMap<String, UserState>,
    policies: BTreeMap<String, PolicyState>,
    /// (policy id, target id) in attachment order
    attachments: Vec<(String, String)>,
    parameters: BTreeMap<String, StoredParameter>,
    /// Parameter names listed a second time at the end of path listings
    repeated_listings: Vec<String>,
    failures: HashSet<Operation>,
    calls: HashMap<Operation, usize>,
}

impl CloudState {
    fn resolve_key(&self, key_id: &str) -> Option<&KeyMetadata> {
        let id = self.aliases.get(key_id).map_or(key_id, String::as_str);
        self.keys
            .get(id)
            .or_else(|| self.keys.values().find(|key| key.arn == id))
    }

    fn resolve_key_mut(&mut self, key_id: &str) -> Option<&mut KeyMetadata> {
        let id = self
            .resolve_key(key_id)
            .map(|key| key.key_id.clone())?;
        self.keys.get_mut(&id)
    }
}

/// Process-local implementation of every gateway capability.
pub struct MemoryCloud {
    account_id: String,
    region: String,
    page_size: usize,
    state: Mutex<CloudState>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(CloudState::default()),
        }
    }

    /// Use a different account id.
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    /// Use a different listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Make every later call of `operation` fail with a service error.
    pub fn fail(&self, operation: Operation) {
        self.lock().failures.insert(operation);
    }

    /// Undo [`fail`](Self::fail).
    pub fn restore(&self, operation: Operation) {
        self.lock().failures.remove(&operation);
    }

    /// Number of times `operation` has been called, failed calls included.
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Number of keys not pending deletion.
    pub fn live_key_count(&self) -> usize {
        self.lock()
            .keys
            .values()
            .filter(|key| key.state != KeyState::PendingDeletion)
            .count()
    }

    /// Key id an alias points at.
    pub fn alias_target(&self, alias_name: &str) -> Option<String> {
        self.lock().aliases.get(alias_name).cloned()
    }

    /// Inline policy document attached to a user.
    pub fn user_policy(&self, user: &str, policy_name: &str) -> Option<String> {
        self.lock()
            .users
            .get(user)
            .and_then(|u| u.inline_policies.get(policy_name).cloned())
    }

    /// Number of access keys a user owns.
    pub fn access_key_count(&self, user: &str) -> usize {
        self.lock()
            .users
            .get(user)
            .map_or(0, |u| u.access_keys.len())
    }

    /// Content of an organization policy, looked up by name.
    pub fn policy_content(&self, name: &str) -> Option<String> {
        self.lock()
            .policies
            .values()
            .find(|p| p.name == name)
            .map(|p| p.content.clone())
    }

    /// Number of organization policies, attached or not.
    pub fn policy_count(&self) -> usize {
        self.lock().policies.len()
    }

    /// Attach an unrelated policy to a target, e.g. to push the vault
    /// guardrail onto a later listing page.
    pub fn seed_attached_policy(&self, name: &str, target_id: &str) -> String {
        let mut state = self.lock();
        let id = new_policy_id();
        state.policies.insert(
            id.clone(),
            PolicyState {
                name: name.to_string(),
                content: "{}".to_string(),
            },
        );
        state.attachments.push((id.clone(), target_id.to_string()));
        id
    }

    /// List a stored parameter again at the end of every path listing, the
    /// way a listing that shifts between pages can return a name twice.
    pub fn repeat_in_listing(&self, name: &str) {
        self.lock().repeated_listings.push(name.to_string());
    }

    /// Raw stored value of a parameter, bypassing key checks.
    pub fn parameter_value(&self, name: &str) -> Option<String> {
        self.lock()
            .parameters
            .get(name)
            .map(|p| p.value.as_str().to_string())
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and apply any injected failure.
    fn enter(&self, operation: Operation) -> GatewayResult<MutexGuard<'_, CloudState>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_insert(0) += 1;
        if state.failures.contains(&operation) {
            tracing::debug!(%operation, "Injected failure");
            return Err(GatewayError::service(operation, "injected failure"));
        }
        Ok(state)
    }

    fn page<T: Clone>(
        &self,
        items: &[T],
        next_token: Option<&str>,
        operation: Operation,
    ) -> GatewayResult<(Vec<T>, Option<String>)> {
        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| GatewayError::service(operation, format!("invalid token {token}")))?,
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let batch = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let next = (end < items.len()).then(|| end.to_string());
        Ok((batch, next))
    }
}

fn new_policy_id() -> String {
    format!("p-{}", &Uuid::new_v4().simple().to_string()[..12])
}

#[async_trait]
impl KeyManagement for MemoryCloud {
    async fn describe_key(&self, key_id: &str) -> GatewayResult<KeyMetadata> {
        let state = self.enter(Operation::DescribeKey)?;
        state
            .resolve_key(key_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(Operation::DescribeKey, key_id))
    }

    async fn create_symmetric_key(&self, _description: &str) -> GatewayResult<KeyMetadata> {
        let mut state = self.enter(Operation::CreateKey)?;
        let key_id = Uuid::new_v4().to_string();
        let key = KeyMetadata {
            arn: format!("arn:aws:kms:{}:{}:key/{}", self.region, self.account_id, key_id),
            key_id: key_id.clone(),
            state: KeyState::Enabled,
        };
        state.keys.insert(key_id, key.clone());
        Ok(key)
    }

    async fn create_alias(&self, alias_name: &str, target_key_id: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::CreateAlias)?;
        if !alias_name.starts_with("alias/") {
            return Err(GatewayError::service(
                Operation::CreateAlias,
                format!("alias {alias_name} must begin with alias/"),
            ));
        }
        if state.aliases.contains_key(alias_name) {
            return Err(GatewayError::already_exists(Operation::CreateAlias, alias_name));
        }
        let key_id = state
            .resolve_key(target_key_id)
            .map(|key| key.key_id.clone())
            .ok_or_else(|| GatewayError::not_found(Operation::CreateAlias, target_key_id))?;
        state.aliases.insert(alias_name.to_string(), key_id);
        Ok(())
    }

    async fn delete_alias(&self, alias_name: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::DeleteAlias)?;
        state
            .aliases
            .remove(alias_name)
            .map(|_| ())
            .ok_or_else(|| GatewayError::not_found(Operation::DeleteAlias, alias_name))
    }

    async fn schedule_key_deletion(
        &self,
        key_id: &str,
        pending_window_days: u32,
    ) -> GatewayResult<()> {
        let mut state = self.enter(Operation::ScheduleKeyDeletion)?;
        if !(7..=30).contains(&pending_window_days) {
            return Err(GatewayError::service(
                Operation::ScheduleKeyDeletion,
                format!("pending window of {pending_window_days} days is outside 7-30"),
            ));
        }
        let key = state
            .resolve_key_mut(key_id)
            .ok_or_else(|| GatewayError::not_found(Operation::ScheduleKeyDeletion, key_id))?;
        if key.state == KeyState::PendingDeletion {
            return Err(GatewayError::service(
                Operation::ScheduleKeyDeletion,
                format!("key {key_id} is already pending deletion"),
            ));
        }
        key.state = KeyState::PendingDeletion;
        Ok(())
    }
}

#[async_trait]
impl IdentityManagement for MemoryCloud {
    async fn caller_account_id(&self) -> GatewayResult<String> {
        let _state = self.enter(Operation::GetCallerIdentity)?;
        Ok(self.account_id.clone())
    }

    async fn get_user(&self, name: &str) -> GatewayResult<User> {
        let state = self.enter(Operation::GetUser)?;
        state
            .users
            .get(name)
            .map(|u| User {
                name: name.to_string(),
                arn: u.arn.clone(),
            })
            .ok_or_else(|| GatewayError::not_found(Operation::GetUser, name))
    }

    async fn create_user(&self, name: &str) -> GatewayResult<User> {
        let mut state = self.enter(Operation::CreateUser)?;
        if state.users.contains_key(name) {
            return Err(GatewayError::already_exists(Operation::CreateUser, name));
        }
        let arn = format!("arn:aws:iam::{}:user/{}", self.account_id, name);
        state.users.insert(
            name.to_string(),
            UserState {
                arn: arn.clone(),
                ..UserState::default()
            },
        );
        Ok(User {
            name: name.to_string(),
            arn,
        })
    }

    async fn put_user_policy(
        &self,
        user: &str,
        policy_name: &str,
        document: &str,
    ) -> GatewayResult<()> {
        let mut state = self.enter(Operation::PutUserPolicy)?;
        if serde_json::from_str::<serde_json::Value>(document).is_err() {
            return Err(GatewayError::service(
                Operation::PutUserPolicy,
                "malformed policy document",
            ));
        }
        let entry = state
            .users
            .get_mut(user)
            .ok_or_else(|| GatewayError::not_found(Operation::PutUserPolicy, user))?;
        entry
            .inline_policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }

    async fn delete_user_policy(&self, user: &str, policy_name: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::DeleteUserPolicy)?;
        let entry = state
            .users
            .get_mut(user)
            .ok_or_else(|| GatewayError::not_found(Operation::DeleteUserPolicy, user))?;
        entry
            .inline_policies
            .remove(policy_name)
            .map(|_| ())
            .ok_or_else(|| GatewayError::not_found(Operation::DeleteUserPolicy, policy_name))
    }

    async fn create_access_key(&self, user: &str) -> GatewayResult<AccessKey> {
        let mut state = self.enter(Operation::CreateAccessKey)?;
        let entry = state
            .users
            .get_mut(user)
            .ok_or_else(|| GatewayError::not_found(Operation::CreateAccessKey, user))?;
        let id = Uuid::new_v4().simple().to_string().to_uppercase();
        let access_key_id = format!("AKIA{}", &id[..16]);
        entry.access_keys.push(access_key_id.clone());
        Ok(AccessKey {
            access_key_id,
            secret_access_key: Zeroizing::new(Uuid::new_v4().simple().to_string()),
        })
    }

    async fn delete_access_key(&self, user: &str, access_key_id: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::DeleteAccessKey)?;
        let entry = state
            .users
            .get_mut(user)
            .ok_or_else(|| GatewayError::not_found(Operation::DeleteAccessKey, user))?;
        let before = entry.access_keys.len();
        entry.access_keys.retain(|id| id != access_key_id);
        if entry.access_keys.len() == before {
            return Err(GatewayError::not_found(Operation::DeleteAccessKey, access_key_id));
        }
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::DeleteUser)?;
        let entry = state
            .users
            .get(name)
            .ok_or_else(|| GatewayError::not_found(Operation::DeleteUser, name))?;
        if !entry.inline_policies.is_empty() || !entry.access_keys.is_empty() {
            return Err(GatewayError::service(
                Operation::DeleteUser,
                format!("user {name} still has policies or access keys"),
            ));
        }
        state.users.remove(name);
        Ok(())
    }
}

#[async_trait]
impl PolicyManagement for MemoryCloud {
    async fn list_policies_for_target(
        &self,
        target_id: &str,
        next_token: Option<&str>,
    ) -> GatewayResult<PolicyPage> {
        let state = self.enter(Operation::ListPoliciesForTarget)?;
        let attached: Vec<PolicySummary> = state
            .attachments
            .iter()
            .filter(|(_, target)| target == target_id)
            .filter_map(|(id, _)| {
                state.policies.get(id).map(|p| PolicySummary {
                    id: id.clone(),
                    name: p.name.clone(),
                })
            })
            .collect();
        let (policies, next_token) =
            self.page(&attached, next_token, Operation::ListPoliciesForTarget)?;
        Ok(PolicyPage {
            policies,
            next_token,
        })
    }

    async fn create_policy(
        &self,
        name: &str,
        _description: &str,
        content: &str,
    ) -> GatewayResult<PolicySummary> {
        let mut state = self.enter(Operation::CreatePolicy)?;
        if state.policies.values().any(|p| p.name == name) {
            return Err(GatewayError::already_exists(Operation::CreatePolicy, name));
        }
        let id = new_policy_id();
        state.policies.insert(
            id.clone(),
            PolicyState {
                name: name.to_string(),
                content: content.to_string(),
            },
        );
        Ok(PolicySummary {
            id,
            name: name.to_string(),
        })
    }

    async fn attach_policy(&self, policy_id: &str, target_id: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::AttachPolicy)?;
        if !state.policies.contains_key(policy_id) {
            return Err(GatewayError::not_found(Operation::AttachPolicy, policy_id));
        }
        let attachment = (policy_id.to_string(), target_id.to_string());
        if state.attachments.contains(&attachment) {
            return Err(GatewayError::already_exists(
                Operation::AttachPolicy,
                format!("{policy_id} on {target_id}"),
            ));
        }
        state.attachments.push(attachment);
        Ok(())
    }

    async fn detach_policy(&self, policy_id: &str, target_id: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::DetachPolicy)?;
        let attachment = (policy_id.to_string(), target_id.to_string());
        let before = state.attachments.len();
        state.attachments.retain(|a| *a != attachment);
        if state.attachments.len() == before {
            return Err(GatewayError::not_found(
                Operation::DetachPolicy,
                format!("{policy_id} on {target_id}"),
            ));
        }
        Ok(())
    }

    async fn delete_policy(&self, policy_id: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::DeletePolicy)?;
        if !state.policies.contains_key(policy_id) {
            return Err(GatewayError::not_found(Operation::DeletePolicy, policy_id));
        }
        if state.attachments.iter().any(|(id, _)| id == policy_id) {
            return Err(GatewayError::service(
                Operation::DeletePolicy,
                format!("policy {policy_id} is still attached"),
            ));
        }
        state.policies.remove(policy_id);
        Ok(())
    }
}

#[async_trait]
impl ParameterStore for MemoryCloud {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> GatewayResult<Parameter> {
        let state = self.enter(Operation::GetParameter)?;
        let stored = state
            .parameters
            .get(name)
            .ok_or_else(|| GatewayError::not_found(Operation::GetParameter, name))?;
        if !with_decryption {
            return Ok(Parameter {
                name: name.to_string(),
                value: Zeroizing::new("<encrypted>".to_string()),
            });
        }
        match state.resolve_key(&stored.key_id) {
            Some(key) if key.state == KeyState::Enabled => Ok(Parameter {
                name: name.to_string(),
                value: stored.value.clone(),
            }),
            _ => Err(GatewayError::service(
                Operation::GetParameter,
                format!("key {} cannot decrypt {name}", stored.key_id),
            )),
        }
    }

    async fn put_parameter(&self, request: PutParameter) -> GatewayResult<()> {
        let mut state = self.enter(Operation::PutParameter)?;
        if request.value.len() > MAX_PARAMETER_BYTES {
            return Err(GatewayError::service(
                Operation::PutParameter,
                format!("value exceeds {MAX_PARAMETER_BYTES} bytes"),
            ));
        }
        let key_id = match state.resolve_key(&request.key_id) {
            Some(key) if key.state == KeyState::Enabled => key.key_id.clone(),
            Some(_) => {
                return Err(GatewayError::service(
                    Operation::PutParameter,
                    format!("key {} is not enabled", request.key_id),
                ))
            }
            None => return Err(GatewayError::not_found(Operation::PutParameter, request.key_id)),
        };
        if !request.overwrite && state.parameters.contains_key(&request.name) {
            return Err(GatewayError::already_exists(Operation::PutParameter, request.name));
        }
        state.parameters.insert(
            request.name,
            StoredParameter {
                value: request.value,
                key_id,
            },
        );
        Ok(())
    }

    async fn delete_parameter(&self, name: &str) -> GatewayResult<()> {
        let mut state = self.enter(Operation::DeleteParameter)?;
        state
            .parameters
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GatewayError::not_found(Operation::DeleteParameter, name))
    }

    async fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> GatewayResult<ParameterPage> {
        let state = self.enter(Operation::GetParametersByPath)?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let is_child = |name: &&String| {
            name.strip_prefix(&prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        };
        let names: Vec<String> = state
            .parameters
            .keys()
            .chain(
                state
                    .repeated_listings
                    .iter()
                    .filter(|name| state.parameters.contains_key(*name)),
            )
            .filter(is_child)
            .cloned()
            .collect();
        let (names, next_token) = self.page(&names, next_token, Operation::GetParametersByPath)?;
        Ok(ParameterPage { names, next_token })
    }
}
