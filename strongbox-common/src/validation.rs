//! Configuration validation for strongbox actions.
//!
//! Management actions (install, eradicate) need the names of every backing
//! resource; data actions (add, delete, search, rotate, backup) only need
//! enough to locate the key and the record path.

use thiserror::Error;

use crate::config::VaultConfig;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// The class of action a configuration is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Install or eradicate the vault infrastructure.
    Management,
    /// Day-to-day credential operations against an installed vault.
    Data,
}

const REQUIRED_MANAGEMENT_FIELDS: &[&str] = &[
    "region",
    "identity_name",
    "identity_policy_name",
    "key_alias",
    "param_path",
];

const REQUIRED_DATA_FIELDS: &[&str] = &["region", "identity_name", "key_alias", "param_path"];

const REQUIRED_GUARDRAIL_FIELDS: &[&str] = &["guardrail_policy_name", "member_role"];

impl VaultConfig {
    /// Validate that every field the given action needs is present.
    ///
    /// All missing fields are collected rather than stopping at the first.
    pub fn validate_for(&self, kind: ActionKind) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let required = match kind {
            ActionKind::Management => REQUIRED_MANAGEMENT_FIELDS,
            ActionKind::Data => REQUIRED_DATA_FIELDS,
        };
        for field in required {
            self.require(field, &mut errors);
        }

        if kind == ActionKind::Management && self.guardrail_enabled {
            for field in REQUIRED_GUARDRAIL_FIELDS {
                self.require(field, &mut errors);
            }
            let has_role = self
                .member_role
                .as_deref()
                .is_some_and(|role| !role.trim().is_empty());
            if has_role && self.member_account_id().is_none() {
                errors.push(ValidationError::InvalidValue {
                    field: "member_role".into(),
                    reason: "must be a role ARN carrying the member account id".into(),
                });
            }
        }

        if self.param_path.contains('/') {
            errors.push(ValidationError::InvalidValue {
                field: "param_path".into(),
                reason: "must be a single path segment without '/'".into(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    fn require(&self, field: &str, errors: &mut Vec<ValidationError>) {
        let value = match field {
            "region" => Some(self.region.as_str()),
            "identity_name" => Some(self.identity_name.as_str()),
            "identity_policy_name" => Some(self.identity_policy_name.as_str()),
            "key_alias" => Some(self.key_alias.as_str()),
            "param_path" => Some(self.param_path.as_str()),
            "guardrail_policy_name" => self.guardrail_policy_name.as_deref(),
            "member_role" => self.member_role.as_deref(),
            _ => None,
        };

        if value.map_or(true, |v| v.trim().is_empty()) {
            errors.push(ValidationError::MissingField {
                field: field.to_string(),
            });
        }
    }
}
