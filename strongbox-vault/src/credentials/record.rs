//! The credentials of one service.

use std::fmt;

use zeroize::Zeroizing;

use super::codec::{validate_secret, validate_username, Entries};
use crate::error::{Result, VaultError};

/// Every username/secret pair stored for one service.
///
/// Secrets are wiped from memory when the record is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretRecord {
    service: String,
    entries: Entries,
}

impl SecretRecord {
    /// A record with no credentials yet.
    pub fn new(service: impl Into<String>) -> Self {
        Self::from_entries(service, Entries::new())
    }

    pub fn from_entries(service: impl Into<String>, entries: Entries) -> Self {
        Self {
            service: service.into(),
            entries,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Usernames in sorted order.
    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn credential(&self, username: &str) -> Option<&str> {
        self.entries.get(username).map(|s| s.as_str())
    }

    /// Add a new credential. An existing username is an error; use
    /// [`rotate_credential`](Self::rotate_credential) to change its secret.
    pub fn add_credential(&mut self, username: &str, secret: &str) -> Result<()> {
        self.check(username, secret)?;
        if self.entries.contains_key(username) {
            return Err(VaultError::CredentialExists {
                service: self.service.clone(),
                username: username.to_string(),
            });
        }
        self.entries
            .insert(username.to_string(), Zeroizing::new(secret.to_string()));
        Ok(())
    }

    /// Replace the secret of an existing credential.
    pub fn rotate_credential(&mut self, username: &str, secret: &str) -> Result<()> {
        self.check(username, secret)?;
        match self.entries.get_mut(username) {
            Some(current) => {
                *current = Zeroizing::new(secret.to_string());
                Ok(())
            }
            None => Err(self.missing(username)),
        }
    }

    pub fn remove_credential(&mut self, username: &str) -> Result<()> {
        self.entries
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| self.missing(username))
    }

    fn check(&self, username: &str, secret: &str) -> Result<()> {
        validate_username(username)
            .and_then(|()| validate_secret(secret))
            .map_err(|e| VaultError::encoding(&self.service, e))
    }

    fn missing(&self, username: &str) -> VaultError {
        VaultError::CredentialMissing {
            service: self.service.clone(),
            username: username.to_string(),
        }
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("service", &self.service)
            .field("users", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
