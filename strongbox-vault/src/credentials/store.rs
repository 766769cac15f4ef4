//! Secret records on top of the parameter store.

use std::collections::BTreeSet;

use strongbox_common::VaultConfig;

use super::codec::{decode, encode, validate_service};
use super::record::SecretRecord;
use crate::error::{Result, VaultError};
use crate::gateway::{CloudGateway, PutParameter};

/// What [`CredentialStore::push`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// The record had no credentials left and was removed
    Deleted,
}

/// Reads and writes the secret records of one vault.
pub struct CredentialStore<'a> {
    gateway: &'a CloudGateway,
    config: &'a VaultConfig,
}

impl<'a> CredentialStore<'a> {
    pub fn new(gateway: &'a CloudGateway, config: &'a VaultConfig) -> Self {
        Self { gateway, config }
    }

    /// Storage path of a service's record. Only single, non-empty path
    /// segments are accepted, anything else could not be listed or wiped.
    fn record_path(&self, service: &str) -> Result<String> {
        validate_service(service).map_err(|e| VaultError::encoding(service, e))?;
        Ok(self.config.record_path(service))
    }

    /// Fetch and decode a service's record. `None` means it does not exist.
    pub async fn pull(&self, service: &str) -> Result<Option<SecretRecord>> {
        let name = self.record_path(service)?;
        let parameter = match self.gateway.parameters().get_parameter(&name, true).await {
            Ok(parameter) => parameter,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entries = decode(&parameter.value).map_err(|e| VaultError::encoding(service, e))?;
        Ok(Some(SecretRecord::from_entries(service, entries)))
    }

    /// The service's record, or an empty one if it has none yet.
    pub async fn record(&self, service: &str) -> Result<SecretRecord> {
        Ok(self
            .pull(service)
            .await?
            .unwrap_or_else(|| SecretRecord::new(service)))
    }

    /// Write a record back. An empty record is deleted instead of stored.
    #[tracing::instrument(skip_all, fields(service = %record.service(), users = record.len()))]
    pub async fn push(&self, record: &SecretRecord) -> Result<PushOutcome> {
        let name = self.record_path(record.service())?;

        if record.is_empty() {
            match self.gateway.parameters().delete_parameter(&name).await {
                Ok(()) => tracing::info!("Deleted empty secret record"),
                Err(e) if e.is_not_found() => tracing::debug!("Empty secret record was never stored"),
                Err(e) => return Err(e.into()),
            }
            return Ok(PushOutcome::Deleted);
        }

        let value =
            encode(record.entries()).map_err(|e| VaultError::encoding(record.service(), e))?;
        self.gateway
            .parameters()
            .put_parameter(PutParameter {
                name,
                value,
                key_id: self.config.alias_name(),
                overwrite: true,
            })
            .await?;

        tracing::debug!("Stored secret record");
        Ok(PushOutcome::Stored)
    }

    /// Every service with a record, sorted and de-duplicated.
    pub async fn list_services(&self) -> Result<Vec<String>> {
        let root = self.config.records_root();
        let prefix = format!("{root}/");
        let mut services = BTreeSet::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .gateway
                .parameters()
                .get_parameters_by_path(&root, next_token.as_deref())
                .await?;

            services.extend(
                page.names
                    .iter()
                    .filter_map(|name| name.strip_prefix(&prefix))
                    .filter(|service| !service.is_empty())
                    .map(str::to_string),
            );

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(services.into_iter().collect())
    }

    pub async fn service_exists(&self, service: &str) -> Result<bool> {
        let name = self.record_path(service)?;
        match self.gateway.parameters().get_parameter(&name, false).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Services whose name starts with `prefix`.
    pub async fn search(&self, prefix: &str) -> Result<Vec<String>> {
        let mut services = self.list_services().await?;
        services.retain(|service| service.starts_with(prefix));
        Ok(services)
    }

    /// Delete every record. Returns how many were deleted.
    #[tracing::instrument(skip_all, fields(path = %self.config.records_root()))]
    pub async fn wipe(&self) -> Result<usize> {
        let mut deleted = 0;

        for service in self.list_services().await? {
            let name = self.record_path(&service)?;
            match self.gateway.parameters().delete_parameter(&name).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(deleted, "Wiped secret records");
        Ok(deleted)
    }
}
