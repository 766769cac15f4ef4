//! Plain-text backups of every secret record.
//!
//! ```json
//! {"creds_list": [{"service": "github", "username": "alice", "password": "..."}]}
//! ```
//!
//! One entry per credential, not grouped by service.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strongbox_common::ResultExt;
use zeroize::Zeroize;

use super::store::CredentialStore;
use crate::error::Result;

/// A backup file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    pub creds_list: Vec<BackupEntry>,
}

/// One credential of a backup.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub service: String,
    pub username: String,
    pub password: String,
}

impl Drop for BackupEntry {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for BackupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupEntry")
            .field("service", &self.service)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Records written back to the store
    pub records_written: usize,
    pub credentials_added: usize,
    /// Credentials whose username already existed for the service
    pub credentials_skipped: usize,
}

pub fn read_backup(path: &Path) -> Result<BackupFile> {
    let content = fs::read_to_string(path)
        .context(format!("Unable to read backup file {}", path.display()))?;
    let backup = serde_json::from_str(&content)
        .context(format!("Invalid backup file {}", path.display()))?;
    Ok(backup)
}

pub fn write_backup(path: &Path, backup: &BackupFile) -> Result<()> {
    let mut content =
        serde_json::to_string_pretty(backup).context("Unable to serialize backup")?;
    let written = fs::write(path, &content)
        .context(format!("Unable to write backup file {}", path.display()));
    content.zeroize();
    written?;

    tracing::info!(
        path = %path.display(),
        credentials = backup.creds_list.len(),
        "Wrote backup"
    );
    Ok(())
}

impl CredentialStore<'_> {
    /// Every credential in the vault as a flat list.
    pub async fn export(&self) -> Result<BackupFile> {
        let mut creds_list = Vec::new();

        for service in self.list_services().await? {
            let Some(record) = self.pull(&service).await? else {
                continue;
            };
            creds_list.extend(record.entries().iter().map(|(username, secret)| BackupEntry {
                service: service.clone(),
                username: username.clone(),
                password: secret.as_str().to_string(),
            }));
        }

        Ok(BackupFile { creds_list })
    }

    /// Merge a backup into the vault. Existing usernames are left untouched.
    #[tracing::instrument(skip_all, fields(credentials = backup.creds_list.len()))]
    pub async fn import(&self, backup: &BackupFile) -> Result<ImportSummary> {
        let mut by_service: BTreeMap<&str, Vec<&BackupEntry>> = BTreeMap::new();
        for entry in &backup.creds_list {
            by_service
                .entry(entry.service.as_str())
                .or_default()
                .push(entry);
        }

        let mut summary = ImportSummary::default();

        for (service, entries) in by_service {
            let mut record = self.record(service).await?;
            let mut added = 0;

            for entry in entries {
                if record.credential(&entry.username).is_some() {
                    tracing::debug!(
                        service = %service,
                        username = %entry.username,
                        "Credential exists, skipping"
                    );
                    summary.credentials_skipped += 1;
                    continue;
                }
                record.add_credential(&entry.username, &entry.password)?;
                added += 1;
            }

            if added > 0 {
                self.push(&record).await?;
                summary.records_written += 1;
                summary.credentials_added += added;
            }
        }

        tracing::info!(
            records = summary.records_written,
            added = summary.credentials_added,
            skipped = summary.credentials_skipped,
            "Imported backup"
        );
        Ok(summary)
    }
}
