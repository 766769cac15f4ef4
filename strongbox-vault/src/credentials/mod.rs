//! Per-service secret records.
//!
//! Each service's credentials are packed into one encrypted parameter at
//! `/<param_path>/<service>`. A record with no credentials left is deleted
//! rather than stored.

mod backup;
mod codec;
mod record;
mod store;

pub use backup::{read_backup, write_backup, BackupEntry, BackupFile, ImportSummary};
pub use codec::{decode, encode, Entries, MAX_RECORD_BYTES};
pub use record::SecretRecord;
pub use store::{CredentialStore, PushOutcome};
