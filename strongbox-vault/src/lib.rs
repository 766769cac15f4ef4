//! Strongbox Vault - lifecycle management and credential records for a
//! cloud-backed secret vault.
//!
//! A vault is made of up to three provider resources:
//! - An encryption key reachable through an alias
//! - A dedicated identity with an inline access policy and an access key
//! - An optional organization guardrail policy restricting record access
//!
//! ## Architecture
//!
//! Every run starts from what the provider reports; no local state is kept.
//!
//! ```text
//! VaultManager ── ResourceProbe ──────────┐
//!      │      ├── ResourceProvisioner ────┼── CloudGateway (keys, identities,
//!      │      └── ResourceDecommissioner ─┘                 policies, parameters)
//!      └── CredentialStore ── codec ── one parameter per service
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod access_keys;
pub mod credentials;
pub mod decommissioner;
pub mod error;
pub mod gateway;
pub mod infrastructure;
pub mod lifecycle;
pub mod policy;
pub mod probe;
pub mod provisioner;

// Re-export commonly used types
pub use access_keys::{AccessKeyStore, MemoryAccessKeyStore, SharedCredentialsFile};
pub use credentials::{BackupFile, CredentialStore, ImportSummary, PushOutcome, SecretRecord};
pub use decommissioner::{ResourceDecommissioner, TeardownOutcome};
pub use error::{Component, EncodingError, Result, VaultError};
pub use gateway::{CloudGateway, GatewayError, MemoryCloud};
pub use infrastructure::{IdentityRef, KeyRef, PolicyId, ProvisioningState, VaultInfrastructure};
pub use lifecycle::{EradicationReport, InstallReport, Timings, VaultManager, VaultStatus};
pub use probe::ResourceProbe;
pub use provisioner::ResourceProvisioner;
