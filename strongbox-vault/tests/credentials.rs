//! Integration tests for secret records on an installed vault.

use std::sync::Arc;

use strongbox_common::VaultConfig;
use strongbox_vault::credentials::{read_backup, write_backup};
use strongbox_vault::gateway::Operation;
use strongbox_vault::{
    CloudGateway, CredentialStore, MemoryAccessKeyStore, MemoryCloud, PushOutcome, SecretRecord,
    Timings, VaultError, VaultManager,
};
use tempfile::TempDir;
use tokio_test::assert_ok;

fn config() -> VaultConfig {
    VaultConfig {
        region: "us-east-1".into(),
        identity_name: "vault-user".into(),
        identity_policy_name: "vault-policy".into(),
        key_alias: "vault-key".into(),
        param_path: "vault".into(),
        ..VaultConfig::default()
    }
}

async fn installed(cloud: Arc<MemoryCloud>, config: &VaultConfig) -> CloudGateway {
    installed_with(cloud, config, &MemoryAccessKeyStore::new()).await
}

async fn installed_with(
    cloud: Arc<MemoryCloud>,
    config: &VaultConfig,
    access_keys: &MemoryAccessKeyStore,
) -> CloudGateway {
    let gateway = CloudGateway::from_provider(cloud);
    let report = VaultManager::new(&gateway, config, access_keys)
        .with_timings(Timings::immediate())
        .install()
        .await
        .unwrap();
    assert!(report.is_complete());
    gateway
}

async fn put(store: &CredentialStore<'_>, service: &str, credentials: &[(&str, &str)]) {
    let mut record = SecretRecord::new(service);
    for (username, secret) in credentials {
        record.add_credential(username, secret).unwrap();
    }
    assert_eq!(assert_ok!(store.push(&record).await), PushOutcome::Stored);
}

#[tokio::test]
async fn test_last_credential_removal_deletes_record() {
    let cloud = Arc::new(MemoryCloud::new());
    let config = config();
    let gateway = installed(cloud.clone(), &config).await;
    let store = CredentialStore::new(&gateway, &config);

    put(&store, "svcA", &[("u1", "p1")]).await;
    put(&store, "svcB", &[("u2", "p2"), ("u3", "p3")]).await;

    let mut svc_b = store.pull("svcB").await.unwrap().unwrap();
    assert_eq!(svc_b.users().collect::<Vec<_>>(), vec!["u2", "u3"]);
    assert_eq!(svc_b.credential("u2"), Some("p2"));

    svc_b.remove_credential("u2").unwrap();
    assert_eq!(assert_ok!(store.push(&svc_b).await), PushOutcome::Stored);
    assert_eq!(cloud.parameter_value("/vault/svcB").as_deref(), Some("u3:p3"));

    svc_b.remove_credential("u3").unwrap();
    assert_eq!(assert_ok!(store.push(&svc_b).await), PushOutcome::Deleted);

    assert!(store.pull("svcB").await.unwrap().is_none());
    assert_eq!(assert_ok!(store.list_services().await), vec!["svcA"]);
}

#[tokio::test]
async fn test_listing_spans_pages() {
    let cloud = Arc::new(MemoryCloud::new());
    let config = config();
    let gateway = installed(cloud.clone(), &config).await;
    let store = CredentialStore::new(&gateway, &config);

    for i in 0..14 {
        put(&store, &format!("service-{i:02}"), &[("alice", "secret")]).await;
    }

    let services = assert_ok!(store.list_services().await);

    assert_eq!(services.len(), 14);
    assert_eq!(services.first().map(String::as_str), Some("service-00"));
    assert_eq!(services.last().map(String::as_str), Some("service-13"));
    assert_eq!(cloud.calls(Operation::GetParametersByPath), 2);
}

#[tokio::test]
async fn test_listing_drops_names_repeated_across_pages() {
    let cloud = Arc::new(MemoryCloud::new());
    let config = config();
    let gateway = installed(cloud.clone(), &config).await;
    let store = CredentialStore::new(&gateway, &config);

    for i in 0..12 {
        put(&store, &format!("service-{i:02}"), &[("alice", "secret")]).await;
    }
    // service-03 is on the first page and listed again on the second
    cloud.repeat_in_listing("/vault/service-03");

    let services = assert_ok!(store.list_services().await);

    assert_eq!(services.len(), 12);
    assert_eq!(services.iter().filter(|s| *s == "service-03").count(), 1);
    assert_eq!(cloud.calls(Operation::GetParametersByPath), 2);
    assert_eq!(assert_ok!(store.wipe().await), 12);
}

#[tokio::test]
async fn test_nested_service_name_cannot_escape_wipe() {
    let cloud = Arc::new(MemoryCloud::new());
    let config = config();
    let gateway = installed(cloud.clone(), &config).await;
    let store = CredentialStore::new(&gateway, &config);

    let mut record = SecretRecord::new("team/github");
    record.add_credential("alice", "a").unwrap();
    assert!(matches!(
        store.push(&record).await.unwrap_err(),
        VaultError::Encoding { .. }
    ));

    assert_eq!(cloud.parameter_value("/vault/team/github"), None);
    assert!(assert_ok!(store.list_services().await).is_empty());
}

#[tokio::test]
async fn test_open_credentials_requires_installation() {
    let config = config();
    let cloud = Arc::new(MemoryCloud::new());
    let gateway = CloudGateway::from_provider(cloud);
    let access_keys = MemoryAccessKeyStore::new();
    let manager = VaultManager::new(&gateway, &config, &access_keys)
        .with_timings(Timings::immediate());

    let err = manager.open_credentials().await.err().unwrap();
    assert!(matches!(err, VaultError::NotInstalled { .. }));

    assert_ok!(manager.install().await);
    let store = manager.open_credentials().await.ok().unwrap();
    put(&store, "github", &[("alice", "a")]).await;
    assert_eq!(assert_ok!(store.list_services().await), vec!["github"]);
}

#[tokio::test]
async fn test_rotate_and_add_round_trip() {
    let cloud = Arc::new(MemoryCloud::new());
    let config = config();
    let gateway = installed(cloud, &config).await;
    let store = CredentialStore::new(&gateway, &config);
    put(&store, "github", &[("alice", "old")]).await;

    let mut record = assert_ok!(store.record("github").await);
    record.rotate_credential("alice", "new").unwrap();
    record.add_credential("bob", "b").unwrap();
    assert_ok!(store.push(&record).await);

    let stored = store.pull("github").await.unwrap().unwrap();
    assert_eq!(stored.credential("alice"), Some("new"));
    assert_eq!(stored.credential("bob"), Some("b"));

    let mut record = assert_ok!(store.record("github").await);
    let err = record.add_credential("alice", "again").unwrap_err();
    assert!(matches!(err, VaultError::CredentialExists { .. }));
}

#[tokio::test]
async fn test_oversize_record_is_not_stored() {
    let cloud = Arc::new(MemoryCloud::new());
    let config = config();
    let gateway = installed(cloud.clone(), &config).await;
    let store = CredentialStore::new(&gateway, &config);

    let mut record = SecretRecord::new("bulk");
    for i in 0..300 {
        record.add_credential(&format!("user-{i:03}"), "a-reasonably-long-secret").unwrap();
    }

    let err = store.push(&record).await.unwrap_err();

    assert!(matches!(err, VaultError::Encoding { .. }));
    assert_eq!(cloud.calls(Operation::PutParameter), 0);
}

#[tokio::test]
async fn test_records_unreadable_after_key_scheduled() {
    let cloud = Arc::new(MemoryCloud::new());
    let config = config();
    let access_keys = MemoryAccessKeyStore::new();
    let gateway = installed_with(cloud, &config, &access_keys).await;
    let store = CredentialStore::new(&gateway, &config);
    put(&store, "github", &[("alice", "a")]).await;

    let report = VaultManager::new(&gateway, &config, &access_keys)
        .with_timings(Timings::immediate())
        .eradicate(false)
        .await
        .unwrap();
    assert!(report.is_complete());

    // The record survives without a wipe but can no longer be decrypted
    assert_eq!(assert_ok!(store.list_services().await), vec!["github"]);
    assert!(matches!(
        store.pull("github").await.unwrap_err(),
        VaultError::Gateway(_)
    ));
}

#[tokio::test]
async fn test_backup_survives_reinstall() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("backup.json");
    let config = config();

    let first = installed(Arc::new(MemoryCloud::new()), &config).await;
    let store = CredentialStore::new(&first, &config);
    put(&store, "github", &[("alice", "a"), ("bob", "b")]).await;
    put(&store, "jira", &[("carol", "c")]).await;
    write_backup(&path, &assert_ok!(store.export().await)).unwrap();

    let second = installed(Arc::new(MemoryCloud::new()), &config).await;
    let store = CredentialStore::new(&second, &config);
    let summary = assert_ok!(store.import(&read_backup(&path).unwrap()).await);

    assert_eq!(summary.credentials_added, 3);
    assert_eq!(assert_ok!(store.list_services().await), vec!["github", "jira"]);
    let jira = store.pull("jira").await.unwrap().unwrap();
    assert_eq!(jira.credential("carol"), Some("c"));
}
