//! Persistence properties: tunables travel with the fleet in one document,
//! damaged files self-heal, and a reset wipes both files.

use tether_core::config::RegistryDoc;
use tether_services::{registration, ChangeSignal, RegistryStore, RouteStore};

use crate::{peripheral, temp_state_path, TestCore};

#[tokio::test]
async fn tunables_survive_reopen_alongside_fleet() {
    let mut seed = RegistryDoc::default();
    seed.known_ports = "6900-6910".to_string();
    seed.scan_interval_secs = 17;
    let core = TestCore::open_with("tunables", seed).await;

    registration::register(
        &core.registry,
        &core.activity,
        "pump",
        "aaaaaaaa-0000-0000-0000-0000000000e1",
        6905,
    )
    .await
    .unwrap();

    let reopened = RegistryStore::open(core.registry_file.clone(), ChangeSignal::new())
        .await
        .unwrap();
    let doc = reopened.doc_snapshot().await;
    assert_eq!(doc.known_ports, "6900-6910");
    assert_eq!(doc.scan_interval_secs, 17);
    assert_eq!(doc.peripherals.len(), 1);
    assert_eq!(doc.peripherals[0].name, "pump");
    core.cleanup();
}

#[tokio::test]
async fn orchestrator_identity_is_stable_across_reopens() {
    let core = TestCore::open("identity").await;
    let first = core.registry.doc_snapshot().await.orchestrator_uuid;

    let reopened = RegistryStore::open(core.registry_file.clone(), ChangeSignal::new())
        .await
        .unwrap();
    assert_eq!(reopened.doc_snapshot().await.orchestrator_uuid, first);
    core.cleanup();
}

#[tokio::test]
async fn corrupt_registry_file_self_heals_on_open() {
    let path = temp_state_path("registry", "corrupt");
    std::fs::write(&path, "}}not json{{").unwrap();

    let store = RegistryStore::open(path.clone(), ChangeSignal::new())
        .await
        .unwrap();
    assert!(store.is_empty().await);
    assert!(serde_json::from_str::<RegistryDoc>(&std::fs::read_to_string(&path).unwrap()).is_ok());
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn reset_deletes_both_state_files() {
    let core = TestCore::open("reset").await;
    registration::register(
        &core.registry,
        &core.activity,
        "gone",
        "aaaaaaaa-0000-0000-0000-0000000000f1",
        6901,
    )
    .await
    .unwrap();
    core.routes
        .add(
            "r1",
            &peripheral("gone", "aaaaaaaa-0000-0000-0000-0000000000f1", 6901),
            &peripheral("dst", "aaaaaaaa-0000-0000-0000-0000000000f2", 6902),
        )
        .await
        .unwrap();

    core.registry.clear_and_delete().await.unwrap();
    core.routes.clear_and_delete().await.unwrap();

    assert!(!core.registry_file.exists());
    assert!(!core.routes_file.exists());
    assert!(core.registry.is_empty().await);
    assert!(core.routes.list().await.is_empty());
}

#[tokio::test]
async fn missing_routes_file_starts_empty() {
    let path = temp_state_path("routes", "missing");
    let store = RouteStore::open(path.clone()).await.unwrap();
    assert!(store.list().await.is_empty());
    let _ = std::fs::remove_file(path);
}
