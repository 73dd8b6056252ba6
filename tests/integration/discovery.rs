//! End-to-end discovery: fake peripherals on real TCP ports, a full scan
//! pass, and the resulting registry state on disk.

use tether_core::config::RegistryDoc;
use tether_services::{discovery, ChangeSignal, RegistryStore};

use crate::{fake_peripheral, TestCore};

#[tokio::test]
async fn scan_discovers_and_survives_reopen() {
    let sensor = fake_peripheral("sensor", "aaaaaaaa-0000-0000-0000-0000000000a1").await;
    let camera = fake_peripheral("camera", "aaaaaaaa-0000-0000-0000-0000000000b1").await;

    let mut seed = RegistryDoc::default();
    seed.known_ports = format!("{sensor},{camera}");
    seed.socket_timeout_secs = 2;
    let core = TestCore::open_with("scan-reopen", seed).await;

    discovery::scan(&core.registry, &core.activity).await;
    assert_eq!(core.registry.len().await, 2);

    // a second pass refreshes in place, it never duplicates
    discovery::scan(&core.registry, &core.activity).await;
    assert_eq!(core.registry.len().await, 2);

    // the fleet is on disk: a fresh store sees the same peripherals
    let reopened = RegistryStore::open(core.registry_file.clone(), ChangeSignal::new())
        .await
        .unwrap();
    let names: Vec<String> = reopened
        .snapshot()
        .await
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert!(names.contains(&"sensor".to_string()));
    assert!(names.contains(&"camera".to_string()));
    core.cleanup();
}

#[tokio::test]
async fn scan_deduplicates_names_across_distinct_uuids() {
    let first = fake_peripheral("relay", "aaaaaaaa-0000-0000-0000-0000000000c1").await;
    let second = fake_peripheral("relay", "aaaaaaaa-0000-0000-0000-0000000000c2").await;

    let mut seed = RegistryDoc::default();
    seed.known_ports = format!("{first},{second}");
    seed.socket_timeout_secs = 2;
    let core = TestCore::open_with("scan-dedup", seed).await;

    discovery::scan(&core.registry, &core.activity).await;

    let mut names: Vec<String> = core
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(|p| p.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["relay".to_string(), "relay_2".to_string()]);
    core.cleanup();
}

#[tokio::test]
async fn scan_records_discovery_in_activity_log() {
    let port = fake_peripheral("probe", "aaaaaaaa-0000-0000-0000-0000000000d1").await;

    let mut seed = RegistryDoc::default();
    seed.known_ports = format!("{port}");
    seed.socket_timeout_secs = 2;
    let core = TestCore::open_with("scan-activity", seed).await;

    discovery::scan(&core.registry, &core.activity).await;
    let recent = core.activity.recent(5);
    assert!(recent
        .iter()
        .any(|(_, m)| m == &format!("Discovered new peripheral: probe on port {port}")));
    core.cleanup();
}
