//! Synchronizer reconciliation: a peripheral re-registers on a new port and
//! the cached route ports are repaired, including when the registry changed
//! on disk behind the in-memory store.

use tether_core::config::RegistryDoc;
use tether_services::{registration, sync, ChangeSignal, RegistryStore};

use crate::{line_sink, peripheral, TestCore};

#[tokio::test]
async fn reregistration_repairs_cached_route_ports() {
    let mut seed = RegistryDoc::default();
    seed.data_port_range = "7101-7110".to_string();
    let core = TestCore::open_with("repair", seed).await;

    registration::register(
        &core.registry,
        &core.activity,
        "src",
        "aaaaaaaa-0000-0000-0000-000000000011",
        6200,
    )
    .await
    .unwrap();
    registration::register(
        &core.registry,
        &core.activity,
        "dst",
        "aaaaaaaa-0000-0000-0000-000000000012",
        6201,
    )
    .await
    .unwrap();

    let src = core.registry.by_name("src").await.unwrap();
    let dst = core.registry.by_name("dst").await.unwrap();
    core.routes.add("r1", &src, &dst).await.unwrap();

    // destination comes back on a different control port
    registration::register(
        &core.registry,
        &core.activity,
        "dst",
        "aaaaaaaa-0000-0000-0000-000000000012",
        6266,
    )
    .await
    .unwrap();

    assert!(sync::sync_once(&core.registry, &core.routes)
        .await
        .unwrap());
    assert_eq!(core.routes.list().await[0].destination_port, 6266);

    // nothing left to repair on the next pass
    assert!(!sync::sync_once(&core.registry, &core.routes)
        .await
        .unwrap());
    core.cleanup();
}

#[tokio::test]
async fn sync_observes_registry_changes_made_on_disk() {
    let core = TestCore::open("on-disk").await;

    core.routes
        .add(
            "r1",
            &peripheral("src", "aaaaaaaa-0000-0000-0000-000000000021", 6200),
            &peripheral("dst", "aaaaaaaa-0000-0000-0000-000000000022", 6201),
        )
        .await
        .unwrap();

    // a second daemon's store writes the registry file directly
    let writer = RegistryStore::open(core.registry_file.clone(), ChangeSignal::new())
        .await
        .unwrap();
    writer
        .upsert_registered("dst", "aaaaaaaa-0000-0000-0000-000000000022", 6244)
        .await
        .unwrap();

    // the port map comes from disk, so the out-of-band write is seen, while
    // the first store's in-memory fleet is not replaced
    assert!(sync::sync_once(&core.registry, &core.routes)
        .await
        .unwrap());
    assert_eq!(core.routes.list().await[0].destination_port, 6244);
    assert!(core.registry.is_empty().await);
    core.cleanup();
}

#[tokio::test]
async fn repaired_route_forwards_to_new_port() {
    let core = TestCore::open("forward-after").await;
    let (new_port, received) = line_sink().await;

    core.routes
        .add(
            "r1",
            &peripheral("src", "aaaaaaaa-0000-0000-0000-000000000031", 6200),
            &peripheral("dst", "aaaaaaaa-0000-0000-0000-000000000032", 1),
        )
        .await
        .unwrap();

    core.registry
        .upsert_registered("dst", "aaaaaaaa-0000-0000-0000-000000000032", new_port)
        .await
        .unwrap();
    sync::sync_once(&core.registry, &core.routes)
        .await
        .unwrap();

    tether_services::routing::forward(
        &core.registry,
        &core.routes,
        &core.activity,
        "aaaaaaaa-0000-0000-0000-000000000031",
        "rerouted",
    )
    .await;
    assert_eq!(received.await.unwrap(), "rerouted\n");
    core.cleanup();
}
