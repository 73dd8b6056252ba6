//! End-to-end routing: forwards over real TCP, external route-file edits
//! taken up without restart, and fan-out to several destinations.

use tether_core::Route;
use tether_services::routing;

use crate::{line_sink, peripheral, TestCore};

#[tokio::test]
async fn forward_delivers_and_stamps_route() {
    let core = TestCore::open("deliver").await;
    let (port, received) = line_sink().await;

    let src = peripheral("src", "u-src", 1);
    let dst = peripheral("dst", "u-dst", port);
    core.routes.add("r1", &src, &dst).await.unwrap();

    routing::forward(&core.registry, &core.routes, &core.activity, "u-src", "42.7").await;

    assert_eq!(received.await.unwrap(), "42.7\n");
    assert!(core.routes.list().await[0].last_used.is_some());
    core.cleanup();
}

#[tokio::test]
async fn external_route_file_edit_applies_without_restart() {
    let core = TestCore::open("hot-edit").await;
    let (port, received) = line_sink().await;

    // a route written to the file behind the store's back
    let injected = vec![Route {
        name: "injected".to_string(),
        source: "u-src".to_string(),
        destination: "u-dst".to_string(),
        source_port: 1,
        destination_port: port,
        last_used: None,
    }];
    std::fs::write(
        &core.routes_file,
        serde_json::to_string_pretty(&injected).unwrap(),
    )
    .unwrap();

    // forward reloads the table before matching, so the edit takes effect
    routing::forward(&core.registry, &core.routes, &core.activity, "u-src", "hot").await;

    assert_eq!(received.await.unwrap(), "hot\n");
    core.cleanup();
}

#[tokio::test]
async fn fanout_reaches_every_destination() {
    let core = TestCore::open("fanout").await;
    let (port_a, recv_a) = line_sink().await;
    let (port_b, recv_b) = line_sink().await;

    let src = peripheral("src", "u-src", 1);
    core.routes
        .add("to-a", &src, &peripheral("a", "u-a", port_a))
        .await
        .unwrap();
    core.routes
        .add("to-b", &src, &peripheral("b", "u-b", port_b))
        .await
        .unwrap();

    routing::forward(&core.registry, &core.routes, &core.activity, "u-src", "both").await;

    assert_eq!(recv_a.await.unwrap(), "both\n");
    assert_eq!(recv_b.await.unwrap(), "both\n");
    core.cleanup();
}
