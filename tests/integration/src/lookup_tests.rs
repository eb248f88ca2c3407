//! Lookup Tests - Full Enumeration over TCP
//!
//! These tests drive the public session API against a scripted endpoint
//! mapper on a loopback port:
//! - Enumeration of TCP, UDP and named pipe endpoints until exhaustion
//! - Continuation handle echo across requests
//! - Step-by-step lookups and session state
//! - Independent sessions in parallel

mod common;

use std::time::Duration;

use common::*;
use epmap::{Endpoint, LookupSessionBuilder, LookupStep, SessionState};

#[tokio::test]
async fn test_enumerate_three_entries_then_exhausted() {
    init_tracing();
    let mut server = ScriptedServer::start(Script::entries(vec![
        tcp_entry(SAMR_UUID, 49664, "SAM access"),
        udp_entry(NETLOGON_UUID, 49670),
        pipe_entry(LSARPC_UUID, "\\PIPE\\lsass", "LSA access"),
    ]))
    .await;

    let mut session = LookupSessionBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .connect("127.0.0.1", server.port())
        .await
        .unwrap();
    session.bind().await.unwrap();
    assert_eq!(session.assoc_group_id(), 0x1f2e);

    let entries = session.enumerate().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let bindings: Vec<String> = entries
        .iter()
        .map(|entry| entry.tower.endpoint().unwrap().binding("127.0.0.1"))
        .collect();
    assert_eq!(
        bindings,
        vec![
            "ncacn_ip_tcp:127.0.0.1[49664]",
            "ncacn_ip_udp:127.0.0.1[49670]",
            "ncacn_np:127.0.0.1[\\\\PIPE\\lsass]",
        ]
    );
    assert_eq!(entries[0].tower.interface, Some(uuid(SAMR_UUID)));
    assert_eq!(entries[0].annotation, "SAM access");
    assert_eq!(entries[2].annotation, "LSA access");

    let log = server.next_log().await;
    // Bind, three entries, the exhausting lookup, shutdown
    assert_eq!(log.lookups(), 4);
    assert!(log.saw_shutdown());
    assert_eq!(log.call_ids[..5], [1, 2, 3, 4, 5]);

    assert!(log.request_handles[0].is_nil());
    for handle in &log.request_handles[1..] {
        assert_eq!(*handle, SERVER_HANDLE);
    }
}

#[tokio::test]
async fn test_next_endpoint_step_by_step() {
    init_tracing();
    let mut server = ScriptedServer::start(Script::entries(vec![tcp_entry(SAMR_UUID, 135, "")])).await;

    let mut session = LookupSessionBuilder::new()
        .connect("127.0.0.1", server.port())
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    session.bind().await.unwrap();
    assert_eq!(session.state(), SessionState::Bound);

    match session.next_endpoint().await.unwrap() {
        LookupStep::Endpoint(entry) => {
            assert_eq!(entry.tower.endpoint(), Some(Endpoint::Tcp(135)));
        }
        other => panic!("expected an endpoint, got {:?}", other),
    }
    assert_eq!(*session.handle(), SERVER_HANDLE);

    assert_eq!(session.next_endpoint().await.unwrap(), LookupStep::EnumerationExhausted);
    assert_eq!(session.state(), SessionState::Exhausted);

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);

    let log = server.next_log().await;
    assert_eq!(log.lookups(), 2);
    assert!(log.saw_shutdown());
}

#[tokio::test]
async fn test_empty_map() {
    init_tracing();
    let mut server = ScriptedServer::start(Script::default()).await;

    let mut session = LookupSessionBuilder::new()
        .connect("127.0.0.1", server.port())
        .await
        .unwrap();
    session.bind().await.unwrap();
    assert!(session.enumerate().await.unwrap().is_empty());

    let log = server.next_log().await;
    assert_eq!(log.lookups(), 1);
}

#[tokio::test]
async fn test_parallel_sessions() {
    init_tracing();
    let mut server = ScriptedServer::start(Script::entries(vec![
        tcp_entry(SAMR_UUID, 49664, ""),
        tcp_entry(LSARPC_UUID, 49665, ""),
    ]))
    .await;
    let port = server.port();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            tokio::spawn(async move {
                let mut session = LookupSessionBuilder::new().connect("127.0.0.1", port).await?;
                session.bind().await?;
                session.enumerate().await
            })
        })
        .collect();

    for task in tasks {
        let entries = task.await.unwrap().unwrap();
        assert_eq!(entries.len(), 2);
    }
    for _ in 0..4 {
        assert_eq!(server.next_log().await.lookups(), 3);
    }
}
