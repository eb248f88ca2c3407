//! Failure Tests - Rejections, Faults and Broken Connections
//!
//! These tests exercise the terminal failure paths over real TCP:
//! - Bind refused with a BIND_NAK
//! - Lookup answered with a FAULT partway through the map
//! - Server hanging up mid-enumeration
//! - Connection failures

mod common;

use common::*;
use epmap::{EpmError, LookupSessionBuilder, LookupStep, RejectReason, SessionState};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_bind_rejected() {
    init_tracing();
    let mut server = ScriptedServer::start(Script {
        reject_bind: Some(RejectReason::ProtocolVersionNotSupported),
        ..Script::default()
    })
    .await;

    let mut session = LookupSessionBuilder::new()
        .connect("127.0.0.1", server.port())
        .await
        .unwrap();
    let err = session.bind().await.unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::ProtocolVersionNotSupported));
    assert_eq!(session.state(), SessionState::Failed);

    // No lookups on a session that failed to bind
    assert!(matches!(session.next_endpoint().await, Err(EpmError::InvalidArgument(_))));
    session.close().await;

    let log = server.next_log().await;
    assert_eq!(log.lookups(), 0);
}

#[tokio::test]
async fn test_fault_during_enumeration() {
    init_tracing();
    let mut server = ScriptedServer::start(Script {
        entries: vec![tcp_entry(SAMR_UUID, 49664, ""), tcp_entry(LSARPC_UUID, 49665, "")],
        fault_at: Some((1, 0x1c010002)),
        ..Script::default()
    })
    .await;

    let mut session = LookupSessionBuilder::new()
        .connect("127.0.0.1", server.port())
        .await
        .unwrap();
    session.bind().await.unwrap();

    assert!(matches!(session.next_endpoint().await.unwrap(), LookupStep::Endpoint(_)));
    let err = session.next_endpoint().await.unwrap_err();
    assert_eq!(err.fault_status(), Some(0x1c010002));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.last_fault(), Some(0x1c010002));

    session.close().await;
    let log = server.next_log().await;
    assert_eq!(log.lookups(), 2);
    assert!(log.saw_shutdown());
}

#[tokio::test]
async fn test_enumerate_surfaces_fault() {
    init_tracing();
    let server = ScriptedServer::start(Script {
        entries: vec![tcp_entry(SAMR_UUID, 49664, "")],
        fault_at: Some((0, 0x1c010003)),
        ..Script::default()
    })
    .await;

    let mut session = LookupSessionBuilder::new()
        .connect("127.0.0.1", server.port())
        .await
        .unwrap();
    session.bind().await.unwrap();

    let err = session.enumerate().await.unwrap_err();
    assert!(matches!(err, EpmError::RemoteFault(0x1c010003)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_server_hangs_up() {
    init_tracing();
    let server = ScriptedServer::start(Script {
        entries: vec![tcp_entry(SAMR_UUID, 49664, "")],
        hang_up_at: Some(1),
        ..Script::default()
    })
    .await;

    let mut session = LookupSessionBuilder::new()
        .connect("127.0.0.1", server.port())
        .await
        .unwrap();
    session.bind().await.unwrap();
    session.next_endpoint().await.unwrap();

    let err = session.next_endpoint().await.unwrap_err();
    assert!(matches!(err, EpmError::ReceiveFailure(_)));
    assert_eq!(session.state(), SessionState::Failed);
    session.close().await;
}

#[tokio::test]
async fn test_connection_refused() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = LookupSessionBuilder::new()
        .connect("127.0.0.1", port)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EpmError::ConnectionFailure { .. }));
}
