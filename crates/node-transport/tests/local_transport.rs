//! End-to-end tests for the local backend through a session

use node_transport::{
    LocalAddresses, Node, SafetyFilter, TransportKind, TransportRouter, TransportSession,
};
use std::sync::Arc;
use std::time::Duration;

async fn local_session() -> TransportSession {
    let router = TransportRouter::with_local_addresses(LocalAddresses::from_parts(
        Vec::new(),
        Vec::new(),
    ));
    TransportSession::open(
        Node::ssh("127.0.0.1").with_name("self"),
        Arc::new(router),
        Arc::new(SafetyFilter::standard().unwrap()),
    )
    .await
    .unwrap()
    .with_timeout(Duration::from_secs(10))
}

#[smol_potat::test]
async fn test_ssh_to_loopback_runs_locally() {
    let session = local_session().await;
    assert_eq!(session.kind(), TransportKind::Local);
    assert_eq!(session.exec("echo hello").await.unwrap().trim(), "hello");
    session.close().await.unwrap();
}

#[smol_potat::test]
async fn test_upload_then_download_preserves_bytes() {
    let session = local_session().await;
    let dir = tempfile::tempdir().unwrap();

    let original = dir.path().join("original.log");
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&original, &payload).unwrap();

    let remote = dir.path().join("remote/stage/observer.log");
    session
        .upload(&original, remote.to_str().unwrap())
        .await
        .unwrap();

    let back = dir.path().join("back/observer.log");
    session
        .download(remote.to_str().unwrap(), &back)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&back).unwrap(), payload);
    session.close().await.unwrap();
}

#[smol_potat::test]
async fn test_failed_command_reports_output() {
    let session = local_session().await;
    let err = session.exec("ls /definitely/not/here").await.unwrap_err();
    assert!(matches!(err, node_transport::Error::CommandFailed { .. }));
    assert!(err.to_string().contains("/definitely/not/here"));
}

#[smol_potat::test]
async fn test_timeout_bounds_a_single_call() {
    let session = local_session().await;
    let err = session
        .exec_with_timeout("sleep 5", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, node_transport::Error::CommandTimeout { .. }));

    // The session remains usable after a timeout
    assert_eq!(session.exec("echo still-here").await.unwrap().trim(), "still-here");
}
