//! Live tests against a Docker container
//!
//! Run with `--features docker-tests`. Requires a running container named by
//! `GATHER_TEST_CONTAINER` (default `gather-test`) with `sh` and `tar`.

#[cfg(feature = "docker-tests")]
mod tests {
    use node_transport::{DockerTransport, Node, Transport};

    fn container() -> String {
        std::env::var("GATHER_TEST_CONTAINER").unwrap_or_else(|_| "gather-test".to_string())
    }

    #[smol_potat::test]
    async fn test_exec_in_container() {
        let transport = DockerTransport::connect(&Node::docker(container()))
            .await
            .unwrap();
        let out = transport.exec("echo from-container").await.unwrap();
        assert_eq!(out.trim(), "from-container");
        assert!(transport.exec("exit 3").await.is_err());
    }

    #[smol_potat::test]
    async fn test_roundtrip_through_archive() {
        let transport = DockerTransport::connect(&Node::docker(container()))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.log");
        std::fs::write(&source, "observer line\n").unwrap();

        transport.upload(&source, "/tmp/gather-roundtrip.log").await.unwrap();
        let back = dir.path().join("out/gather-roundtrip.log");
        transport.download("/tmp/gather-roundtrip.log", &back).await.unwrap();

        assert_eq!(std::fs::read_to_string(back).unwrap(), "observer line\n");
        transport.exec("rm -f /tmp/gather-roundtrip.log").await.unwrap();
    }

    #[smol_potat::test]
    async fn test_missing_container_fails_to_connect() {
        let err = DockerTransport::connect(&Node::docker("gather-no-such-container"))
            .await
            .unwrap_err();
        assert!(matches!(err, node_transport::Error::TransportInit { .. }));
    }
}
