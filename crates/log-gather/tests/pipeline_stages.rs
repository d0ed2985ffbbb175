//! Pipeline behaviour against a scripted in-memory transport

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use log_gather::{GatherConfig, GatherRunner, ScopeCatalog, Selection};
use node_transport::{Connector, Error as TransportError, Node, SafetyFilter, Transport, TransportKind};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers `find` with a fixed listing and `stat` with a fixed size
#[derive(Clone)]
struct Scripted {
    files: Vec<String>,
    bundle_size: u64,
    commands: Arc<Mutex<Vec<String>>>,
    downloads: Arc<Mutex<Vec<String>>>,
}

impl Scripted {
    fn new(files: Vec<String>, bundle_size: u64) -> Self {
        Self {
            files,
            bundle_size,
            commands: Arc::default(),
            downloads: Arc::default(),
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|c| c.starts_with(prefix))
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for Scripted {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn exec(&self, command: &str) -> node_transport::Result<String> {
        self.commands.lock().unwrap().push(command.to_string());
        if command.starts_with("find ") {
            return Ok(self
                .files
                .iter()
                .map(|f| format!("/home/admin/oceanbase/log/{}\n", f))
                .collect());
        }
        if command.starts_with("stat -c %s") {
            return Ok(format!("{}\n", self.bundle_size));
        }
        Ok(String::new())
    }

    async fn download(&self, remote: &str, local: &Path) -> node_transport::Result<()> {
        self.downloads.lock().unwrap().push(remote.to_string());
        std::fs::create_dir_all(local.parent().unwrap())?;
        std::fs::write(local, b"bundle")?;
        Ok(())
    }

    async fn upload(&self, _local: &Path, _remote: &str) -> node_transport::Result<()> {
        Ok(())
    }
}

/// Hands out the scripted transport; `unreachable` is refused and `stalled`
/// never answers
struct ScriptedConnector {
    transport: Scripted,
    connects: AtomicUsize,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, node: &Node) -> node_transport::Result<Box<dyn Transport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if node.identity() == "stalled" {
            std::future::pending::<()>().await;
        }
        if node.identity() == "unreachable" {
            return Err(TransportError::init("unreachable", "Permission denied (publickey)"));
        }
        Ok(Box::new(self.transport.clone()))
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn node(name: &str) -> Node {
    Node::ssh("10.0.0.5")
        .with_name(name)
        .with_home_path("/home/admin/oceanbase")
}

fn config(store: &Path) -> GatherConfig {
    GatherConfig::new("observer", store)
        .with_selection(Selection::Since(Duration::from_secs(3600)))
        .with_timeout(Duration::from_secs(5))
}

fn runner(config: GatherConfig, transport: &Scripted) -> (GatherRunner, Arc<ScriptedConnector>) {
    let connector = Arc::new(ScriptedConnector {
        transport: transport.clone(),
        connects: AtomicUsize::new(0),
    });
    let runner = GatherRunner::new(
        config,
        ScopeCatalog::standard(),
        connector.clone(),
        Arc::new(SafetyFilter::standard().unwrap()),
    )
    .with_now(now());
    (runner, connector)
}

fn two_files() -> Vec<String> {
    vec![
        "observer.log".to_string(),
        "observer.log.20240101235900000".to_string(),
    ]
}

#[smol_potat::test]
async fn test_successful_run_downloads_one_bundle() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 1024);
    let (runner, _) = runner(config(store.path()), &transport);

    let results = runner.run(vec![node("zone1")]).await.unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success, "{}", result.info);
    assert_eq!(result.file_count, 2);
    assert_eq!(result.file_size, Some(1024));

    let bundle = result.bundle_path.as_ref().unwrap();
    assert!(bundle.starts_with(store.path()));
    let name = bundle.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("observer_log_zone1_20240101230000_20240102000000_"));
    assert!(name.ends_with(".tar.gz"));
    assert!(bundle.exists());
    assert_eq!(transport.download_count(), 1);

    // Strict stage order, with cleanup last
    let commands = transport.commands();
    let order: Vec<&str> = commands
        .iter()
        .map(|c| c.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(order, vec!["mkdir", "find", "cp", "cp", "tar", "stat", "rm"]);
}

#[smol_potat::test]
async fn test_too_many_files_skips_packaging() {
    let store = tempfile::tempdir().unwrap();
    let files: Vec<String> = (0..21).map(|i| format!("observer.log.part{}", i)).collect();
    let transport = Scripted::new(files, 1024);
    let (runner, _) = runner(config(store.path()).with_file_number_limit(20), &transport);

    let results = runner.run(vec![node("zone1")]).await.unwrap();
    assert!(!results[0].success);
    assert!(results[0].info.contains("too many files"));
    assert!(!transport.ran("cp "));
    assert!(!transport.ran("tar "));
    assert_eq!(transport.download_count(), 0);
    assert!(transport.ran("rm -rf "));
}

#[smol_potat::test]
async fn test_empty_bundle_is_not_downloaded() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 0);
    let (runner, _) = runner(config(store.path()), &transport);

    let results = runner.run(vec![node("zone1")]).await.unwrap();
    assert!(!results[0].success);
    assert!(results[0].info.contains("empty"));
    assert_eq!(transport.download_count(), 0);
    assert!(transport.ran("rm -rf "));
}

#[smol_potat::test]
async fn test_oversized_bundle_is_not_downloaded() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 4096);
    let (runner, _) = runner(config(store.path()).with_file_size_limit(4095), &transport);

    let results = runner.run(vec![node("zone1")]).await.unwrap();
    assert!(!results[0].success);
    assert!(results[0].info.contains("limit is 4095"));
    assert_eq!(transport.download_count(), 0);
    assert!(transport.ran("rm -rf "));
}

#[smol_potat::test]
async fn test_nothing_selected_is_discovery_empty() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(vec!["observer.log.20240101000000000".to_string()], 1024);
    let (runner, _) = runner(config(store.path()), &transport);

    let results = runner.run(vec![node("zone1")]).await.unwrap();
    assert!(!results[0].success);
    assert!(results[0].info.contains("no observer log files"));
    assert!(transport.ran("rm -rf "));
}

#[smol_potat::test]
async fn test_failing_node_does_not_affect_siblings() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 1024);
    let (runner, _) = runner(config(store.path()).with_parallelism(2), &transport);

    let results = runner
        .run(vec![node("zone1"), node("unreachable")])
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].node, "zone1");
    assert!(results[0].success);
    assert_eq!(results[1].node, "unreachable");
    assert!(!results[1].success);
    assert!(results[1].info.contains("failed to initialise"));
}

#[smol_potat::test]
async fn test_all_nodes_failing_is_a_normal_return() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 1024);
    let (runner, _) = runner(config(store.path()), &transport);

    let results = runner.run(vec![node("unreachable")]).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
}

#[smol_potat::test]
async fn test_grep_terms_are_chained() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(
        vec![
            "observer.log".to_string(),
            "observer.log.20240101235900000.gz".to_string(),
        ],
        1024,
    );
    let (runner, _) = runner(
        config(store.path()).with_grep("trace-42").with_grep("WARN"),
        &transport,
    );

    let results = runner.run(vec![node("zone1")]).await.unwrap();
    assert!(results[0].success, "{}", results[0].info);
    let commands = transport.commands();
    assert!(commands.iter().any(|c| c.contains(
        "grep -e trace-42 /home/admin/oceanbase/log/observer.log | grep -e WARN > "
    )));
    // Compressed files are copied verbatim
    assert!(commands.iter().any(|c| c.starts_with("cp ") && c.contains(".gz")));
}

#[smol_potat::test]
async fn test_recent_selection_names_bundle() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 1024);
    let (runner, _) = runner(
        config(store.path()).with_selection(Selection::Recent(3)),
        &transport,
    );

    let results = runner.run(vec![node("zone1")]).await.unwrap();
    let bundle = results[0].bundle_path.as_ref().unwrap();
    let name = bundle.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("observer_log_zone1_recent3_"));
}

#[smol_potat::test]
async fn test_bad_config_fails_before_any_node() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 1024);
    let (runner, connector) = runner(GatherConfig::new("no-such-scope", store.path()), &transport);

    let err = runner.run(vec![node("zone1")]).await.unwrap_err();
    assert!(matches!(err, log_gather::Error::Config(_)));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[smol_potat::test]
async fn test_stalled_connect_does_not_block_later_nodes() {
    let store = tempfile::tempdir().unwrap();
    let transport = Scripted::new(two_files(), 1024);
    let (runner, _) = runner(
        config(store.path()).with_timeout(Duration::from_secs(1)),
        &transport,
    );

    let run = async { Some(runner.run(vec![node("stalled"), node("zone1")]).await) };
    let deadline = async {
        smol::Timer::after(Duration::from_secs(10)).await;
        None
    };
    let results = smol::future::or(run, deadline)
        .await
        .expect("run blocked on a stalled connect")
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert!(results[0].info.contains("timed out"), "{}", results[0].info);
    assert!(results[1].success, "{}", results[1].info);
}
