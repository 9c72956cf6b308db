//! Tests for `relay listen` over in-memory pipes.

use crate::handlers;
use crate::listen::Listener;
use relay_core::run::RunStatus;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, BufReader};

const PROJECT: &str = r#"
policy:
  canonical_repository: acme/widget
pipelines_dir: pipelines
workspace: .
cache_dir: .cache
"#;

const PIPELINE: &str = r#"
name: ci
jobs:
  - id: build
    steps:
      - id: build
        uses: run
        with: { command: '[ "$RELAY_REF" = refs/heads/slow ] && sleep 30; true' }
"#;

fn project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("pipelines")).unwrap();
    std::fs::write(dir.path().join("pipelines/ci.yaml"), PIPELINE).unwrap();
    let path = dir.path().join("relay.yaml");
    std::fs::write(&path, PROJECT).unwrap();
    (dir, path)
}

async fn listener(path: &Path) -> Listener {
    let (project, catalog) = handlers::load_project(path).unwrap().unwrap();
    let dispatcher = handlers::build_dispatcher(&project, catalog).await.unwrap();
    Listener::new(dispatcher, "acme/widget")
}

#[tokio::test]
async fn test_listener_cancels_by_ref_and_keeps_serving() {
    let (_dir, path) = project();
    let listener = listener(&path).await;
    let (mut input, server) = tokio::io::duplex(1024);
    let mut output = Vec::new();

    let feed = async move {
        input
            .write_all(b"{\"type\": \"push\", \"ref\": \"refs/heads/slow\"}\nnot json\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        input
            .write_all(
                b"{\"type\": \"cancel\", \"ref\": \"refs/heads/slow\", \"reason\": \"stop\"}\n\
                  {\"type\": \"cancel\", \"ref\": \"refs/heads/idle\"}\n\
                  {\"type\": \"push\", \"ref\": \"refs/heads/fast\", \"sha\": \"4f2a9c1\"}\n",
            )
            .await
            .unwrap();
    };
    let serve = listener.serve(BufReader::new(server), &mut output, std::future::pending());

    let (reports, ()) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(serve, feed)
    })
    .await
    .expect("listener did not stop after input closed");
    let reports = reports.unwrap();

    assert_eq!(reports.len(), 2);
    let status = |git_ref: &str| {
        reports
            .iter()
            .find(|r| r.git_ref == git_ref)
            .map(|r| r.status)
            .unwrap_or_else(|| panic!("no report for {git_ref}"))
    };
    assert_eq!(status("refs/heads/slow"), RunStatus::Cancelled);
    assert_eq!(status("refs/heads/fast"), RunStatus::Succeeded);

    let written: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(written.len(), 2);
    assert!(written.iter().any(|r| r["status"] == "cancelled"));
}

#[tokio::test]
async fn test_shutdown_cancels_running_dispatches() {
    let (_dir, path) = project();
    let listener = listener(&path).await;
    let (mut input, server) = tokio::io::duplex(1024);
    input
        .write_all(b"{\"type\": \"push\", \"ref\": \"refs/heads/slow\"}\n")
        .await
        .unwrap();

    let reports = tokio::time::timeout(
        Duration::from_secs(10),
        listener.serve(
            BufReader::new(server),
            tokio::io::sink(),
            tokio::time::sleep(Duration::from_millis(300)),
        ),
    )
    .await
    .expect("shutdown did not stop the listener")
    .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, RunStatus::Cancelled);
    drop(input);
}
