//! Shared utilities for integration testing.
//!
//! Every gateway under test runs a small shell script as its program. The
//! script dispatches on its first word, so `/args/x` runs `cli.sh args x ...`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use command_gateway::config::GatewayConfig;
use command_gateway::lifecycle::Shutdown;
use command_gateway::GatewayServer;
use tempfile::TempDir;
use tokio::net::TcpListener;

const CLI_SCRIPT: &str = r#"#!/bin/sh
[ -n "$GATEWAY_MARKER" ] && touch "$GATEWAY_MARKER"

tmp_dir() {
    while [ $# -gt 0 ]; do
        if [ "$1" = "--tmpDir" ]; then
            printf '%s' "$2"
            return
        fi
        shift
    done
}

cmd="$1"
shift
case "$cmd" in
    args)
        printf '%s|' "$@"
        ;;
    exit)
        echo "failed with $1" >&2
        exit "$1"
        ;;
    stdin)
        cat
        ;;
    b64)
        printf 'aGVsbG8gd29ybGQ=\n'
        ;;
    json)
        printf '{"name":"Ada","langs":["rust","sh"]}'
        ;;
    tmpdir)
        dir=$(tmp_dir "$@")
        [ -d "$dir" ] && printf '%s' "$dir"
        ;;
    files)
        dir=$(tmp_dir "$@")
        ls "$dir" | sort | tr '\n' ' '
        ;;
    *)
        echo "unknown command: $cmd" >&2
        exit 127
        ;;
esac
"#;

/// A running gateway and the scratch space it owns.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub script: PathBuf,
    pub tmp_root: PathBuf,
    pub marker: PathBuf,
    shutdown: Shutdown,
    _dir: TempDir,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// True once the program has been run at least once.
    pub fn command_ran(&self) -> bool {
        self.marker.exists()
    }

    /// Number of scratch directories currently present.
    pub fn scratch_dirs(&self) -> usize {
        std::fs::read_dir(&self.tmp_root)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway on an ephemeral port, letting the test adjust its config.
pub async fn start_gateway<F>(configure: F) -> TestGateway
where
    F: FnOnce(&mut GatewayConfig, &Path),
{
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("cli.sh");
    std::fs::write(&script, CLI_SCRIPT).unwrap();

    let tmp_root = dir.path().join("scratch");
    let marker = dir.path().join("ran");

    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.command.program = format!("sh {}", script.display());
    config
        .command
        .env
        .insert("GATEWAY_MARKER".into(), marker.display().to_string());
    config.uploads.tmp_root = tmp_root.clone();
    config.views.dir = dir.path().join("views");
    configure(&mut config, dir.path());

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap();

    TestGateway {
        addr,
        client,
        script,
        tmp_root,
        marker,
        shutdown,
        _dir: dir,
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
