#![allow(dead_code)]

use std::io::ErrorKind;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use delayq_core::{DelayQueue, RedisStore};

/// A throwaway `redis-server` for e2e testing.
///
/// Listens on a random port with persistence disabled and a temporary
/// working directory. The server is killed when this struct is dropped.
pub struct TestRedis {
    child: Child,
    url: String,
    _dir: tempfile::TempDir,
}

impl TestRedis {
    /// Start a server, or return `None` when `redis-server` is not installed.
    pub fn start() -> Option<Self> {
        let port = free_port();
        let dir = tempfile::tempdir().expect("create temp dir");

        let spawned = Command::new("redis-server")
            .args(["--port", &port.to_string()])
            .args(["--bind", "127.0.0.1"])
            .args(["--save", ""])
            .args(["--appendonly", "no"])
            .current_dir(dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                eprintln!("redis-server not found on PATH, skipping");
                return None;
            }
            Err(e) => panic!("start redis-server: {e}"),
        };

        let addr = format!("127.0.0.1:{port}");
        let mut server = Self {
            child,
            url: format!("redis://{addr}/0"),
            _dir: dir,
        };

        // Poll TCP until the server is reachable.
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_secs(10) {
            if std::net::TcpStream::connect(&addr).is_ok() {
                return Some(server);
            }
            if let Ok(Some(status)) = server.child.try_wait() {
                panic!("redis-server exited early with {status}");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let _ = server.child.kill();
        panic!("redis-server did not become reachable at {addr} within 10s");
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn store(&self) -> RedisStore {
        RedisStore::connect(&self.url, Duration::from_secs(5))
            .await
            .expect("connect to redis")
    }

    pub async fn queue(&self) -> DelayQueue<RedisStore> {
        DelayQueue::new(self.store().await)
    }

    /// A raw connection for poking at the keyspace directly.
    pub async fn raw(&self) -> redis::aio::MultiplexedConnection {
        redis::Client::open(self.url.as_str())
            .expect("parse url")
            .get_multiplexed_async_connection()
            .await
            .expect("raw connection")
    }
}

impl Drop for TestRedis {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Output from a CLI invocation.
pub struct CliOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub success: bool,
}

impl CliOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// Run the `delayq` CLI binary against the given store URL. Returns `None`
/// when the binary has not been built.
pub fn cli_run(url: &str, args: &[&str]) -> Option<CliOutput> {
    let binary = cli_binary();
    if !binary.exists() {
        eprintln!("delayq CLI binary not found at {binary:?}, skipping");
        return None;
    }

    let output: Output = Command::new(&binary)
        .arg("--url")
        .arg(url)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run delayq CLI");

    Some(CliOutput {
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    })
}

/// Find a free TCP port.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to free port");
    listener.local_addr().unwrap().port()
}

/// Resolve the path to the delayq CLI binary in the workspace target directory.
fn cli_binary() -> PathBuf {
    let mut path = match std::env::var_os("CARGO_TARGET_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let mut root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            root.pop(); // crates/
            root.pop(); // workspace root
            root.push("target");
            root
        }
    };
    path.push("debug");
    path.push("delayq");
    path
}
