//! Shared test infrastructure for integration tests.
//!
//! Spawns the compiled `s3emu` binary against an ephemeral data directory
//! and drives it with a real `aws-sdk-s3` client.

#![allow(dead_code)]

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;
use rand::{Rng, SeedableRng};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(19100);

/// The emulator's one fixed signing identity (see `src/accounts.rs`).
pub const ACCESS_KEY: &str = "S3RVER";
pub const SECRET_KEY: &str = "S3RVER";

/// A running `s3emu` process plus the temp directory backing it.
pub struct TestServer {
    process: Child,
    port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Start a server listening on an ephemeral loopback port.
    pub async fn start() -> Self {
        Self::start_with_args(&[]).await
    }

    /// Start a server with extra CLI flags appended after the required ones.
    pub async fn start_with_args(extra_args: &[&str]) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let data_dir = TempDir::new().expect("failed to create temp dir");

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_s3emu"));
        cmd.arg("-d")
            .arg(data_dir.path())
            .arg("-a")
            .arg("127.0.0.1")
            .arg("-p")
            .arg(port.to_string())
            .arg("-s")
            .env("RUST_LOG", "s3emu=warn");
        for arg in extra_args {
            cmd.arg(arg);
        }

        let process = cmd.spawn().expect("failed to start s3emu");

        let mut server = Self {
            process,
            port,
            _data_dir: data_dir,
        };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&mut self) {
        let addr = format!("127.0.0.1:{}", self.port);
        for _ in 0..150 {
            if std::net::TcpStream::connect(&addr).is_ok() {
                sleep(Duration::from_millis(50)).await;
                return;
            }
            if let Ok(Some(status)) = self.process.try_wait() {
                panic!("s3emu exited before becoming ready: {status}");
            }
            sleep(Duration::from_millis(100)).await;
        }
        let _ = self.process.kill();
        panic!("timed out waiting for s3emu on {addr}");
    }

    /// An `aws-sdk-s3` client forced to path-style addressing against this server.
    pub fn s3_client(&self) -> Client {
        let credentials = Credentials::new(ACCESS_KEY, SECRET_KEY, None, None, "s3emu-test");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(self.endpoint())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        Client::from_conf(config)
    }

    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

/// Deterministic binary payload, reproducible across test runs by seed.
pub fn generate_binary(size: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill(&mut data[..]);
    data
}
