use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use rand::{distributions::Alphanumeric, Rng};
use tempfile::{NamedTempFile, TempDir};

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::init_tracing;
use crate::errors::Error;
use crate::store::UploadClient;
use crate::target::UploadOptions;

// Helper function to create a temporary file with random content of a specified size
pub fn create_random_temp_file(size: usize) -> std::io::Result<(NamedTempFile, String)> {
    create_temp_file(&random_bytes(size))
}

// Helper function to create a temporary file with given content
pub fn create_temp_file(content: &[u8]) -> std::io::Result<(NamedTempFile, String)> {
    let mut temp_file = NamedTempFile::new()?;
    temp_file.write_all(content)?;
    let temp_path = temp_file.path().to_string_lossy().to_string();
    Ok((temp_file, temp_path))
}

pub fn random_bytes(size: usize) -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .collect()
}

/// Temp directory populated with `(relative path, content)` pairs
pub fn create_report_tree(files: &[(&str, &[u8])]) -> std::io::Result<TempDir> {
    let dir = tempfile::tempdir()?;
    for (relative, content) in files {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
    }
    Ok(dir)
}

#[derive(Clone, Debug)]
pub struct RecordedUpload {
    pub local_path: PathBuf,
    pub remote_key: ObjectPath,
    pub options: UploadOptions,
}

/// Upload client that records calls and fails for a configured set of keys
#[derive(Debug, Default)]
pub struct RecordingClient {
    uploads: Mutex<Vec<RecordedUpload>>,
    failing_keys: HashSet<String>,
    delay: Option<Duration>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(keys: &[&str]) -> Self {
        RecordingClient {
            failing_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay_ms(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    /// Successful uploads, in completion order
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadClient for RecordingClient {
    async fn upload(
        &self,
        local_path: &Path,
        remote_key: &ObjectPath,
        options: &UploadOptions,
    ) -> Result<(), Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_keys.contains(remote_key.as_ref()) {
            return Err(Error::ObjectStore(object_store::Error::Generic {
                store: "recording",
                source: format!("rejected {}", remote_key).into(),
            }));
        }
        self.uploads.lock().unwrap().push(RecordedUpload {
            local_path: local_path.to_path_buf(),
            remote_key: remote_key.clone(),
            options: options.clone(),
        });
        Ok(())
    }
}

pub fn init_logger() {
    std::env::set_var("RUST_LOG", "warn,report_publisher=trace");
    // Another test may already own the global subscriber
    let _ = init_tracing("pretty");
}
