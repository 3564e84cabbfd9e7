use chrono::{DateTime, Utc};
use object_store::path::Path as ObjectPath;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use walkdir::DirEntry;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::errors::Error;
use crate::store::UploadClient;
use crate::target::{CacheControl, UploadOptions, UploadTarget, Validation};
use crate::walker::{list_files, list_files_filtered, Depth, FileEntry};

pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 16;

/// Outcome of a single file upload
#[derive(Debug)]
pub enum UploadResult {
    Succeeded(ObjectPath),
    Failed { remote_key: ObjectPath, error: Error },
}

impl UploadResult {
    pub fn remote_key(&self) -> &ObjectPath {
        match self {
            UploadResult::Succeeded(remote_key) => remote_key,
            UploadResult::Failed { remote_key, .. } => remote_key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Succeeded(_))
    }
}

/// All upload outcomes of one publish call
#[derive(Debug)]
pub struct PublishReport {
    pub results: Vec<UploadResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PublishReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// A run only counts as successful when every file made it
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ObjectPath> {
        self.results.iter().filter_map(|r| match r {
            UploadResult::Succeeded(remote_key) => Some(remote_key),
            UploadResult::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ObjectPath, &Error)> {
        self.results.iter().filter_map(|r| match r {
            UploadResult::Failed { remote_key, error } => Some((remote_key, error)),
            UploadResult::Succeeded(_) => None,
        })
    }

    /// Fold another report (e.g. the latest mirror) into this one
    pub fn merge(&mut self, other: PublishReport) {
        self.results.extend(other.results);
        self.started_at = self.started_at.min(other.started_at);
        self.finished_at = self.finished_at.max(other.finished_at);
    }

    pub fn into_result(self) -> Result<Self, Error> {
        let failed = self.failed_count();
        if failed > 0 {
            return Err(Error::AggregateFailure {
                failed,
                total: self.total(),
            });
        }
        Ok(self)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            uploaded: self.total() - self.failed_count(),
            failed: self.failed_count(),
            total: self.total(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            failures: self
                .failures()
                .map(|(remote_key, error)| FailedUpload {
                    remote_key: remote_key.to_string(),
                    error: error.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedUpload {
    pub remote_key: String,
    pub error: String,
}

/// Serializable view of a publish report
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub failures: Vec<FailedUpload>,
}

impl ReportSummary {
    pub fn write_json(&self, path: &Path) -> Result<(), Error> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Uploads local report directories through an upload client
#[derive(Clone)]
pub struct Publisher {
    client: Arc<dyn UploadClient>,
    max_concurrent_uploads: usize,
    validation: Validation,
    resumable: bool,
}

impl Publisher {
    pub fn new(client: Arc<dyn UploadClient>) -> Self {
        Publisher {
            client,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            validation: Validation::default(),
            resumable: false,
        }
    }

    pub fn with_max_concurrent_uploads(mut self, max_concurrent_uploads: usize) -> Self {
        self.max_concurrent_uploads = max_concurrent_uploads.max(1);
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_resumable(mut self, resumable: bool) -> Self {
        self.resumable = resumable;
        self
    }

    fn options(&self, target: &UploadTarget) -> UploadOptions {
        UploadOptions::for_target(target)
            .with_validation(self.validation)
            .with_resumable(self.resumable)
    }

    /// Upload every regular file under `root_dir` to `target`, keyed by its path relative to the root
    pub async fn publish(&self, root_dir: &Path, target: &UploadTarget) -> Result<PublishReport, Error> {
        let files = list_files(root_dir, Depth::Recursive)?;
        tracing::info!(
            root_dir = tracing::field::debug(root_dir),
            bucket = target.bucket_name(),
            prefix = target.destination_prefix.as_ref(),
            files = files.len(),
            "Publish report directory"
        );
        self.upload_all(files, &target.destination_prefix, self.options(target))
            .await
    }

    /// Upload the files directly inside `parent_dir` under `prefix_name`, never cached
    pub async fn publish_latest_mirror(
        &self,
        parent_dir: &Path,
        target: &UploadTarget,
        prefix_name: &ObjectPath,
    ) -> Result<PublishReport, Error> {
        let files = {
            let is_dir = |entry: &DirEntry| entry.file_type().is_dir();
            let exclude: [&dyn Fn(&DirEntry) -> bool; 1] = [&is_dir];
            list_files_filtered(parent_dir, Depth::Immediate, &exclude)?
        };
        tracing::info!(
            parent_dir = tracing::field::debug(parent_dir),
            bucket = target.bucket_name(),
            prefix = prefix_name.as_ref(),
            files = files.len(),
            "Publish latest mirror"
        );
        let options = self
            .options(target)
            .with_cache_control(CacheControl::NoCache);
        self.upload_all(files, prefix_name, options).await
    }

    /// Fan out one task per file, at most `max_concurrent_uploads` in flight, and wait for all of them
    async fn upload_all(
        &self,
        files: Vec<FileEntry>,
        prefix: &ObjectPath,
        options: UploadOptions,
    ) -> Result<PublishReport, Error> {
        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_uploads));
        let options = Arc::new(options);

        let mut results = Vec::with_capacity(files.len());
        let mut handles = Vec::with_capacity(files.len());
        for file in files {
            let remote_key = match file.remote_key(prefix) {
                Ok(remote_key) => remote_key,
                Err(e) => {
                    let remote_key =
                        ObjectPath::from(file.relative_path.to_string_lossy().as_ref());
                    results.push(UploadResult::Failed {
                        error: Error::transfer(&remote_key, e),
                        remote_key,
                    });
                    continue;
                }
            };
            let client = self.client.clone();
            let options = options.clone();
            let semaphore = semaphore.clone();
            let key = remote_key.clone();
            let handle: tokio::task::JoinHandle<Result<(), Error>> = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::TaskJoin(e.to_string()))?;
                client.upload(&file.absolute_path, &key, &options).await
            });
            handles.push((remote_key, handle));
        }

        for (remote_key, handle) in handles {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(Error::TaskJoin(e.to_string())));
            match outcome {
                Ok(()) => results.push(UploadResult::Succeeded(remote_key)),
                Err(e) => {
                    tracing::warn!(
                        remote_key = remote_key.as_ref(),
                        error = e.to_string(),
                        "File upload failed"
                    );
                    results.push(UploadResult::Failed {
                        error: Error::transfer(&remote_key, e),
                        remote_key,
                    });
                }
            }
        }

        let report = PublishReport {
            results,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::debug!(
            total = report.total(),
            failed = report.failed_count(),
            "Uploads settled"
        );
        Ok(report)
    }
}
