use chrono::Utc;

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Error;

/// Owner of a run's local result directory
pub trait ResultStorage: Send + Sync {
    /// Directory holding the run's generated report files
    fn result_dir(&self) -> PathBuf;

    /// Remote prefix used when no destination path is configured
    fn default_prefix(&self) -> String;

    fn remove_local_results(&self) -> Result<(), Error>;
}

#[derive(Clone, Debug)]
pub struct LocalResultStorage {
    result_dir: PathBuf,
}

impl LocalResultStorage {
    /// Existing directories are canonicalized so `.` or `results/..` resolve to a named directory
    pub fn new(result_dir: impl Into<PathBuf>) -> Self {
        let result_dir = result_dir.into();
        let result_dir = fs::canonicalize(&result_dir).unwrap_or(result_dir);
        LocalResultStorage { result_dir }
    }

    /// Create a fresh `base_dir/<YYYYmmdd-HHMMSS>` directory for a new run
    pub fn timestamped(base_dir: &Path) -> Result<Self, Error> {
        let run_name = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let result_dir = base_dir.join(run_name);
        fs::create_dir_all(&result_dir)?;
        Ok(Self::new(result_dir))
    }
}

impl ResultStorage for LocalResultStorage {
    fn result_dir(&self) -> PathBuf {
        self.result_dir.clone()
    }

    fn default_prefix(&self) -> String {
        self.result_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn remove_local_results(&self) -> Result<(), Error> {
        tracing::info!(
            result_dir = tracing::field::debug(&self.result_dir),
            "Remove local results"
        );
        fs::remove_dir_all(&self.result_dir)?;
        Ok(())
    }
}
