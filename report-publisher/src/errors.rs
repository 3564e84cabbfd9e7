use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Failed to upload {remote_key}: {source}")]
    Transfer {
        remote_key: String,
        #[source]
        source: Box<Error>,
    },
    #[error("{failed} of {total} uploads failed")]
    AggregateFailure { failed: usize, total: usize },
    #[error("File IO error: {0}")]
    FileIO(#[from] std::io::Error),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Upload validation failed: {0}")]
    Validation(String),
    #[error("Upload task did not complete: {0}")]
    TaskJoin(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Wrap an error from a single file upload with the key it was headed for
    pub fn transfer(remote_key: impl ToString, source: Error) -> Self {
        Error::Transfer {
            remote_key: remote_key.to_string(),
            source: Box::new(source),
        }
    }

    /// Configuration errors are fatal at startup, everything else is reported per run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}
