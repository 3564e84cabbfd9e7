use clap::{Args, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

use crate::errors::Error;
use crate::publisher::DEFAULT_MAX_CONCURRENT_UPLOADS;
use crate::target::{UploadTarget, Validation};

#[derive(Clone, Debug, Parser, Serialize, Deserialize)]
#[command(
    name = "report-publisher",
    about = "Publish a run's report directory to an object storage bucket"
)]
#[command(author, version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub publisher: PublisherArgs,
    #[arg(
        long,
        value_name = "RESULTS_DIR",
        env = "RESULTS_DIR",
        help = "Local directory holding the run's generated report files"
    )]
    pub results_dir: String,
    #[arg(
        long,
        value_name = "CONFIG",
        env = "PUBLISHER_CONFIG",
        help = "TOML file with publisher options; replaces the publisher flags when given"
    )]
    pub config: Option<String>,
    #[arg(
        long,
        value_name = "REPORT_FILE",
        env = "REPORT_FILE",
        help = "Write a JSON summary of the uploads to this file"
    )]
    pub report_file: Option<String>,
    #[arg(
        long,
        value_name = "LOG_FORMAT",
        env = "LOG_FORMAT",
        help = "Support logging formats: pretty, json, full, compact",
        long_help = "pretty: verbose and human readable; json: not verbose and parsable; compact:  not verbose and not parsable; full: verbose and not parsible",
        default_value = "pretty"
    )]
    pub log_format: LogFormat,
}

impl Cli {
    /// Parse config arguments
    pub fn args() -> Self {
        let config = Cli::parse();
        // Enables tracing under RUST_LOG variable
        init_tracing(&config.log_format.to_string()).expect("Could not set up global default subscriber for logger, check environmental variable `RUST_LOG` or the CLI input `log-format`");
        config
    }

    /// Publisher options, read from the TOML file when one is configured
    pub fn publisher_args(&self) -> Result<PublisherArgs, Error> {
        match &self.config {
            Some(path) => PublisherArgs::from_toml_file(Path::new(path)),
            None => Ok(self.publisher.clone()),
        }
    }
}

/// Storage service the bucket lives in
#[derive(ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Gcs,
    /// Bucket emulated as a local directory, for dry runs
    Local,
}

#[derive(Clone, Debug, Args, Serialize, Deserialize)]
#[group(required = false, multiple = true)]
#[serde(default)]
pub struct PublisherArgs {
    #[arg(
        long = "bucket",
        value_name = "BUCKET_NAME",
        env = "BUCKET_NAME",
        help = "Object storage bucket to publish into (required)"
    )]
    pub bucket_name: Option<String>,
    #[arg(
        long = "service-account-key",
        value_name = "SERVICE_ACCOUNT_KEY_PATH",
        env = "SERVICE_ACCOUNT_KEY_PATH",
        help = "Path to the service account key file; falls back to the environment's credentials"
    )]
    pub service_account_key_path: Option<String>,
    #[arg(
        long,
        value_name = "DESTINATION_PATH",
        env = "DESTINATION_PATH",
        help = "Prefix inside the bucket; the run directory name is appended to it"
    )]
    pub destination_path: Option<String>,
    #[arg(long, env = "PUBLIC", help = "Make uploaded objects public-read")]
    pub public: bool,
    #[arg(long, env = "GZIP", help = "Gzip objects and mark them with Content-Encoding: gzip")]
    pub gzip: bool,
    #[arg(
        long,
        env = "REMOVE_LOCAL_RESULT_AFTER_UPLOAD",
        help = "Delete the local results directory once every file is uploaded"
    )]
    pub remove_local_result_after_upload: bool,
    #[arg(
        long,
        env = "COPY_LATEST_FILES_TO_PARENT",
        help = "Also upload the run's top level files one prefix up, without caching"
    )]
    pub copy_latest_files_to_parent: bool,
    #[arg(
        long,
        value_name = "MAX_CONCURRENT_UPLOADS",
        env = "MAX_CONCURRENT_UPLOADS",
        default_value_t = DEFAULT_MAX_CONCURRENT_UPLOADS,
        help = "Maximum number of uploads in flight"
    )]
    pub max_concurrent_uploads: usize,
    #[arg(
        long,
        env = "RESUMABLE",
        help = "Use multipart uploads for large files"
    )]
    pub resumable: bool,
    #[arg(
        long,
        value_name = "VALIDATION",
        value_enum,
        env = "VALIDATION",
        default_value_t = Validation::Size,
        help = "Check uploaded objects after writing them: off, size"
    )]
    pub validation: Validation,
    #[arg(
        long,
        value_name = "BACKEND",
        value_enum,
        env = "BACKEND",
        default_value_t = Backend::Gcs,
        help = "Storage service: gcs, local"
    )]
    pub backend: Backend,
    #[arg(
        long,
        value_name = "LOCAL_STORE_DIR",
        env = "LOCAL_STORE_DIR",
        default_value = "./object-store",
        help = "Directory holding emulated buckets for the local backend"
    )]
    pub local_store_dir: String,
}

impl Default for PublisherArgs {
    fn default() -> Self {
        PublisherArgs {
            bucket_name: None,
            service_account_key_path: None,
            destination_path: None,
            public: false,
            gzip: false,
            remove_local_result_after_upload: false,
            copy_latest_files_to_parent: false,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            resumable: false,
            validation: Validation::default(),
            backend: Backend::default(),
            local_store_dir: "./object-store".to_string(),
        }
    }
}

impl PublisherArgs {
    pub fn from_toml_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// The required bucket name; absent or blank is a configuration error
    pub fn bucket(&self) -> Result<&str, Error> {
        match self.bucket_name.as_deref().map(str::trim) {
            Some(bucket) if !bucket.is_empty() => Ok(bucket),
            _ => Err(Error::InvalidConfig(
                "bucket name is required (--bucket or BUCKET_NAME)".to_string(),
            )),
        }
    }

    /// Upload target for a run whose default prefix is `run_prefix`
    pub fn upload_target(&self, run_prefix: &str) -> Result<UploadTarget, Error> {
        let prefix = match self.destination_path.as_deref() {
            Some(destination) if !destination.trim_matches('/').is_empty() => {
                format!("{}/{}", destination.trim_end_matches('/'), run_prefix)
            }
            _ => run_prefix.to_string(),
        };
        Ok(UploadTarget::new(self.bucket()?, &prefix)?
            .with_public(self.public)
            .with_gzip(self.gzip))
    }
}

/// Sets up tracing, allows log level to be set from the environment variables
pub fn init_tracing(format: &str) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::from_default_env();

    let subscriber_builder: tracing_subscriber::fmt::SubscriberBuilder<
        tracing_subscriber::fmt::format::DefaultFields,
        tracing_subscriber::fmt::format::Format,
        EnvFilter,
    > = FmtSubscriber::builder().with_env_filter(filter);

    match format {
        "json" => tracing::subscriber::set_global_default(subscriber_builder.json().finish()),
        "full" => tracing::subscriber::set_global_default(subscriber_builder.finish()),
        "compact" => tracing::subscriber::set_global_default(subscriber_builder.compact().finish()),
        _ => tracing::subscriber::set_global_default(
            subscriber_builder.with_ansi(true).pretty().finish(),
        ),
    }
}

#[derive(clap::ValueEnum, Clone, Debug, Serialize, Deserialize, Default)]
pub enum LogFormat {
    Compact,
    #[default]
    Pretty,
    Json,
    Full,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Full => write!(f, "full"),
        }
    }
}
