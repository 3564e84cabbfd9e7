use object_store::path::Path;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Error;

/// Cache lifetime for regular report uploads, one year in seconds
pub const LONG_LIVED_MAX_AGE: u64 = 31_536_000;

/// Where and how a run's files land in the bucket
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTarget {
    bucket_name: String,
    pub destination_prefix: Path,
    pub public: bool,
    pub gzip: bool,
    pub cacheable: bool,
}

impl UploadTarget {
    pub fn new(bucket_name: &str, destination_prefix: &str) -> Result<Self, Error> {
        if bucket_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "bucket name must not be empty".to_string(),
            ));
        }
        // `parse` keeps characters such as `~` or `%` as written instead of percent-encoding them
        let destination_prefix = Path::parse(destination_prefix).map_err(|e| {
            Error::InvalidConfig(format!(
                "destination prefix {:?} is not a valid object key: {}",
                destination_prefix, e
            ))
        })?;
        Ok(UploadTarget {
            bucket_name: bucket_name.to_string(),
            destination_prefix,
            public: false,
            gzip: false,
            cacheable: true,
        })
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Same bucket and flags under a different prefix
    pub fn with_prefix(mut self, destination_prefix: Path) -> Self {
        self.destination_prefix = destination_prefix;
        self
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn acl(&self) -> ObjectAcl {
        if self.public {
            ObjectAcl::PublicRead
        } else {
            ObjectAcl::Private
        }
    }

    pub fn cache_control(&self) -> CacheControl {
        if self.cacheable {
            CacheControl::LongLived
        } else {
            CacheControl::NoCache
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectAcl {
    Private,
    PublicRead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheControl {
    LongLived,
    NoCache,
}

impl CacheControl {
    pub fn header_value(&self) -> String {
        match self {
            CacheControl::LongLived => format!("public, max-age={}", LONG_LIVED_MAX_AGE),
            CacheControl::NoCache => "public, max-age=0".to_string(),
        }
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header_value())
    }
}

/// Post-upload check performed by the client
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    Off,
    /// Compare the stored object's size to the bytes that were sent
    #[default]
    Size,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Off => write!(f, "off"),
            Validation::Size => write!(f, "size"),
        }
    }
}

/// Per-object options handed to the upload client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOptions {
    pub acl: ObjectAcl,
    pub gzip: bool,
    pub cache_control: CacheControl,
    pub validation: Validation,
    pub resumable: bool,
}

impl UploadOptions {
    pub fn for_target(target: &UploadTarget) -> Self {
        UploadOptions {
            acl: target.acl(),
            gzip: target.gzip,
            cache_control: target.cache_control(),
            validation: Validation::default(),
            resumable: false,
        }
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_resumable(mut self, resumable: bool) -> Self {
        self.resumable = resumable;
        self
    }

    pub fn with_cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bucket_rejected() {
        assert!(matches!(
            UploadTarget::new("", "run1"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            UploadTarget::new("   ", "run1"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_prefix_kept_verbatim() {
        let target = UploadTarget::new("reports", "nightly/run~1 [b]").unwrap();
        assert_eq!(target.destination_prefix.as_ref(), "nightly/run~1 [b]");

        let target = UploadTarget::new("reports", "/nightly/").unwrap();
        assert_eq!(target.destination_prefix.as_ref(), "nightly");

        assert!(matches!(
            UploadTarget::new("reports", "nightly/../run1"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            UploadTarget::new("reports", "nightly//run1"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_target_defaults() {
        let target = UploadTarget::new("reports", "nightly/run1").unwrap();
        assert_eq!(target.bucket_name(), "reports");
        assert_eq!(target.destination_prefix.as_ref(), "nightly/run1");
        assert_eq!(target.acl(), ObjectAcl::Private);
        assert_eq!(target.cache_control(), CacheControl::LongLived);
        assert!(!target.gzip);
    }

    #[test]
    fn test_options_follow_target() {
        let target = UploadTarget::new("reports", "run1")
            .unwrap()
            .with_public(true)
            .with_gzip(true)
            .with_cacheable(false);
        let options = UploadOptions::for_target(&target);
        assert_eq!(options.acl, ObjectAcl::PublicRead);
        assert!(options.gzip);
        assert_eq!(options.cache_control, CacheControl::NoCache);
        assert_eq!(options.validation, Validation::Size);
        assert!(!options.resumable);
    }

    #[test]
    fn test_cache_control_headers() {
        assert_eq!(
            CacheControl::LongLived.header_value(),
            "public, max-age=31536000"
        );
        assert_eq!(CacheControl::NoCache.header_value(), "public, max-age=0");
    }
}
