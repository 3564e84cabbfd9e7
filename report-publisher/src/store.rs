use async_trait::async_trait;
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use http::{HeaderMap, HeaderName, HeaderValue};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{
    path::Path, Attribute, Attributes, ClientOptions, ObjectStore, PutMultipartOpts, PutOptions,
    PutPayload, WriteMultipart,
};

use std::fs;
use std::io::Write;
use std::path::Path as LocalPath;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::Error;
use crate::target::{ObjectAcl, UploadOptions, Validation};

/// Payloads above this size go through a multipart upload when the upload is resumable
pub const MULTIPART_THRESHOLD: usize = 8 * 1024 * 1024;

/// Object storage collaborator used by the publisher, one call per file
#[async_trait]
pub trait UploadClient: Send + Sync {
    async fn upload(
        &self,
        local_path: &LocalPath,
        remote_key: &Path,
        options: &UploadOptions,
    ) -> Result<(), Error>;
}

/// Upload client backed by an `object_store` implementation
#[derive(Debug, Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    /// ACL every object written through this store receives; `None` for backends without ACLs
    acl: Option<ObjectAcl>,
    /// Whether the backend accepts cache-control and content-encoding attributes
    attributes: bool,
    gzip_skip_logged: Arc<AtomicBool>,
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>, acl: Option<ObjectAcl>, attributes: bool) -> Self {
        ObjectStoreClient {
            store,
            acl,
            attributes,
            gzip_skip_logged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Google Cloud Storage bucket; credentials come from the key file or the environment
    pub fn gcs(
        bucket: &str,
        service_account_key_path: Option<&str>,
        public: bool,
    ) -> Result<Self, Error> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(key_path) = service_account_key_path {
            builder = builder.with_service_account_path(key_path);
        }
        if public {
            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::from_static("x-goog-acl"),
                HeaderValue::from_static("public-read"),
            );
            builder = builder.with_client_options(ClientOptions::new().with_default_headers(headers));
        }
        let store = builder.build()?;
        tracing::debug!(bucket, public, "Created Google Cloud Storage client");
        let acl = if public {
            ObjectAcl::PublicRead
        } else {
            ObjectAcl::Private
        };
        Ok(Self::new(Arc::new(store), Some(acl), true))
    }

    /// Bucket emulated as the directory `root/bucket`, created if missing
    pub fn local(root: &str, bucket: &str) -> Result<Self, Error> {
        let path = LocalPath::new(root).join(bucket);
        if !path.is_dir() {
            tracing::debug!(
                path = tracing::field::debug(&path),
                "Local store path doesn't exist, creating a directory at configured path"
            );
            fs::create_dir_all(&path).map_err(|e| {
                Error::InvalidConfig(format!(
                    "Unable to create local directory for object store: {}",
                    e
                ))
            })?;
        }
        let store = LocalFileSystem::new_with_prefix(path)?;
        Ok(Self::new(Arc::new(store), None, false))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), None, true)
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    /// Compressed bytes are only readable when the backend can record `Content-Encoding: gzip`
    fn should_gzip(&self, options: &UploadOptions) -> bool {
        if options.gzip && !self.attributes {
            if !self.gzip_skip_logged.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "Backend cannot record Content-Encoding, uploading files uncompressed despite gzip"
                );
            }
            return false;
        }
        options.gzip
    }

    fn attributes(&self, options: &UploadOptions) -> Attributes {
        let mut attributes = Attributes::new();
        if !self.attributes {
            tracing::debug!("Backend does not support object attributes, skipping headers");
            return attributes;
        }
        attributes.insert(
            Attribute::CacheControl,
            options.cache_control.header_value().into(),
        );
        if options.gzip {
            attributes.insert(Attribute::ContentEncoding, "gzip".into());
        }
        attributes
    }
}

#[async_trait]
impl UploadClient for ObjectStoreClient {
    async fn upload(
        &self,
        local_path: &LocalPath,
        remote_key: &Path,
        options: &UploadOptions,
    ) -> Result<(), Error> {
        match self.acl {
            Some(acl) if acl != options.acl => {
                return Err(Error::InvalidConfig(format!(
                    "Upload of {} requested {:?} through a client writing {:?} objects",
                    remote_key, options.acl, acl
                )));
            }
            Some(_) => {}
            None if options.acl == ObjectAcl::PublicRead => {
                tracing::debug!(
                    remote_key = remote_key.as_ref(),
                    "Backend has no object ACLs, ignoring public-read"
                );
            }
            None => {}
        }

        let raw = tokio::fs::read(local_path).await?;
        let bytes = if self.should_gzip(options) {
            Bytes::from(gzip(&raw)?)
        } else {
            Bytes::from(raw)
        };
        let size = bytes.len();
        let attributes = self.attributes(options);

        if options.resumable && size > MULTIPART_THRESHOLD {
            let upload = self
                .store
                .put_multipart_opts(
                    remote_key,
                    PutMultipartOpts {
                        attributes,
                        ..Default::default()
                    },
                )
                .await?;
            let mut writer = WriteMultipart::new(upload);
            writer.write(&bytes);
            writer.finish().await?;
        } else {
            self.store
                .put_opts(
                    remote_key,
                    PutPayload::from(bytes),
                    PutOptions {
                        attributes,
                        ..Default::default()
                    },
                )
                .await?;
        }

        if options.validation == Validation::Size {
            let meta = self.store.head(remote_key).await?;
            if meta.size != size {
                return Err(Error::Validation(format!(
                    "{} stored with {} bytes, sent {}",
                    remote_key, meta.size, size
                )));
            }
        }

        tracing::trace!(
            file = tracing::field::debug(local_path),
            remote_key = remote_key.as_ref(),
            size,
            "Uploaded file"
        );
        Ok(())
    }
}

pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use flate2::read::GzDecoder;
    use std::io::Read;

    use super::*;
    use crate::target::{CacheControl, UploadTarget};
    use crate::test_util::{create_random_temp_file, create_temp_file};

    fn options() -> UploadOptions {
        UploadOptions::for_target(&UploadTarget::new("bucket", "").unwrap())
    }

    #[tokio::test]
    async fn test_upload_sets_cache_control() {
        let (_file, path) = create_temp_file(b"<html>report</html>").unwrap();
        let client = ObjectStoreClient::in_memory();
        let key = Path::from("run1/index.html");

        client
            .upload(LocalPath::new(&path), &key, &options())
            .await
            .unwrap();

        let result = client.store().get(&key).await.unwrap();
        assert_eq!(
            result.attributes.get(&Attribute::CacheControl).map(|v| v.as_ref()),
            Some("public, max-age=31536000")
        );
        assert!(result.attributes.get(&Attribute::ContentEncoding).is_none());
        let stored = result.bytes().await.unwrap();
        assert_eq!(stored.as_ref(), b"<html>report</html>");
    }

    #[tokio::test]
    async fn test_upload_gzip_no_cache() {
        let (_file, path) = create_temp_file(b"{\"latency\": 12}").unwrap();
        let client = ObjectStoreClient::in_memory();
        let key = Path::from("latest/summary.json");
        let mut options = options().with_cache_control(CacheControl::NoCache);
        options.gzip = true;

        client
            .upload(LocalPath::new(&path), &key, &options)
            .await
            .unwrap();

        let result = client.store().get(&key).await.unwrap();
        assert_eq!(
            result.attributes.get(&Attribute::CacheControl).map(|v| v.as_ref()),
            Some("public, max-age=0")
        );
        assert_eq!(
            result.attributes.get(&Attribute::ContentEncoding).map(|v| v.as_ref()),
            Some("gzip")
        );
        let stored = result.bytes().await.unwrap();
        let mut decoded = String::new();
        GzDecoder::new(stored.as_ref())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "{\"latency\": 12}");
    }

    #[tokio::test]
    async fn test_resumable_multipart_upload() {
        let file_size = MULTIPART_THRESHOLD + 1024;
        let (_file, path) = create_random_temp_file(file_size).unwrap();
        let client = ObjectStoreClient::in_memory();
        let key = Path::from("run1/big.bin");

        client
            .upload(LocalPath::new(&path), &key, &options().with_resumable(true))
            .await
            .unwrap();

        let meta = client.store().head(&key).await.unwrap();
        assert_eq!(meta.size, file_size);
    }

    #[tokio::test]
    async fn test_public_upload_through_private_client() {
        let (_file, path) = create_temp_file(b"x").unwrap();
        let client =
            ObjectStoreClient::new(Arc::new(InMemory::new()), Some(ObjectAcl::Private), true);
        let mut options = options();
        options.acl = ObjectAcl::PublicRead;

        let res = client
            .upload(LocalPath::new(&path), &Path::from("a"), &options)
            .await;
        assert!(matches!(res, Err(Error::InvalidConfig(_))));
        assert!(client.store().head(&Path::from("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let client = ObjectStoreClient::in_memory();
        let res = client
            .upload(
                LocalPath::new("/definitely/not/here.html"),
                &Path::from("a"),
                &options(),
            )
            .await;
        assert!(matches!(res, Err(Error::FileIO(_))));
    }

    #[tokio::test]
    async fn test_local_store_drops_attributes() {
        let root = tempfile::tempdir().unwrap();
        let (_file, path) = create_temp_file(b"local copy").unwrap();
        let client =
            ObjectStoreClient::local(root.path().to_str().unwrap(), "reports").unwrap();

        client
            .upload(LocalPath::new(&path), &Path::from("run1/a.html"), &options())
            .await
            .unwrap();

        let written = root.path().join("reports").join("run1").join("a.html");
        assert_eq!(fs::read(written).unwrap(), b"local copy");
    }

    #[tokio::test]
    async fn test_local_store_skips_gzip() {
        let root = tempfile::tempdir().unwrap();
        let (_file, path) = create_temp_file(b"<html>plain</html>").unwrap();
        let client =
            ObjectStoreClient::local(root.path().to_str().unwrap(), "reports").unwrap();
        let mut options = options();
        options.gzip = true;

        for name in ["run1/a.html", "run1/b.html"] {
            client
                .upload(LocalPath::new(&path), &Path::from(name), &options)
                .await
                .unwrap();
        }

        let written = root.path().join("reports").join("run1").join("b.html");
        assert_eq!(fs::read(written).unwrap(), b"<html>plain</html>");
        assert!(client.gzip_skip_logged.load(Ordering::Relaxed));
    }
}
