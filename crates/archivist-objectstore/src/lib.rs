//! Object-store client: the S3-compatible backend the pipeline fetches bags
//! from and saves preservation/restoration copies to (spec §4.A).
//!
//! Grounded on the freighter storage crate's `S3StorageProvider`: same
//! `aws_sdk_s3::Client` + bucket-name-per-call shape, same "check the error
//! variant for NoSuchKey before bailing" pattern for not-found detection.

use std::io::SeekFrom;
use std::path::Path;

use archivist_error::{Error, Kind, Result};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

const FETCH_RETRY_ATTEMPTS: u32 = 5;
/// A 4 999 999 999-byte upload takes the single-part path; 5 000 000 000
/// bytes takes multipart — the exact decimal boundary named by the worked
/// example, not the binary `5 * 1024^3` a "5 GiB" reading would suggest.
const MULTIPART_THRESHOLD: u64 = 5_000_000_000;
const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Metadata and content-negotiation options for a `save`/`save_large` call.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub base64_md5: Option<String>,
    pub metadata: Vec<(String, String)>,
}

/// Builds [`SaveOptions`] from a base64-encoded MD5 and an arbitrary
/// key/value metadata set, mirroring the object-store client's
/// `make_options` entry point (spec §4.A).
pub fn make_options(base64_md5: Option<String>, metadata: Vec<(String, String)>) -> SaveOptions {
    SaveOptions {
        base64_md5,
        metadata,
    }
}

/// Outcome of a fetch-to-file or fetch-and-hash operation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub local_path: String,
    pub size: u64,
    pub md5_verified: bool,
    pub retry: bool,
    pub error_message: Option<String>,
}

impl FetchResult {
    fn ok(local_path: impl Into<String>, size: u64, md5_verified: bool) -> Self {
        FetchResult {
            local_path: local_path.into(),
            size,
            md5_verified,
            retry: false,
            error_message: None,
        }
    }
}

/// Outcome of a `fetch_and_sha256` call: digest of an object's bytes without
/// ever writing them to local disk (used by the fixity engine).
#[derive(Debug, Clone)]
pub struct FixityResult {
    pub sha256: String,
    pub retry: bool,
    pub error_message: Option<String>,
}

/// Splits an `s3://bucket/key/with/slashes` URI into its bucket and key.
/// The URI must have at least four slash-separated parts (`s3:`, ``,
/// `bucket`, and at least one key segment) or this fails non-retryably —
/// used by both the restore and fixity engines to recover the storage
/// location recorded on a [`crate`]-saved file (spec §4.I).
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = uri.split('/').collect();
    if parts.len() < 4 {
        return Err(Error::validation(format!(
            "storage URI '{uri}' does not have at least four slash-separated parts"
        )));
    }
    let bucket = parts[2].to_string();
    let key = parts[3..].join("/");
    if bucket.is_empty() || key.is_empty() {
        return Err(Error::validation(format!(
            "storage URI '{uri}' has an empty bucket or key"
        )));
    }
    Ok((bucket, key))
}

/// One listed object.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

pub struct Client {
    s3: aws_sdk_s3::Client,
}

impl Client {
    pub fn new(s3: aws_sdk_s3::Client) -> Self {
        Client { s3 }
    }

    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Client {
            s3: aws_sdk_s3::Client::new(&config),
        }
    }

    pub async fn list(&self, bucket: &str, limit: Option<i32>) -> Result<Vec<ObjectSummary>> {
        let mut req = self.s3.list_objects_v2().bucket(bucket);
        if let Some(limit) = limit {
            req = req.max_keys(limit);
        }
        let resp = req.send().await.map_err(|e| store_error(&e, "list"))?;
        Ok(resp
            .contents()
            .iter()
            .map(|obj| ObjectSummary {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0) as u64,
                etag: obj.e_tag().map(|s| s.trim_matches('"').to_string()),
            })
            .collect())
    }

    pub async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectSummary>> {
        match self.s3.head_object().bucket(bucket).key(key).send().await {
            Ok(resp) => Ok(Some(ObjectSummary {
                key: key.to_string(),
                size: resp.content_length().unwrap_or(0) as u64,
                etag: resp.e_tag().map(|s| s.trim_matches('"').to_string()),
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(store_error(&e, "head")),
        }
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.head(bucket, key).await?.is_some())
    }

    pub async fn get_reader(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let resp = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(&e, "get_object"))?;
        Ok(resp.body)
    }

    /// Downloads `bucket/key` to `local_path`, retrying transient failures
    /// up to [`FETCH_RETRY_ATTEMPTS`] times and stopping immediately on a
    /// not-found signal (spec §4.A).
    pub async fn fetch_to_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<FetchResult> {
        let mut last_err = None;
        for attempt in 0..FETCH_RETRY_ATTEMPTS {
            match self.try_fetch_to_file(bucket, key, local_path).await {
                Ok(result) => return Ok(result),
                Err(e) if e.kind == Kind::NotFound => return Err(e),
                Err(e) => {
                    warn!(attempt, bucket, key, "fetch attempt failed, retrying");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::transient("fetch_to_file exhausted retries")))
    }

    async fn try_fetch_to_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<FetchResult> {
        let resp = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(&e, "get_object"))?;

        let etag = resp.e_tag().map(|s| s.trim_matches('"').to_string());
        let mut body = resp.body.into_async_read();

        let mut file = File::create(local_path)
            .await
            .map_err(|e| Error::fatal(format!("could not create {}: {e}", local_path.display())))?;
        let mut hasher = md5::Context::new();
        let mut buf = [0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = tokio::io::AsyncReadExt::read(&mut body, &mut buf)
                .await
                .map_err(|e| Error::transient(format!("error reading response body: {e}")))?;
            if n == 0 {
                break;
            }
            hasher.consume(&buf[..n]);
            file.write_all(&buf[..n])
                .await
                .map_err(|e| Error::fatal(format!("could not write {}: {e}", local_path.display())))?;
            size += n as u64;
        }
        file.flush().await.ok();

        // MD5 is only verifiable when the ETag is a plain 32-hex digest; a
        // multipart ETag (containing '-') is not a digest of the full object.
        let mut md5_verified = false;
        if let Some(etag) = &etag {
            if etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit()) {
                let actual = hex::encode(hasher.compute().0);
                if actual != *etag {
                    tokio::fs::remove_file(local_path).await.ok();
                    return Err(Error::integrity(format!(
                        "MD5 mismatch fetching {bucket}/{key}: store reported {etag}, computed {actual}"
                    )));
                }
                md5_verified = true;
            }
        }

        Ok(FetchResult::ok(local_path.display().to_string(), size, md5_verified))
    }

    /// Like [`Client::fetch_to_file`], but also computes the SHA-256 digest
    /// in the same pass (used by the restore engine while rebuilding a
    /// bag's manifests; spec §4.H "simultaneously updates the bag's MD5 and
    /// SHA-256 manifests").
    pub async fn fetch_to_file_with_digests(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(FetchResult, String)> {
        let mut last_err = None;
        for attempt in 0..FETCH_RETRY_ATTEMPTS {
            match self.try_fetch_to_file_with_digests(bucket, key, local_path).await {
                Ok(result) => return Ok(result),
                Err(e) if e.kind == Kind::NotFound => return Err(e),
                Err(e) => {
                    warn!(attempt, bucket, key, "fetch attempt failed, retrying");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::transient("fetch_to_file_with_digests exhausted retries")))
    }

    async fn try_fetch_to_file_with_digests(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(FetchResult, String)> {
        let resp = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(&e, "get_object"))?;

        let etag = resp.e_tag().map(|s| s.trim_matches('"').to_string());
        let mut body = resp.body.into_async_read();

        let mut file = File::create(local_path)
            .await
            .map_err(|e| Error::fatal(format!("could not create {}: {e}", local_path.display())))?;
        let mut md5_hasher = md5::Context::new();
        let mut sha256_hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = body
                .read(&mut buf)
                .await
                .map_err(|e| Error::transient(format!("error reading response body: {e}")))?;
            if n == 0 {
                break;
            }
            md5_hasher.consume(&buf[..n]);
            sha256_hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .await
                .map_err(|e| Error::fatal(format!("could not write {}: {e}", local_path.display())))?;
            size += n as u64;
        }
        file.flush().await.ok();

        let mut md5_verified = false;
        if let Some(etag) = &etag {
            if etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit()) {
                let actual = hex::encode(md5_hasher.compute().0);
                if actual != *etag {
                    tokio::fs::remove_file(local_path).await.ok();
                    return Err(Error::integrity(format!(
                        "MD5 mismatch fetching {bucket}/{key}: store reported {etag}, computed {actual}"
                    )));
                }
                md5_verified = true;
            }
        }

        let sha256 = hex::encode(sha256_hasher.finalize());
        Ok((FetchResult::ok(local_path.display().to_string(), size, md5_verified), sha256))
    }

    pub async fn fetch_url_to_file(&self, url: &str, local_path: &Path) -> Result<FetchResult> {
        let resp = reqwest::get(url)
            .await
            .map_err(|e| Error::transient(format!("could not fetch {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::transient(format!(
                "fetching {url} returned status {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::transient(format!("error reading response body from {url}: {e}")))?;
        tokio::fs::write(local_path, &bytes)
            .await
            .map_err(|e| Error::fatal(format!("could not write {}: {e}", local_path.display())))?;
        Ok(FetchResult::ok(local_path.display().to_string(), bytes.len() as u64, false))
    }

    /// Streams an object's bytes through SHA-256 only, never touching local
    /// disk; used exclusively by the fixity engine.
    pub async fn fetch_and_sha256(&self, bucket: &str, key: &str) -> Result<FixityResult> {
        match self.s3.get_object().bucket(bucket).key(key).send().await {
            Ok(resp) => {
                let mut body = resp.body.into_async_read();
                let mut hasher = Sha256::new();
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = body
                        .read(&mut buf)
                        .await
                        .map_err(|e| Error::transient(format!("error reading object body: {e}")))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(FixityResult {
                    sha256: hex::encode(hasher.finalize()),
                    retry: false,
                    error_message: None,
                })
            }
            Err(e) if is_not_found(&e) => Err(Error::not_found(format!("{bucket}/{key} not found"))),
            Err(e) => Err(store_error(&e, "get_object")),
        }
    }

    pub async fn save(
        &self,
        bucket: &str,
        key: &str,
        mime: &str,
        bytes: Bytes,
        options: &SaveOptions,
    ) -> Result<String> {
        let mut req = self
            .s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(mime)
            .body(ByteStream::from(bytes));
        if let Some(md5) = &options.base64_md5 {
            req = req.content_md5(md5.clone());
        }
        for (k, v) in &options.metadata {
            req = req.metadata(k, v);
        }
        req.send().await.map_err(|e| store_error(&e, "put_object"))?;
        Ok(format!("s3://{bucket}/{key}"))
    }

    /// Uploads via S3 multipart when `length >= MULTIPART_THRESHOLD`. On any per-chunk
    /// failure the multipart upload is aborted before returning; if the
    /// abort itself fails, the returned error explicitly warns that orphan
    /// parts may accrue storage charges (spec §4.A).
    pub async fn save_large(
        &self,
        bucket: &str,
        key: &str,
        mime: &str,
        seekable_path: &Path,
        length: u64,
        options: &SaveOptions,
        chunk_size: Option<u64>,
    ) -> Result<String> {
        if length < MULTIPART_THRESHOLD {
            let bytes = tokio::fs::read(seekable_path)
                .await
                .map_err(|e| Error::fatal(format!("could not read {}: {e}", seekable_path.display())))?;
            return self.save(bucket, key, mime, Bytes::from(bytes), options).await;
        }

        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);

        let create = self
            .s3
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(mime)
            .send()
            .await
            .map_err(|e| store_error(&e, "create_multipart_upload"))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| Error::fatal("create_multipart_upload returned no upload id"))?
            .to_string();

        match self
            .upload_parts(bucket, key, &upload_id, seekable_path, length, chunk_size)
            .await
        {
            Ok(parts) => {
                self.s3
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| store_error(&e, "complete_multipart_upload"))?;

                if !options.metadata.is_empty() {
                    self.verify_metadata_echoed(bucket, key, options).await?;
                }

                Ok(format!("s3://{bucket}/{key}"))
            }
            Err(upload_err) => {
                if let Err(abort_err) = self
                    .s3
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    return Err(Error::fatal(format!(
                        "multipart upload of {bucket}/{key} failed ({upload_err}) and abort \
                         also failed ({abort_err}): orphan parts may accrue storage charges"
                    )));
                }
                Err(upload_err)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        path: &Path,
        length: u64,
        chunk_size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::fatal(format!("could not open {}: {e}", path.display())))?;
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1i32;

        while offset < length {
            let this_len = chunk_size.min(length - offset);
            let mut buf = vec![0u8; this_len as usize];
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| Error::transient(format!("seek failed: {e}")))?;
            file.read_exact(&mut buf)
                .await
                .map_err(|e| Error::transient(format!("read failed: {e}")))?;

            let resp = self
                .s3
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buf))
                .send()
                .await
                .map_err(|e| store_error(&e, "upload_part"))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(resp.e_tag().map(String::from))
                    .build(),
            );

            offset += this_len;
            part_number += 1;
            debug!(bucket, key, part_number, "uploaded multipart chunk");
        }

        Ok(parts)
    }

    async fn verify_metadata_echoed(
        &self,
        bucket: &str,
        key: &str,
        options: &SaveOptions,
    ) -> Result<()> {
        let resp = self
            .s3
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(&e, "head_object"))?;
        let echoed = resp.metadata().cloned().unwrap_or_default();
        let missing: Vec<&str> = options
            .metadata
            .iter()
            .filter(|(k, _)| !echoed.contains_key(k.as_str()))
            .map(|(k, _)| k.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(Error::integrity(format!(
                "metadata keys not echoed by store after save_large: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.s3
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(&e, "delete_object"))?;
        Ok(())
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool
where
    E: std::fmt::Debug,
{
    matches!(err, SdkError::ServiceError(_)) && format!("{err:?}").contains("NoSuchKey")
}

fn store_error<E: std::fmt::Debug>(err: &SdkError<E>, op: &str) -> Error {
    if is_not_found(err) {
        Error::not_found(format!("{op}: key does not exist"))
    } else {
        Error::transient(format!("{op} failed: {err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_options_round_trips_fields() {
        let opts = make_options(
            Some("deadbeef==".to_string()),
            vec![("x-amz-meta-foo".to_string(), "bar".to_string())],
        );
        assert_eq!(opts.base64_md5.as_deref(), Some("deadbeef=="));
        assert_eq!(opts.metadata.len(), 1);
    }

    #[test]
    fn parse_s3_uri_splits_bucket_and_key() {
        let (bucket, key) = parse_s3_uri("s3://preservation.bucket/abc-123").unwrap();
        assert_eq!(bucket, "preservation.bucket");
        assert_eq!(key, "abc-123");
    }

    #[test]
    fn parse_s3_uri_rejects_uris_with_too_few_parts() {
        assert!(parse_s3_uri("not-a-uri").is_err());
        assert!(parse_s3_uri("s3://bucket-only").is_err());
    }

    #[test]
    fn multipart_threshold_is_the_exact_decimal_boundary() {
        assert_eq!(MULTIPART_THRESHOLD, 5_000_000_000);
        assert!(4_999_999_999u64 < MULTIPART_THRESHOLD);
        assert!(5_000_000_000u64 >= MULTIPART_THRESHOLD);
    }
}
