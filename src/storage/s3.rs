// dbvault/src/storage/s3.rs
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::error::DisplayErrorContext;
use s3::primitives::{ByteStream, Length};
use s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{BackupRecord, ObjectStore};
use crate::artifact::create_private;
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};

/// DeleteObjects accepts at most this many keys per request.
const DELETE_BATCH: usize = 1000;

const MIB: u64 = 1024 * 1024;
/// Files up to this size go up in a single PutObject (hard limit 5 GiB).
const SINGLE_PUT_LIMIT: u64 = 100 * MIB;
/// Parts must be at least 5 MiB except the last, and at most 10000 per upload.
const MIN_PART_SIZE: u64 = 8 * MIB;
const MAX_PARTS: u64 = 10_000;

/// One byte range of a multipart upload. Part numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PartRange {
    pub number: i32,
    pub offset: u64,
    pub length: u64,
}

pub(crate) fn needs_multipart(size: u64) -> bool {
    size > SINGLE_PUT_LIMIT
}

/// Splits `size` bytes into contiguous parts of whole MiB, growing the part
/// size past the minimum only when the count would exceed the part limit.
pub(crate) fn plan_parts(size: u64) -> Vec<PartRange> {
    let part_size = MIN_PART_SIZE.max(size.div_ceil(MAX_PARTS).next_multiple_of(MIB));
    (0..size.div_ceil(part_size))
        .map(|i| {
            let offset = i * part_size;
            PartRange {
                number: (i + 1) as i32,
                offset,
                length: part_size.min(size - offset),
            }
        })
        .collect()
}

fn storage_error<E>(operation: &'static str, namespace: &str, err: E) -> AppError
where
    E: std::error::Error,
{
    AppError::Storage {
        operation,
        namespace: namespace.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

/// S3-compatible object storage (Yandex Object Storage, Spaces, MinIO, AWS).
pub struct S3ObjectStore {
    client: s3::Client,
}

impl S3ObjectStore {
    pub async fn connect(config: &StorageConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        S3ObjectStore {
            client: s3::Client::from_conf(s3_config),
        }
    }

    /// Multipart upload for files too large for one PutObject. An
    /// unfinished upload is aborted so no orphaned parts stay billed.
    async fn upload_multipart(
        &self,
        namespace: &str,
        local_path: &Path,
        key: &str,
        size: u64,
    ) -> Result<()> {
        let parts = plan_parts(size);
        debug!(namespace, key, size, parts = parts.len(), "starting multipart upload");

        let created = self
            .client
            .create_multipart_upload()
            .bucket(namespace)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("upload", namespace, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| AppError::Storage {
                operation: "upload",
                namespace: namespace.to_string(),
                message: format!("no upload id returned for {}", key),
            })?
            .to_string();

        let result = self
            .send_parts(namespace, local_path, key, &upload_id, &parts)
            .await;
        if result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(namespace)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(namespace, key, error = %DisplayErrorContext(e), "failed to abort multipart upload");
            }
        }
        result
    }

    async fn send_parts(
        &self,
        namespace: &str,
        local_path: &Path,
        key: &str,
        upload_id: &str,
        parts: &[PartRange],
    ) -> Result<()> {
        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            let body = ByteStream::read_from()
                .path(local_path)
                .offset(part.offset)
                .length(Length::Exact(part.length))
                .build()
                .await
                .map_err(|e| storage_error("upload", namespace, e))?;
            let output = self
                .client
                .upload_part()
                .bucket(namespace)
                .key(key)
                .upload_id(upload_id)
                .part_number(part.number)
                .body(body)
                .send()
                .await
                .map_err(|e| storage_error("upload", namespace, e))?;
            debug!(namespace, key, part = part.number, "uploaded part");
            completed.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part.number)
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(namespace)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| storage_error("upload", namespace, e))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, namespace: &str) -> Result<Vec<BackupRecord>> {
        debug!(namespace, "listing objects");
        let mut records = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(namespace)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| storage_error("list", namespace, e))?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let last_modified = object
                    .last_modified()
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos()))
                    .ok_or_else(|| AppError::Storage {
                        operation: "list",
                        namespace: namespace.to_string(),
                        message: format!("object {} has no usable last-modified time", key),
                    })?;
                records.push(BackupRecord {
                    key: key.to_string(),
                    last_modified,
                    size: object.size().unwrap_or_default().max(0) as u64,
                });
            }
        }
        debug!(namespace, count = records.len(), "listed objects");
        Ok(records)
    }

    async fn upload(&self, namespace: &str, local_path: &Path, key: &str) -> Result<()> {
        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| AppError::io(local_path, e))?
            .len();
        debug!(namespace, key, size, file = %local_path.display(), "uploading");
        if needs_multipart(size) {
            return self.upload_multipart(namespace, local_path, key, size).await;
        }

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| storage_error("upload", namespace, e))?;

        self.client
            .put_object()
            .bucket(namespace)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| storage_error("upload", namespace, e))?;
        Ok(())
    }

    async fn download(&self, namespace: &str, key: &str, local_path: &Path) -> Result<()> {
        debug!(namespace, key, file = %local_path.display(), "downloading");

        let mut object = self
            .client
            .get_object()
            .bucket(namespace)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("download", namespace, e))?;

        let mut output_file = File::from_std(create_private(local_path)?);

        let mut total_bytes = 0usize;
        while let Some(chunk) = object
            .body
            .try_next()
            .await
            .map_err(|e| storage_error("download", namespace, e))?
        {
            output_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::io(local_path, e))?;
            total_bytes += chunk.len();
        }
        output_file
            .flush()
            .await
            .map_err(|e| AppError::io(local_path, e))?;

        debug!(namespace, key, total_bytes, "download finished");
        Ok(())
    }

    async fn delete_many(&self, namespace: &str, keys: &[String]) -> Result<()> {
        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| storage_error("delete", namespace, e))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| storage_error("delete", namespace, e))?;

            let output = self
                .client
                .delete_objects()
                .bucket(namespace)
                .delete(delete)
                .send()
                .await
                .map_err(|e| storage_error("delete", namespace, e))?;

            if let Some(failed) = output.errors().first() {
                return Err(AppError::Storage {
                    operation: "delete",
                    namespace: namespace.to_string(),
                    message: format!(
                        "{} of {} keys not deleted, first: {} ({})",
                        output.errors().len(),
                        batch.len(),
                        failed.key().unwrap_or("?"),
                        failed.message().unwrap_or("no message"),
                    ),
                });
            }
            debug!(namespace, count = batch.len(), "deleted objects");
        }
        Ok(())
    }
}
