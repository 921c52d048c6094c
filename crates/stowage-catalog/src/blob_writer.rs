//! Writes one upload into the blob store, verifying its fingerprint on the way through.

use futures_util::StreamExt;
use metrics::counter;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use stowage_api_types::resource::{
    BlobName, Fingerprint, FingerprintHasher, ResourceError, ResourceResult,
};
use stowage_api_types::storage::{BlobStore, BlobStream, StorageError};

#[derive(Default)]
struct Observed {
    hasher: FingerprintHasher,
    overran: bool,
    /// Set when the uploader's stream failed, as opposed to the blob store.
    content_error: Option<String>,
}

/// Hashes chunks as the blob store pulls them, and fails the stream as soon as it yields more
/// than the declared size.
fn verifying_stream(content: BlobStream, declared_size: u64) -> (BlobStream, Arc<Mutex<Observed>>) {
    let observed = Arc::new(Mutex::new(Observed::default()));
    let state = observed.clone();
    let stream = content.map(move |chunk| {
        let mut state = state.lock();
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                state.content_error = Some(e.to_string());
                return Err(e);
            }
        };
        state.hasher.observe(&chunk);
        if state.hasher.observed_len() > declared_size {
            state.overran = true;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("content is longer than the declared {declared_size} bytes"),
            ));
        }
        Ok(chunk)
    });
    (stream.boxed(), observed)
}

/// Streams `content` into a freshly named blob and checks it against the declaration.
///
/// On success the blob exists but nothing references it yet, so the caller owns it and must
/// [`discard_blob`] it if the record can't be committed.
pub async fn store<B>(
    blobs: &B,
    content: BlobStream,
    declared_fingerprint: &Fingerprint,
    declared_size: u64,
) -> ResourceResult<BlobName>
where
    B: BlobStore + Send + Sync + ?Sized,
{
    let name = BlobName::generate();
    let (stream, observed) = verifying_stream(content, declared_size);

    if let Err(e) = blobs.put_blob(name.as_str(), stream, declared_size).await {
        let (overran, content_error) = {
            let observed = observed.lock();
            (observed.overran, observed.content_error.clone())
        };
        if let Some(reason) = content_error {
            tracing::info!(blob = %name, %reason, "Upload body ended with an error");
            return Err(ResourceError::IncompleteUpload(reason));
        }
        return Err(match e {
            StorageError::SizeMismatch { expected, actual } => ResourceError::IntegrityMismatch(
                format!("expected {expected} bytes, received {actual}"),
            ),
            _ if overran => ResourceError::IntegrityMismatch(format!(
                "received more than the declared {declared_size} bytes"
            )),
            StorageError::NotFound => ResourceError::StorageUnavailable(StorageError::NotFound.into()),
            StorageError::ServiceError(e) => ResourceError::StorageUnavailable(e),
        });
    }

    let (fingerprint, size) = {
        let observed = std::mem::take(&mut *observed.lock());
        let size = observed.hasher.observed_len();
        (observed.hasher.finalize(), size)
    };

    let mismatch = if size != declared_size {
        Some(format!("expected {declared_size} bytes, received {size}"))
    } else if fingerprint != *declared_fingerprint {
        Some(format!(
            "declared fingerprint {declared_fingerprint}, content hashes to {fingerprint}"
        ))
    } else {
        None
    };

    if let Some(mismatch) = mismatch {
        discard_blob(blobs, &name).await;
        return Err(ResourceError::IntegrityMismatch(mismatch));
    }

    tracing::debug!(blob = %name, size, "Stored verified blob");
    Ok(name)
}

/// Deletes a blob that no record will reference.
///
/// This is the only compensating action in the catalog. Failures are logged and counted, and
/// never replace the error that caused the compensation.
pub async fn discard_blob<B>(blobs: &B, name: &BlobName)
where
    B: BlobStore + Send + Sync + ?Sized,
{
    if let Err(error) = blobs.remove_blob(name.as_str()).await {
        counter!("stowage_blob_cleanup_failures_total").increment(1);
        tracing::error!(blob = %name, ?error, "Failed to remove unreferenced blob");
    }
}
