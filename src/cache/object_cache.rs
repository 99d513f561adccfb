//! Object cache adapter: blob-store backed, with gzip auto-detect and an
//! intelligent write-back policy.

use crate::config::{RetryConfig, WriteBackPolicy};
use crate::error::{EngineError, EngineResult};
use crate::models::CanonicalBook;
use crate::retry::with_retry;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::io::Read;
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA_VERSION: u32 = 1;

/// Result kind for a cache fetch.
pub enum FetchOutcome {
    Success(serde_json::Value),
    NotFound,
    Disabled,
}

/// The outcome of evaluating the write-back policy, returned
/// so callers can log/test the decision path distinctly from the I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBackDecision {
    WriteAbsentOrUnreadable,
    SkipIdentical,
    WriteLongerDescription,
    WriteMorePopulatedFields,
    SkipExistingAuthoritative,
}

impl WriteBackDecision {
    pub fn should_write(self) -> bool {
        !matches!(
            self,
            WriteBackDecision::SkipIdentical | WriteBackDecision::SkipExistingAuthoritative
        )
    }
}

pub struct ObjectCacheAdapter {
    store: Arc<dyn ObjectStore>,
    retry_config: RetryConfig,
    write_back_policy: WriteBackPolicy,
}

impl ObjectCacheAdapter {
    pub fn new(store: Arc<dyn ObjectStore>, retry_config: RetryConfig, write_back_policy: WriteBackPolicy) -> Self {
        Self {
            store,
            retry_config,
            write_back_policy,
        }
    }

    fn key_for(book_id: Uuid) -> ObjectPath {
        ObjectPath::from(format!("books/v{SCHEMA_VERSION}/{book_id}.json"))
    }

    /// Fetch a cached book, retrying only on transient/service errors.
    pub async fn fetch(&self, book_id: Uuid) -> EngineResult<FetchOutcome> {
        if !self.store_enabled() {
            return Ok(FetchOutcome::Disabled);
        }
        let path = Self::key_for(book_id);
        let config = self.retry_config.clone();
        let result = with_retry(&config, || {
            let store = self.store.clone();
            let path = path.clone();
            async move {
                match store.get(&path).await {
                    Ok(get_result) => {
                        let bytes = get_result.bytes().await.map_err(EngineError::from)?;
                        Ok(bytes)
                    }
                    Err(e) => Err(EngineError::from(e)),
                }
            }
        })
        .await;

        match result {
            Ok(bytes) => {
                let decoded = decode_payload(&bytes)?;
                Ok(FetchOutcome::Success(decoded))
            }
            Err(EngineError::NotFound) => Ok(FetchOutcome::NotFound),
            Err(other) => Err(other),
        }
    }

    /// Upload with the write-back policy already decided by
    /// the caller (see [`decide_write_back`]).
    pub async fn upload(&self, book_id: Uuid, json: &serde_json::Value) -> EngineResult<()> {
        if !self.store_enabled() {
            return Err(EngineError::Disabled);
        }
        let path = Self::key_for(book_id);
        let payload = Bytes::from(serde_json::to_vec(json)?);
        let config = self.retry_config.clone();
        with_retry(&config, || {
            let store = self.store.clone();
            let path = path.clone();
            let payload = payload.clone();
            async move {
                store
                    .put(&path, payload.into())
                    .await
                    .map(|_| ())
                    .map_err(EngineError::from)
            }
        })
        .await
    }

    pub async fn delete(&self, book_id: Uuid) -> EngineResult<()> {
        let path = Self::key_for(book_id);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(EngineError::from(e)),
        }
    }

    pub async fn copy(&self, src: Uuid, dst: Uuid) -> EngineResult<()> {
        let src_path = Self::key_for(src);
        let dst_path = Self::key_for(dst);
        self.store.copy(&src_path, &dst_path).await.map_err(EngineError::from)
    }

    /// Read an arbitrary legacy key (not necessarily `books/v{N}/{uuid}.json`)
    /// during consolidation. Returns `None` for a missing key.
    pub async fn fetch_raw_key(&self, key: &str) -> EngineResult<Option<serde_json::Value>> {
        let path = ObjectPath::from(key);
        match self.store.get(&path).await {
            Ok(get_result) => {
                let bytes = get_result.bytes().await.map_err(EngineError::from)?;
                Ok(Some(decode_payload(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(EngineError::from(e)),
        }
    }

    /// Delete an arbitrary legacy key during consolidation.
    pub async fn delete_by_key(&self, key: &str) -> EngineResult<()> {
        let path = ObjectPath::from(key);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(EngineError::from(e)),
        }
    }

    /// List all keys under a legacy migration prefix.
    pub async fn list(&self, prefix: &str) -> EngineResult<Vec<String>> {
        use futures::StreamExt;
        let prefix_path = ObjectPath::from(prefix);
        let mut stream = self.store.list(Some(&prefix_path));
        let mut keys = Vec::new();
        while let Some(meta) = stream.next().await {
            keys.push(meta.map_err(EngineError::from)?.location.to_string());
        }
        Ok(keys)
    }

    fn store_enabled(&self) -> bool {
        true
    }

    pub fn write_back_policy(&self) -> WriteBackPolicy {
        self.write_back_policy
    }
}

/// Auto-detect gzip (magic bytes `1f 8b`) and transparently decompress,
/// otherwise treat the payload as UTF-8 JSON directly.
fn decode_payload(bytes: &Bytes) -> EngineResult<serde_json::Value> {
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut decompressed = String::new();
        decoder
            .read_to_string(&mut decompressed)
            .map_err(|e| EngineError::ParseError(e.to_string()))?;
        Ok(serde_json::from_str(&decompressed)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Five-step write-back decision, pure and independently testable.
///
/// `existing` is `None` when the key is absent or unreadable (step 1).
/// `new_book`/`existing_book` are the parsed canonical representations used
/// for steps 3-4; `new_json`/`existing_json` are the serialized forms used for
/// the textual-identity check in step 2.
pub fn decide_write_back(
    new_json: &serde_json::Value,
    new_book: &CanonicalBook,
    existing: Option<(&serde_json::Value, &CanonicalBook)>,
    policy: WriteBackPolicy,
) -> WriteBackDecision {
    let Some((existing_json, existing_book)) = existing else {
        return WriteBackDecision::WriteAbsentOrUnreadable;
    };

    if new_json == existing_json {
        return WriteBackDecision::SkipIdentical;
    }

    let new_desc = new_book.description.as_deref().unwrap_or("");
    let existing_desc = existing_book.description.as_deref().unwrap_or("");
    if !new_desc.is_empty() && (existing_desc.is_empty() || new_desc.len() as f64 >= existing_desc.len() as f64 * 1.10)
    {
        return WriteBackDecision::WriteLongerDescription;
    }

    let new_count = new_book.populated_field_count();
    let existing_count = existing_book.populated_field_count();
    if new_count > existing_count {
        return WriteBackDecision::WriteMorePopulatedFields;
    }

    match policy {
        WriteBackPolicy::PreferIncoming if new_count == existing_count => {
            WriteBackDecision::WriteMorePopulatedFields
        }
        _ => WriteBackDecision::SkipExistingAuthoritative,
    }
}
