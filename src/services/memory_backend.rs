//! In-memory `ObjectBackend` with S3-style listing, for tests.

use crate::services::backend::{
    BackendError, BackendResult, ListPage, ObjectBackend, ObjectSummary, TransferOptions,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    io::SeekFrom,
    ops::Bound,
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncSeekExt, AsyncWriteExt},
};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    page_size: usize,
    failing: AtomicBool,
    delete_batches: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Listing pages hold at most `page_size` entries.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            failing: AtomicBool::new(false),
            delete_batches: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent call fail with a service error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.store(key, Bytes::copy_from_slice(data));
    }

    /// All stored keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Number of bulk delete calls received.
    pub fn delete_batches(&self) -> usize {
        self.delete_batches.load(Ordering::SeqCst)
    }

    fn store(&self, key: &str, data: Bytes) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::Service("backend unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn list_prefixed(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<String>,
    ) -> BackendResult<ListPage> {
        self.check_available()?;
        let objects = self.objects.lock().unwrap();
        let start = match continuation_token {
            Some(token) => Bound::Excluded(token),
            None => Bound::Unbounded,
        };

        let mut page = ListPage::default();
        let mut emitted = 0;
        let mut last_key: Option<&String> = None;
        for (key, obj) in objects.range((start, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                continue;
            }
            let group = delimiter.and_then(|d| compute_common_prefix(key, prefix, d));
            if group.is_some() && page.common_prefixes.last() == group.as_ref() {
                last_key = Some(key);
                continue;
            }
            if emitted == self.page_size {
                page.next_token = last_key.cloned();
                break;
            }
            emitted += 1;
            last_key = Some(key);
            match group {
                Some(common) => page.common_prefixes.push(common),
                None => page.objects.push(ObjectSummary {
                    key: key.clone(),
                    size: obj.data.len() as u64,
                    last_modified: obj.last_modified,
                }),
            }
        }
        Ok(page)
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        _transfer: &TransferOptions,
    ) -> BackendResult<()> {
        self.check_available()?;
        let data = fs::read(source).await?;
        self.store(key, Bytes::from(data));
        Ok(())
    }

    async fn get_object(
        &self,
        key: &str,
        destination: &Path,
        transfer: &TransferOptions,
    ) -> BackendResult<()> {
        self.check_available()?;
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| BackendError::NotFound(key.to_string()))?;

        let size = data.len() as u64;
        if !transfer.is_segmented(size) {
            fs::write(destination, &data).await?;
            return Ok(());
        }

        // Write segments back to front so each lands at its own offset.
        let mut file = OpenOptions::new().write(true).open(destination).await?;
        file.set_len(size).await?;
        for (start, end) in transfer.segments(size).into_iter().rev() {
            file.seek(SeekFrom::Start(start)).await?;
            file.write_all(&data[start as usize..=end as usize]).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        self.check_available()?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> BackendResult<()> {
        self.check_available()?;
        self.delete_batches.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

/// Compute the common prefix a key is grouped under for a delimited listing.
///
/// Returns `None` when the key sits directly below `prefix`.
fn compute_common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(prefix)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!(
        "{}{}",
        prefix,
        &after_prefix[..pos + delimiter.len()]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delimited_pages_never_split_a_common_prefix() {
        let backend = MemoryBackend::with_page_size(2);
        for key in ["a/1", "a/2", "a/3", "b.txt", "c/1", "d.txt"] {
            backend.insert(key, b"x");
        }

        let first = backend.list_prefixed("", Some("/"), None).await.unwrap();
        assert_eq!(first.common_prefixes, vec!["a/".to_string()]);
        assert_eq!(first.objects[0].key, "b.txt");
        let token = first.next_token.clone().unwrap();

        let second = backend
            .list_prefixed("", Some("/"), Some(token))
            .await
            .unwrap();
        assert_eq!(second.common_prefixes, vec!["c/".to_string()]);
        assert_eq!(second.objects[0].key, "d.txt");
        assert!(second.next_token.is_none());
    }

    #[test]
    fn common_prefix_is_one_level_below_prefix() {
        assert_eq!(
            compute_common_prefix("docs/deep/er/c.txt", "docs/", "/"),
            Some("docs/deep/".to_string())
        );
        assert_eq!(compute_common_prefix("docs/a.txt", "docs/", "/"), None);
        assert_eq!(compute_common_prefix("other/a.txt", "docs/", "/"), None);
    }
}
