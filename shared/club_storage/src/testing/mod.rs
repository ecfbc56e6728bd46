//! In-memory storage fakes for tests
//!
//! Both fakes write every call into one shared [`CallLog`] so tests can assert
//! the order in which rows and blobs were touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::beer::{
    Beer, BeerPatch, BeerQuery, BeerStorage, BeerStorageError, BeerStorageResult, NewBeer,
};
use crate::media::{BlobStorage, BucketError, BucketResult, PresignedUrl};

/// A single collaborator call observed by a fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    RowInsert { photo_path: Option<String> },
    RowUpdate { id: String, photo_path: Option<String> },
    RowDelete { id: String },
    RowGet { id: String },
    RowQuery { club_id: String },
    BlobUpload { key: String, overwrite: bool },
    BlobDelete { key: String },
    BlobExists { key: String },
    BlobSignedUrl { key: String },
}

impl StorageCall {
    /// Whether the call touches the row store
    #[must_use]
    pub const fn is_row_write(&self) -> bool {
        matches!(
            self,
            Self::RowInsert { .. } | Self::RowUpdate { .. } | Self::RowDelete { .. }
        )
    }
}

/// Ordered log of calls shared between fakes
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<StorageCall>>>);

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Vec<StorageCall>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a call
    pub fn record(&self, call: StorageCall) {
        self.lock().push(call);
    }

    /// Snapshot of every call so far
    #[must_use]
    pub fn calls(&self) -> Vec<StorageCall> {
        self.lock().clone()
    }

    /// Whether no call was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets every recorded call
    pub fn clear(&self) {
        self.lock().clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn simulated_row_outage() -> BeerStorageError {
    BeerStorageError::Unavailable("simulated outage".to_string())
}

/// Beer storage kept in a hash map
#[derive(Debug)]
pub struct InMemoryBeerStorage {
    rows: Mutex<HashMap<String, Beer>>,
    log: CallLog,
    clock: AtomicI64,
    next_id: AtomicUsize,
    failing_queries: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryBeerStorage {
    /// Creates an empty store writing to `log`
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            log,
            clock: AtomicI64::new(Utc::now().timestamp()),
            next_id: AtomicUsize::new(1),
            failing_queries: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Adds a row without recording a call
    pub fn seed(&self, beer: Beer) {
        lock(&self.rows).insert(beer.id.clone(), beer);
    }

    /// Current row for `id`, without recording a call
    #[must_use]
    pub fn row(&self, id: &str) -> Option<Beer> {
        lock(&self.rows).get(id).cloned()
    }

    /// Number of stored rows
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next `count` queries fail
    pub fn fail_next_queries(&self, count: usize) {
        self.failing_queries.store(count, Ordering::SeqCst);
    }

    /// Makes every insert, update and delete fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> BeerStorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(simulated_row_outage());
        }
        Ok(())
    }
}

#[async_trait]
impl BeerStorage for InMemoryBeerStorage {
    async fn insert(&self, beer: NewBeer) -> BeerStorageResult<Beer> {
        self.log.record(StorageCall::RowInsert {
            photo_path: beer.photo_path.clone(),
        });
        self.check_writes()?;

        let id = format!("beer-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let row = Beer {
            id: id.clone(),
            club_id: beer.club_id,
            user_id: beer.user_id,
            name: beer.fields.name,
            brewery: beer.fields.brewery,
            style: beer.fields.style,
            color: beer.fields.color,
            price: beer.fields.price,
            rating: beer.fields.rating,
            photo_path: beer.photo_path,
            created_at: self.clock.fetch_add(1, Ordering::SeqCst),
        };
        lock(&self.rows).insert(id, row.clone());

        Ok(row)
    }

    async fn update(&self, id: &str, patch: BeerPatch) -> BeerStorageResult<Beer> {
        self.log.record(StorageCall::RowUpdate {
            id: id.to_string(),
            photo_path: patch.photo_path.clone(),
        });
        self.check_writes()?;

        let mut rows = lock(&self.rows);
        let row = rows
            .get_mut(id)
            .ok_or_else(|| BeerStorageError::NotFound(id.to_string()))?;

        row.name = patch.fields.name;
        row.brewery = patch.fields.brewery;
        row.style = patch.fields.style;
        row.color = patch.fields.color;
        row.price = patch.fields.price;
        row.rating = patch.fields.rating;
        if let Some(photo_path) = patch.photo_path {
            row.photo_path = Some(photo_path);
        }

        Ok(row.clone())
    }

    async fn delete(&self, id: &str) -> BeerStorageResult<()> {
        self.log.record(StorageCall::RowDelete { id: id.to_string() });
        self.check_writes()?;

        lock(&self.rows).remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> BeerStorageResult<Option<Beer>> {
        self.log.record(StorageCall::RowGet { id: id.to_string() });
        Ok(self.row(id))
    }

    async fn query(&self, query: &BeerQuery) -> BeerStorageResult<Vec<Beer>> {
        self.log.record(StorageCall::RowQuery {
            club_id: query.club_id.clone(),
        });

        let failing = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(simulated_row_outage());
        }

        let rows = lock(&self.rows).values().cloned().collect();
        Ok(query.apply(rows))
    }
}

/// Blob storage kept in a hash map
#[derive(Debug)]
pub struct InMemoryBlobStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    log: CallLog,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    fail_signing: AtomicBool,
}

impl InMemoryBlobStorage {
    /// Creates an empty store writing to `log`
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            log,
            fail_uploads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_signing: AtomicBool::new(false),
        }
    }

    /// Adds an object without recording a call
    pub fn seed(&self, key: &str, bytes: Vec<u8>) {
        lock(&self.objects).insert(key.to_string(), (bytes, mime_jpeg()));
    }

    /// Bytes and content type stored at `key`, without recording a call
    #[must_use]
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        lock(&self.objects).get(key).cloned()
    }

    /// Every stored key, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Makes every upload fail
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Makes every delete fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Makes every URL signing fail
    pub fn fail_signing(&self, fail: bool) {
        self.fail_signing.store(fail, Ordering::SeqCst);
    }
}

fn mime_jpeg() -> String {
    "image/jpeg".to_string()
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> BucketResult<()> {
        self.log.record(StorageCall::BlobUpload {
            key: key.to_string(),
            overwrite,
        });

        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BucketError::UpstreamError("simulated outage".to_string()));
        }

        let mut objects = lock(&self.objects);
        if !overwrite && objects.contains_key(key) {
            return Err(BucketError::ObjectExists(key.to_string()));
        }
        objects.insert(key.to_string(), (bytes, content_type.to_string()));

        Ok(())
    }

    async fn delete(&self, key: &str) -> BucketResult<()> {
        self.log.record(StorageCall::BlobDelete {
            key: key.to_string(),
        });

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BucketError::UpstreamError("simulated outage".to_string()));
        }

        lock(&self.objects).remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> BucketResult<bool> {
        self.log.record(StorageCall::BlobExists {
            key: key.to_string(),
        });
        Ok(lock(&self.objects).contains_key(key))
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> BucketResult<PresignedUrl> {
        self.log.record(StorageCall::BlobSignedUrl {
            key: key.to_string(),
        });

        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(BucketError::UpstreamError("simulated outage".to_string()));
        }

        let expires_at = Utc::now() + ttl;
        Ok(PresignedUrl {
            url: format!("https://blobs.test/{key}?expires={}", expires_at.timestamp()),
            expires_at,
        })
    }
}
