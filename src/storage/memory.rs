use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    time::Duration,
};
use url::Url;

use super::{child_of, RemoteStorage, JSON_CONTENT_TYPE};
use crate::error::ConceptError;

#[derive(Debug, Clone)]
struct StoredResource {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Default)]
struct Faults {
    all_writes: bool,
    all_deletes: bool,
    write_uris: HashSet<Url>,
    delete_uris: HashSet<Url>,
    read_uris: HashSet<Url>,
}

#[derive(Debug, Default)]
struct WriteStats {
    count: HashMap<Url, usize>,
    in_flight: HashMap<Url, usize>,
    max_in_flight: usize,
}

/// In-memory [`RemoteStorage`].
///
/// Writes and deletes can be made to fail, globally or per URI, reads per URI, and writes can be given an
/// artificial latency (driven by `tokio::time`, so it obeys a paused test clock).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    resources: Mutex<BTreeMap<Url, StoredResource>>,
    faults: Mutex<Faults>,
    stats: Mutex<WriteStats>,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.lock().all_writes = fail;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.faults.lock().all_deletes = fail;
    }

    pub fn fail_writes_to(&self, uri: &Url) {
        self.faults.lock().write_uris.insert(uri.clone());
    }

    pub fn fail_deletes_of(&self, uri: &Url) {
        self.faults.lock().delete_uris.insert(uri.clone());
    }

    pub fn fail_reads_of(&self, uri: &Url) {
        self.faults.lock().read_uris.insert(uri.clone());
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.resources.lock().contains_key(uri)
    }

    pub fn content_type(&self, uri: &Url) -> Option<String> {
        self.resources
            .lock()
            .get(uri)
            .map(|r| r.content_type.clone())
    }

    /// Number of completed writes to `uri`.
    pub fn write_count(&self, uri: &Url) -> usize {
        self.stats.lock().count.get(uri).copied().unwrap_or(0)
    }

    /// Highest number of writes to a single URI that were ever in flight at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.stats.lock().max_in_flight
    }

    fn check_write(&self, uri: &Url) -> Result<(), ConceptError> {
        let faults = self.faults.lock();
        if faults.all_writes || faults.write_uris.contains(uri) {
            return Err(ConceptError::Storage(format!(
                "simulated write failure for {uri}"
            )));
        }
        Ok(())
    }

    async fn store(&self, uri: &Url, bytes: Vec<u8>, content_type: &str) -> Result<(), ConceptError> {
        {
            let mut stats = self.stats.lock();
            let in_flight = stats.in_flight.entry(uri.clone()).or_insert(0);
            *in_flight += 1;
            let current = *in_flight;
            stats.max_in_flight = stats.max_in_flight.max(current);
        }
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.check_write(uri);
        if result.is_ok() {
            self.resources.lock().insert(
                uri.clone(),
                StoredResource {
                    bytes,
                    content_type: content_type.to_string(),
                },
            );
        }
        let mut stats = self.stats.lock();
        if let Some(in_flight) = stats.in_flight.get_mut(uri) {
            *in_flight -= 1;
        }
        if result.is_ok() {
            *stats.count.entry(uri.clone()).or_insert(0) += 1;
        }
        result
    }
}

impl RemoteStorage for MemoryStorage {
    async fn read_resource(&self, uri: &Url) -> Result<Option<String>, ConceptError> {
        if self.faults.lock().read_uris.contains(uri) {
            return Err(ConceptError::Storage(format!("simulated read failure for {uri}")));
        }
        let resources = self.resources.lock();
        match resources.get(uri) {
            None => Ok(None),
            Some(resource) => String::from_utf8(resource.bytes.clone())
                .map(Some)
                .map_err(|e| ConceptError::Serialization(format!("{uri} is not text: {e}"))),
        }
    }

    async fn write_resource(&self, uri: &Url, content: &str) -> Result<(), ConceptError> {
        self.store(uri, content.as_bytes().to_vec(), JSON_CONTENT_TYPE)
            .await
    }

    async fn write_blob(
        &self,
        uri: &Url,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ConceptError> {
        self.store(uri, bytes.to_vec(), content_type).await
    }

    async fn delete_resource(&self, uri: &Url) -> Result<(), ConceptError> {
        {
            let faults = self.faults.lock();
            if faults.all_deletes || faults.delete_uris.contains(uri) {
                return Err(ConceptError::Storage(format!(
                    "simulated delete failure for {uri}"
                )));
            }
        }
        match self.resources.lock().remove(uri) {
            Some(_) => Ok(()),
            None => Err(ConceptError::StaleDelete(uri.to_string())),
        }
    }

    async fn list_children(&self, container: &Url) -> Result<Vec<Url>, ConceptError> {
        let resources = self.resources.lock();
        let children: BTreeSet<Url> = resources
            .keys()
            .filter_map(|uri| child_of(container, uri))
            .collect();
        Ok(children.into_iter().collect())
    }
}
