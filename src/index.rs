//! # Concept index
//!
//! Each `(workspace, scope)` pair owns one index resource holding every [`Concept`] of that
//! scope, addressed by concept URI. The index is a derived cache: entries are rebuilt from the
//! note body on every save, never patched.
//!
//! [`ConceptIndexStore`] keeps the last loaded or written version as an immutable
//! [`IndexSnapshot`]. Writes clone the snapshot, apply the change, persist the whole
//! resource and only then publish the new snapshot, so readers holding an older snapshot
//! keep a consistent view and a failed write leaves the published state untouched.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{mpsc::UnboundedSender, Mutex as AsyncMutex};
use url::Url;

use crate::{
    concept::Concept,
    config::{Scope, Workspace},
    error::ConceptError,
    event::GraphEvent,
    storage::RemoteStorage,
};

pub const INDEX_FORMAT_VERSION: u32 = 1;

pub type IndexSnapshot = Arc<ConceptIndex>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConceptIndex {
    concepts: BTreeMap<Url, Concept>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexResource {
    version: u32,
    #[serde(default)]
    concepts: Vec<Concept>,
}

impl ConceptIndex {
    pub fn get(&self, concept_uri: &Url) -> Option<&Concept> {
        self.concepts.get(concept_uri)
    }

    pub fn contains(&self, concept_uri: &Url) -> bool {
        self.concepts.contains_key(concept_uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Copy with `concept` inserted, replacing any record with the same URI.
    pub fn with(&self, concept: Concept) -> ConceptIndex {
        let mut next = self.clone();
        next.concepts.insert(concept.uri.clone(), concept);
        next
    }

    pub fn without(&self, concept_uri: &Url) -> ConceptIndex {
        let mut next = self.clone();
        next.concepts.remove(concept_uri);
        next
    }

    pub fn parse(content: &str) -> Result<ConceptIndex, ConceptError> {
        let resource: IndexResource = serde_json::from_str(content)?;
        if resource.version != INDEX_FORMAT_VERSION {
            return Err(ConceptError::Serialization(format!(
                "unsupported concept index version {}",
                resource.version
            )));
        }
        Ok(resource.concepts.into_iter().collect())
    }

    pub fn to_resource(&self) -> Result<String, ConceptError> {
        let resource = IndexResource {
            version: INDEX_FORMAT_VERSION,
            concepts: self.concepts.values().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&resource)?)
    }
}

impl FromIterator<Concept> for ConceptIndex {
    fn from_iter<T: IntoIterator<Item = Concept>>(iter: T) -> Self {
        ConceptIndex {
            concepts: iter.into_iter().map(|c| (c.uri.clone(), c)).collect(),
        }
    }
}

/// The index of one scope of a workspace, backed by a single storage resource.
pub struct ConceptIndexStore<S: RemoteStorage> {
    storage: Arc<S>,
    workspace: Arc<Workspace>,
    scope: Scope,
    uri: Url,
    snapshot: RwLock<Option<IndexSnapshot>>,
    // Records found on load whose note lives outside this scope. They are kept out of the
    // snapshot so no later write persists them again.
    misplaced: RwLock<Vec<Concept>>,
    // Serializes read-modify-write cycles so concurrent saves of different notes do not
    // drop each other's entries.
    write_lock: AsyncMutex<()>,
    events: Option<UnboundedSender<GraphEvent>>,
}

impl<S: RemoteStorage> ConceptIndexStore<S> {
    pub fn new(
        storage: Arc<S>,
        workspace: Arc<Workspace>,
        scope: Scope,
    ) -> Result<Self, ConceptError> {
        let uri = workspace.index_uri(scope)?;
        Ok(ConceptIndexStore {
            storage,
            workspace,
            scope,
            uri,
            snapshot: RwLock::new(None),
            misplaced: RwLock::new(Vec::new()),
            write_lock: AsyncMutex::new(()),
            events: None,
        })
    }

    pub fn with_events(mut self, tx: UnboundedSender<GraphEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// The last loaded or written snapshot; `None` until the index has been loaded.
    pub fn snapshot(&self) -> Option<IndexSnapshot> {
        self.snapshot.read().clone()
    }

    /// Like [`Self::snapshot`], treating a not yet loaded index as empty.
    pub fn current(&self) -> IndexSnapshot {
        self.snapshot().unwrap_or_default()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// (Re)read the index resource. A missing resource is an empty index.
    ///
    /// Records whose note lives outside this scope are left out of the snapshot (and so out of
    /// every later write of the resource) and reported by [`Self::misplaced`].
    #[tracing::instrument(skip(self), fields(scope = %self.scope))]
    pub async fn load(&self) -> Result<IndexSnapshot, ConceptError> {
        let index = match self.storage.read_resource(&self.uri).await? {
            None => {
                tracing::debug!("No concept index at {}, starting empty", self.uri);
                ConceptIndex::default()
            }
            Some(content) => ConceptIndex::parse(&content)?,
        };
        let (kept, misplaced): (Vec<Concept>, Vec<Concept>) = index
            .iter()
            .cloned()
            .partition(|concept| self.workspace.scope_of(&concept.stored_at) == Some(self.scope));
        for concept in misplaced.iter() {
            tracing::warn!(
                "Dropping '{}' from the {} index, its note is stored at {}",
                concept.name,
                self.scope,
                concept.stored_at
            );
        }
        let snapshot = Arc::new(kept.into_iter().collect::<ConceptIndex>());
        *self.misplaced.write() = misplaced;
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Records dropped by the last [`Self::load`] because their note is stored in another scope.
    pub fn misplaced(&self) -> Vec<Concept> {
        self.misplaced.read().clone()
    }

    /// The published snapshot, loading the index first if it never was.
    pub async fn ensure_loaded(&self) -> Result<IndexSnapshot, ConceptError> {
        match self.snapshot() {
            Some(snapshot) => Ok(snapshot),
            None => self.load().await,
        }
    }

    pub fn get(&self, name: &str) -> Result<Option<Concept>, ConceptError> {
        let uri = self.workspace.concept_uri(name)?;
        Ok(self.current().get(&uri).cloned())
    }

    pub fn all(&self) -> Vec<Concept> {
        self.current().iter().cloned().collect()
    }

    /// Insert or replace `concept` and persist the index.
    ///
    /// The concept's note must live under this scope's storage root.
    #[tracing::instrument(skip(self, concept), fields(scope = %self.scope, concept = %concept.name))]
    pub async fn upsert(&self, concept: Concept) -> Result<IndexSnapshot, ConceptError> {
        if self.workspace.scope_of(&concept.stored_at) != Some(self.scope) {
            return Err(ConceptError::ScopeMismatch {
                name: concept.name.clone(),
                stored_at: concept.stored_at.to_string(),
                scope: self.scope.to_string(),
            });
        }
        let _guard = self.write_lock.lock().await;
        let base = self.ensure_loaded().await?;
        let concept_uri = concept.uri.clone();
        let next = Arc::new(base.with(concept));
        self.persist(&next).await?;
        self.emit(GraphEvent::ConceptUpserted(concept_uri, self.scope));
        Ok(next)
    }

    /// Remove the record with `concept_uri` and persist the index. Removing an absent record
    /// is a no-op that does not touch storage.
    #[tracing::instrument(skip(self), fields(scope = %self.scope))]
    pub async fn remove(&self, concept_uri: &Url) -> Result<IndexSnapshot, ConceptError> {
        let _guard = self.write_lock.lock().await;
        let base = self.ensure_loaded().await?;
        if !base.contains(concept_uri) {
            tracing::debug!("{} is not in the {} index", concept_uri, self.scope);
            return Ok(base);
        }
        let next = Arc::new(base.without(concept_uri));
        self.persist(&next).await?;
        self.emit(GraphEvent::ConceptRemoved(concept_uri.clone(), self.scope));
        Ok(next)
    }

    async fn persist(&self, next: &IndexSnapshot) -> Result<(), ConceptError> {
        let content = next.to_resource()?;
        self.storage
            .write_resource(&self.uri, &content)
            .await
            .map_err(|e| {
                tracing::error!("Writing the {} concept index failed: {e}", self.scope);
                ConceptError::IndexWriteFailed(format!("{}: {e}", self.uri))
            })?;
        *self.snapshot.write() = Some(next.clone());
        Ok(())
    }

    fn emit(&self, event: GraphEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event) {
                tracing::debug!("Dropping graph event, receiver closed: {:?}", e.0);
            }
        }
    }
}
