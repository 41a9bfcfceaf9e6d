//! # Concept service
//!
//! [`ConceptService`] bundles everything one workspace needs: the storage handle, the
//! workspace configuration and the two per-scope index stores. It owns the combined
//! note-and-index write path used by every save, and is the entry point for migration,
//! deletion, image upload and the consistency check. It is cheap to clone; clones share the
//! index stores, the per-note write locks and the open sessions.
//!
//! Every operation that writes a note or its index record (save, cover image, migration,
//! deletion) holds that note's write lock for its whole duration, so a debounced save that
//! fires while the note is being migrated waits and then writes to the destination scope.
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc::UnboundedSender, Mutex as AsyncMutex, OwnedMutexGuard};
use url::Url;

use crate::{
    concept::{Concept, ConceptBuilder},
    config::{Scope, SessionConfig, Workspace},
    doctor::{self, ConsistencyReport},
    document::{extract_references, Document},
    error::ConceptError,
    event::GraphEvent,
    graph::CombinedGraphView,
    images::ImageUpload,
    index::ConceptIndexStore,
    migration::{MigrationCoordinator, MigrationOutcome, MigrationStatus},
    note::Note,
    save::{SaveController, WeakSaveController},
    session::{NoteSession, SessionWriter},
    storage::RemoteStorage,
};

pub struct ConceptService<S: RemoteStorage> {
    storage: Arc<S>,
    workspace: Arc<Workspace>,
    public: Arc<ConceptIndexStore<S>>,
    private: Arc<ConceptIndexStore<S>>,
    events: Option<UnboundedSender<GraphEvent>>,
    note_locks: Arc<Mutex<HashMap<Url, Arc<AsyncMutex<()>>>>>,
    sessions: Arc<Mutex<HashMap<Arc<str>, WeakSaveController<SessionWriter<S>>>>>,
}

impl<S: RemoteStorage> Clone for ConceptService<S> {
    fn clone(&self) -> Self {
        ConceptService {
            storage: self.storage.clone(),
            workspace: self.workspace.clone(),
            public: self.public.clone(),
            private: self.private.clone(),
            events: self.events.clone(),
            note_locks: self.note_locks.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<S: RemoteStorage> ConceptService<S> {
    pub fn new(storage: Arc<S>, workspace: Workspace) -> Result<Self, ConceptError> {
        Self::with_events(storage, workspace, None)
    }

    pub fn with_events(
        storage: Arc<S>,
        workspace: Workspace,
        events: Option<UnboundedSender<GraphEvent>>,
    ) -> Result<Self, ConceptError> {
        workspace.validate()?;
        let workspace = Arc::new(workspace);
        let store = |scope| -> Result<Arc<ConceptIndexStore<S>>, ConceptError> {
            let store = ConceptIndexStore::new(storage.clone(), workspace.clone(), scope)?;
            Ok(Arc::new(match &events {
                Some(tx) => store.with_events(tx.clone()),
                None => store,
            }))
        };
        let public = store(Scope::Public)?;
        let private = store(Scope::Private)?;
        Ok(ConceptService {
            storage,
            workspace,
            public,
            private,
            events,
            note_locks: Arc::default(),
            sessions: Arc::default(),
        })
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn index(&self, scope: Scope) -> &Arc<ConceptIndexStore<S>> {
        match scope {
            Scope::Public => &self.public,
            Scope::Private => &self.private,
        }
    }

    /// (Re)load both indices.
    pub async fn load(&self) -> Result<(), ConceptError> {
        self.public.load().await?;
        self.private.load().await?;
        Ok(())
    }

    /// Snapshot view over both indices as currently published.
    pub fn view(&self) -> CombinedGraphView {
        CombinedGraphView::from_stores(&self.public, &self.private)
    }

    pub fn locate(&self, name: &str) -> Result<Option<(Scope, Concept)>, ConceptError> {
        Ok(self
            .view()
            .get(name)?
            .map(|(scope, concept)| (scope, concept.clone())))
    }

    pub async fn read_note(&self, name: &str) -> Result<Option<(Scope, Note)>, ConceptError> {
        let Some((scope, concept)) = self.locate(name)? else {
            return Ok(None);
        };
        Ok(Note::read(self.storage.as_ref(), &concept.stored_at)
            .await?
            .map(|note| (scope, note)))
    }

    /// Persist `value` as the body of `name` and re-derive its index record.
    ///
    /// The note is written first, then the index of the scope the concept lives in (the
    /// workspace default scope for new notes). Either failure aborts the save; a failed index
    /// write leaves the new body in place with a stale index entry.
    #[tracing::instrument(skip(self, value))]
    pub async fn save(&self, name: &str, value: &Document) -> Result<Concept, ConceptError> {
        let references = extract_references(value);
        let body = value.to_body()?;
        let _guard = self.lock_note(name).await?;
        self.public.ensure_loaded().await?;
        self.private.ensure_loaded().await?;
        let (scope, existing) = match self.locate(name)? {
            Some((scope, concept)) => (scope, Some(concept)),
            None => (self.workspace.default_scope, None),
        };
        let concept = ConceptBuilder::new(&self.workspace, scope).build(
            name,
            existing.as_ref(),
            &references,
            None,
        )?;
        Note::write_body(self.storage.as_ref(), &concept.stored_at, body).await?;
        self.emit(GraphEvent::NoteSaved(concept.stored_at.clone()));
        self.index(scope).upsert(concept.clone()).await?;
        tracing::debug!(
            "Saved '{name}' ({} refs, {} tags) in the {scope} scope",
            concept.refs.len(),
            concept.tags.len()
        );
        Ok(concept)
    }

    pub async fn set_cover_image(
        &self,
        name: &str,
        cover_image: Option<Url>,
    ) -> Result<Note, ConceptError> {
        let _guard = self.lock_note(name).await?;
        let (_, concept) = self
            .locate(name)?
            .ok_or_else(|| ConceptError::NotFound(format!("'{name}' has no saved note")))?;
        let mut note = Note::read(self.storage.as_ref(), &concept.stored_at)
            .await?
            .unwrap_or_default();
        note.cover_image = cover_image;
        note.write(self.storage.as_ref(), &concept.stored_at).await?;
        self.emit(GraphEvent::NoteSaved(concept.stored_at.clone()));
        Ok(note)
    }

    /// Store an image in the `images/` container of `scope`.
    pub async fn upload_image(
        &self,
        scope: Scope,
        upload: &ImageUpload,
    ) -> Result<Url, ConceptError> {
        let container = self.workspace.storage_root(scope).join("images/")?;
        upload.store(self.storage.as_ref(), &container).await
    }

    /// Delete the note of `name` and drop it from every index holding it.
    ///
    /// Deleting the note resource is best effort; removing the index record is not.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<(), ConceptError> {
        let concept_uri = self.workspace.concept_uri(name)?;
        let _guard = self.lock_note(name).await?;
        self.public.ensure_loaded().await?;
        self.private.ensure_loaded().await?;
        let mut found = false;
        for scope in [Scope::Public, Scope::Private] {
            let index = self.index(scope);
            let Some(concept) = index.current().get(&concept_uri).cloned() else {
                continue;
            };
            found = true;
            match self.storage.delete_resource(&concept.stored_at).await {
                Ok(()) => self.emit(GraphEvent::NoteDeleted(concept.stored_at.clone())),
                Err(ConceptError::StaleDelete(uri)) => {
                    tracing::debug!("Note {uri} was already gone")
                }
                Err(e) => tracing::warn!("Could not delete {}: {e}", concept.stored_at),
            }
            index.remove(&concept_uri).await?;
        }
        if !found {
            return Err(ConceptError::NotFound(format!("'{name}' is not indexed")));
        }
        Ok(())
    }

    /// Move `name` into `target`, see [`MigrationCoordinator`].
    pub async fn migrate(
        &self,
        name: &str,
        target: Scope,
    ) -> Result<MigrationOutcome, ConceptError> {
        let coordinator = MigrationCoordinator::new(
            self.storage.as_ref(),
            &self.workspace,
            self.index(target.other()),
            self.index(target),
        )?;
        let _guard = self.lock_note(name).await?;
        let outcome = coordinator.migrate(name).await?;
        if outcome.status != MigrationStatus::AlreadyInScope {
            self.emit(GraphEvent::Migrated(
                outcome.concept.uri.clone(),
                outcome.from,
                outcome.to,
            ));
        }
        Ok(outcome)
    }

    pub async fn make_public(&self, name: &str) -> Result<MigrationOutcome, ConceptError> {
        self.migrate(name, Scope::Public).await
    }

    pub async fn make_private(&self, name: &str) -> Result<MigrationOutcome, ConceptError> {
        self.migrate(name, Scope::Private).await
    }

    pub async fn doctor(&self) -> Result<ConsistencyReport, ConceptError> {
        self.load().await?;
        let dropped = [Scope::Public, Scope::Private]
            .into_iter()
            .flat_map(|scope| {
                self.index(scope)
                    .misplaced()
                    .into_iter()
                    .map(move |concept| (scope, concept))
            })
            .collect();
        doctor::check(self.storage.as_ref(), &self.workspace, &self.view(), dropped).await
    }

    /// Open `name` for editing. A name without a saved note opens as the empty document.
    ///
    /// While a session for `name` is alive, opening it again returns a handle to the same save
    /// controller, so edits from both handles are debounced and written as one stream.
    pub async fn open(
        &self,
        name: &str,
        config: SessionConfig,
    ) -> Result<NoteSession<S>, ConceptError>
    where
        S: 'static,
    {
        crate::ident::validate_name(name)?;
        if let Some(controller) = self.open_session(name) {
            return Ok(NoteSession::from_controller(name, controller));
        }
        self.public.ensure_loaded().await?;
        self.private.ensure_loaded().await?;
        let value = match self.read_note(name).await? {
            Some((_, note)) => Some(Document::parse(&note.body)?),
            None => None,
        };

        let mut sessions = self.sessions.lock();
        // another open of the same name may have finished while the note was read
        if let Some(controller) = sessions.get(name).and_then(|weak| weak.upgrade()) {
            return Ok(NoteSession::from_controller(name, controller));
        }
        sessions.retain(|_, weak| !weak.is_dropped());
        let name: Arc<str> = Arc::from(name);
        let controller = SaveController::new(
            SessionWriter::new(self.clone(), name.clone()),
            config.quiet_period(),
        );
        controller.loaded(value);
        sessions.insert(name.clone(), controller.downgrade());
        Ok(NoteSession::from_controller(&name, controller))
    }

    fn open_session(&self, name: &str) -> Option<SaveController<SessionWriter<S>>>
    where
        S: 'static,
    {
        self.sessions.lock().get(name).and_then(|weak| weak.upgrade())
    }

    /// Exclusive write access to the note of `name`, held across every note and index write
    /// of one operation.
    async fn lock_note(&self, name: &str) -> Result<OwnedMutexGuard<()>, ConceptError> {
        let concept_uri = self.workspace.concept_uri(name)?;
        let lock = {
            let mut locks = self.note_locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(concept_uri).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    fn emit(&self, event: GraphEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event) {
                tracing::debug!("Dropping graph event, receiver closed: {:?}", e.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::tests::test_workspace, document::Node, storage::MemoryStorage};
    use test_log::test;

    fn service() -> (Arc<MemoryStorage>, ConceptService<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let service = ConceptService::new(storage.clone(), test_workspace()).unwrap();
        (storage, service)
    }

    fn doc(text: &str, refs: &[&str]) -> Document {
        let mut children = vec![Node::text(text)];
        children.extend(refs.iter().map(|r| Node::concept(r)));
        Document(vec![Node::paragraph(children)])
    }

    #[test(tokio::test)]
    async fn test_save_creates_note_and_index_entry() {
        let (storage, service) = service();
        let concept = service.save("Idea", &doc("hi", &["Other"])).await.unwrap();
        let ws = test_workspace();
        assert_eq!(concept.stored_at, ws.note_uri(Scope::Private, "Idea").unwrap());
        assert!(storage.contains(&concept.stored_at));
        assert_eq!(service.index(Scope::Private).get("Idea").unwrap(), Some(concept));
        assert_eq!(
            service.view().backlinks_of_name("Other").unwrap().len(),
            1
        );
    }

    #[test(tokio::test)]
    async fn test_save_keeps_scope_and_recomputes_refs() {
        let (_, service) = service();
        service.save("Idea", &doc("hi", &["A", "B"])).await.unwrap();
        service.make_public("Idea").await.unwrap();
        let concept = service.save("Idea", &doc("hi", &["C"])).await.unwrap();
        let ws = test_workspace();
        assert_eq!(ws.scope_of(&concept.stored_at), Some(Scope::Public));
        assert_eq!(concept.refs.len(), 1);
        assert!(service.index(Scope::Private).all().is_empty());
    }

    #[test(tokio::test)]
    async fn test_index_failure_is_reported() {
        let (storage, service) = service();
        storage.fail_writes_to(service.index(Scope::Private).uri());
        assert!(matches!(
            service.save("Idea", &doc("hi", &[])).await,
            Err(ConceptError::IndexWriteFailed(_))
        ));
    }

    #[test(tokio::test)]
    async fn test_invalid_name_writes_nothing() {
        let (storage, service) = service();
        assert!(matches!(
            service.save("..", &doc("hi", &[])).await,
            Err(ConceptError::InvalidName(_))
        ));
        assert_eq!(storage.max_concurrent_writes(), 0);
    }

    #[test(tokio::test)]
    async fn test_delete_tolerates_missing_note() {
        let (storage, service) = service();
        let concept = service.save("Idea", &doc("hi", &[])).await.unwrap();
        storage.delete_resource(&concept.stored_at).await.unwrap();
        service.delete("Idea").await.unwrap();
        assert!(service.locate("Idea").unwrap().is_none());
        assert!(matches!(
            service.delete("Idea").await,
            Err(ConceptError::NotFound(_))
        ));
    }

    #[test(tokio::test)]
    async fn test_cover_image_survives_saves_and_migration() {
        let (_, service) = service();
        service.save("Idea", &doc("hi", &[])).await.unwrap();
        let cover = service
            .upload_image(Scope::Private, &ImageUpload::new(vec![0; 4], "image/webp"))
            .await
            .unwrap();
        service
            .set_cover_image("Idea", Some(cover.clone()))
            .await
            .unwrap();
        service.save("Idea", &doc("edited", &[])).await.unwrap();
        service.make_public("Idea").await.unwrap();
        let (scope, note) = service.read_note("Idea").await.unwrap().unwrap();
        assert_eq!(scope, Scope::Public);
        assert_eq!(note.cover_image, Some(cover));
    }

    #[test(tokio::test)]
    async fn test_doctor_reports_records_dropped_on_load() {
        let (storage, service) = service();
        let stray = service.save("Stray", &doc("hi", &[])).await.unwrap();
        // a public index pointing at a private note
        let resource = [stray.clone()]
            .into_iter()
            .collect::<crate::index::ConceptIndex>()
            .to_resource()
            .unwrap();
        let public_uri = service.index(Scope::Public).uri().clone();
        storage.write_resource(&public_uri, &resource).await.unwrap();

        let report = service.doctor().await.unwrap();
        assert_eq!(
            report.misplaced,
            vec![(Scope::Public, "Stray".to_string(), stray.stored_at.clone())]
        );
        assert!(report.duplicated.is_empty());
        assert_eq!(service.locate("Stray").unwrap().unwrap().0, Scope::Private);
    }

    #[test(tokio::test)]
    async fn test_events() {
        let storage = Arc::new(MemoryStorage::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let service =
            ConceptService::with_events(storage, test_workspace(), Some(tx)).unwrap();
        service.save("Idea", &doc("hi", &[])).await.unwrap();
        service.make_public("Idea").await.unwrap();
        drop(service);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events[0], GraphEvent::NoteSaved(_)));
        assert!(matches!(events[1], GraphEvent::ConceptUpserted(_, Scope::Private)));
        assert!(matches!(
            events.last(),
            Some(GraphEvent::Migrated(_, Scope::Private, Scope::Public))
        ));
    }
}
