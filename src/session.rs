use std::sync::Arc;
use url::Url;

use crate::{
    concept::Concept,
    config::Scope,
    document::Document,
    error::ConceptError,
    migration::MigrationOutcome,
    note::Note,
    save::{NoteWriter, SaveController, SavePhase},
    service::ConceptService,
    storage::RemoteStorage,
};

/// Writes one note through [`ConceptService::save`].
pub struct SessionWriter<S: RemoteStorage> {
    service: ConceptService<S>,
    name: Arc<str>,
}

impl<S: RemoteStorage> SessionWriter<S> {
    pub(crate) fn new(service: ConceptService<S>, name: Arc<str>) -> Self {
        SessionWriter { service, name }
    }
}

impl<S: RemoteStorage + 'static> NoteWriter for SessionWriter<S> {
    async fn write(&self, value: Document) -> Result<(), ConceptError> {
        self.service.save(&self.name, &value).await.map(|_| ())
    }
}

/// An open note: the editor-facing handle combining the debounced save controller with the
/// graph queries and actions available on a note. Handles opened for the same name share one
/// controller.
pub struct NoteSession<S: RemoteStorage + 'static> {
    name: Arc<str>,
    controller: SaveController<SessionWriter<S>>,
}

impl<S: RemoteStorage + 'static> NoteSession<S> {
    pub(crate) fn from_controller(
        name: &str,
        controller: SaveController<SessionWriter<S>>,
    ) -> Self {
        NoteSession {
            name: Arc::from(name),
            controller,
        }
    }

    fn service(&self) -> &ConceptService<S> {
        &self.controller.writer().service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scope the note is indexed in, `None` before its first save.
    pub fn scope(&self) -> Result<Option<Scope>, ConceptError> {
        Ok(self.service().locate(&self.name)?.map(|(scope, _)| scope))
    }

    pub fn current_value(&self) -> Document {
        self.controller.current_value()
    }

    pub fn edit(&self, value: Document) {
        self.controller.edit(value)
    }

    pub fn phase(&self) -> SavePhase {
        self.controller.phase()
    }

    pub fn saved(&self) -> bool {
        self.controller.saved()
    }

    pub fn saving(&self) -> bool {
        self.controller.saving()
    }

    /// Error of the last failed save, cleared by the next successful one.
    pub fn last_error(&self) -> Option<ConceptError> {
        self.controller.last_error()
    }

    /// Save now. `Ok(false)` when a save was already in flight.
    pub async fn save(&self) -> Result<bool, ConceptError> {
        self.controller.save().await
    }

    pub async fn settled(&self) {
        self.controller.settled().await
    }

    pub fn backlinks(&self) -> Result<Vec<Concept>, ConceptError> {
        self.service().view().backlinks_of_name(&self.name)
    }

    pub fn links_to(&self) -> Result<Vec<(Url, String)>, ConceptError> {
        self.service().view().links_from(&self.name)
    }

    // Pending edits are flushed first. Edits made while the move runs are saved after it,
    // into the new scope.
    pub async fn make_public(&self) -> Result<MigrationOutcome, ConceptError> {
        self.settled().await;
        self.service().make_public(&self.name).await
    }

    pub async fn make_private(&self) -> Result<MigrationOutcome, ConceptError> {
        self.settled().await;
        self.service().make_private(&self.name).await
    }

    pub async fn delete(&self) -> Result<(), ConceptError> {
        self.settled().await;
        self.service().delete(&self.name).await
    }

    pub async fn set_cover_image(&self, cover_image: Option<Url>) -> Result<Note, ConceptError> {
        self.service().set_cover_image(&self.name, cover_image).await
    }

    pub fn public_path(&self, owner: &str) -> Result<String, ConceptError> {
        self.service().workspace().public_note_path(owner, &self.name)
    }

    pub fn private_path(&self) -> Result<String, ConceptError> {
        self.service().workspace().private_note_path(&self.name)
    }
}
