//! # Privacy migration
//!
//! Moving a concept between scopes touches four resources (two note resources, two index
//! resources) with no transaction spanning them. [`MigrationCoordinator`] orders the writes so
//! that every failure leaves the concept readable from at least one scope:
//!
//! 1. read the note from the source scope
//! 2. write it to the destination note resource
//! 3. upsert the concept into the destination index, pointing at the destination note
//! 4. remove the concept from the source index
//! 5. delete the source note
//!
//! Nothing is rolled back. A failure in steps 3 or 4 surfaces as
//! [`ConceptError::PartialMigration`] and may leave the concept indexed in both scopes until
//! the migration is run again. A failed step 5 only orphans the source note resource and is
//! reported in the outcome instead of as an error.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    concept::Concept,
    config::{Scope, Workspace},
    error::ConceptError,
    index::ConceptIndexStore,
    note::Note,
    storage::RemoteStorage,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    /// All five steps ran; the source note is gone (or already was).
    Completed,
    /// The concept was only indexed in the destination scope. Nothing to move.
    AlreadyInScope,
    /// The concept moved but the source note resource could not be deleted.
    SourceOrphaned { uri: Url, error: ConceptError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    /// The record now held by the destination index
    pub concept: Concept,
    pub from: Scope,
    pub to: Scope,
    pub status: MigrationStatus,
}

impl MigrationOutcome {
    pub fn is_clean(&self) -> bool {
        !matches!(self.status, MigrationStatus::SourceOrphaned { .. })
    }
}

pub struct MigrationCoordinator<'a, S: RemoteStorage> {
    storage: &'a S,
    workspace: &'a Workspace,
    source: &'a ConceptIndexStore<S>,
    destination: &'a ConceptIndexStore<S>,
}

impl<'a, S: RemoteStorage> MigrationCoordinator<'a, S> {
    pub fn new(
        storage: &'a S,
        workspace: &'a Workspace,
        source: &'a ConceptIndexStore<S>,
        destination: &'a ConceptIndexStore<S>,
    ) -> Result<Self, ConceptError> {
        if source.scope() == destination.scope() {
            return Err(ConceptError::Config(format!(
                "cannot migrate from the {} scope into itself",
                source.scope()
            )));
        }
        Ok(MigrationCoordinator {
            storage,
            workspace,
            source,
            destination,
        })
    }

    #[tracing::instrument(skip(self), fields(from = %self.source.scope(), to = %self.destination.scope()))]
    pub async fn migrate(&self, name: &str) -> Result<MigrationOutcome, ConceptError> {
        let from = self.source.scope();
        let to = self.destination.scope();
        let concept_uri = self.workspace.concept_uri(name)?;
        let source_index = self.source.ensure_loaded().await?;
        let destination_index = self.destination.ensure_loaded().await?;

        let Some(current) = source_index.get(&concept_uri).cloned() else {
            return match destination_index.get(&concept_uri) {
                Some(existing) => {
                    tracing::debug!("'{name}' is already {to}");
                    Ok(MigrationOutcome {
                        concept: existing.clone(),
                        from,
                        to,
                        status: MigrationStatus::AlreadyInScope,
                    })
                }
                None => Err(ConceptError::NotFound(format!(
                    "'{name}' is not indexed in the {from} scope"
                ))),
            };
        };
        let target = self.workspace.note_uri(to, name)?;

        // 1. read
        let note = match Note::read(self.storage, &current.stored_at).await? {
            Some(note) => Some(note),
            None => {
                // an earlier run may have copied the note before failing
                tracing::warn!("Source note {} is missing", current.stored_at);
                if Note::read(self.storage, &target).await?.is_none() {
                    return Err(ConceptError::NotFound(format!(
                        "no note body for '{name}' at {} or {}",
                        current.stored_at, target
                    )));
                }
                None
            }
        };

        // 2. write destination
        if let Some(note) = &note {
            note.write(self.storage, &target).await?;
            tracing::debug!("Copied '{name}' to {target}");
        }

        // 3. index in destination
        let moved = current.relocated(target, Utc::now());
        self.destination
            .upsert(moved.clone())
            .await
            .map_err(|e| partial(name, format!("indexing in the {to} scope failed: {e}")))?;

        // 4. unindex from source
        self.source
            .remove(&concept_uri)
            .await
            .map_err(|e| partial(name, format!("removing from the {from} index failed: {e}")))?;

        // 5. delete source, strictly last
        let status = if note.is_none() {
            MigrationStatus::Completed
        } else {
            match self.storage.delete_resource(&current.stored_at).await {
                Ok(()) => MigrationStatus::Completed,
                Err(ConceptError::StaleDelete(uri)) => {
                    tracing::debug!("Source note {uri} was already deleted");
                    MigrationStatus::Completed
                }
                Err(error) => {
                    tracing::warn!(
                        "'{name}' is now {to} but {} could not be deleted: {error}",
                        current.stored_at
                    );
                    MigrationStatus::SourceOrphaned {
                        uri: current.stored_at.clone(),
                        error,
                    }
                }
            }
        };
        tracing::info!("Moved '{name}' from {from} to {to}");
        Ok(MigrationOutcome {
            concept: moved,
            from,
            to,
            status,
        })
    }
}

fn partial(name: &str, reason: String) -> ConceptError {
    tracing::error!("Migration of '{name}' stopped part way: {reason}");
    ConceptError::PartialMigration {
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        concept::ConceptBuilder, config::tests::test_workspace, document::References,
        storage::MemoryStorage,
    };
    use std::sync::Arc;
    use test_log::test;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        workspace: Arc<Workspace>,
        public: ConceptIndexStore<MemoryStorage>,
        private: ConceptIndexStore<MemoryStorage>,
    }

    impl Fixture {
        async fn with_private_note(name: &str, body: &str) -> Fixture {
            let storage = Arc::new(MemoryStorage::new());
            let workspace = Arc::new(test_workspace());
            let public =
                ConceptIndexStore::new(storage.clone(), workspace.clone(), Scope::Public).unwrap();
            let private =
                ConceptIndexStore::new(storage.clone(), workspace.clone(), Scope::Private)
                    .unwrap();
            let concept = ConceptBuilder::new(&workspace, Scope::Private)
                .build(name, None, &References::default(), None)
                .unwrap();
            Note::new(body.to_string())
                .write(storage.as_ref(), &concept.stored_at)
                .await
                .unwrap();
            private.upsert(concept).await.unwrap();
            Fixture {
                storage,
                workspace,
                public,
                private,
            }
        }

        fn to_public(&self) -> MigrationCoordinator<'_, MemoryStorage> {
            MigrationCoordinator::new(
                self.storage.as_ref(),
                &self.workspace,
                &self.private,
                &self.public,
            )
            .unwrap()
        }
    }

    #[test(tokio::test)]
    async fn test_make_public() {
        let fx = Fixture::with_private_note("Idea", "hello").await;
        let outcome = fx.to_public().migrate("Idea").await.unwrap();
        assert_eq!(outcome.status, MigrationStatus::Completed);

        let public_uri = fx.workspace.note_uri(Scope::Public, "Idea").unwrap();
        let private_uri = fx.workspace.note_uri(Scope::Private, "Idea").unwrap();
        assert_eq!(fx.public.get("Idea").unwrap().unwrap().stored_at, public_uri);
        assert_eq!(fx.private.get("Idea").unwrap(), None);
        let note = Note::read(fx.storage.as_ref(), &public_uri).await.unwrap();
        assert_eq!(note.unwrap().body, "hello");
        assert!(!fx.storage.contains(&private_uri));
    }

    #[test(tokio::test)]
    async fn test_note_write_failure_leaves_source_intact() {
        let fx = Fixture::with_private_note("Idea", "hello").await;
        let public_uri = fx.workspace.note_uri(Scope::Public, "Idea").unwrap();
        fx.storage.fail_writes_to(&public_uri);
        assert!(matches!(
            fx.to_public().migrate("Idea").await,
            Err(ConceptError::NoteWriteFailed(_))
        ));
        assert!(fx.private.get("Idea").unwrap().is_some());
        assert!(fx.public.get("Idea").unwrap().is_none());
        assert!(fx
            .storage
            .contains(&fx.workspace.note_uri(Scope::Private, "Idea").unwrap()));
    }

    #[test(tokio::test)]
    async fn test_source_index_failure_duplicates_then_recovers() {
        let fx = Fixture::with_private_note("Idea", "hello").await;
        fx.storage.fail_writes_to(fx.private.uri());
        let result = fx.to_public().migrate("Idea").await;
        assert!(matches!(result, Err(ConceptError::PartialMigration { .. })));
        // indexed in both scopes, source note untouched
        assert!(fx.private.get("Idea").unwrap().is_some());
        assert!(fx.public.get("Idea").unwrap().is_some());
        assert!(fx
            .storage
            .contains(&fx.workspace.note_uri(Scope::Private, "Idea").unwrap()));

        fx.storage.clear_faults();
        let outcome = fx.to_public().migrate("Idea").await.unwrap();
        assert_eq!(outcome.status, MigrationStatus::Completed);
        assert_eq!(fx.public.all().len(), 1);
        assert!(fx.private.all().is_empty());
    }

    #[test(tokio::test)]
    async fn test_failed_delete_is_not_fatal() {
        let fx = Fixture::with_private_note("Idea", "hello").await;
        let private_uri = fx.workspace.note_uri(Scope::Private, "Idea").unwrap();
        fx.storage.fail_deletes_of(&private_uri);
        let outcome = fx.to_public().migrate("Idea").await.unwrap();
        assert!(!outcome.is_clean());
        assert!(fx.public.get("Idea").unwrap().is_some());
        assert!(fx.private.get("Idea").unwrap().is_none());

        let again = fx.to_public().migrate("Idea").await.unwrap();
        assert_eq!(again.status, MigrationStatus::AlreadyInScope);
        assert_eq!(fx.public.all().len(), 1);
    }

    #[test(tokio::test)]
    async fn test_unknown_concept() {
        let fx = Fixture::with_private_note("Idea", "hello").await;
        assert!(matches!(
            fx.to_public().migrate("Nope").await,
            Err(ConceptError::NotFound(_))
        ));
    }

    #[test]
    fn test_same_scope_is_rejected() {
        let storage = Arc::new(MemoryStorage::new());
        let workspace = Arc::new(test_workspace());
        let a = ConceptIndexStore::new(storage.clone(), workspace.clone(), Scope::Public).unwrap();
        let b = ConceptIndexStore::new(storage.clone(), workspace.clone(), Scope::Public).unwrap();
        assert!(MigrationCoordinator::new(storage.as_ref(), &workspace, &a, &b).is_err());
    }
}
