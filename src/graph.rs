//! Read-time union of a workspace's public and private concept indices.
//!
//! Only outgoing edges are persisted (`Concept::refs`); backlinks are found by scanning every
//! concept of both scopes. There is deliberately no reverse adjacency to keep in sync.
use std::{collections::BTreeMap, sync::Arc};
use url::Url;

use crate::{
    concept::Concept,
    config::{Scope, Workspace},
    error::ConceptError,
    index::{ConceptIndexStore, IndexSnapshot},
    storage::RemoteStorage,
};

#[derive(Debug, Clone)]
pub struct CombinedGraphView {
    workspace: Arc<Workspace>,
    public: IndexSnapshot,
    private: IndexSnapshot,
}

impl CombinedGraphView {
    /// An absent snapshot (index not loaded yet) is treated as empty.
    pub fn new(
        workspace: Arc<Workspace>,
        public: Option<IndexSnapshot>,
        private: Option<IndexSnapshot>,
    ) -> Self {
        CombinedGraphView {
            workspace,
            public: public.unwrap_or_default(),
            private: private.unwrap_or_default(),
        }
    }

    pub fn from_stores<S: RemoteStorage>(
        public: &ConceptIndexStore<S>,
        private: &ConceptIndexStore<S>,
    ) -> Self {
        CombinedGraphView::new(
            public.workspace().clone(),
            public.snapshot(),
            private.snapshot(),
        )
    }

    pub fn snapshot(&self, scope: Scope) -> &IndexSnapshot {
        match scope {
            Scope::Public => &self.public,
            Scope::Private => &self.private,
        }
    }

    /// Every record of both scopes, public first. A concept caught mid-migration appears once
    /// per scope.
    pub fn concepts(&self) -> impl Iterator<Item = (Scope, &Concept)> {
        self.public
            .iter()
            .map(|c| (Scope::Public, c))
            .chain(self.private.iter().map(|c| (Scope::Private, c)))
    }

    /// The record for `name` and the scope it is indexed in. When indexed in both scopes the
    /// most recently modified record wins.
    pub fn get(&self, name: &str) -> Result<Option<(Scope, &Concept)>, ConceptError> {
        let uri = self.workspace.concept_uri(name)?;
        Ok(self.get_uri(&uri))
    }

    pub fn get_uri(&self, concept_uri: &Url) -> Option<(Scope, &Concept)> {
        let public = self.public.get(concept_uri).map(|c| (Scope::Public, c));
        let private = self.private.get(concept_uri).map(|c| (Scope::Private, c));
        match (public, private) {
            (Some(p), Some(q)) => Some(if p.1.modified >= q.1.modified { p } else { q }),
            (p, q) => p.or(q),
        }
    }

    /// Concepts whose body references `concept_uri`, across both scopes. Full scan.
    ///
    /// A referencing concept indexed in both scopes is reported once, using its most recently
    /// modified record. Results are ordered by concept URI.
    pub fn backlinks_of(&self, concept_uri: &Url) -> Vec<Concept> {
        let mut found: BTreeMap<&Url, &Concept> = BTreeMap::new();
        for (_, concept) in self.concepts() {
            if !concept.references(concept_uri) {
                continue;
            }
            found
                .entry(&concept.uri)
                .and_modify(|seen| {
                    if concept.modified > seen.modified {
                        *seen = concept;
                    }
                })
                .or_insert(concept);
        }
        found.into_values().cloned().collect()
    }

    pub fn backlinks_of_name(&self, name: &str) -> Result<Vec<Concept>, ConceptError> {
        let uri = self.workspace.concept_uri(name)?;
        Ok(self.backlinks_of(&uri))
    }

    /// Outgoing references of `name` as `(concept uri, name)` pairs. A concept that is not
    /// indexed has no links.
    pub fn links_from(&self, name: &str) -> Result<Vec<(Url, String)>, ConceptError> {
        let Some((_, concept)) = self.get(name)? else {
            return Ok(Vec::new());
        };
        let mut links = Vec::with_capacity(concept.refs.len());
        for uri in concept.refs.iter() {
            match self.workspace.concept_name_from_uri(uri) {
                Ok(target) => links.push((uri.clone(), target)),
                Err(e) => tracing::warn!("'{}' links to undecodable {}: {e}", concept.name, uri),
            }
        }
        Ok(links)
    }
}
