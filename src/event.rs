use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use url::Url;

use crate::config::Scope;

/// Notifications emitted after a write reached storage. Views holding snapshots use them to
/// know when to re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphEvent {
    /// Concept URI, scope of the index that now holds it
    ConceptUpserted(Url, Scope),
    ConceptRemoved(Url, Scope),
    /// Note resource URI
    NoteSaved(Url),
    NoteDeleted(Url),
    /// Concept URI, source scope, destination scope
    Migrated(Url, Scope, Scope),
}

impl GraphEvent {
    pub fn concept(&self) -> Option<&Url> {
        match self {
            GraphEvent::ConceptUpserted(uri, _)
            | GraphEvent::ConceptRemoved(uri, _)
            | GraphEvent::Migrated(uri, _, _) => Some(uri),
            GraphEvent::NoteSaved(_) | GraphEvent::NoteDeleted(_) => None,
        }
    }
}

impl Display for GraphEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            GraphEvent::ConceptUpserted(uri, scope) => write!(f, "ConceptUpserted({uri}, {scope})"),
            GraphEvent::ConceptRemoved(uri, scope) => write!(f, "ConceptRemoved({uri}, {scope})"),
            GraphEvent::NoteSaved(uri) => write!(f, "NoteSaved({uri})"),
            GraphEvent::NoteDeleted(uri) => write!(f, "NoteDeleted({uri})"),
            GraphEvent::Migrated(uri, from, to) => write!(f, "Migrated({uri}, {from} -> {to})"),
        }
    }
}
