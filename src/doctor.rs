//! Read-only consistency check over both scopes of a workspace.
//!
//! Interrupted migrations and failed deletes leave traces that are harmless but untidy:
//! concepts indexed in both scopes and note resources nothing points to. Re-running the
//! migration (or deleting the note) clears them; the report only finds them.
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
};
use url::Url;

use crate::{
    concept::Concept,
    config::{Scope, Workspace},
    error::ConceptError,
    graph::CombinedGraphView,
    storage::RemoteStorage,
};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Concept names indexed in both scopes
    pub duplicated: Vec<String>,
    /// Records whose note lives outside the storage root of the index holding them
    pub misplaced: Vec<(Scope, String, Url)>,
    /// Note resources no index record points to
    pub orphaned_notes: Vec<Url>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.duplicated.is_empty() && self.misplaced.is_empty() && self.orphaned_notes.is_empty()
    }
}

impl Display for ConsistencyReport {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.is_clean() {
            return writeln!(f, "No inconsistencies found.");
        }
        writeln!(f, "Inconsistencies found:")?;
        for name in self.duplicated.iter() {
            writeln!(f, "  - '{name}' is indexed in both scopes")?;
        }
        for (scope, name, stored_at) in self.misplaced.iter() {
            writeln!(f, "  - '{name}' in the {scope} index points at {stored_at}")?;
        }
        for uri in self.orphaned_notes.iter() {
            writeln!(f, "  - {uri} is not referenced by any index")?;
        }
        Ok(())
    }
}

/// Check `view` against the note resources in `storage`. `dropped` holds records the index
/// stores left out on load because they point into the wrong scope.
pub async fn check<S: RemoteStorage>(
    storage: &S,
    workspace: &Workspace,
    view: &CombinedGraphView,
    dropped: Vec<(Scope, Concept)>,
) -> Result<ConsistencyReport, ConceptError> {
    let mut report = ConsistencyReport::default();
    for (scope, concept) in dropped {
        report.misplaced.push((scope, concept.name, concept.stored_at));
    }
    let public = view.snapshot(Scope::Public);
    let private = view.snapshot(Scope::Private);

    for concept in public.iter() {
        if private.contains(&concept.uri) {
            report.duplicated.push(concept.name.clone());
        }
    }
    let mut referenced = HashSet::new();
    for (scope, concept) in view.concepts() {
        if workspace.scope_of(&concept.stored_at) != Some(scope) {
            report
                .misplaced
                .push((scope, concept.name.clone(), concept.stored_at.clone()));
        }
        referenced.insert(concept.stored_at.clone());
    }
    for scope in [Scope::Public, Scope::Private] {
        let container = workspace.notes_container(scope)?;
        for child in storage.list_children(&container).await? {
            if child.as_str().ends_with('/') {
                continue;
            }
            if !referenced.contains(&child) {
                report.orphaned_notes.push(child);
            }
        }
    }
    if !report.is_clean() {
        tracing::warn!(
            "Workspace '{}': {} duplicated, {} misplaced, {} orphaned",
            workspace.slug,
            report.duplicated.len(),
            report.misplaced.len(),
            report.orphaned_notes.len()
        );
    }
    Ok(report)
}
