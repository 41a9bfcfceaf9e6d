//! Concept records and the builder that derives them from a note's document.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;

use crate::{
    config::{Scope, Workspace},
    document::References,
    error::ConceptError,
    ident,
};

/// Graph-visible metadata of one note: its identity, outgoing links, tags and where its body
/// lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub id: String,
    pub uri: Url,
    #[serde(default)]
    pub refs: BTreeSet<Url>,
    #[serde(default)]
    pub tags: BTreeSet<Url>,
    pub stored_at: Url,
    pub modified: DateTime<Utc>,
}

impl Concept {
    pub fn references(&self, concept_uri: &Url) -> bool {
        self.refs.contains(concept_uri)
    }

    /// Copy of this record pointing at a different note resource, stamped `now`.
    pub fn relocated(&self, stored_at: Url, now: DateTime<Utc>) -> Concept {
        Concept {
            stored_at,
            modified: now,
            ..self.clone()
        }
    }
}

/// Reference-only label. Tags are never stored on their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub id: String,
    pub uri: Url,
}

impl Tag {
    pub fn new(workspace: &Workspace, name: &str) -> Result<Tag, ConceptError> {
        Ok(Tag {
            name: name.to_string(),
            id: ident::encode(name)?,
            uri: workspace.tag_uri(name)?,
        })
    }
}

/// Builds Concept records for one scope of a workspace.
#[derive(Debug, Clone, Copy)]
pub struct ConceptBuilder<'a> {
    workspace: &'a Workspace,
    scope: Scope,
}

impl<'a> ConceptBuilder<'a> {
    pub fn new(workspace: &'a Workspace, scope: Scope) -> Self {
        ConceptBuilder { workspace, scope }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Build the record for `name` from the references extracted from its body.
    ///
    /// `stored_at` wins when given. Otherwise an existing record keeps its location and a new
    /// record gets the default note URI of this builder's scope. `refs` and `tags` are
    /// recomputed from scratch; nothing carries over from `existing` except the location.
    pub fn build(
        &self,
        name: &str,
        existing: Option<&Concept>,
        references: &References,
        stored_at: Option<Url>,
    ) -> Result<Concept, ConceptError> {
        self.build_at(name, existing, references, stored_at, Utc::now())
    }

    pub fn build_at(
        &self,
        name: &str,
        existing: Option<&Concept>,
        references: &References,
        stored_at: Option<Url>,
        now: DateTime<Utc>,
    ) -> Result<Concept, ConceptError> {
        let id = ident::encode(name)?;
        let uri = self.workspace.concept_uri(name)?;
        let refs = references
            .concepts
            .iter()
            .map(|n| self.workspace.concept_uri(n))
            .collect::<Result<BTreeSet<Url>, ConceptError>>()?;
        let tags = references
            .tags
            .iter()
            .map(|n| self.workspace.tag_uri(n))
            .collect::<Result<BTreeSet<Url>, ConceptError>>()?;
        let stored_at = match (stored_at, existing) {
            (Some(uri), _) => uri,
            (None, Some(existing)) => existing.stored_at.clone(),
            (None, None) => self.workspace.note_uri(self.scope, name)?,
        };
        Ok(Concept {
            name: name.to_string(),
            id,
            uri,
            refs,
            tags,
            stored_at,
            modified: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_workspace;
    use chrono::TimeZone;
    use test_log::test;

    fn refs(concepts: &[&str], tags: &[&str]) -> References {
        References {
            concepts: concepts.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_new_concept_defaults_to_scope_storage() {
        let ws = test_workspace();
        let builder = ConceptBuilder::new(&ws, Scope::Public);
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let concept = builder
            .build_at("Big Idea", None, &refs(&["Other", "Third"], &["draft"]), None, now)
            .unwrap();
        assert_eq!(concept.id, "Big%20Idea");
        assert_eq!(concept.uri, ws.concept_uri("Big Idea").unwrap());
        assert_eq!(concept.stored_at, ws.note_uri(Scope::Public, "Big Idea").unwrap());
        assert_eq!(concept.modified, now);
        assert_eq!(concept.refs.len(), 2);
        assert!(concept.references(&ws.concept_uri("Other").unwrap()));
        assert!(concept.tags.contains(&ws.tag_uri("draft").unwrap()));
    }

    #[test]
    fn test_existing_location_is_kept_and_refs_recomputed() {
        let ws = test_workspace();
        let builder = ConceptBuilder::new(&ws, Scope::Private);
        let first = builder
            .build("Idea", None, &refs(&["A", "B"], &["t"]), None)
            .unwrap();
        let moved = first.relocated(ws.note_uri(Scope::Public, "Idea").unwrap(), Utc::now());
        let second = builder
            .build("Idea", Some(&moved), &refs(&["C"], &[]), None)
            .unwrap();
        assert_eq!(second.stored_at, moved.stored_at);
        assert_eq!(
            second.refs,
            BTreeSet::from([ws.concept_uri("C").unwrap()])
        );
        assert!(second.tags.is_empty());
        // input untouched
        assert_eq!(moved.refs.len(), 2);
    }

    #[test]
    fn test_override_location() {
        let ws = test_workspace();
        let builder = ConceptBuilder::new(&ws, Scope::Private);
        let existing = builder.build("Idea", None, &refs(&[], &[]), None).unwrap();
        let target = ws.note_uri(Scope::Public, "Idea").unwrap();
        let concept = builder
            .build("Idea", Some(&existing), &refs(&[], &[]), Some(target.clone()))
            .unwrap();
        assert_eq!(concept.stored_at, target);
    }

    #[test]
    fn test_invalid_reference_name_is_rejected() {
        let ws = test_workspace();
        let builder = ConceptBuilder::new(&ws, Scope::Private);
        let result = builder.build("Idea", None, &refs(&["bad\u{0}name"], &[]), None);
        assert!(matches!(result, Err(ConceptError::InvalidName(_))));
    }

    #[test]
    fn test_tag_and_concept_namespaces_are_independent() {
        let ws = test_workspace();
        let tag = Tag::new(&ws, "Idea").unwrap();
        assert_eq!(tag.id, ident::encode("Idea").unwrap());
        assert_ne!(tag.uri, ws.concept_uri("Idea").unwrap());
    }
}
