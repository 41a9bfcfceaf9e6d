//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use concept_sync::{
    config::{Scope, Workspace},
    document::{Document, Node},
    service::ConceptService,
    storage::MemoryStorage,
};
use std::sync::Arc;
use url::Url;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Workspace rooted at `base`, which must end in `/`.
#[allow(dead_code)]
pub fn workspace_at(base: &Url) -> Workspace {
    Workspace {
        slug: "default".to_string(),
        concept_prefix: "https://pod.example/ws/concepts#".to_string(),
        tag_prefix: "https://pod.example/ws/tags#".to_string(),
        public_storage_root: base.join("public/ws/").unwrap(),
        private_storage_root: base.join("private/ws/").unwrap(),
        default_scope: Scope::Private,
    }
}

#[allow(dead_code)]
pub fn test_workspace() -> Workspace {
    workspace_at(&Url::parse("https://pod.example/").unwrap())
}

#[allow(dead_code)]
pub fn memory_service() -> (Arc<MemoryStorage>, ConceptService<MemoryStorage>) {
    init_logging();
    let storage = Arc::new(MemoryStorage::new());
    let service = ConceptService::new(storage.clone(), test_workspace()).unwrap();
    (storage, service)
}

/// One paragraph holding `text` followed by a reference to each of `concepts`.
#[allow(dead_code)]
pub fn doc(text: &str, concepts: &[&str]) -> Document {
    let mut children = vec![Node::text(text)];
    children.extend(concepts.iter().map(|name| Node::concept(name)));
    Document(vec![Node::paragraph(children)])
}
