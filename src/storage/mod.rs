//! # Remote storage
//!
//! The engine talks to the user's storage space only through [`RemoteStorage`]: read, write
//! and delete a resource by URI, plus listing a container. The credentialed HTTP client that
//! talks to a real storage server lives outside this crate; two implementations ship here:
//!
//! - [`MemoryStorage`]: in-process map with failure injection, for tests and demos.
//! - [`FsStorage`]: `file://` URIs under a root directory, used by the CLI.
//!
//! There are no transactions across resources. Callers that touch several resources
//! (saving a note and its index entry, migrating between scopes) order their writes so that
//! a failure part way leaves every concept readable from at least one scope.
use std::future::Future;
use url::Url;

use crate::error::ConceptError;

#[cfg(not(target_arch = "wasm32"))]
pub mod fs;
pub mod memory;

#[cfg(not(target_arch = "wasm32"))]
pub use fs::FsStorage;
pub use memory::MemoryStorage;

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub trait RemoteStorage: Send + Sync {
    /// Read a resource as text. `Ok(None)` when it does not exist.
    fn read_resource(
        &self,
        uri: &Url,
    ) -> impl Future<Output = Result<Option<String>, ConceptError>> + Send;

    /// Create or overwrite a text resource.
    fn write_resource(
        &self,
        uri: &Url,
        content: &str,
    ) -> impl Future<Output = Result<(), ConceptError>> + Send;

    /// Create or overwrite a binary resource with the given MIME type.
    fn write_blob(
        &self,
        uri: &Url,
        bytes: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<(), ConceptError>> + Send;

    /// Delete a resource. Deleting a resource that does not exist is
    /// [`ConceptError::StaleDelete`].
    fn delete_resource(&self, uri: &Url) -> impl Future<Output = Result<(), ConceptError>> + Send;

    /// Direct children of a container URI (which ends in `/`). Child containers are listed
    /// with a trailing `/`. A missing container lists as empty.
    fn list_children(
        &self,
        container: &Url,
    ) -> impl Future<Output = Result<Vec<Url>, ConceptError>> + Send;
}

/// First path segment of `uri` below `container`, or `None` when `uri` is not inside it.
pub(crate) fn child_of(container: &Url, uri: &Url) -> Option<Url> {
    let rest = uri.as_str().strip_prefix(container.as_str())?;
    if rest.is_empty() {
        return None;
    }
    let child = match rest.find('/') {
        Some(idx) => &rest[..=idx],
        None => rest,
    };
    container.join(child).ok()
}
