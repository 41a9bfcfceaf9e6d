use std::{
    io,
    path::{Path, PathBuf},
};
use url::Url;

use super::RemoteStorage;
use crate::error::ConceptError;

/// [`RemoteStorage`] over a local directory.
///
/// Serves the `file://` URIs below `base` (the directory URL of `root`). URI path segments are
/// used as file names without percent-decoding, so `notes/a%2Fb.json` is the file
/// `a%2Fb.json` inside `notes/`, never a nested `a/b.json`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    base: Url,
}

impl FsStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, ConceptError> {
        let root = root.as_ref().to_path_buf();
        let base = Url::from_directory_path(&root).map_err(|_| {
            ConceptError::Config(format!("{root:?} is not an absolute directory path"))
        })?;
        Ok(FsStorage { root, base })
    }

    /// `file://` URL of the root directory, ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn path_for(&self, uri: &Url) -> Result<PathBuf, ConceptError> {
        let rest = uri.as_str().strip_prefix(self.base.as_str()).ok_or_else(|| {
            ConceptError::Storage(format!("{uri} is outside of {}", self.base))
        })?;
        let mut path = self.root.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(ConceptError::Storage(format!(
                    "{uri} contains a relative segment"
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    async fn write_bytes(&self, uri: &Url, bytes: &[u8]) -> Result<(), ConceptError> {
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(uri, e))?;
        }
        // write-then-rename so readers never see a torn resource
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| storage_error(uri, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error(uri, e))?;
        tracing::debug!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }
}

fn storage_error(uri: &Url, e: io::Error) -> ConceptError {
    ConceptError::Storage(format!("{uri}: {e}"))
}

impl RemoteStorage for FsStorage {
    async fn read_resource(&self, uri: &Url) -> Result<Option<String>, ConceptError> {
        let path = self.path_for(uri)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(uri, e)),
        }
    }

    async fn write_resource(&self, uri: &Url, content: &str) -> Result<(), ConceptError> {
        self.write_bytes(uri, content.as_bytes()).await
    }

    async fn write_blob(
        &self,
        uri: &Url,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), ConceptError> {
        self.write_bytes(uri, bytes).await
    }

    async fn delete_resource(&self, uri: &Url) -> Result<(), ConceptError> {
        let path = self.path_for(uri)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ConceptError::StaleDelete(uri.to_string()))
            }
            Err(e) => Err(storage_error(uri, e)),
        }
    }

    async fn list_children(&self, container: &Url) -> Result<Vec<Url>, ConceptError> {
        let dir = self.path_for(container)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error(container, e)),
        };
        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error(container, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Skipping non UTF-8 file name in {:?}", dir);
                continue;
            };
            if name.ends_with(".tmp") {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| storage_error(container, e))?
                .is_dir();
            let child = if is_dir { format!("{name}/") } else { name };
            children.push(container.join(&child)?);
        }
        children.sort();
        Ok(children)
    }
}
