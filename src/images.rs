use url::Url;
use uuid::Uuid;

use crate::{error::ConceptError, storage::RemoteStorage};

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/gif", "gif"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/svg+xml", "svg"),
    ("image/webp", "webp"),
];

/// An image handed over by the editor, to be stored next to the notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// Original file name, used for the extension when the MIME type is not a known image type
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, mime: &str) -> Self {
        ImageUpload {
            bytes,
            mime: mime.to_string(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = Some(file_name.to_string());
        self
    }

    pub fn extension(&self) -> Option<&str> {
        extension_for(&self.mime, self.file_name.as_deref())
    }

    /// Write the image into `container` under a fresh random name and return its URI.
    pub async fn store<S: RemoteStorage>(
        &self,
        storage: &S,
        container: &Url,
    ) -> Result<Url, ConceptError> {
        let name = match self.extension() {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };
        let uri = container.join(&name)?;
        storage.write_blob(&uri, &self.bytes, &self.mime).await?;
        tracing::debug!("Stored {} byte image at {uri}", self.bytes.len());
        Ok(uri)
    }
}

pub fn extension_for<'a>(mime: &str, file_name: Option<&'a str>) -> Option<&'a str> {
    if let Some((_, ext)) = MIME_EXTENSIONS.iter().find(|(m, _)| *m == mime) {
        return Some(*ext);
    }
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
}
