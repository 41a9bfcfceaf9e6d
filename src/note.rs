use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::ConceptError, storage::RemoteStorage};

/// The content resource of a concept. Its identity is its storage URI.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Serialized document tree
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<Url>,
}

impl Note {
    pub fn new(body: String) -> Self {
        Note {
            body,
            cover_image: None,
        }
    }

    pub async fn read<S: RemoteStorage>(
        storage: &S,
        uri: &Url,
    ) -> Result<Option<Note>, ConceptError> {
        match storage.read_resource(uri).await? {
            None => Ok(None),
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
        }
    }

    /// Overwrite the note resource at `uri`. Transport failures become
    /// [`ConceptError::NoteWriteFailed`].
    pub async fn write<S: RemoteStorage>(
        &self,
        storage: &S,
        uri: &Url,
    ) -> Result<(), ConceptError> {
        let content = serde_json::to_string(self)?;
        storage
            .write_resource(uri, &content)
            .await
            .map_err(|e| ConceptError::NoteWriteFailed(format!("{uri}: {e}")))
    }

    /// Replace the body of the note at `uri`, keeping whatever else the stored resource holds.
    ///
    /// A resource that is not a valid note is replaced. Failing to reach the resource at all
    /// is a [`ConceptError::NoteWriteFailed`], nothing is written.
    pub async fn write_body<S: RemoteStorage>(
        storage: &S,
        uri: &Url,
        body: String,
    ) -> Result<Note, ConceptError> {
        let note = match Note::read(storage, uri).await {
            Ok(Some(existing)) => Note { body, ..existing },
            Ok(None) => Note::new(body),
            Err(ConceptError::Serialization(e)) => {
                tracing::warn!("Replacing unreadable note {uri}: {e}");
                Note::new(body)
            }
            Err(e) => {
                return Err(ConceptError::NoteWriteFailed(format!(
                    "reading {uri} before writing: {e}"
                )));
            }
        };
        note.write(storage, uri).await?;
        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_body_write_keeps_cover_image() {
        let storage = MemoryStorage::new();
        let uri = Url::parse("https://pod.example/private/ws/notes/Idea.json").unwrap();
        let cover = Url::parse("https://pod.example/private/ws/images/c.png").unwrap();
        Note {
            body: "[]".to_string(),
            cover_image: Some(cover.clone()),
        }
        .write(&storage, &uri)
        .await
        .unwrap();

        let note = Note::write_body(&storage, &uri, "[{\"text\":\"\"}]".to_string())
            .await
            .unwrap();
        assert_eq!(note.cover_image, Some(cover));
        assert_eq!(Note::read(&storage, &uri).await.unwrap(), Some(note));
    }

    #[test(tokio::test)]
    async fn test_failed_write_is_note_write_failed() {
        let storage = MemoryStorage::new();
        let uri = Url::parse("https://pod.example/private/ws/notes/Idea.json").unwrap();
        storage.set_fail_writes(true);
        assert!(matches!(
            Note::write_body(&storage, &uri, "[]".to_string()).await,
            Err(ConceptError::NoteWriteFailed(_))
        ));
    }

    #[test(tokio::test)]
    async fn test_unreachable_note_is_not_overwritten() {
        let storage = MemoryStorage::new();
        let uri = Url::parse("https://pod.example/private/ws/notes/Idea.json").unwrap();
        let cover = Url::parse("https://pod.example/private/ws/images/c.png").unwrap();
        let stored = Note {
            body: "[]".to_string(),
            cover_image: Some(cover),
        };
        stored.write(&storage, &uri).await.unwrap();
        storage.fail_reads_of(&uri);
        assert!(matches!(
            Note::write_body(&storage, &uri, "[{\"text\":\"\"}]".to_string()).await,
            Err(ConceptError::NoteWriteFailed(_))
        ));
        storage.clear_faults();
        assert_eq!(Note::read(&storage, &uri).await.unwrap(), Some(stored));
    }

    #[test(tokio::test)]
    async fn test_corrupt_note_is_replaced() {
        let storage = MemoryStorage::new();
        let uri = Url::parse("https://pod.example/private/ws/notes/Idea.json").unwrap();
        storage.write_resource(&uri, "not json").await.unwrap();
        let note = Note::write_body(&storage, &uri, "[]".to_string()).await.unwrap();
        assert_eq!(note, Note::new("[]".to_string()));
    }

    #[test]
    fn test_wire_format() {
        let note: Note = serde_json::from_str(r#"{"body":"[]","coverImage":"https://x.example/a.png"}"#)
            .unwrap();
        assert_eq!(note.cover_image.unwrap().as_str(), "https://x.example/a.png");
        let bare = serde_json::to_string(&Note::new("[]".to_string())).unwrap();
        assert_eq!(bare, r#"{"body":"[]"}"#);
    }
}
