//! Debounced saving of an open note, driven on a paused tokio clock.
use concept_sync::{
    config::{Scope, SessionConfig},
    document::Document,
    note::Note,
    save::SavePhase,
    service::ConceptService,
    ConceptError,
};
use std::time::Duration;
use test_log::test;

mod common;
use common::{doc, memory_service, test_workspace};

const CONFIG: SessionConfig = SessionConfig { debounce_ms: 1500 };

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[test(tokio::test(start_paused = true))]
async fn test_rapid_edits_are_saved_once() {
    let (storage, service) = memory_service();
    let note_uri = test_workspace().note_uri(Scope::Private, "Idea").unwrap();
    let session = service.open("Idea", CONFIG).await.unwrap();

    session.edit(doc("v1", &[]));
    advance(500).await;
    session.edit(doc("v2", &[]));
    advance(500).await;
    session.edit(doc("v3", &["Other"]));
    assert_eq!(session.phase(), SavePhase::PendingSave);
    assert_eq!(storage.write_count(&note_uri), 0);

    session.settled().await;
    assert_eq!(storage.write_count(&note_uri), 1);
    let note = Note::read(storage.as_ref(), &note_uri).await.unwrap().unwrap();
    assert_eq!(Document::parse(&note.body).unwrap(), doc("v3", &["Other"]));
    assert!(session.saved());
    assert_eq!(session.links_to().unwrap().len(), 1);
}

#[test(tokio::test(start_paused = true))]
async fn test_at_most_one_save_in_flight() {
    let (storage, service) = memory_service();
    let note_uri = test_workspace().note_uri(Scope::Private, "Idea").unwrap();
    storage.set_write_delay(Some(Duration::from_secs(1)));
    let session = service.open("Idea", CONFIG).await.unwrap();

    session.edit(doc("v1", &[]));
    advance(1600).await;
    assert!(session.saving());

    // neither a manual save nor a new quiet period may start a second write
    assert!(!session.save().await.unwrap());
    session.edit(doc("v2", &[]));
    assert_eq!(session.phase(), SavePhase::Saving);

    session.settled().await;
    assert_eq!(storage.max_concurrent_writes(), 1);
    assert_eq!(storage.write_count(&note_uri), 2);
    let note = Note::read(storage.as_ref(), &note_uri).await.unwrap().unwrap();
    assert_eq!(Document::parse(&note.body).unwrap(), doc("v2", &[]));
    assert!(session.saved());
}

#[test(tokio::test(start_paused = true))]
async fn test_saved_flag_follows_persisted_body() {
    let (_, service) = memory_service();
    let session = service.open("Idea", CONFIG).await.unwrap();
    assert!(session.saved());

    session.edit(doc("v1", &[]));
    assert!(!session.saved());
    session.settled().await;
    assert!(session.saved());

    session.edit(doc("v2", &[]));
    assert!(!session.saved());
    // back to what was persisted
    session.edit(doc("v1", &[]));
    assert!(session.saved());
}

#[test(tokio::test(start_paused = true))]
async fn test_manual_save_skips_quiet_period() {
    let (storage, service) = memory_service();
    let note_uri = test_workspace().note_uri(Scope::Private, "Idea").unwrap();
    let session = service.open("Idea", CONFIG).await.unwrap();
    session.edit(doc("now", &[]));
    assert!(session.save().await.unwrap());
    assert_eq!(storage.write_count(&note_uri), 1);
    assert_eq!(session.phase(), SavePhase::Idle);
    assert!(session.saved());
}

#[test(tokio::test(start_paused = true))]
async fn test_failed_save_is_retried_by_next_edit() {
    let (storage, service) = memory_service();
    let session = service.open("Idea", CONFIG).await.unwrap();
    storage.set_fail_writes(true);

    session.edit(doc("v1", &[]));
    session.settled().await;
    assert!(matches!(
        session.last_error(),
        Some(ConceptError::NoteWriteFailed(_))
    ));
    assert!(!session.saved());
    assert_eq!(session.current_value(), doc("v1", &[]));

    storage.clear_faults();
    session.edit(doc("v2", &[]));
    session.settled().await;
    assert_eq!(session.last_error(), None);
    assert!(session.saved());
    assert_eq!(session.scope().unwrap(), Some(Scope::Private));
}

#[test(tokio::test(start_paused = true))]
async fn test_empty_new_note_is_not_written() {
    let (storage, service) = memory_service();
    let note_uri = test_workspace().note_uri(Scope::Private, "Blank").unwrap();
    let session = service.open("Blank", CONFIG).await.unwrap();
    session.edit(Document::empty());
    session.settled().await;
    assert!(!storage.contains(&note_uri));
    assert_eq!(session.scope().unwrap(), None);
}

#[test(tokio::test(start_paused = true))]
async fn test_reopen_loads_persisted_value() {
    let (storage, service) = memory_service();
    let session = service.open("Idea", CONFIG).await.unwrap();
    session.edit(doc("kept", &[]));
    session.settled().await;
    drop(session);

    let fresh = ConceptService::new(storage, test_workspace()).unwrap();
    let reopened = fresh.open("Idea", CONFIG).await.unwrap();
    assert_eq!(reopened.current_value(), doc("kept", &[]));
    assert!(reopened.saved());
    assert_eq!(reopened.phase(), SavePhase::Idle);
}

#[test(tokio::test)]
async fn test_invalid_name_cannot_be_opened() {
    let (_, service) = memory_service();
    assert!(matches!(
        service.open("", CONFIG).await,
        Err(ConceptError::InvalidName(_))
    ));
}

#[test(tokio::test(start_paused = true))]
async fn test_sessions_of_one_note_share_a_controller() {
    let (storage, service) = memory_service();
    let note_uri = test_workspace().note_uri(Scope::Private, "Idea").unwrap();
    storage.set_write_delay(Some(Duration::from_millis(1000)));
    let first = service.open("Idea", CONFIG).await.unwrap();
    let second = service.open("Idea", CONFIG).await.unwrap();

    first.edit(doc("from first", &[]));
    assert_eq!(second.current_value(), doc("from first", &[]));
    advance(1000).await;
    second.edit(doc("from second", &[]));
    assert_eq!(first.phase(), SavePhase::PendingSave);

    first.settled().await;
    assert!(second.saved());
    assert_eq!(storage.write_count(&note_uri), 1);
    assert_eq!(storage.max_concurrent_writes(), 1);
    let (_, note) = service.read_note("Idea").await.unwrap().unwrap();
    assert_eq!(note.body, doc("from second", &[]).to_body().unwrap());
}
