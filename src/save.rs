//! # Debounced saving
//!
//! Edits to an open note are coalesced: every change restarts a quiet-period timer and only
//! the value current when the timer runs out is written. At most one write per note is ever in
//! flight; a timer that expires during a write does not start a second one, the pending value
//! is picked up by a fresh quiet period once the write completes.
//!
//! [`DebouncedSave`] is the state machine itself. It never reads a clock; every transition
//! takes the current instant, so it can be driven step by step in tests.
//! [`SaveController`] drives it with `tokio::time` timers and a [`NoteWriter`].
use parking_lot::Mutex;
use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::Notify, time::Instant};

use crate::{document::Document, error::ConceptError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Idle,
    /// Edited, waiting for the quiet period to end
    PendingSave,
    /// A write is in flight
    Saving,
}

/// A write handed out by the state machine. Report its result with
/// [`DebouncedSave::on_complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTicket {
    pub id: u64,
    pub value: Document,
    pub body: String,
}

#[derive(Debug)]
pub struct DebouncedSave {
    quiet: Duration,
    current: Document,
    persisted: Option<String>,
    deadline: Option<Instant>,
    in_flight: Option<(u64, String)>,
    next_ticket: u64,
    edited: bool,
    last_error: Option<ConceptError>,
}

impl DebouncedSave {
    pub fn new(quiet: Duration) -> Self {
        DebouncedSave {
            quiet,
            current: Document::empty(),
            persisted: None,
            deadline: None,
            in_flight: None,
            next_ticket: 0,
            edited: false,
            last_error: None,
        }
    }

    /// Reset to a value read from storage. `None` for a note that was never saved.
    pub fn loaded(&mut self, value: Option<Document>) {
        match value {
            Some(doc) => {
                self.persisted = doc.to_body().ok();
                self.current = doc;
            }
            None => {
                self.persisted = None;
                self.current = Document::empty();
            }
        }
        self.deadline = None;
        self.edited = false;
        self.last_error = None;
    }

    pub fn phase(&self) -> SavePhase {
        if self.in_flight.is_some() {
            SavePhase::Saving
        } else if self.deadline.is_some() {
            SavePhase::PendingSave
        } else {
            SavePhase::Idle
        }
    }

    pub fn saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// True when nothing was edited, or the current value serializes to the persisted body.
    pub fn saved(&self) -> bool {
        if !self.edited {
            return true;
        }
        match (&self.persisted, self.current.to_body()) {
            (Some(persisted), Ok(body)) => *persisted == body,
            _ => false,
        }
    }

    pub fn current(&self) -> &Document {
        &self.current
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn last_error(&self) -> Option<&ConceptError> {
        self.last_error.as_ref()
    }

    /// Record an edit and restart the quiet period. Returns the new deadline.
    pub fn on_change(&mut self, value: Document, now: Instant) -> Instant {
        self.current = value;
        self.edited = true;
        let deadline = now + self.quiet;
        self.deadline = Some(deadline);
        deadline
    }

    /// A timer went off. Starts a save when the quiet period has ended, nothing is in flight
    /// and the current value is worth writing.
    pub fn on_timer(&mut self, now: Instant) -> Option<SaveTicket> {
        let deadline = self.deadline?;
        if now < deadline || self.in_flight.is_some() {
            return None;
        }
        self.deadline = None;
        if !self.edited {
            return None;
        }
        if self.persisted.is_none() && self.current.is_empty_sentinel() {
            tracing::trace!("Not saving the initial empty document");
            return None;
        }
        let body = match self.current.to_body() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Cannot serialize the current document: {e}");
                self.last_error = Some(e);
                return None;
            }
        };
        if self.persisted.as_ref() == Some(&body) {
            return None;
        }
        Some(self.issue(body))
    }

    /// Explicit save. Skips the timer but not the one-write-in-flight rule.
    pub fn on_manual_save(&mut self) -> Option<SaveTicket> {
        if self.in_flight.is_some() {
            return None;
        }
        let body = match self.current.to_body() {
            Ok(body) => body,
            Err(e) => {
                self.last_error = Some(e);
                return None;
            }
        };
        self.deadline = None;
        Some(self.issue(body))
    }

    fn issue(&mut self, body: String) -> SaveTicket {
        self.next_ticket += 1;
        self.in_flight = Some((self.next_ticket, body.clone()));
        SaveTicket {
            id: self.next_ticket,
            value: self.current.clone(),
            body,
        }
    }

    /// The write for `ticket` finished. Returns a deadline to wait for when edits made during
    /// the write still need saving.
    pub fn on_complete(
        &mut self,
        ticket: u64,
        result: Result<(), ConceptError>,
        now: Instant,
    ) -> Option<Instant> {
        match self.in_flight.take() {
            Some((id, body)) if id == ticket => match result {
                Ok(()) => {
                    self.persisted = Some(body);
                    self.last_error = None;
                }
                Err(e) => {
                    tracing::warn!("Save failed, keeping local changes: {e}");
                    self.last_error = Some(e);
                }
            },
            other => {
                tracing::warn!("Ignoring completion of unknown save {ticket}");
                self.in_flight = other;
                return None;
            }
        }
        let deadline = self.deadline?;
        if deadline <= now {
            // the timer already fired while we were busy
            let rearmed = now + self.quiet;
            self.deadline = Some(rearmed);
            Some(rearmed)
        } else {
            Some(deadline)
        }
    }
}

/// The combined note and index write performed for one save.
pub trait NoteWriter: Send + Sync + 'static {
    fn write(&self, value: Document) -> impl Future<Output = Result<(), ConceptError>> + Send;
}

struct ControllerInner<W> {
    writer: W,
    machine: Mutex<DebouncedSave>,
    changed: Notify,
}

/// Drives a [`DebouncedSave`] for one open note. Cheap to clone; clones share state.
pub struct SaveController<W: NoteWriter> {
    inner: Arc<ControllerInner<W>>,
}

impl<W: NoteWriter> Clone for SaveController<W> {
    fn clone(&self) -> Self {
        SaveController {
            inner: self.inner.clone(),
        }
    }
}

/// A non-owning handle to a [`SaveController`], for registries that must not keep a note
/// open.
pub struct WeakSaveController<W> {
    inner: Weak<ControllerInner<W>>,
}

impl<W: NoteWriter> WeakSaveController<W> {
    pub fn upgrade(&self) -> Option<SaveController<W>> {
        self.inner.upgrade().map(|inner| SaveController { inner })
    }

    pub fn is_dropped(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl<W: NoteWriter> SaveController<W> {
    pub fn downgrade(&self) -> WeakSaveController<W> {
        WeakSaveController {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn new(writer: W, quiet: Duration) -> Self {
        SaveController {
            inner: Arc::new(ControllerInner {
                writer,
                machine: Mutex::new(DebouncedSave::new(quiet)),
                changed: Notify::new(),
            }),
        }
    }

    pub fn writer(&self) -> &W {
        &self.inner.writer
    }

    pub fn loaded(&self, value: Option<Document>) {
        self.inner.machine.lock().loaded(value);
        self.inner.changed.notify_waiters();
    }

    pub fn phase(&self) -> SavePhase {
        self.inner.machine.lock().phase()
    }

    pub fn saving(&self) -> bool {
        self.inner.machine.lock().saving()
    }

    pub fn saved(&self) -> bool {
        self.inner.machine.lock().saved()
    }

    pub fn current_value(&self) -> Document {
        self.inner.machine.lock().current().clone()
    }

    pub fn last_error(&self) -> Option<ConceptError> {
        self.inner.machine.lock().last_error().cloned()
    }

    /// Editor change notification. Must be called from within a tokio runtime.
    pub fn edit(&self, value: Document) {
        let deadline = self.inner.machine.lock().on_change(value, Instant::now());
        self.arm(deadline);
    }

    /// Save now. `Ok(false)` when a save was already in flight and none was started.
    pub async fn save(&self) -> Result<bool, ConceptError> {
        let ticket = self.inner.machine.lock().on_manual_save();
        match ticket {
            None => Ok(false),
            Some(ticket) => self.run(ticket).await.map(|_| true),
        }
    }

    /// Wait until no save is pending or in flight.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.phase() == SavePhase::Idle {
                return;
            }
            notified.await;
        }
    }

    fn arm(&self, deadline: Instant) {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            controller.fire().await;
        });
    }

    async fn fire(&self) {
        let ticket = self.inner.machine.lock().on_timer(Instant::now());
        match ticket {
            Some(ticket) => {
                // failures are kept in last_error and retried on the next edit
                let _ = self.run(ticket).await;
            }
            None => self.inner.changed.notify_waiters(),
        }
    }

    async fn run(&self, ticket: SaveTicket) -> Result<(), ConceptError> {
        let id = ticket.id;
        tracing::debug!("Save {id} started");
        let result = self.inner.writer.write(ticket.value).await;
        let rearm = self
            .inner
            .machine
            .lock()
            .on_complete(id, result.clone(), Instant::now());
        if let Some(deadline) = rearm {
            self.arm(deadline);
        }
        self.inner.changed.notify_waiters();
        result
    }
}
