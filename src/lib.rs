//! # concept-sync
//!
//! A synchronization engine for a graph of interlinked notes kept on user-controlled remote
//! storage.
//!
//! ## Overview
//!
//! Each note has a human-readable name and a rich-text body. Bodies contain inline references
//! to other notes ("concepts") and to tags. On every save the references are extracted and
//! the note's **concept record** (its outgoing links, tags and storage location) is rebuilt
//! and written into a per-scope **concept index**. Backlinks are answered by scanning the
//! union of the public and private indices.
//!
//! Notes live in one of two **scopes**, public or private, each with its own storage root and
//! its own index. Moving a note between scopes is an ordered five-step migration that never
//! deletes anything before the destination copy is fully indexed.
//!
//! Edits are saved through a debounced controller: rapid changes coalesce into one write and
//! at most one write per note is ever in flight.
//!
//! ## Architecture
//!
//! - **[`ident`]**: reversible name ⇄ identifier codec
//! - **[`document`]**: editor document tree and the reference extractor
//! - **[`concept`]**: concept records and their builder
//! - **[`index`]**: per-scope concept index with copy-on-write snapshots
//! - **[`graph`]**: combined public + private view, backlinks and forward links
//! - **[`migration`]**: the public/private migration sequence
//! - **[`save`]**: debounce state machine and its tokio driver
//! - **[`service`]** / **[`session`]**: workspace entry point and the open-note handle
//! - **[`storage`]**: the remote storage trait plus in-memory and filesystem implementations
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use concept_sync::{
//!     config::{TomlConfigProvider, WorkspaceConfigProvider},
//!     document::{Document, Node},
//!     service::ConceptService,
//!     storage::MemoryStorage,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TomlConfigProvider::new("workspace.toml".into()).get_config()?;
//!     let service = ConceptService::new(Arc::new(MemoryStorage::new()), config.workspace)?;
//!     service.load().await?;
//!
//!     let note = service.open("Idea", config.session).await?;
//!     note.edit(Document(vec![Node::paragraph(vec![
//!         Node::text("builds on "),
//!         Node::concept("Older Idea"),
//!     ])]));
//!     note.settled().await;
//!
//!     for concept in service.view().backlinks_of_name("Older Idea")? {
//!         println!("{} links to Older Idea", concept.name);
//!     }
//!     note.make_public().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `bin`: the `concept-sync` command-line front end (clap, tracing-subscriber)
pub mod concept;
pub mod config;
pub mod doctor;
pub mod document;
pub mod error;
pub mod event;
pub mod graph;
pub mod ident;
pub mod images;
pub mod index;
pub mod migration;
pub mod note;
pub mod save;
pub mod service;
pub mod session;
pub mod storage;

pub use error::*;
