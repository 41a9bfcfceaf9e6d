//! concept-sync CLI
//!
//! Command-line front end over a workspace whose storage roots are `file://` URLs, configured
//! by a `workspace.toml`:
//!
//! ```toml
//! [workspace]
//! slug = "notes"
//! concept_prefix = "https://example.org/notes/concepts#"
//! tag_prefix = "https://example.org/notes/tags#"
//! public_storage_root = "file:///srv/notes/public/"
//! private_storage_root = "file:///srv/notes/private/"
//! ```
//!
//! Set `RUST_LOG=debug` for a trace of every storage operation.
use clap::{Parser, Subcommand};
use concept_sync::{
    config::{Scope, TomlConfigProvider, WorkspaceConfigProvider},
    document::Document,
    migration::{MigrationOutcome, MigrationStatus},
    service::ConceptService,
    storage::FsStorage,
};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(name = "concept-sync")]
#[command(author, version, about = "Inspect and edit a concept graph of interlinked notes", long_about = None)]
struct Cli {
    /// Workspace configuration file
    #[arg(short, long, default_value = "workspace.toml")]
    config: PathBuf,

    /// Directory the file:// storage URLs are resolved under
    #[arg(long, default_value = "/")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List indexed concepts
    List {
        /// Only list one scope (public or private)
        #[arg(long)]
        scope: Option<Scope>,
    },
    /// Print a concept record and its note body
    Show { name: String },
    /// Save a document (editor JSON) as the body of a note
    Save { name: String, document: PathBuf },
    /// List the concepts linking to a concept
    Backlinks { name: String },
    /// List the concepts a concept links to
    Links { name: String },
    /// Move a note into the public scope
    Publish { name: String },
    /// Move a note into the private scope
    Unpublish { name: String },
    /// Delete a note and its index entry
    Delete { name: String },
    /// Report duplicated, misplaced and orphaned entries
    Doctor,
}

fn report_migration(outcome: &MigrationOutcome) {
    match &outcome.status {
        MigrationStatus::Completed => println!(
            "'{}' moved from {} to {}",
            outcome.concept.name, outcome.from, outcome.to
        ),
        MigrationStatus::AlreadyInScope => {
            println!("'{}' is already {}", outcome.concept.name, outcome.to)
        }
        MigrationStatus::SourceOrphaned { uri, error } => {
            println!(
                "'{}' moved from {} to {}",
                outcome.concept.name, outcome.from, outcome.to
            );
            eprintln!("Warning: the old note {uri} could not be deleted: {error}");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = TomlConfigProvider::new(cli.config.clone()).get_config()?;
    let storage = Arc::new(FsStorage::new(&cli.root)?);
    let service = ConceptService::new(storage, config.workspace)?;
    service.load().await?;

    match cli.command {
        Commands::List { scope } => {
            let view = service.view();
            for (concept_scope, concept) in view.concepts() {
                if scope.is_some_and(|s| s != concept_scope) {
                    continue;
                }
                println!(
                    "{:<8} {:<40} {} refs, {} tags",
                    concept_scope,
                    concept.name,
                    concept.refs.len(),
                    concept.tags.len()
                );
            }
        }
        Commands::Show { name } => {
            let Some((scope, concept)) = service.locate(&name)? else {
                eprintln!("Error: '{name}' is not indexed");
                std::process::exit(1);
            };
            println!("{}", serde_json::to_string_pretty(&concept)?);
            println!("scope: {scope}");
            if let Some((_, note)) = service.read_note(&name).await? {
                if let Some(cover) = note.cover_image {
                    println!("cover image: {cover}");
                }
                println!("{}", note.body);
            }
        }
        Commands::Save { name, document } => {
            let content = std::fs::read_to_string(&document)?;
            let value = Document::parse(&content)?;
            let concept = service.save(&name, &value).await?;
            println!("Saved '{}' to {}", concept.name, concept.stored_at);
        }
        Commands::Backlinks { name } => {
            for concept in service.view().backlinks_of_name(&name)? {
                println!("{}", concept.name);
            }
        }
        Commands::Links { name } => {
            for (uri, target) in service.view().links_from(&name)? {
                println!("{target}\t{uri}");
            }
        }
        Commands::Publish { name } => report_migration(&service.make_public(&name).await?),
        Commands::Unpublish { name } => report_migration(&service.make_private(&name).await?),
        Commands::Delete { name } => {
            service.delete(&name).await?;
            println!("Deleted '{name}'");
        }
        Commands::Doctor => {
            let report = service.doctor().await?;
            print!("{report}");
            if !report.is_clean() {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}
