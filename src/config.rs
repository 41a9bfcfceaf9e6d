use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    fs::{read_to_string, write},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};
use url::Url;

use crate::{error::ConceptError, ident};

/// Default quiet period between the last edit and the debounced save.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;

/// Visibility partition of a workspace. Each scope has its own storage root and its own
/// concept index.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Public,
    #[default]
    Private,
}

impl Scope {
    pub fn other(&self) -> Scope {
        match self {
            Scope::Public => Scope::Private,
            Scope::Private => Scope::Public,
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Scope::Public => write!(f, "public"),
            Scope::Private => write!(f, "private"),
        }
    }
}

impl FromStr for Scope {
    type Err = ConceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Scope::Public),
            "private" => Ok(Scope::Private),
            other => Err(ConceptError::Config(format!("unknown scope '{other}'"))),
        }
    }
}

/// Prefixes and storage roots for one workspace. Supplied once per session and passed
/// explicitly to every component that derives identifiers or URIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub slug: String,
    /// Concept URIs are `concept_prefix ++ id`. Shared by both scopes.
    pub concept_prefix: String,
    /// Tag URIs are `tag_prefix ++ id`.
    pub tag_prefix: String,
    pub public_storage_root: Url,
    pub private_storage_root: Url,
    /// Scope in which notes without an index entry are created.
    #[serde(default)]
    pub default_scope: Scope,
}

impl Workspace {
    pub fn validate(&self) -> Result<(), ConceptError> {
        if self.slug.trim().is_empty() {
            return Err(ConceptError::Config("workspace slug is empty".to_string()));
        }
        for (label, root) in [
            ("public", &self.public_storage_root),
            ("private", &self.private_storage_root),
        ] {
            if !root.as_str().ends_with('/') {
                return Err(ConceptError::Config(format!(
                    "{label} storage root {root} must end with '/'"
                )));
            }
        }
        let public = self.public_storage_root.as_str();
        let private = self.private_storage_root.as_str();
        if public.starts_with(private) || private.starts_with(public) {
            return Err(ConceptError::Config(format!(
                "storage roots must be disjoint, got {public} and {private}"
            )));
        }
        if self.concept_prefix == self.tag_prefix {
            return Err(ConceptError::Config(
                "concept and tag prefixes must differ".to_string(),
            ));
        }
        for (label, prefix) in [("concept", &self.concept_prefix), ("tag", &self.tag_prefix)] {
            let probe = format!("{prefix}x");
            let parsed = Url::parse(&probe).map_err(|e| {
                ConceptError::Config(format!("{label} prefix '{prefix}' does not form URIs: {e}"))
            })?;
            // ids are recovered by stripping the prefix from the serialized URI
            if parsed.as_str() != probe {
                return Err(ConceptError::Config(format!(
                    "{label} prefix '{prefix}' is not in normalized form ({parsed})"
                )));
            }
        }
        Ok(())
    }

    pub fn storage_root(&self, scope: Scope) -> &Url {
        match scope {
            Scope::Public => &self.public_storage_root,
            Scope::Private => &self.private_storage_root,
        }
    }

    /// The scope whose storage root contains `uri`, if any.
    pub fn scope_of(&self, uri: &Url) -> Option<Scope> {
        [Scope::Public, Scope::Private]
            .into_iter()
            .find(|scope| uri.as_str().starts_with(self.storage_root(*scope).as_str()))
    }

    pub fn concept_uri(&self, name: &str) -> Result<Url, ConceptError> {
        self.uri_in(ident::Namespace::Concept, name)
    }

    pub fn tag_uri(&self, name: &str) -> Result<Url, ConceptError> {
        self.uri_in(ident::Namespace::Tag, name)
    }

    pub fn uri_in(&self, namespace: ident::Namespace, name: &str) -> Result<Url, ConceptError> {
        let prefix = match namespace {
            ident::Namespace::Concept => &self.concept_prefix,
            ident::Namespace::Tag => &self.tag_prefix,
        };
        Ok(Url::parse(&format!("{prefix}{}", ident::encode(name)?))?)
    }

    /// Strip the concept prefix from a concept URI.
    pub fn concept_id_from_uri<'a>(&self, uri: &'a Url) -> Option<&'a str> {
        uri.as_str()
            .strip_prefix(self.concept_prefix.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn concept_name_from_uri(&self, uri: &Url) -> Result<String, ConceptError> {
        let id = self.concept_id_from_uri(uri).ok_or_else(|| {
            ConceptError::InvalidName(format!("{uri} is not a concept of {}", self.slug))
        })?;
        ident::decode(id)
    }

    /// Container holding every note resource of `scope`.
    pub fn notes_container(&self, scope: Scope) -> Result<Url, ConceptError> {
        Ok(self.storage_root(scope).join("notes/")?)
    }

    /// Deterministic note resource URI for `name` in `scope`.
    pub fn note_uri(&self, scope: Scope, name: &str) -> Result<Url, ConceptError> {
        let id = ident::encode(name)?;
        Ok(self.notes_container(scope)?.join(&format!("{id}.json"))?)
    }

    /// URI of the concept index resource of `scope`.
    pub fn index_uri(&self, scope: Scope) -> Result<Url, ConceptError> {
        Ok(self.storage_root(scope).join("concepts.json")?)
    }

    /// Route of the read-only, sharable view of a public note.
    pub fn public_note_path(&self, owner: &str, name: &str) -> Result<String, ConceptError> {
        Ok(format!(
            "/u/{}/{}/{}",
            ident::encode(owner)?,
            self.slug,
            ident::encode(name)?
        ))
    }

    /// Route of the owner's editing view of a note.
    pub fn private_note_path(&self, name: &str) -> Result<String, ConceptError> {
        Ok(format!("/notes/{}/{}", self.slug, ident::encode(name)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl SessionConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptSyncConfig {
    pub workspace: Workspace,
    #[serde(default)]
    pub session: SessionConfig,
}

pub trait WorkspaceConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<ConceptSyncConfig, ConceptError>;
    fn set_config(&self, config: &ConceptSyncConfig) -> Result<(), ConceptError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }
}

impl WorkspaceConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<ConceptSyncConfig, ConceptError> {
        tracing::debug!("Attempting to read workspace config from: {:?}", &self.path);
        if !self.path.exists() {
            return Err(ConceptError::NotFound(format!(
                "workspace config {:?} does not exist",
                self.path
            )));
        }
        let content = read_to_string(&self.path)?;
        let config: ConceptSyncConfig = toml::from_str(&content)?;
        config.workspace.validate()?;
        Ok(config)
    }

    fn set_config(&self, config: &ConceptSyncConfig) -> Result<(), ConceptError> {
        tracing::debug!("Attempting to write workspace config to: {:?}", &self.path);
        config.workspace.validate()?;
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
