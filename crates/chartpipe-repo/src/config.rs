//! Local registry of classic repositories
//!
//! Layout under the cache directory:
//!
//! ```text
//! <cache>/repositories.yaml
//! <cache>/repository/<name>-index.yaml
//! ```

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::credentials::{HttpSettings, ResolvedCredentials};
use crate::error::{RegistryError, RepoError, Result};
use crate::http::{HttpRepository, validate_url};
use crate::index::ChartIndex;

pub const REPOSITORIES_FILE: &str = "repositories.yaml";
pub const INDEX_DIR: &str = "repository";

/// A named classic repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryEntry {
    /// Unique name, used as `<name>/<chart>` in references
    pub name: String,

    pub url: String,

    /// Send credentials to every host, not just the repository's own
    #[serde(default)]
    pub pass_credentials_all: bool,
}

impl RepositoryEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            pass_credentials_all: false,
        }
    }

    pub fn with_pass_credentials_all(mut self, pass: bool) -> Self {
        self.pass_credentials_all = pass;
        self
    }
}

/// `repositories.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryFile {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

fn default_api_version() -> String {
    "chartpipe.io/v1".to_string()
}

impl Default for RepositoryFile {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            repositories: Vec::new(),
        }
    }
}

impl RepositoryFile {
    /// Load, or an empty file when none exists yet
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        write_atomic(path, content.as_bytes())
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryEntry> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Insert, or replace the entry with the same name
    pub fn upsert(&mut self, entry: RepositoryEntry) {
        match self.repositories.iter_mut().find(|r| r.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.repositories.push(entry),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Replace `path` with `data` through a temporary file in the same directory
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RepoError::Io(e.error))?;
    Ok(())
}

/// Registers classic repositories and caches their indexes
///
/// Writers hold the lock exclusively, so a reader never sees a half-updated
/// registry. Upserts are last-writer-wins by name.
#[derive(Debug)]
pub struct RepositoryRegistrar {
    cache_dir: PathBuf,
    settings: HttpSettings,
    lock: RwLock<()>,
}

impl RepositoryRegistrar {
    pub fn new(cache_dir: impl Into<PathBuf>, settings: HttpSettings) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            settings,
            lock: RwLock::new(()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn settings(&self) -> HttpSettings {
        self.settings
    }

    pub fn repositories_path(&self) -> PathBuf {
        self.cache_dir.join(REPOSITORIES_FILE)
    }

    pub fn cached_index_path(&self, name: &str) -> PathBuf {
        self.cache_dir
            .join(INDEX_DIR)
            .join(format!("{}-index.yaml", name))
    }

    /// Register `entry`, or refresh it if the name is already registered
    ///
    /// The index is downloaded first. Nothing on disk changes unless the
    /// download succeeds and parses, and a failed index write restores the
    /// previous entry.
    pub async fn register_or_update(
        &self,
        entry: RepositoryEntry,
        credentials: Option<ResolvedCredentials>,
    ) -> std::result::Result<(), RegistryError> {
        validate_url(&entry.url).map_err(|e| RegistryError::InvalidUrl {
            url: entry.url.clone(),
            reason: match e {
                RepoError::InvalidRepositoryUrl { reason, .. } => reason,
                other => other.to_string(),
            },
        })?;

        let repo = HttpRepository::new(
            &entry.url,
            credentials,
            entry.pass_credentials_all,
            self.settings,
        )
        .map_err(|source| RegistryError::Fetch {
            name: entry.name.clone(),
            source,
        })?;

        let index = repo
            .fetch_index_bytes()
            .await
            .map_err(|source| RegistryError::Fetch {
                name: entry.name.clone(),
                source,
            })?;

        let _guard = self.lock.write().await;
        let name = entry.name.clone();
        let persist = |e: RepoError| RegistryError::Persist {
            name: name.clone(),
            message: e.to_string(),
        };

        let path = self.repositories_path();
        let previous = RepositoryFile::load_from(&path).map_err(persist)?;
        let mut file = previous.clone();
        file.upsert(entry);
        file.save_to(&path).map_err(persist)?;

        // The entry and its cached index change together or not at all
        if let Err(e) = write_atomic(&self.cached_index_path(&name), &index) {
            if let Err(restore) = previous.save_to(&path) {
                tracing::warn!(repo = %name, error = %restore, "could not restore previous repository entry");
            }
            return Err(persist(e));
        }

        tracing::info!(repo = %name, "repository registered");
        Ok(())
    }

    /// Registered entry by name
    pub async fn get(&self, name: &str) -> Result<Option<RepositoryEntry>> {
        let _guard = self.lock.read().await;
        let file = RepositoryFile::load_from(&self.repositories_path())?;
        Ok(file.get(name).cloned())
    }

    /// Cached index for a registered repository, if one is on disk
    pub async fn cached_index(&self, name: &str) -> Result<Option<ChartIndex>> {
        let _guard = self.lock.read().await;
        let path = self.cached_index_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)?;
        ChartIndex::from_bytes(&data).map(Some)
    }

    /// Replace the cached index of a repository
    pub async fn store_index(&self, name: &str, data: &[u8]) -> Result<()> {
        let _guard = self.lock.write().await;
        write_atomic(&self.cached_index_path(name), data)
    }
}
