//! Session credential storage.
//!
//! One bearer token per process. It is written on login, read by the access
//! pipeline on every request and wiped on logout or on any 401.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Backend for the session credential.
pub trait CredentialStore: Send + Sync {
  fn load(&self) -> Option<String>;

  fn save(&self, token: &str) -> Result<()>;

  /// Remove the credential entirely. Removing an absent credential is not an error.
  fn clear(&self) -> Result<()>;
}

/// Credential kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryStore {
  token: RwLock<Option<String>>,
}

impl CredentialStore for MemoryStore {
  fn load(&self) -> Option<String> {
    self
      .token
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn save(&self, token: &str) -> Result<()> {
    *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    Ok(())
  }
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
  token: String,
}

/// Credential persisted to a JSON file so separate CLI runs share one session.
pub struct FileStore {
  path: PathBuf,
}

impl FileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Store under the user data directory.
  pub fn open_default() -> Result<Self> {
    Ok(Self::new(Self::default_path()?))
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("painel").join("session.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl CredentialStore for FileStore {
  fn load(&self) -> Option<String> {
    let contents = std::fs::read_to_string(&self.path).ok()?;
    match serde_json::from_str::<SessionFile>(&contents) {
      Ok(file) => Some(file.token),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
        None
      }
    }
  }

  fn save(&self, token: &str) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let contents = serde_json::to_string(&SessionFile {
      token: token.to_string(),
    })?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
      use std::os::unix::fs::OpenOptionsExt;
      options.mode(0o600);
    }
    let mut file = options
      .open(&self.path)
      .map_err(|e| eyre!("Failed to open session file {}: {}", self.path.display(), e))?;

    // `mode` only applies on creation; tighten a file left by an older run
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      file
        .set_permissions(std::fs::Permissions::from_mode(0o600))
        .map_err(|e| eyre!("Failed to restrict session file {}: {}", self.path.display(), e))?;
    }

    file
      .write_all(contents.as_bytes())
      .map_err(|e| eyre!("Failed to write session file {}: {}", self.path.display(), e))
  }

  fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!(
        "Failed to remove session file {}: {}",
        self.path.display(),
        e
      )),
    }
  }
}

/// Process-wide handle on the session credential.
#[derive(Clone)]
pub struct Session {
  store: Arc<dyn CredentialStore>,
}

impl Session {
  pub fn new(store: impl CredentialStore + 'static) -> Self {
    Self {
      store: Arc::new(store),
    }
  }

  pub fn in_memory() -> Self {
    Self::new(MemoryStore::default())
  }

  pub fn set(&self, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
      return Err(eyre!("Refusing to store an empty session token"));
    }
    self.store.save(token)?;
    debug!("session credential stored");
    Ok(())
  }

  pub fn get(&self) -> Option<String> {
    self.store.load().filter(|t| !t.is_empty())
  }

  pub fn is_authenticated(&self) -> bool {
    self.get().is_some()
  }

  /// Wipe the credential. Failures are logged, never propagated.
  pub fn clear(&self) {
    match self.store.clear() {
      Ok(()) => debug!("session credential cleared"),
      Err(e) => warn!(error = %e, "failed to clear session credential"),
    }
  }
}
