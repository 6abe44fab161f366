//! Durable anonymous identity and per-process session.

use crate::Error;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Section the identity is stored under.
pub const IDENTITY_SECTION: &str = "Vortex";

/// Key the identity is stored under.
pub const IDENTITY_KEY: &str = "VortexID";

/// App version used when the host does not provide one.
pub const DEFAULT_APP_VERSION: &str = "1.0.0";

/// Durable key-value configuration owned by the host.
///
/// Only the anonymous identity is ever written through this trait.
pub trait IdentityStore: Send {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&mut self, section: &str, key: &str) -> Result<Option<String>, Error>;

    /// Stage a value for the next [`flush`](IdentityStore::flush).
    fn set(&mut self, section: &str, key: &str, value: &str);

    /// Write staged values to durable storage.
    fn flush(&mut self) -> Result<(), Error>;
}

type Tables = BTreeMap<String, BTreeMap<String, String>>;

/// Identity store backed by a TOML file of `[section] key = "value"` tables.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: Option<Tables>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tables: None,
        }
    }

    /// `<config dir>/vortex/vortex.toml`, if the platform has a config dir.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("vortex").join("vortex.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tables(&mut self) -> Result<&mut Tables, Error> {
        if self.tables.is_none() {
            let loaded = if self.path.exists() {
                let content = fs::read_to_string(&self.path)?;
                toml::from_str(&content)?
            } else {
                Tables::new()
            };
            self.tables = Some(loaded);
        }
        Ok(self.tables.get_or_insert_with(Tables::new))
    }
}

impl IdentityStore for FileStore {
    fn get(&mut self, section: &str, key: &str) -> Result<Option<String>, Error> {
        let tables = self.tables()?;
        Ok(tables.get(section).and_then(|t| t.get(key)).cloned())
    }

    fn set(&mut self, section: &str, key: &str, value: &str) {
        // An unreadable file is replaced rather than merged.
        let tables = self.tables.get_or_insert_with(Tables::new);
        tables
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    fn flush(&mut self) -> Result<(), Error> {
        let Some(tables) = &self.tables else {
            return Ok(());
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(tables)?;
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "identity store flushed");
        Ok(())
    }
}

/// In-process identity store. Clones share the same contents, which lets a
/// test simulate a restart by handing a clone to a second manager.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<(String, String), String>>>,
    flushes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times [`IdentityStore::flush`] was called on any clone.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl IdentityStore for MemoryStore {
    fn get(&mut self, section: &str, key: &str) -> Result<Option<String>, Error> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&(section.to_string(), key.to_string())).cloned())
    }

    fn set(&mut self, section: &str, key: &str, value: &str) {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert((section.to_string(), key.to_string()), value.to_string());
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Identity snapshot attached to every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: String,
    pub session_id: String,
    pub app_version: String,
}

impl Session {
    /// Load or create the durable identity and start a fresh session.
    ///
    /// Store failures never escape: an unreadable identity counts as absent
    /// and a failed write leaves the new identity valid for this process only.
    pub fn init(store: &mut dyn IdentityStore, app_version: Option<&str>) -> Self {
        let stored = match store.get(IDENTITY_SECTION, IDENTITY_KEY) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to read identity, generating a new one");
                None
            }
        };

        let identity = match stored {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => {
                let id = Uuid::new_v4().to_string();
                store.set(IDENTITY_SECTION, IDENTITY_KEY, &id);
                if let Err(e) = store.flush() {
                    warn!(error = %e, "failed to persist identity");
                }
                id
            }
        };

        let app_version = match app_version.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => DEFAULT_APP_VERSION.to_string(),
        };

        Self {
            identity,
            session_id: Uuid::new_v4().to_string(),
            app_version,
        }
    }
}

impl Default for Session {
    /// Blank snapshot used for events tracked before `init`.
    fn default() -> Self {
        Self {
            identity: String::new(),
            session_id: String::new(),
            app_version: DEFAULT_APP_VERSION.to_string(),
        }
    }
}
