//! File-backed settings for host (development) builds.
//!
//! Each namespace is a JSON object in its own file, by default under
//! `~/.bms-monitor-esp32/`. Writes are read back and compared so a silently
//! failed write is reported instead of discovered after a restart.

use super::{Namespace, SettingsStore, StoreError};
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

type Entries = BTreeMap<String, String>;

/// Settings stored as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `~/.bms-monitor-esp32`.
    pub fn open_default() -> io::Result<Self> {
        Ok(Self::new(default_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, ns: Namespace) -> PathBuf {
        self.dir.join(format!("{}.json", ns.as_str()))
    }

    fn read(&self, ns: Namespace) -> Result<Entries, StoreError> {
        let path = self.path(ns);
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}", path);
                Ok(Entries::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, ns: Namespace, entries: &Entries) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(ns);
        let text = serde_json::to_string_pretty(entries)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        fs::write(&path, &text)?;

        // Verify write by reading back
        let read_back = fs::read_to_string(&path)?;
        if read_back != text {
            return Err(StoreError::VerifyFailed(path.display().to_string()));
        }
        Ok(())
    }
}

/// Get the default settings directory.
///
/// Returns `~/.bms-monitor-esp32`
pub fn default_dir() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".bms-monitor-esp32"))
}

impl SettingsStore for FileStore {
    fn get_str(&self, ns: Namespace, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(ns)?.remove(key))
    }

    fn set_str(&mut self, ns: Namespace, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.read(ns)?;
        entries.insert(key.to_string(), value.to_string());
        self.write(ns, &entries)
    }

    fn remove(&mut self, ns: Namespace, key: &str) -> Result<(), StoreError> {
        let mut entries = self.read(ns)?;
        if entries.remove(key).is_some() {
            self.write(ns, &entries)?;
        }
        Ok(())
    }
}
