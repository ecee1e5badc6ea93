use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("state file is not a JSON object")]
    NotAnObject,
}

/// Durable key-value record for notification bookkeeping.
///
/// Loaded once on construction and written through on every `set`. A single
/// lock serializes readers and writers, so callers on the scheduler task and
/// the activation path never observe a torn value. Disk is best effort: a
/// failed write is logged and the in-memory value stays authoritative.
#[derive(Debug)]
pub struct NotificationState {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl NotificationState {
    /// Open the store at `path`. A missing, unreadable or corrupt file yields an
    /// empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match load(&path) {
            Ok(map) => map,
            Err(e) => {
                warn!("Failed to read notification state {}: {}", path.display(), e);
                Map::new()
            }
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut data = self.lock();
        data.insert(key.to_string(), value);
        if let Err(e) = save(&self.path, &data) {
            error!("Failed to persist notification state {}: {}", self.path.display(), e);
        }
    }

    /// Read-modify-write of one key under the store lock. The closure sees the
    /// current value (if any) and returns the value to persist.
    pub fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut data = self.lock();
        let next = f(data.get(key));
        data.insert(key.to_string(), next.clone());
        if let Err(e) = save(&self.path, &data) {
            error!("Failed to persist notification state {}: {}", self.path.display(), e);
        }
        next
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        // A panicking writer cannot leave the map half-updated: inserts are atomic.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load(path: &Path) -> Result<Map<String, Value>, StateError> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        _ => Err(StateError::NotAnObject),
    }
}

fn save(path: &Path, data: &Map<String, Value>) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json)?;
    Ok(())
}
