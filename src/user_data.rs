//! Liked-release set with debounced persistence.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::cache::write_atomic;
use crate::error::UserDataError;

/// `id -> liked` map. Unliked ids stay in the file as `false`.
pub struct UserDataStore {
    likes: Mutex<BTreeMap<String, bool>>,
    dirty: AtomicBool,
    path: PathBuf,
}

impl UserDataStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            likes: Mutex::new(BTreeMap::new()),
            dirty: AtomicBool::new(false),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory set with the file contents. A missing file is an empty set.
    pub fn load(&self) -> Result<usize, UserDataError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(UserDataError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let likes: BTreeMap<String, bool> = serde_json::from_slice(&bytes)?;
        let liked = likes.values().filter(|liked| **liked).count();
        *self.likes.lock() = likes;
        info!("UserData: loaded {} liked releases", liked);
        Ok(liked)
    }

    pub fn is_liked(&self, id: &str) -> bool {
        self.likes.lock().get(id).copied().unwrap_or(false)
    }

    pub fn set_liked(&self, id: &str, liked: bool) {
        self.likes.lock().insert(id.to_string(), liked);
        self.dirty.store(true, Ordering::Release);
    }

    /// Flips the like state of `id` and returns the new state.
    pub fn toggle(&self, id: &str) -> bool {
        let liked = {
            let mut likes = self.likes.lock();
            let entry = likes.entry(id.to_string()).or_insert(false);
            *entry = !*entry;
            *entry
        };
        self.dirty.store(true, Ordering::Release);
        liked
    }

    /// Copy of the ids currently liked.
    pub fn liked_ids(&self) -> HashSet<String> {
        self.likes
            .lock()
            .iter()
            .filter(|(_, liked)| **liked)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Writes the set if it changed since the last successful write.
    /// A failed write leaves the store dirty so the next tick retries.
    pub fn persist_if_dirty(&self) -> Result<bool, UserDataError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let result = self.write_file();
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result.map(|()| true)
    }

    fn write_file(&self) -> Result<(), UserDataError> {
        let bytes = serde_json::to_vec_pretty(&*self.likes.lock())?;
        let io_error = |source| UserDataError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        write_atomic(&self.path, &bytes).map_err(io_error)
    }
}

/// Persists dirty likes every `interval` until `shutdown`, then flushes once more.
pub fn spawn_persist_loop(
    store: Arc<UserDataStore>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            let stopping = shutdown.load(Ordering::Acquire);
            match store.persist_if_dirty() {
                Ok(true) => debug!("UserData: wrote {}", store.path().display()),
                Ok(false) => {}
                Err(error) => warn!("UserData: persist failed, will retry: {}", error),
            }
            if stopping {
                break;
            }
            thread::sleep(interval);
        }
    })
}
