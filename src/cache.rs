//! Content-addressed media cache: `<root>/<owner id>/<sanitized url>`.
//!
//! A file's modification time is the only validity signal. There is no size or
//! checksum verification, so a truncated file left behind by an external
//! process is served as a hit. Writes go through a temp file and a rename so
//! this process never leaves a partial file at the final path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use log::{debug, warn};

use crate::error::CacheError;
use crate::http_client::Fetcher;

const MAX_FILE_NAME_BYTES: usize = 200;
const SHORTENED_PREFIX_BYTES: usize = 100;

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Modification time in seconds since the epoch, or 0 when the file is absent.
pub fn file_mtime(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs().max(1))
        .unwrap_or(0)
}

fn replace_path_hostile_chars(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '?' | '*' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Names that would resolve to the owner directory or its parent.
fn is_dot_name(name: &str) -> bool {
    name.is_empty() || name == "." || name == ".."
}

/// Maps a URL to a stable file name.
pub fn sanitize_url(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let sanitized = replace_path_hostile_chars(stripped);
    if is_dot_name(&sanitized) {
        return "_".to_string();
    }
    if sanitized.len() <= MAX_FILE_NAME_BYTES {
        return sanitized;
    }

    let mut cut = SHORTENED_PREFIX_BYTES;
    while !sanitized.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{:x}", &sanitized[..cut], md5::compute(url.as_bytes()))
}

fn owner_dir_name(owner_id: &str) -> String {
    let name = replace_path_hostile_chars(owner_id);
    if is_dot_name(&name) {
        return "_".to_string();
    }
    name
}

/// Downloads each resource once and hands out its local path.
pub struct MediaCache {
    root: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    cached_release_folders: AtomicU32,
    cached_bytes: AtomicU64,
}

impl MediaCache {
    pub fn new(root: PathBuf, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            root,
            fetcher,
            cached_release_folders: AtomicU32::new(0),
            cached_bytes: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_path(&self, url: &str, owner_id: &str) -> PathBuf {
        self.root
            .join(owner_dir_name(owner_id))
            .join(sanitize_url(url))
    }

    /// Returns the local path for `url`, fetching it first if no file exists yet.
    pub fn fetch_and_cache(&self, url: &str, owner_id: &str) -> Result<PathBuf, CacheError> {
        let path = self.cache_path(url, owner_id);
        if file_mtime(&path) != 0 {
            return Ok(path);
        }

        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
                self.cached_release_folders.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!("Cache: downloading {}", url);
        let bytes = self.fetcher.fetch(url)?;
        write_atomic(&path, &bytes).map_err(|source| CacheError::Write {
            path: path.clone(),
            source,
        })?;
        self.cached_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        debug!("Cache: stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Release folders created during this session.
    pub fn cached_release_folders(&self) -> u32 {
        self.cached_release_folders.load(Ordering::Relaxed)
    }

    /// Bytes written to the cache during this session.
    pub fn cached_bytes(&self) -> u64 {
        self.cached_bytes.load(Ordering::Relaxed)
    }
}

/// Sibling temp path, unique per process and per call so concurrent writers
/// of the same destination never share one.
fn temp_path_for(path: &Path) -> PathBuf {
    let sequence = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(format!(".{}.{}.tmp", std::process::id(), sequence));
    PathBuf::from(temp_name)
}

/// Writes `bytes` next to `path` and renames it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(path);
    if let Err(error) = fs::write(&temp_path, bytes) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    if let Err(error) = fs::rename(&temp_path, path) {
        warn!(
            "Cache: failed moving {} into place: {}",
            temp_path.display(),
            error
        );
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    Ok(())
}
