//! Registry store: the current catalog document plus its readiness flags.
//!
//! The document is replaced wholesale on every refresh and handed out as a
//! copy, so readers never hold the lock while filtering or sorting.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::write_atomic;
use crate::catalog::ordered_releases;
use crate::error::RegistryError;
use crate::http_client::Fetcher;
use crate::protocol::{notify, Bus, PipelineMessage};

const FAILED_REFRESH_RETRY: Duration = Duration::from_secs(5);
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DataStatus {
    NotInitialised = 0,
    Loading = 1,
    Ready = 2,
}

impl DataStatus {
    fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            _ => Self::NotInitialised,
        }
    }
}

#[derive(Debug, Default)]
struct StatusFlag(AtomicU32);

impl StatusFlag {
    fn get(&self) -> DataStatus {
        DataStatus::from_u32(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, status: DataStatus) {
        self.0.store(status as u32, Ordering::SeqCst);
    }
}

/// How long a consumer is prepared to wait for a fresh fetch.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    /// Give up on `latest` after this long and use the cached document.
    pub timeout: Duration,
    pub poll: Duration,
}

pub struct RegistryStore {
    document: Mutex<Option<Value>>,
    cached: StatusFlag,
    latest: StatusFlag,
    /// Bumped by every `request_latest`, so a fetch that started earlier
    /// cannot mark the request as served.
    latest_requests: AtomicU64,
    snapshot_path: PathBuf,
}

impl RegistryStore {
    pub fn new(snapshot_path: PathBuf) -> Self {
        Self {
            document: Mutex::new(None),
            cached: StatusFlag::default(),
            latest: StatusFlag::default(),
            latest_requests: AtomicU64::new(0),
            snapshot_path,
        }
    }

    pub fn cached_status(&self) -> DataStatus {
        self.cached.get()
    }

    pub fn latest_status(&self) -> DataStatus {
        self.latest.get()
    }

    /// Copy of the current document.
    pub fn snapshot(&self) -> Option<Value> {
        self.document.lock().clone()
    }

    fn install(&self, document: Value) -> usize {
        let releases = ordered_releases(&document).len();
        *self.document.lock() = Some(document);
        releases
    }

    /// Loads the last persisted document so views can start before the network answers.
    pub fn load_persisted(&self) -> Result<usize, RegistryError> {
        self.cached.set(DataStatus::Loading);
        let text = match fs::read(&self.snapshot_path) {
            Ok(text) => text,
            Err(source) => {
                self.cached.set(DataStatus::NotInitialised);
                return Err(RegistryError::Io {
                    path: self.snapshot_path.clone(),
                    source,
                });
            }
        };
        let document = match serde_json::from_slice::<Value>(&text) {
            Ok(document) => document,
            Err(error) => {
                self.cached.set(DataStatus::NotInitialised);
                return Err(error.into());
            }
        };
        let releases = self.install(document);
        self.cached.set(DataStatus::Ready);
        info!(
            "Registry: loaded snapshot with {} releases from {}",
            releases,
            self.snapshot_path.display()
        );
        Ok(releases)
    }

    /// Fetches, parses, persists and installs the remote document.
    ///
    /// If `request_latest` is called while the fetch is in flight, `latest`
    /// ends up `Loading` rather than `Ready` so the loop fetches again.
    pub fn refresh(&self, fetcher: &dyn Fetcher, url: &str) -> Result<usize, RegistryError> {
        let generation = self.latest_requests.load(Ordering::SeqCst);
        self.latest.set(DataStatus::Loading);
        let result = fetcher
            .fetch(url)
            .map_err(RegistryError::from)
            .and_then(|bytes| {
                let document = serde_json::from_slice::<Value>(&bytes)?;
                Ok((bytes, document))
            });
        let (bytes, document) = match result {
            Ok(parsed) => parsed,
            Err(error) => {
                self.settle_latest(DataStatus::NotInitialised, generation);
                return Err(error);
            }
        };

        if let Some(parent) = self.snapshot_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(error) = write_atomic(&self.snapshot_path, &bytes) {
            warn!("Registry: failed persisting snapshot: {}", error);
        }

        let releases = self.install(document);
        self.cached.set(DataStatus::Ready);
        self.settle_latest(DataStatus::Ready, generation);
        Ok(releases)
    }

    fn settle_latest(&self, status: DataStatus, generation: u64) {
        self.latest.set(status);
        if self.latest_requests.load(Ordering::SeqCst) != generation {
            self.latest.set(DataStatus::Loading);
        }
    }

    /// Asks the refresh loop for a new fetch. `latest` drops back to `Loading`.
    pub fn request_latest(&self) {
        self.latest_requests.fetch_add(1, Ordering::SeqCst);
        self.latest.set(DataStatus::Loading);
    }

    /// Waits until a usable document exists and returns a copy of it.
    ///
    /// Returns as soon as `latest` is ready, or once `cached` is ready and the
    /// freshness timeout has elapsed. `None` when `cancel` is raised first.
    pub fn wait_for_document(&self, freshness: Freshness, cancel: &AtomicBool) -> Option<Value> {
        let started = Instant::now();
        loop {
            if cancel.load(Ordering::Acquire) {
                return None;
            }
            let latest_ready = self.latest.get() == DataStatus::Ready;
            let cached_usable = self.cached.get() == DataStatus::Ready
                && started.elapsed() >= freshness.timeout;
            if latest_ready || cached_usable {
                if let Some(document) = self.snapshot() {
                    return Some(document);
                }
            }
            thread::sleep(freshness.poll);
        }
    }
}

/// Settings for the background refresh thread.
pub struct RefreshLoop {
    pub fetcher: Arc<dyn Fetcher>,
    pub url: String,
    pub poll_interval: Duration,
    pub bus: Bus,
    pub shutdown: Arc<AtomicBool>,
}

/// Refreshes immediately, then again whenever a consumer requests it or the
/// poll interval elapses.
pub fn spawn_refresh_loop(registry: Arc<RegistryStore>, settings: RefreshLoop) -> JoinHandle<()> {
    let RefreshLoop {
        fetcher,
        url,
        poll_interval,
        bus,
        shutdown,
    } = settings;

    thread::spawn(move || {
        while !shutdown.load(Ordering::Acquire) {
            let wait = match registry.refresh(fetcher.as_ref(), &url) {
                Ok(releases) => {
                    info!("Registry: refreshed {} releases from {}", releases, url);
                    notify(&bus, PipelineMessage::RegistryRefreshed { releases });
                    poll_interval
                }
                Err(error) => {
                    warn!("Registry: refresh failed: {}", error);
                    notify(
                        &bus,
                        PipelineMessage::RegistryRefreshFailed {
                            reason: error.to_string(),
                        },
                    );
                    FAILED_REFRESH_RETRY.min(poll_interval)
                }
            };

            let idle_started = Instant::now();
            while !shutdown.load(Ordering::Acquire) {
                if registry.latest_status() == DataStatus::Loading {
                    debug!("Registry: fresh fetch requested");
                    break;
                }
                if idle_started.elapsed() >= wait {
                    break;
                }
                thread::sleep(IDLE_POLL.min(wait));
            }
        }
        debug!("Registry: refresh loop stopped");
    })
}
