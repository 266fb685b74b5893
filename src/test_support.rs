//! In-process fakes for the network, image decode and render collaborators.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::app_context::AppContext;
use crate::cache::MediaCache;
use crate::config::Config;
use crate::error::FetchError;
use crate::http_client::Fetcher;
use crate::image_pipeline::{DecodedImage, ImageDecoder};
use crate::protocol::new_bus;
use crate::registry::RegistryStore;
use crate::render::{RenderDevice, TextureHandle};
use crate::user_data::UserDataStore;

pub fn unique_temp_dir(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock should be after UNIX_EPOCH")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "dig_{}_{}_{}",
        test_name,
        std::process::id(),
        nanos
    ))
}

/// Serves canned bodies by URL and counts every request.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    total_calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn with_body(self, url: &str, body: &[u8]) -> Self {
        self.set_body(url, body);
        self
    }

    pub fn set_body(&self, url: &str, body: &[u8]) {
        self.bodies.lock().insert(url.to_string(), body.to_vec());
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    pub fn recover(&self, url: &str) {
        self.failing.lock().remove(url);
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|call| *call == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(url.to_string());
        if self.failing.lock().contains(url) {
            return Err(FetchError::Request {
                url: url.to_string(),
                message: "simulated failure".to_string(),
            });
        }
        self.bodies
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Request {
                url: url.to_string(),
                message: "404".to_string(),
            })
    }
}

/// Treats the file contents as the pixel buffer of a 1-pixel-high image.
/// Files starting with `bad` fail to decode.
#[derive(Default)]
pub struct FakeDecoder {
    pub decoded: AtomicUsize,
}

impl ImageDecoder for FakeDecoder {
    fn decode_file(&self, path: &Path) -> Option<DecodedImage> {
        let bytes = std::fs::read(path).ok()?;
        if bytes.is_empty() || bytes.starts_with(b"bad") {
            return None;
        }
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Some(DecodedImage {
            width: bytes.len() as u32,
            height: 1,
            pixels: bytes,
        })
    }
}

/// Records every upload and release.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next: TextureHandle,
    pub live: HashSet<TextureHandle>,
    pub released: Vec<TextureHandle>,
}

impl RenderDevice for RecordingDevice {
    fn upload_texture(&mut self, _image: &DecodedImage) -> TextureHandle {
        self.next += 1;
        self.live.insert(self.next);
        self.next
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        assert!(self.live.remove(&handle), "released unknown texture {handle}");
        self.released.push(handle);
    }
}

/// Context over fakes, with a registry already holding `document`.
pub fn test_context(
    name: &str,
    document: &[u8],
    fetcher: Arc<FakeFetcher>,
) -> (Arc<AppContext>, PathBuf) {
    let root = unique_temp_dir(name);
    let mut config = Config::default();
    config.pipeline.builder_entry_sleep_ms = 0;
    config.pipeline.worker_pass_sleep_ms = 1;
    config.pipeline.registry_wait_poll_ms = 1;
    config.pipeline.reload_freshness_timeout_ms = 0;

    let registry = Arc::new(RegistryStore::new(root.join("registry.json")));
    let registry_fetcher = FakeFetcher::default().with_body("registry", document);
    registry
        .refresh(&registry_fetcher, "registry")
        .expect("registry document should parse");

    let context = AppContext::new(
        &config,
        registry,
        Arc::new(UserDataStore::new(root.join("likes.json"))),
        Arc::new(MediaCache::new(root.join("cache"), fetcher)),
        Arc::new(FakeDecoder::default()),
        new_bus(),
    );
    (Arc::new(context), root)
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
