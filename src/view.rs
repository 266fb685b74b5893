//! A view: one entry store projected from the registry plus its three workers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app_context::AppContext;
use crate::catalog::{TagFilter, ViewMode};
use crate::entry_store::EntryStore;
use crate::pipeline::{builder, cacher, decoder};
use crate::protocol::{notify, PipelineMessage, ViewId};
use crate::registry::Freshness;
use crate::render::RenderDevice;

pub const WORKER_COUNT: u32 = 3;

pub struct View {
    id: ViewId,
    mode: ViewMode,
    filter: TagFilter,
    freshness: Freshness,
    store: EntryStore,
    terminate: AtomicBool,
    populated: AtomicBool,
    threads_terminated: AtomicU32,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Counts a worker as terminated when it leaves, including by panic.
struct ExitReport<'a> {
    view: &'a View,
    worker: &'static str,
}

impl Drop for ExitReport<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("View[{}]: {} worker panicked", self.view.id, self.worker);
        }
        let exited = self.view.threads_terminated.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            "View[{}]: {} worker exited ({}/{})",
            self.view.id, self.worker, exited, WORKER_COUNT
        );
    }
}

impl View {
    fn new(id: ViewId, mode: ViewMode, filter: TagFilter, freshness: Freshness) -> Self {
        Self {
            id,
            mode,
            filter,
            freshness,
            store: EntryStore::new(),
            terminate: AtomicBool::new(false),
            populated: AtomicBool::new(false),
            threads_terminated: AtomicU32::new(0),
            workers: Mutex::new(Vec::with_capacity(WORKER_COUNT as usize)),
        }
    }

    /// Creates the view and starts its builder, cacher and decoder.
    pub fn spawn(
        id: ViewId,
        mode: ViewMode,
        filter: TagFilter,
        reload: bool,
        context: &Arc<AppContext>,
    ) -> Arc<Self> {
        let view = Arc::new(Self::new(id, mode, filter, context.freshness(reload)));
        info!(
            "View[{}]: created {} ({:?}){}",
            id,
            mode.display_name(),
            filter,
            if reload { " for reload" } else { "" }
        );
        notify(
            &context.bus,
            PipelineMessage::ViewCreated {
                view_id: id,
                mode,
                filter,
            },
        );

        let workers: [(&'static str, fn(&View, &AppContext)); 3] = [
            ("builder", builder::run),
            ("cacher", cacher::run),
            ("decoder", decoder::run),
        ];
        let mut handles = view.workers.lock();
        for (worker, run) in workers {
            let view_ref = Arc::clone(&view);
            let context = Arc::clone(context);
            handles.push(thread::spawn(move || {
                let _exit = ExitReport {
                    view: &view_ref,
                    worker,
                };
                run(&view_ref, &context);
            }));
        }
        drop(handles);
        view
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn filter(&self) -> TagFilter {
        self.filter
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn matches(&self, mode: ViewMode, filter: TagFilter) -> bool {
        self.mode == mode && self.filter == filter
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    pub(crate) fn terminate_flag(&self) -> &AtomicBool {
        &self.terminate
    }

    /// Set by the builder once every selected entry is published.
    pub fn is_populated(&self) -> bool {
        self.populated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_populated(&self) {
        self.populated.store(true, Ordering::Release);
    }

    pub fn threads_terminated(&self) -> u32 {
        self.threads_terminated.load(Ordering::Acquire)
    }

    pub fn workers_finished(&self) -> bool {
        self.threads_terminated() >= WORKER_COUNT
    }

    /// Joins the workers and releases every texture. Only valid once all
    /// workers have exited; returns `false` and does nothing otherwise.
    pub fn destroy(&self, device: &mut dyn RenderDevice) -> bool {
        if !self.workers_finished() {
            return false;
        }
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                warn!("View[{}]: worker ended with a panic", self.id);
            }
        }
        let released = self.store.release_all_textures(device);
        info!(
            "View[{}]: torn down, released {} textures",
            self.id, released
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_context, wait_until, FakeFetcher, RecordingDevice};
    use std::time::Duration;

    #[test]
    fn test_view_builds_and_workers_exit_after_terminate() {
        let document = br#"[{"id": "a", "new_releases": 1}, {"id": "b", "new_releases": 0}]"#;
        let (context, root) =
            test_context("view_lifecycle", document, Arc::new(FakeFetcher::default()));
        let view = View::spawn(1, ViewMode::Latest, TagFilter::ALL, false, &context);

        assert!(wait_until(Duration::from_secs(5), || view.is_populated()));
        assert_eq!(view.store().available_entries(), 2);
        assert_eq!(view.store().id(0), "b");
        assert!(wait_until(Duration::from_secs(5), || {
            view.threads_terminated() == 1
        }));

        let mut device = RecordingDevice::default();
        assert!(!view.destroy(&mut device));

        view.request_terminate();
        assert!(wait_until(Duration::from_secs(5), || view.workers_finished()));
        assert!(view.destroy(&mut device));
        assert_eq!(view.threads_terminated(), WORKER_COUNT);

        let _ = std::fs::remove_dir_all(root);
    }
}
