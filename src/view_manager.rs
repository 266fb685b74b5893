//! Owns the active view plus the back, reload-in-flight and retired views.
//!
//! Everything here runs on the main thread. Retired views are torn down only
//! after all three of their workers reported exit, and never while they are
//! still referenced as active, back or reload.

use std::sync::Arc;

use log::{debug, info};

use crate::app_context::AppContext;
use crate::catalog::{TagFilter, ViewMode};
use crate::entry_store::EntryFlags;
use crate::prefetch::{PrefetchController, PrefetchPass};
use crate::protocol::{notify, PipelineMessage, ViewId};
use crate::render::{upload_loaded_artwork, RenderDevice};
use crate::view::View;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    /// Nothing to show yet, or a reload is still in flight.
    Pending,
    Ready,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub swapped: bool,
    pub torn_down: usize,
    pub prefetch: PrefetchPass,
    pub uploaded: usize,
}

pub struct ViewManager {
    context: Arc<AppContext>,
    prefetch: PrefetchController,
    next_view_id: ViewId,
    active: Option<Arc<View>>,
    back: Option<Arc<View>>,
    reload: Option<Arc<View>>,
    background: Vec<Arc<View>>,
}

fn same_view(left: &Option<Arc<View>>, right: &Arc<View>) -> bool {
    left.as_ref().is_some_and(|view| Arc::ptr_eq(view, right))
}

impl ViewManager {
    pub fn new(context: Arc<AppContext>) -> Self {
        let prefetch = PrefetchController::new(&context.prefetch);
        Self {
            context,
            prefetch,
            next_view_id: 1,
            active: None,
            back: None,
            reload: None,
            background: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<&Arc<View>> {
        self.active.as_ref()
    }

    pub fn back(&self) -> Option<&Arc<View>> {
        self.back.as_ref()
    }

    pub fn reload_in_flight(&self) -> Option<&Arc<View>> {
        self.reload.as_ref()
    }

    pub fn background_len(&self) -> usize {
        self.background.len()
    }

    fn spawn_view(&mut self, mode: ViewMode, filter: TagFilter, reload: bool) -> Arc<View> {
        let id = self.next_view_id;
        self.next_view_id += 1;
        View::spawn(id, mode, filter, reload, &self.context)
    }

    fn retire(&mut self, view: Arc<View>) {
        debug!("View[{}]: retired to background", view.id());
        if !self.background.iter().any(|queued| Arc::ptr_eq(queued, &view)) {
            self.background.push(view);
        }
    }

    /// Switches to `(mode, filter)`. Returns `false` when that view is already active.
    pub fn change_view(&mut self, mode: ViewMode, filter: TagFilter) -> bool {
        if self
            .active
            .as_ref()
            .is_some_and(|view| view.matches(mode, filter))
        {
            return false;
        }

        if let Some(reload) = self.reload.take() {
            self.retire(reload);
        }
        let previous = self.active.take();
        if mode == ViewMode::Likes {
            if previous.as_ref().is_some_and(|view| view.mode() != ViewMode::Likes) {
                self.back = previous.clone();
            }
        } else {
            self.back = None;
        }
        if let Some(previous) = previous {
            self.retire(previous);
        }

        let view = self.spawn_view(mode, filter, false);
        self.active = Some(view);
        true
    }

    /// Returns from the likes view to the view it was opened from.
    pub fn go_back(&mut self) -> bool {
        let Some(back) = self.back.take() else {
            return false;
        };
        self.background.retain(|queued| !Arc::ptr_eq(queued, &back));
        if let Some(reload) = self.reload.take() {
            self.retire(reload);
        }
        let previous = self.active.replace(Arc::clone(&back));
        if let Some(previous) = &previous {
            self.retire(Arc::clone(previous));
        }
        info!("View[{}]: restored as active", back.id());
        notify(
            &self.context.bus,
            PipelineMessage::ViewSwapped {
                view_id: back.id(),
                previous: previous.map(|view| view.id()),
            },
        );
        true
    }

    /// Starts a fresh copy of the active view that replaces it once it has entries.
    pub fn request_reload(&mut self) -> bool {
        if self.reload.is_some() {
            return false;
        }
        let Some((mode, filter)) = self
            .active
            .as_ref()
            .map(|view| (view.mode(), view.filter()))
        else {
            return false;
        };
        self.context.registry.request_latest();
        let view = self.spawn_view(mode, filter, true);
        self.reload = Some(view);
        true
    }

    /// Swaps the reload view in once its builder has published something, or
    /// finished with nothing to publish.
    pub fn tick_reload(&mut self) -> bool {
        let ready = self.reload.as_ref().is_some_and(|view| {
            view.store().available_entries() > 0 || view.is_populated()
        });
        if !ready {
            return false;
        }
        let Some(reload) = self.reload.take() else {
            return false;
        };
        let previous = self.active.replace(Arc::clone(&reload));
        info!("View[{}]: reload swapped in", reload.id());
        notify(
            &self.context.bus,
            PipelineMessage::ViewSwapped {
                view_id: reload.id(),
                previous: previous.as_ref().map(|view| view.id()),
            },
        );
        if let Some(previous) = previous {
            self.retire(previous);
        }
        true
    }

    /// Terminates retired views and tears down those whose workers have all exited.
    pub fn cleanup_background(&mut self, device: &mut dyn RenderDevice) -> usize {
        let mut torn_down = 0usize;
        let mut index = 0usize;
        while index < self.background.len() {
            let view = Arc::clone(&self.background[index]);
            if same_view(&self.active, &view)
                || same_view(&self.back, &view)
                || same_view(&self.reload, &view)
            {
                index += 1;
                continue;
            }
            view.request_terminate();
            if !view.destroy(device) {
                index += 1;
                continue;
            }
            self.background.swap_remove(index);
            notify(
                &self.context.bus,
                PipelineMessage::ViewTornDown { view_id: view.id() },
            );
            torn_down += 1;
        }
        torn_down
    }

    /// Per-frame driver: reload swap, cleanup, prefetch windows, texture upload.
    pub fn frame(&mut self, top: usize, device: &mut dyn RenderDevice) -> FrameReport {
        let swapped = self.tick_reload();
        let torn_down = self.cleanup_background(device);
        let Some(active) = self.active.clone() else {
            return FrameReport {
                swapped,
                torn_down,
                ..FrameReport::default()
            };
        };
        let prefetch = self.prefetch.update(active.store(), top, device);
        let uploaded = upload_loaded_artwork(active.store(), device);
        FrameReport {
            swapped,
            torn_down,
            prefetch,
            uploaded,
        }
    }

    pub fn status(&self) -> ViewStatus {
        if self.reload.is_some() {
            return ViewStatus::Pending;
        }
        match &self.active {
            Some(view) if view.store().available_entries() > 0 => ViewStatus::Ready,
            _ => ViewStatus::Pending,
        }
    }

    /// Flips the like state of an active-view entry. Returns the new state.
    pub fn toggle_like(&mut self, index: usize) -> Option<bool> {
        let active = self.active.as_ref()?;
        let store = active.store();
        if index >= store.available_entries() {
            return None;
        }
        let id = store.id(index);
        let liked = self.context.user_data.toggle(&id);
        if liked {
            store.insert_flags(index, EntryFlags::LIKED);
        } else {
            store.remove_flags(index, EntryFlags::LIKED);
        }
        debug!("UserData: release {} liked={}", id, liked);
        notify(&self.context.bus, PipelineMessage::LikeToggled { id, liked });
        Some(liked)
    }

    /// Terminates every view and releases all textures once their workers exit.
    pub fn shutdown(&mut self, device: &mut dyn RenderDevice) {
        let mut views: Vec<Arc<View>> = Vec::new();
        let owned = self
            .background
            .drain(..)
            .chain(self.active.take())
            .chain(self.back.take())
            .chain(self.reload.take());
        for view in owned {
            if !views.iter().any(|known| Arc::ptr_eq(known, &view)) {
                views.push(view);
            }
        }

        for view in &views {
            view.request_terminate();
        }
        for view in views {
            while !view.destroy(device) {
                std::thread::sleep(self.context.worker_pass_sleep());
            }
        }
        info!("Views: shut down");
    }
}
