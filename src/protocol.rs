//! Notification bus shared by the registry, user data and view workers.
//!
//! Messages are informational. Pipeline state lives in the entry stores and the
//! registry; nothing waits on delivery and a lagging subscriber only loses
//! notifications.

use tokio::sync::broadcast;

use crate::catalog::{TagFilter, ViewMode};

pub type ViewId = u64;

pub const BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    RegistryRefreshed {
        releases: usize,
    },
    RegistryRefreshFailed {
        reason: String,
    },
    ViewCreated {
        view_id: ViewId,
        mode: ViewMode,
        filter: TagFilter,
    },
    /// The builder finished; `entries` were published.
    ViewPopulated {
        view_id: ViewId,
        entries: usize,
    },
    ViewSwapped {
        view_id: ViewId,
        previous: Option<ViewId>,
    },
    ViewTornDown {
        view_id: ViewId,
    },
    ArtworkCached {
        view_id: ViewId,
        index: usize,
    },
    ArtworkDecoded {
        view_id: ViewId,
        index: usize,
    },
    TracksCached {
        view_id: ViewId,
        index: usize,
    },
    LikeToggled {
        id: String,
        liked: bool,
    },
}

pub type Bus = broadcast::Sender<PipelineMessage>;

pub fn new_bus() -> Bus {
    let (sender, _) = broadcast::channel(BUS_CAPACITY);
    sender
}

/// Sends without caring whether anyone is listening.
pub fn notify(bus: &Bus, message: PipelineMessage) {
    let _ = bus.send(message);
}
