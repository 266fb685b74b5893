//! Decodes cached artwork for entries inside the decode window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::debug;

use crate::app_context::AppContext;
use crate::entry_store::{EntryFlags, EntryStore};
use crate::image_pipeline::ImageDecoder;
use crate::protocol::{notify, Bus, PipelineMessage, ViewId};
use crate::view::View;

pub fn run(view: &View, context: &AppContext) {
    while !view.is_terminating() {
        decode_pass(
            view.store(),
            context.decoder.as_ref(),
            view.id(),
            &context.bus,
            view.terminate_flag(),
        );
        thread::sleep(context.worker_pass_sleep());
    }
}

pub fn decode_pass(
    store: &EntryStore,
    decoder: &dyn ImageDecoder,
    view_id: ViewId,
    bus: &Bus,
    cancel: &AtomicBool,
) -> usize {
    let wanted = EntryFlags::ARTWORK_CACHED | EntryFlags::ARTWORK_REQUESTED;
    let mut decoded = 0usize;
    for index in 0..store.available_entries() {
        if cancel.load(Ordering::Acquire) {
            break;
        }
        let flags = store.flags(index);
        if !flags.contains(wanted) || flags.contains(EntryFlags::ARTWORK_LOADED) {
            continue;
        }
        let Some(path) = store.artwork_filepath(index) else {
            continue;
        };
        // Undecodable files stay cached-but-unloaded and are tried again next pass.
        let Some(image) = decoder.decode_file(&path) else {
            debug!("View[{}]: could not decode {}", view_id, path.display());
            continue;
        };
        store.publish_artwork_pixels(index, image);
        notify(bus, PipelineMessage::ArtworkDecoded { view_id, index });
        decoded += 1;
    }
    decoded
}
