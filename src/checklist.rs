//! Checklist synchronizer.
//!
//! Mirrors the `trips/{tripId}/checklist` collection (order is not
//! significant) and exposes the add/toggle/delete operations plus the
//! progress metric. Every operation is a no-op until the subscription has
//! been started, so nothing can write before the session is ready.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::Result;
use crate::notice::NoticeQueue;
use crate::planner::{EventSink, SyncEvent};
use crate::session::SessionContext;
use crate::store::{from_fields, to_fields, Document, WatchHandle};
use crate::ChecklistItem;

/// Synchronizer for checklist items.
pub struct ChecklistSync {
    ctx: SessionContext,
    state: Arc<Mutex<ChecklistState>>,
    events: EventSink,
    notices: NoticeQueue,
}

#[derive(Default)]
struct ChecklistState {
    items: Vec<ChecklistItem>,
    watch: Option<WatchHandle>,
    started: bool,
}

fn decode_items(docs: Vec<Document>) -> Vec<ChecklistItem> {
    docs.into_iter()
        .filter_map(|doc| match from_fields::<ChecklistItem>(&doc.data) {
            Ok(mut item) => {
                item.id = doc.id;
                Some(item)
            }
            Err(e) => {
                warn!("[ChecklistSync] skipping undecodable item '{}': {}", doc.id, e);
                None
            }
        })
        .collect()
}

impl ChecklistSync {
    pub(crate) fn new(ctx: SessionContext, events: EventSink, notices: NoticeQueue) -> Self {
        Self {
            ctx,
            state: Arc::new(Mutex::new(ChecklistState::default())),
            events,
            notices,
        }
    }

    /// Open the live subscription to the checklist collection.
    pub fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);

        let handle = self.ctx.store().watch_collection(
            &self.ctx.checklist_path(),
            Arc::new(move |docs| {
                state.lock().unwrap().items = decode_items(docs);
                events(SyncEvent::ChecklistChanged);
            }),
        )?;

        let mut state = self.state.lock().unwrap();
        state.watch = Some(handle);
        state.started = true;
        Ok(())
    }

    /// Add a new task. Blank text is ignored; new tasks start incomplete.
    pub fn add(&self, text: &str) -> Result<()> {
        if !self.is_started() {
            debug!("[ChecklistSync] add ignored, subscription not started");
            return Ok(());
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let item = ChecklistItem {
            id: String::new(),
            text: text.to_string(),
            completed: false,
        };
        self.ctx
            .store()
            .add_document(&self.ctx.checklist_path(), to_fields(&item)?)?;
        self.notices.push("Task added!");
        Ok(())
    }

    /// Flip a task's completed flag.
    pub fn toggle(&self, item_id: &str) -> Result<()> {
        if !self.is_started() {
            debug!("[ChecklistSync] toggle ignored, subscription not started");
            return Ok(());
        }

        let completed = {
            let state = self.state.lock().unwrap();
            match state.items.iter().find(|item| item.id == item_id) {
                Some(item) => item.completed,
                None => return Ok(()),
            }
        };

        let mut fields = crate::store::Fields::new();
        fields.insert("completed".to_string(), (!completed).into());
        self.ctx
            .store()
            .update_document(&self.ctx.checklist_item_path(item_id), fields)?;
        Ok(())
    }

    /// Delete a task.
    pub fn remove(&self, item_id: &str) -> Result<()> {
        if !self.is_started() {
            debug!("[ChecklistSync] remove ignored, subscription not started");
            return Ok(());
        }

        self.ctx
            .store()
            .delete_document(&self.ctx.checklist_item_path(item_id))?;
        self.notices.push("Task deleted.");
        Ok(())
    }

    /// Tear the subscription down (component unmount).
    pub fn stop(&self) {
        let watch = {
            let mut state = self.state.lock().unwrap();
            state.started = false;
            state.watch.take()
        };
        drop(watch);
    }

    /// The mirrored items.
    pub fn items(&self) -> Vec<ChecklistItem> {
        self.state.lock().unwrap().items.clone()
    }

    /// Completed fraction as a percentage; 0 for an empty list.
    pub fn progress_percent(&self) -> f64 {
        let state = self.state.lock().unwrap();
        let total = state.items.len();
        if total == 0 {
            return 0.0;
        }
        let completed = state.items.iter().filter(|item| item.completed).count();
        (completed as f64 / total as f64) * 100.0
    }

    /// Progress rounded for display.
    pub fn progress_rounded(&self) -> u32 {
        self.progress_percent().round() as u32
    }

    fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }
}
