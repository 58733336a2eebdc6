//! Trip details synchronizer.
//!
//! Mirrors the single `trips/{tripId}` document. On the first notification
//! with no document present, the hard-coded defaults are written and
//! adopted locally, so the dashboard always has something to render once
//! the subscription is live. Updates are partial merges with no optimistic
//! local apply: the mirror changes only when the subscription fires again.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde_json::Value;

use crate::error::Result;
use crate::notice::NoticeQueue;
use crate::planner::{EventSink, SyncEvent};
use crate::session::SessionContext;
use crate::store::{from_fields, to_fields, Fields, WatchHandle};
use crate::TripDetails;

/// Synchronizer for the trip document.
pub struct TripSync {
    ctx: SessionContext,
    state: Arc<Mutex<TripState>>,
    events: EventSink,
    notices: NoticeQueue,
}

#[derive(Default)]
struct TripState {
    details: Option<TripDetails>,
    watch: Option<WatchHandle>,
    started: bool,
}

impl TripSync {
    pub(crate) fn new(ctx: SessionContext, events: EventSink, notices: NoticeQueue) -> Self {
        Self {
            ctx,
            state: Arc::new(Mutex::new(TripState::default())),
            events,
            notices,
        }
    }

    /// Open the live subscription to the trip document.
    pub fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        let path = self.ctx.trip_path();
        let store = Arc::clone(self.ctx.store());
        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);
        let watch_path = path.clone();

        let handle = self.ctx.store().watch_document(
            &path,
            Arc::new(move |doc| {
                match doc {
                    Some(doc) => match from_fields::<TripDetails>(&doc.data) {
                        Ok(details) => {
                            state.lock().unwrap().details = Some(details);
                            events(SyncEvent::TripChanged);
                        }
                        Err(e) => warn!("[TripSync] undecodable trip document: {}", e),
                    },
                    None => {
                        // First access: create the document with defaults
                        // and adopt them as local state.
                        info!("[TripSync] no trip document at '{}', writing defaults", watch_path);
                        let defaults = TripDetails::default();
                        match to_fields(&defaults) {
                            Ok(fields) => {
                                if let Err(e) = store.set_document(&watch_path, fields) {
                                    warn!("[TripSync] failed to write defaults: {}", e);
                                }
                            }
                            Err(e) => warn!("[TripSync] failed to encode defaults: {}", e),
                        }
                        state.lock().unwrap().details = Some(defaults);
                        events(SyncEvent::TripChanged);
                    }
                }
            }),
        )?;

        let mut state = self.state.lock().unwrap();
        state.watch = Some(handle);
        state.started = true;
        Ok(())
    }

    /// Merge fields into the trip document.
    ///
    /// A bare `startDate` (no time component) is stored as midnight so the
    /// persisted value is always a full timestamp. No-op before `start()`.
    pub fn update(&self, mut fields: Fields) -> Result<()> {
        if !self.is_started() {
            debug!("[TripSync] update ignored, subscription not started");
            return Ok(());
        }

        if let Some(Value::String(date)) = fields.get("startDate") {
            if !date.contains('T') {
                let normalized = format!("{}T00:00:00", date);
                fields.insert("startDate".to_string(), Value::String(normalized));
            }
        }

        self.ctx
            .store()
            .update_document(&self.ctx.trip_path(), fields)?;
        self.notices.push("Trip details updated!");
        Ok(())
    }

    /// Update the start date (bare dates get a midnight time component).
    pub fn update_start_date(&self, date: &str) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("startDate".to_string(), Value::String(date.to_string()));
        self.update(fields)
    }

    /// Update the total budget.
    pub fn update_total_budget(&self, total_budget: f64) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("totalBudget".to_string(), total_budget.into());
        self.update(fields)
    }

    /// Update the participant count.
    pub fn update_participants(&self, participants: i64) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert("participants".to_string(), participants.into());
        self.update(fields)
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

    /// The mirrored trip document, `None` until the first notification.
    pub fn details(&self) -> Option<TripDetails> {
        self.state.lock().unwrap().details.clone()
    }

    /// Whether the subscription has delivered a snapshot yet.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().details.is_some()
    }

    fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }
}
