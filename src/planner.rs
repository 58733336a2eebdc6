//! Planner facade.
//!
//! `TripPlanner` owns the session context, the four synchronizers, the
//! notice queue, and the event sink, and wires them together: connect
//! (bootstrap the session), start (open every subscription), then read
//! view state and issue mutations through the synchronizer accessors.
//! Everything is explicitly owned; there is no global instance.

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
use log::{info, warn};

use crate::budget::{BudgetSummary, BudgetSync};
use crate::checklist::ChecklistSync;
use crate::countdown::CountdownState;
use crate::error::{Result, TripPlanError};
use crate::import::{self, ImportSummary};
use crate::notice::NoticeQueue;
use crate::routes::RouteSync;
use crate::session::{bootstrap, ConnectionState, IdentityProvider, SessionContext};
use crate::store::DocumentStore;
use crate::trip::TripSync;

/// View-state change notifications, one per synchronizer concern.
///
/// The renderer treats these as re-render hints; state is read back
/// through the planner accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    TripChanged,
    ChecklistChanged,
    BudgetChanged,
    RoutesChanged,
    LocationsChanged,
}

/// Callback the synchronizers emit [`SyncEvent`]s through.
pub type EventSink = Arc<dyn Fn(SyncEvent) + Send + Sync>;

/// Counts per mirrored collection, for monitoring and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerStats {
    pub checklist_count: u32,
    pub expense_count: u32,
    pub route_count: u32,
    pub location_count: u32,
}

/// The assembled trip-planning core.
pub struct TripPlanner {
    ctx: SessionContext,
    connection: Mutex<ConnectionState>,
    trip: TripSync,
    checklist: ChecklistSync,
    budget: BudgetSync,
    routes: RouteSync,
    notices: NoticeQueue,
}

impl TripPlanner {
    /// Bootstrap a session and assemble the synchronizers.
    ///
    /// Fails only when identity acquisition fails; the caller's view stays
    /// "connecting" in that case.
    pub fn connect(
        store: Arc<dyn DocumentStore>,
        auth: &dyn IdentityProvider,
        trip_id: &str,
    ) -> Result<Self> {
        Self::connect_with_events(store, auth, trip_id, Arc::new(|_| {}))
    }

    /// Like [`TripPlanner::connect`], with an event sink for re-render
    /// notifications.
    pub fn connect_with_events(
        store: Arc<dyn DocumentStore>,
        auth: &dyn IdentityProvider,
        trip_id: &str,
        events: EventSink,
    ) -> Result<Self> {
        let ctx = bootstrap(store, auth, trip_id)?;
        let notices = NoticeQueue::new();

        Ok(Self {
            trip: TripSync::new(ctx.clone(), Arc::clone(&events), notices.clone()),
            checklist: ChecklistSync::new(ctx.clone(), Arc::clone(&events), notices.clone()),
            budget: BudgetSync::new(ctx.clone(), Arc::clone(&events), notices.clone()),
            routes: RouteSync::new(ctx.clone(), Arc::clone(&events), notices.clone()),
            ctx,
            connection: Mutex::new(ConnectionState::Connecting),
            notices,
        })
    }

    /// Open every live subscription (trip, checklist, budget, routes).
    pub fn start(&self) -> Result<()> {
        self.trip.start()?;
        self.checklist.start()?;
        self.budget.start()?;
        self.routes.start()?;
        *self.connection.lock().unwrap() = ConnectionState::Ready;
        info!("[TripPlanner] started for trip '{}'", self.ctx.trip_id());
        Ok(())
    }

    /// Tear every subscription down (dashboard unmount). The planner can
    /// be started again afterwards.
    pub fn stop(&self) {
        self.trip.stop();
        self.checklist.stop();
        self.budget.stop();
        self.routes.stop();
        *self.connection.lock().unwrap() = ConnectionState::Connecting;
        info!("[TripPlanner] stopped for trip '{}'", self.ctx.trip_id());
    }

    /// Connecting until [`TripPlanner::start`] succeeds.
    pub fn connection(&self) -> ConnectionState {
        *self.connection.lock().unwrap()
    }

    /// The shared session context.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Trip details synchronizer.
    pub fn trip(&self) -> &TripSync {
        &self.trip
    }

    /// Checklist synchronizer.
    pub fn checklist(&self) -> &ChecklistSync {
        &self.checklist
    }

    /// Budget synchronizer.
    pub fn budget(&self) -> &BudgetSync {
        &self.budget
    }

    /// Route/location synchronizer.
    pub fn routes(&self) -> &RouteSync {
        &self.routes
    }

    /// Transient notices for the toast area.
    pub fn notices(&self) -> &NoticeQueue {
        &self.notices
    }

    /// Spending totals joined with the trip's participant count.
    pub fn budget_summary(&self) -> BudgetSummary {
        let participants = self
            .trip
            .details()
            .map(|details| details.participants)
            .unwrap_or(1);
        self.budget.summary(participants)
    }

    /// Countdown state at `now`; `None` until the trip document loads.
    ///
    /// An unparseable stored date renders as "started" rather than
    /// breaking the dashboard.
    pub fn countdown_at(&self, now: NaiveDateTime) -> Option<CountdownState> {
        let details = self.trip.details()?;
        match CountdownState::until(&details.start_date, now) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("[TripPlanner] bad start date '{}': {}", details.start_date, e);
                Some(CountdownState::Started)
            }
        }
    }

    /// Countdown state against the local wall clock.
    pub fn countdown(&self) -> Option<CountdownState> {
        self.countdown_at(Local::now().naive_local())
    }

    /// Parse and merge an import file as one atomic batch.
    ///
    /// Import appends; it never deletes existing documents.
    pub fn import_json(&self, json: &str) -> Result<ImportSummary> {
        match import::import_json(&self.ctx, json) {
            Ok(summary) => {
                self.notices.push("Trip data merged into the current trip!");
                Ok(summary)
            }
            Err(e) => {
                if matches!(e, TripPlanError::Parse { .. }) {
                    self.notices.push("Could not import the file.");
                }
                Err(e)
            }
        }
    }

    /// Counts per mirrored collection.
    pub fn stats(&self) -> PlannerStats {
        PlannerStats {
            checklist_count: self.checklist.items().len() as u32,
            expense_count: self.budget.expenses().len() as u32,
            route_count: self.routes.routes().len() as u32,
            location_count: self.routes.locations().len() as u32,
        }
    }
}
