//! Route/location aggregate synchronizer.
//!
//! The most intricate synchronizer: a two-level, selection-driven
//! subscription manager. The routes collection is mirrored wholesale; at
//! most one route is active at a time, and the active selection decides
//! which nested locations collection has a live subscription. Changing the
//! selection tears the previous location subscription down before the new
//! one is adopted, and a generation counter discards any notification a
//! superseded subscription manages to deliver late.
//!
//! On first run (no routes at all) the starter dataset is written as one
//! guarded atomic batch before the subscription opens.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::error::{Result, TripPlanError};
use crate::notice::NoticeQueue;
use crate::planner::{EventSink, SyncEvent};
use crate::seed::seed_batch;
use crate::session::SessionContext;
use crate::store::{from_fields, to_fields, Document, WatchHandle};
use crate::{Bounds, Location, LocationType, Route};

/// The caller's answer to the "really delete this route?" prompt.
///
/// A library cannot block on a dialog, so the UI asks and threads the
/// answer through; nothing is deleted without an explicit confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteConfirmation {
    Confirmed,
    Declined,
}

/// Form input for a new location. Coordinates arrive as text straight
/// from the edit widgets and are coerced here.
#[derive(Debug, Clone, Default)]
pub struct LocationDraft {
    pub name: String,
    pub lat: String,
    pub lng: String,
    pub kind: LocationType,
    pub note: String,
    pub address: String,
}

/// Synchronizer for routes and the active route's locations.
pub struct RouteSync {
    ctx: SessionContext,
    state: Arc<Mutex<RouteState>>,
    events: EventSink,
    notices: NoticeQueue,
}

#[derive(Default)]
struct RouteState {
    routes: Vec<Route>,
    active_route_id: Option<String>,
    locations: Vec<Location>,
    routes_watch: Option<WatchHandle>,
    locations_watch: Option<WatchHandle>,
    /// Bumped on every selection change; location callbacks carry the
    /// generation they were opened under and are ignored once it is stale.
    location_generation: u64,
    started: bool,
}

fn decode_routes(docs: Vec<Document>) -> Vec<Route> {
    docs.into_iter()
        .filter_map(|doc| match from_fields::<Route>(&doc.data) {
            Ok(mut route) => {
                route.id = doc.id;
                Some(route)
            }
            Err(e) => {
                warn!("[RouteSync] skipping undecodable route '{}': {}", doc.id, e);
                None
            }
        })
        .collect()
}

fn decode_locations(docs: Vec<Document>) -> Vec<Location> {
    docs.into_iter()
        .filter_map(|doc| match from_fields::<Location>(&doc.data) {
            Ok(mut location) => {
                location.id = doc.id;
                Some(location)
            }
            Err(e) => {
                warn!("[RouteSync] skipping undecodable location '{}': {}", doc.id, e);
                None
            }
        })
        .collect()
}

fn none_if_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl RouteSync {
    pub(crate) fn new(ctx: SessionContext, events: EventSink, notices: NoticeQueue) -> Self {
        Self {
            ctx,
            state: Arc::new(Mutex::new(RouteState::default())),
            events,
            notices,
        }
    }

    /// Seed the starter routes if none exist, then open the routes
    /// subscription.
    pub fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }

        let routes_path = self.ctx.routes_path();
        let store = self.ctx.store();

        if store.list_documents(&routes_path)?.is_empty() {
            self.notices.push("Creating starter routes...");
            match store.commit_batch(seed_batch(&self.ctx)?) {
                Ok(()) => info!("[RouteSync] starter routes seeded"),
                // Another client observed the same empty collection and
                // won the race; its seed is as good as ours.
                Err(TripPlanError::PreconditionFailed { .. }) => {
                    info!("[RouteSync] starter routes already seeded elsewhere")
                }
                Err(e) => return Err(e),
            }
        }

        let ctx = self.ctx.clone();
        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);

        let handle = store.watch_collection(
            &routes_path,
            Arc::new(move |docs| {
                let routes = decode_routes(docs);

                // Wholesale replace, then work out whether the selection
                // rule needs to run. An explicit valid selection is never
                // overridden; an id that vanished from the snapshot counts
                // as no selection at all.
                let desired = {
                    let mut st = state.lock().unwrap();
                    st.routes = routes;

                    let valid = st
                        .active_route_id
                        .as_ref()
                        .map(|id| st.routes.iter().any(|r| &r.id == id))
                        .unwrap_or(false);
                    if valid {
                        None
                    } else if let Some(first) = st.routes.first() {
                        Some(Some(first.id.clone()))
                    } else if st.active_route_id.is_some() {
                        Some(None)
                    } else {
                        None
                    }
                };
                events(SyncEvent::RoutesChanged);

                if let Some(target) = desired {
                    if let Err(e) = Self::apply_selection(&ctx, &state, &events, target) {
                        warn!("[RouteSync] failed to switch selection: {}", e);
                    }
                }
            }),
        )?;

        let mut state = self.state.lock().unwrap();
        state.routes_watch = Some(handle);
        state.started = true;
        Ok(())
    }

    /// Change the active route (or clear it with `None`).
    pub fn select_route(&self, route_id: Option<&str>) -> Result<()> {
        if !self.is_started() {
            debug!("[RouteSync] select ignored, subscription not started");
            return Ok(());
        }
        Self::apply_selection(
            &self.ctx,
            &self.state,
            &self.events,
            route_id.map(String::from),
        )
    }

    /// Tear down the previous location subscription and open one for the
    /// new selection.
    ///
    /// The old watch is cancelled before the new snapshot is adopted, and
    /// the generation captured by each location callback keeps a late
    /// notification from a superseded subscription from clobbering fresh
    /// state.
    fn apply_selection(
        ctx: &SessionContext,
        state: &Arc<Mutex<RouteState>>,
        events: &EventSink,
        target: Option<String>,
    ) -> Result<()> {
        let (old_watch, generation) = {
            let mut st = state.lock().unwrap();
            if st.active_route_id == target {
                return Ok(());
            }
            debug!(
                "[RouteSync] selection {:?} -> {:?}",
                st.active_route_id, target
            );
            st.active_route_id = target.clone();
            st.location_generation += 1;
            st.locations.clear();
            (st.locations_watch.take(), st.location_generation)
        };

        if let Some(watch) = old_watch {
            watch.cancel();
        }

        if let Some(route_id) = target {
            let cb_state = Arc::clone(state);
            let cb_events = Arc::clone(events);

            let handle = ctx.store().watch_collection(
                &ctx.locations_path(&route_id),
                Arc::new(move |docs| {
                    let mut locations = decode_locations(docs);
                    // Ascending order; absent orders decode as 0 and the
                    // sort is stable, so ties keep snapshot order.
                    locations.sort_by_key(|l| l.order);

                    {
                        let mut st = cb_state.lock().unwrap();
                        if st.location_generation != generation {
                            debug!(
                                "[RouteSync] dropping stale location snapshot (generation {})",
                                generation
                            );
                            return;
                        }
                        st.locations = locations;
                    }
                    cb_events(SyncEvent::LocationsChanged);
                }),
            )?;

            let mut st = state.lock().unwrap();
            if st.location_generation == generation {
                st.locations_watch = Some(handle);
            }
            // Otherwise a newer selection superseded this one while the
            // subscription was opening; dropping the handle cancels it.
        }

        events(SyncEvent::LocationsChanged);
        Ok(())
    }

    /// Create a route and immediately make it the active one.
    ///
    /// Blank names are ignored.
    pub fn add_route(&self, name: &str) -> Result<()> {
        if !self.is_started() {
            debug!("[RouteSync] add ignored, subscription not started");
            return Ok(());
        }
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }

        let route = Route {
            id: String::new(),
            name: name.to_string(),
        };
        let route_id = self
            .ctx
            .store()
            .add_document(&self.ctx.routes_path(), to_fields(&route)?)?;
        self.notices.push(format!("Route \"{}\" created!", name));

        // Pre-empt the first-in-snapshot default with the new route.
        Self::apply_selection(&self.ctx, &self.state, &self.events, Some(route_id))
    }

    /// Delete a route. Requires the caller to have confirmed; deleting the
    /// active route resolves through the next routes notification.
    pub fn remove_route(&self, route_id: &str, confirmation: DeleteConfirmation) -> Result<()> {
        if !self.is_started() {
            debug!("[RouteSync] remove ignored, subscription not started");
            return Ok(());
        }
        if confirmation == DeleteConfirmation::Declined {
            return Ok(());
        }

        let name = {
            let st = self.state.lock().unwrap();
            st.routes
                .iter()
                .find(|r| r.id == route_id)
                .map(|r| r.name.clone())
        };

        self.ctx
            .store()
            .delete_document(&self.ctx.route_path(route_id))?;
        self.notices.push(format!(
            "Route \"{}\" deleted.",
            name.unwrap_or_else(|| route_id.to_string())
        ));
        Ok(())
    }

    /// Add a location to the active route.
    ///
    /// Requires an active route and non-empty name/lat/lng; coordinates
    /// are coerced to floats. The order is assigned from the local mirror
    /// (count + 1); concurrent adds from another client may collide.
    pub fn add_location(&self, draft: LocationDraft) -> Result<()> {
        if !self.is_started() {
            debug!("[RouteSync] add location ignored, subscription not started");
            return Ok(());
        }

        let (active, count) = {
            let st = self.state.lock().unwrap();
            (st.active_route_id.clone(), st.locations.len())
        };

        let valid = active.is_some()
            && !draft.name.trim().is_empty()
            && !draft.lat.trim().is_empty()
            && !draft.lng.trim().is_empty();
        let lat = draft.lat.trim().parse::<f64>().ok().filter(|v| v.is_finite());
        let lng = draft.lng.trim().parse::<f64>().ok().filter(|v| v.is_finite());

        let (route_id, lat, lng) = match (active, valid, lat, lng) {
            (Some(route_id), true, Some(lat), Some(lng)) => (route_id, lat, lng),
            _ => {
                self.notices.push("Fill in all the location fields.");
                return Err(TripPlanError::Validation {
                    message: "a location needs an active route, a name, and coordinates"
                        .to_string(),
                });
            }
        };

        let location = Location {
            id: String::new(),
            name: draft.name.trim().to_string(),
            lat,
            lng,
            kind: draft.kind,
            note: none_if_empty(draft.note),
            address: none_if_empty(draft.address),
            order: count as i64 + 1,
        };
        self.ctx
            .store()
            .add_document(&self.ctx.locations_path(&route_id), to_fields(&location)?)?;
        self.notices.push("Location added to the route!");
        Ok(())
    }

    /// Delete a location from the active route. No confirmation required.
    pub fn remove_location(&self, location_id: &str) -> Result<()> {
        if !self.is_started() {
            debug!("[RouteSync] remove location ignored, subscription not started");
            return Ok(());
        }
        let route_id = match self.state.lock().unwrap().active_route_id.clone() {
            Some(id) => id,
            None => return Ok(()),
        };

        self.ctx
            .store()
            .delete_document(&self.ctx.location_path(&route_id, location_id))?;
        self.notices.push("Location deleted.");
        Ok(())
    }

    /// Tear both subscriptions down (component unmount).
    ///
    /// The generation bump makes sure even a backend with lazy teardown
    /// cannot deliver into the stopped mirror.
    pub fn stop(&self) {
        let (routes_watch, locations_watch) = {
            let mut st = self.state.lock().unwrap();
            st.started = false;
            st.location_generation += 1;
            (st.routes_watch.take(), st.locations_watch.take())
        };
        drop(routes_watch);
        drop(locations_watch);
    }

    /// The mirrored routes, in snapshot order.
    pub fn routes(&self) -> Vec<Route> {
        self.state.lock().unwrap().routes.clone()
    }

    /// The active route id, if any.
    pub fn active_route_id(&self) -> Option<String> {
        self.state.lock().unwrap().active_route_id.clone()
    }

    /// The active route, if any.
    pub fn active_route(&self) -> Option<Route> {
        let st = self.state.lock().unwrap();
        let id = st.active_route_id.as_ref()?;
        st.routes.iter().find(|r| &r.id == id).cloned()
    }

    /// The active route's locations, sorted ascending by order.
    pub fn locations(&self) -> Vec<Location> {
        self.state.lock().unwrap().locations.clone()
    }

    /// Map-fit bounds over the active route's locations.
    pub fn path_bounds(&self) -> Option<Bounds> {
        Bounds::from_locations(&self.state.lock().unwrap().locations)
    }

    fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::session::{bootstrap, AnonymousAuth};
    use crate::store::{
        CollectionCallback, DocumentCallback, DocumentStore, Fields, WriteBatch,
    };
    use serde_json::json;

    fn obj(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn sync_on(store: Arc<dyn DocumentStore>) -> RouteSync {
        let ctx = bootstrap(store, &AnonymousAuth::new(), "demo").unwrap();
        RouteSync::new(ctx, Arc::new(|_| {}), NoticeQueue::new())
    }

    fn sync_with_store() -> (RouteSync, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sync = sync_on(Arc::clone(&store) as Arc<dyn DocumentStore>);
        (sync, store)
    }

    #[test]
    fn test_first_run_seeds_and_selects() {
        let (sync, store) = sync_with_store();
        sync.start().unwrap();

        let routes = sync.routes();
        assert_eq!(routes.len(), 2);
        // First route in snapshot order becomes active.
        assert_eq!(sync.active_route_id().unwrap(), routes[0].id);

        let locations = sync.locations();
        assert_eq!(locations.len(), 4);
        let orders: Vec<i64> = locations.iter().map(|l| l.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);

        // 2 routes + 8 locations.
        assert_eq!(store.document_count(), 10);
    }

    #[test]
    fn test_seeding_is_idempotent() {
        let (sync, store) = sync_with_store();
        sync.start().unwrap();
        assert_eq!(store.document_count(), 10);

        // A second client starting against the same store must not seed
        // again.
        let other = sync_on(Arc::clone(&store) as Arc<dyn DocumentStore>);
        other.start().unwrap();

        assert_eq!(store.document_count(), 10);
        assert_eq!(other.routes().len(), 2);
    }

    #[test]
    fn test_explicit_selection_is_not_overridden() {
        let (sync, store) = sync_with_store();
        sync.start().unwrap();

        let second = sync.routes()[1].id.clone();
        sync.select_route(Some(&second)).unwrap();
        assert_eq!(sync.active_route_id().unwrap(), second);

        // A new route arriving does not steal the selection.
        store
            .add_document("trips/demo/routes", obj(json!({"name": "Another"})))
            .unwrap();
        assert_eq!(sync.active_route_id().unwrap(), second);
    }

    #[test]
    fn test_add_route_selects_it() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();

        sync.add_route("Coastal detour").unwrap();

        let active = sync.active_route().unwrap();
        assert_eq!(active.name, "Coastal detour");
        assert_eq!(sync.routes().len(), 3);
        // The new route has no locations yet.
        assert!(sync.locations().is_empty());
    }

    #[test]
    fn test_blank_route_name_is_ignored() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();

        sync.add_route("   ").unwrap();
        assert_eq!(sync.routes().len(), 2);
    }

    #[test]
    fn test_deleting_the_active_route_reselects() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();

        let active = sync.active_route_id().unwrap();
        sync.remove_route(&active, DeleteConfirmation::Confirmed)
            .unwrap();

        let routes = sync.routes();
        assert_eq!(routes.len(), 1);
        // Selection moved to the surviving route and its locations loaded.
        assert_eq!(sync.active_route_id().unwrap(), routes[0].id);
        assert_eq!(sync.locations().len(), 4);
    }

    #[test]
    fn test_declined_deletion_does_nothing() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();

        let active = sync.active_route_id().unwrap();
        sync.remove_route(&active, DeleteConfirmation::Declined)
            .unwrap();
        assert_eq!(sync.routes().len(), 2);
    }

    #[test]
    fn test_deleting_every_route_clears_the_selection() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();

        for route in sync.routes() {
            sync.remove_route(&route.id, DeleteConfirmation::Confirmed)
                .unwrap();
        }

        assert!(sync.routes().is_empty());
        assert!(sync.active_route_id().is_none());
        assert!(sync.locations().is_empty());
    }

    #[test]
    fn test_locations_sorted_by_order_regardless_of_arrival() {
        let (sync, store) = sync_with_store();
        sync.start().unwrap();
        sync.add_route("Sorting test").unwrap();
        let route_id = sync.active_route_id().unwrap();
        let collection = format!("trips/demo/routes/{}/locations", route_id);

        store
            .add_document(
                &collection,
                obj(json!({"name": "Third", "lat": 1.0, "lng": 1.0, "order": 3})),
            )
            .unwrap();
        store
            .add_document(
                &collection,
                obj(json!({"name": "First", "lat": 1.0, "lng": 1.0, "order": 1})),
            )
            .unwrap();
        store
            .add_document(
                &collection,
                obj(json!({"name": "Second", "lat": 1.0, "lng": 1.0, "order": 2})),
            )
            .unwrap();
        // No order at all sorts as 0, ahead of the rest.
        store
            .add_document(
                &collection,
                obj(json!({"name": "Unordered", "lat": 1.0, "lng": 1.0})),
            )
            .unwrap();

        let names: Vec<String> = sync.locations().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Unordered", "First", "Second", "Third"]);
    }

    #[test]
    fn test_switching_routes_never_shows_stale_locations() {
        let (sync, store) = sync_with_store();
        sync.start().unwrap();

        let routes = sync.routes();
        let route_a = routes[0].id.clone();
        let route_b = routes[1].id.clone();
        assert_eq!(sync.active_route_id().unwrap(), route_a);

        sync.select_route(Some(&route_b)).unwrap();

        // A write to A's collection after the switch must not surface: A's
        // subscription was cancelled.
        store
            .add_document(
                &format!("trips/demo/routes/{}/locations", route_a),
                obj(json!({"name": "Sneaky", "lat": 0.0, "lng": 0.0, "order": 9})),
            )
            .unwrap();

        let locations = sync.locations();
        assert_eq!(locations.len(), 4);
        assert!(locations.iter().all(|l| l.name != "Sneaky"));
    }

    /// Store wrapper whose collection-watch cancellations are deliberately
    /// leaky: the underlying watcher stays registered, simulating a
    /// backend whose teardown completes late.
    struct LaggyStore {
        inner: Arc<MemoryStore>,
        leaked: Mutex<Vec<WatchHandle>>,
    }

    impl DocumentStore for LaggyStore {
        fn allocate_id(&self) -> String {
            self.inner.allocate_id()
        }
        fn get_document(&self, path: &str) -> crate::error::Result<Option<Document>> {
            self.inner.get_document(path)
        }
        fn list_documents(&self, collection: &str) -> crate::error::Result<Vec<Document>> {
            self.inner.list_documents(collection)
        }
        fn set_document(&self, path: &str, data: Fields) -> crate::error::Result<()> {
            self.inner.set_document(path, data)
        }
        fn update_document(&self, path: &str, fields: Fields) -> crate::error::Result<()> {
            self.inner.update_document(path, fields)
        }
        fn delete_document(&self, path: &str) -> crate::error::Result<()> {
            self.inner.delete_document(path)
        }
        fn add_document(&self, collection: &str, data: Fields) -> crate::error::Result<String> {
            self.inner.add_document(collection, data)
        }
        fn commit_batch(&self, batch: WriteBatch) -> crate::error::Result<()> {
            self.inner.commit_batch(batch)
        }
        fn watch_document(
            &self,
            path: &str,
            callback: DocumentCallback,
        ) -> crate::error::Result<WatchHandle> {
            self.inner.watch_document(path, callback)
        }
        fn watch_collection(
            &self,
            collection: &str,
            callback: CollectionCallback,
        ) -> crate::error::Result<WatchHandle> {
            let handle = self.inner.watch_collection(collection, callback)?;
            self.leaked.lock().unwrap().push(handle);
            Ok(WatchHandle::noop())
        }
    }

    #[test]
    fn test_generation_guard_drops_late_notifications() {
        let memory = Arc::new(MemoryStore::new());
        let store = Arc::new(LaggyStore {
            inner: Arc::clone(&memory),
            leaked: Mutex::new(Vec::new()),
        });
        let sync = sync_on(store as Arc<dyn DocumentStore>);
        sync.start().unwrap();

        let routes = sync.routes();
        let route_a = routes[0].id.clone();
        let route_b = routes[1].id.clone();

        sync.select_route(Some(&route_b)).unwrap();
        let expected: Vec<String> = sync.locations().into_iter().map(|l| l.name).collect();

        // A's watcher is still registered (the cancel leaked), so this
        // fires A's callback late; the generation check must discard it.
        memory
            .add_document(
                &format!("trips/demo/routes/{}/locations", route_a),
                obj(json!({"name": "Sneaky", "lat": 0.0, "lng": 0.0, "order": 9})),
            )
            .unwrap();

        let names: Vec<String> = sync.locations().into_iter().map(|l| l.name).collect();
        assert_eq!(names, expected);
        assert!(names.iter().all(|n| n != "Sneaky"));
    }

    #[test]
    fn test_add_location_assigns_next_order() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();
        sync.add_route("Fresh").unwrap();

        sync.add_location(LocationDraft {
            name: "Lighthouse".to_string(),
            lat: "43.65".to_string(),
            lng: "-70.25".to_string(),
            kind: LocationType::Attraction,
            note: "  ".to_string(),
            address: "Portland Head Light".to_string(),
        })
        .unwrap();

        let locations = sync.locations();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].order, 1);
        assert_eq!(locations[0].kind, LocationType::Attraction);
        assert!(locations[0].note.is_none());
        assert_eq!(locations[0].address.as_deref(), Some("Portland Head Light"));

        sync.add_location(LocationDraft {
            name: "Dinner".to_string(),
            lat: "43.66".to_string(),
            lng: "-70.26".to_string(),
            ..LocationDraft::default()
        })
        .unwrap();
        assert_eq!(sync.locations()[1].order, 2);
    }

    #[test]
    fn test_add_location_validation() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();
        sync.add_route("Fresh").unwrap();

        // Missing name.
        assert!(sync
            .add_location(LocationDraft {
                lat: "1.0".to_string(),
                lng: "1.0".to_string(),
                ..LocationDraft::default()
            })
            .is_err());
        // Unparseable latitude.
        assert!(sync
            .add_location(LocationDraft {
                name: "X".to_string(),
                lat: "north".to_string(),
                lng: "1.0".to_string(),
                ..LocationDraft::default()
            })
            .is_err());
        assert!(sync.locations().is_empty());

        // No active route.
        sync.select_route(None).unwrap();
        assert!(sync
            .add_location(LocationDraft {
                name: "X".to_string(),
                lat: "1.0".to_string(),
                lng: "1.0".to_string(),
                ..LocationDraft::default()
            })
            .is_err());
    }

    #[test]
    fn test_remove_location() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();

        let before = sync.locations();
        assert_eq!(before.len(), 4);
        sync.remove_location(&before[0].id).unwrap();

        let after = sync.locations();
        assert_eq!(after.len(), 3);
        assert!(after.iter().all(|l| l.id != before[0].id));
    }

    #[test]
    fn test_path_bounds_follow_active_route() {
        let (sync, _store) = sync_with_store();
        sync.start().unwrap();

        let bounds = sync.path_bounds().unwrap();
        assert!(bounds.min_lat < bounds.max_lat);

        sync.select_route(None).unwrap();
        assert!(sync.path_bounds().is_none());
    }

    #[test]
    fn test_operations_before_start_are_noops() {
        let (sync, store) = sync_with_store();

        sync.add_route("Early").unwrap();
        sync.select_route(Some("nowhere")).unwrap();
        sync.remove_route("nowhere", DeleteConfirmation::Confirmed)
            .unwrap();
        sync.remove_location("nowhere").unwrap();

        assert_eq!(store.document_count(), 0);
        assert!(sync.routes().is_empty());
    }
}
