//! First-run starter data.
//!
//! When a trip has no routes at all, the dashboard seeds two example
//! routes with a fixed set of locations so the map has something to show.
//! The whole seed is committed as one guarded atomic batch: the batch
//! requires the routes collection to still be empty at commit time, so two
//! clients racing through a first run cannot both write it and a partial
//! seed can never be observed.

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::session::SessionContext;
use crate::store::{to_fields, WriteBatch};
use crate::{Location, LocationType, Route};

/// One starter route and its ordered locations (ids are assigned at
/// batch-build time).
pub struct SeedRoute {
    pub route: Route,
    pub locations: Vec<Location>,
}

fn loc(
    name: &str,
    lat: f64,
    lng: f64,
    order: i64,
    kind: LocationType,
    note: &str,
    address: &str,
) -> Location {
    Location {
        id: String::new(),
        name: name.to_string(),
        lat,
        lng,
        kind,
        note: Some(note.to_string()),
        address: Some(address.to_string()),
        order,
    }
}

/// The canonical starter dataset.
pub static STARTER_ROUTES: Lazy<Vec<SeedRoute>> = Lazy::new(|| {
    vec![
        SeedRoute {
            route: Route {
                id: String::new(),
                name: "Maine to Baltimore".to_string(),
            },
            locations: vec![
                loc(
                    "The Press Hotel",
                    43.6579,
                    -70.2593,
                    1,
                    LocationType::Hotel,
                    "First night, Autograph Collection",
                    "119 Exchange St, Portland, ME",
                ),
                loc(
                    "Boston Harbor Hotel",
                    42.3571,
                    -71.0504,
                    2,
                    LocationType::Hotel,
                    "Hotel on the waterfront",
                    "70 Rowes Wharf, Boston, MA",
                ),
                loc(
                    "Museum of Science, Boston",
                    42.3678,
                    -71.0709,
                    3,
                    LocationType::Attraction,
                    "Great for families",
                    "1 Science Park, Boston, MA",
                ),
                loc(
                    "Four Seasons Hotel Baltimore",
                    39.2789,
                    -76.598,
                    4,
                    LocationType::Hotel,
                    "Luxury stop to finish",
                    "200 International Drive, Baltimore, MD",
                ),
            ],
        },
        SeedRoute {
            route: Route {
                id: String::new(),
                name: "New York, 4 Days".to_string(),
            },
            locations: vec![
                loc(
                    "Moxy Times Square",
                    40.7513,
                    -73.9882,
                    1,
                    LocationType::Hotel,
                    "Modern hotel, central location",
                    "485 7th Ave, New York, NY",
                ),
                loc(
                    "Times Square",
                    40.758,
                    -73.9855,
                    2,
                    LocationType::Attraction,
                    "Lights and billboards",
                    "Manhattan, NY 10036",
                ),
                loc(
                    "Statue of Liberty",
                    40.6892,
                    -74.0445,
                    3,
                    LocationType::Attraction,
                    "Take the ferry from Battery Park",
                    "New York, NY 10004",
                ),
                loc(
                    "Brooklyn Bridge",
                    40.7061,
                    -73.9969,
                    4,
                    LocationType::Attraction,
                    "Walk at sunset, amazing views",
                    "Brooklyn Bridge, New York, NY",
                ),
            ],
        },
    ]
});

/// Build the guarded atomic batch that writes the starter dataset.
pub fn seed_batch(ctx: &SessionContext) -> Result<WriteBatch> {
    let mut batch = WriteBatch::new();
    batch.require_collection_empty(ctx.routes_path());

    for seed in STARTER_ROUTES.iter() {
        let route_id = ctx.store().allocate_id();
        batch.set(ctx.route_path(&route_id), to_fields(&seed.route)?);

        for location in &seed.locations {
            let location_id = ctx.store().allocate_id();
            batch.set(
                ctx.location_path(&route_id, &location_id),
                to_fields(location)?,
            );
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::session::{bootstrap, AnonymousAuth};
    use crate::store::DocumentStore;
    use std::sync::Arc;

    #[test]
    fn test_starter_dataset_shape() {
        assert_eq!(STARTER_ROUTES.len(), 2);
        for seed in STARTER_ROUTES.iter() {
            assert!(!seed.route.name.is_empty());
            assert_eq!(seed.locations.len(), 4);
            let orders: Vec<i64> = seed.locations.iter().map(|l| l.order).collect();
            assert_eq!(orders, vec![1, 2, 3, 4]);
            assert!(seed.locations.iter().all(|l| l.note.is_some()));
            assert!(seed.locations.iter().all(|l| l.address.is_some()));
        }
    }

    #[test]
    fn test_seed_batch_is_guarded_and_complete() {
        let store = Arc::new(MemoryStore::new());
        let ctx = bootstrap(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            &AnonymousAuth::new(),
            "demo",
        )
        .unwrap();

        let batch = seed_batch(&ctx).unwrap();
        // 2 routes + 8 locations.
        assert_eq!(batch.len(), 10);
        assert_eq!(batch.preconditions().len(), 1);

        store.commit_batch(batch).unwrap();
        let routes = store.list_documents("trips/demo/routes").unwrap();
        assert_eq!(routes.len(), 2);

        for route in &routes {
            let locations = store
                .list_documents(&ctx.locations_path(&route.id))
                .unwrap();
            assert_eq!(locations.len(), 4);
        }
    }

    #[test]
    fn test_seed_batch_refused_when_routes_exist() {
        let store = Arc::new(MemoryStore::new());
        let ctx = bootstrap(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            &AnonymousAuth::new(),
            "demo",
        )
        .unwrap();

        let mut route = crate::store::Fields::new();
        route.insert("name".to_string(), "Mine".into());
        store.add_document("trips/demo/routes", route).unwrap();

        let batch = seed_batch(&ctx).unwrap();
        assert!(store.commit_batch(batch).is_err());
        assert_eq!(store.list_documents("trips/demo/routes").unwrap().len(), 1);
    }
}
