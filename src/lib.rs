//! # Trip Planner
//!
//! Headless data core for a trip-planning dashboard: a countdown, a
//! checklist, a budget tracker, and map-based route/location management,
//! all mirrored live from a remote document store.
//!
//! This library owns the synchronization and view-state logic only. The
//! store is consumed through the [`store::DocumentStore`] contract, and
//! rendering is a pure function of the state the synchronizers expose —
//! no UI code lives here.
//!
//! ## Features
//!
//! - **`persistence`** - SQLite-backed document store
//! - **`http`** - REST-backed document store with rate limiting and retry
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trip_planner::{AnonymousAuth, MemoryStore, TripPlanner};
//!
//! let store = Arc::new(MemoryStore::new());
//! let planner = TripPlanner::connect(store, &AnonymousAuth::new(), "my-trip").unwrap();
//! planner.start().unwrap();
//!
//! // The trip document is created with defaults on first subscribe, and
//! // the empty routes collection is seeded with two example routes.
//! assert!(planner.trip().details().is_some());
//! assert_eq!(planner.stats().route_count, 2);
//!
//! planner.checklist().add("Pack passports").unwrap();
//! assert_eq!(planner.checklist().progress_rounded(), 0);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TripPlanError};

// Document store contract (paths, batches, subscriptions)
pub mod store;
pub use store::{
    Document, DocumentStore, Fields, Precondition, WatchHandle, WriteBatch, WriteOp,
};

// In-memory store (reference implementation of the contract)
pub mod memory;
pub use memory::MemoryStore;

// Session bootstrap (identity + shared context)
pub mod session;
pub use session::{
    bootstrap, AnonymousAuth, ConnectionState, Identity, IdentityProvider, SessionContext,
};

// Transient auto-dismissing notices
pub mod notice;
pub use notice::{Notice, NoticeQueue, NOTICE_DURATION};

// Countdown computation
pub mod countdown;
pub use countdown::{CountdownState, TimeLeft};

// Entity synchronizers
pub mod trip;
pub use trip::TripSync;

pub mod checklist;
pub use checklist::ChecklistSync;

pub mod budget;
pub use budget::{BudgetSummary, BudgetSync, ExpenseDraft};

pub mod routes;
pub use routes::{DeleteConfirmation, LocationDraft, RouteSync};

// First-run starter data
pub mod seed;

// JSON import
pub mod import;
pub use import::{ImportData, ImportSummary};

// Planner facade tying the synchronizers together
pub mod planner;
pub use planner::{EventSink, PlannerStats, SyncEvent, TripPlanner};

// SQLite-backed store
#[cfg(feature = "persistence")]
pub mod sqlite_store;
#[cfg(feature = "persistence")]
pub use sqlite_store::SqliteStore;

// REST-backed store with rate limiting and retry
#[cfg(feature = "http")]
pub mod rest;
#[cfg(feature = "http")]
pub use rest::{RestConfig, RestStore};

// ============================================================================
// Entity Model
// ============================================================================

/// Top-level trip document: one per trip id, created lazily with defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    pub name: String,
    /// ISO-8601 local timestamp; bare dates are normalized to midnight
    /// before they are persisted.
    pub start_date: String,
    pub total_budget: f64,
    pub participants: i64,
}

impl Default for TripDetails {
    /// The hard-coded document written when no trip exists yet.
    fn default() -> Self {
        Self {
            name: "The Great America Trip".to_string(),
            start_date: "2025-07-20T00:00:00".to_string(),
            total_budget: 15000.0,
            participants: 3,
        }
    }
}

/// A single checklist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Store-assigned key; not part of the document body.
    #[serde(skip)]
    pub id: String,
    pub text: String,
    pub completed: bool,
}

/// Expense categories (fixed small set; unknown values map to `Other`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ExpenseCategory {
    Flights,
    Lodging,
    Food,
    Transport,
    Attractions,
    Other,
}

impl From<String> for ExpenseCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "flights" => ExpenseCategory::Flights,
            "lodging" => ExpenseCategory::Lodging,
            "food" => ExpenseCategory::Food,
            "transport" => ExpenseCategory::Transport,
            "attractions" => ExpenseCategory::Attractions,
            _ => ExpenseCategory::Other,
        }
    }
}

impl ExpenseCategory {
    /// All categories, in display order.
    pub const ALL: [ExpenseCategory; 6] = [
        ExpenseCategory::Flights,
        ExpenseCategory::Lodging,
        ExpenseCategory::Food,
        ExpenseCategory::Transport,
        ExpenseCategory::Attractions,
        ExpenseCategory::Other,
    ];
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExpenseCategory::Flights => "flights",
            ExpenseCategory::Lodging => "lodging",
            ExpenseCategory::Food => "food",
            ExpenseCategory::Transport => "transport",
            ExpenseCategory::Attractions => "attractions",
            ExpenseCategory::Other => "other",
        };
        write!(f, "{}", label)
    }
}

/// A single expense row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(skip)]
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub category: ExpenseCategory,
}

/// A named route; its locations live in a nested collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(skip)]
    pub id: String,
    pub name: String,
}

/// Marker type for a location (unknown values map to `General`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LocationType {
    Hotel,
    Attraction,
    General,
}

impl From<String> for LocationType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hotel" => LocationType::Hotel,
            "attraction" => LocationType::Attraction,
            _ => LocationType::General,
        }
    }
}

impl Default for LocationType {
    fn default() -> Self {
        LocationType::General
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LocationType::Hotel => "hotel",
            LocationType::Attraction => "attraction",
            LocationType::General => "general",
        };
        write!(f, "{}", label)
    }
}

/// A stop on a route. `order` drives both the list and the rendered path
/// sequence; documents without one sort as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type", default)]
    pub kind: LocationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub order: i64,
}

/// Bounding box over a set of locations, used to fit the map viewport to
/// the active route's path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Compute bounds from locations. Returns `None` for an empty slice.
    pub fn from_locations(locations: &[Location]) -> Option<Self> {
        if locations.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for loc in locations {
            min_lat = min_lat.min(loc.lat);
            max_lat = max_lat.max(loc.lat);
            min_lng = min_lng.min(loc.lng);
            max_lng = max_lng.max(loc.lng);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Center of the bounds as `(lat, lng)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trip_details_wire_format() {
        let details = TripDetails::default();
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["startDate"], "2025-07-20T00:00:00");
        assert_eq!(value["totalBudget"], 15000.0);
        assert_eq!(value["participants"], 3);

        let back: TripDetails = serde_json::from_value(value).unwrap();
        assert_eq!(back, details);
    }

    #[test]
    fn test_location_defaults_on_decode() {
        let loc: Location = serde_json::from_value(json!({
            "name": "Somewhere",
            "lat": 40.0,
            "lng": -70.0
        }))
        .unwrap();

        assert_eq!(loc.order, 0);
        assert_eq!(loc.kind, LocationType::General);
        assert!(loc.note.is_none());
        assert!(loc.address.is_none());
    }

    #[test]
    fn test_unknown_enum_values_fall_back() {
        let category: ExpenseCategory = serde_json::from_value(json!("souvenirs")).unwrap();
        assert_eq!(category, ExpenseCategory::Other);

        let kind: LocationType = serde_json::from_value(json!("campsite")).unwrap();
        assert_eq!(kind, LocationType::General);
    }

    #[test]
    fn test_entity_ids_stay_out_of_the_document_body() {
        let item = ChecklistItem {
            id: "abc".to_string(),
            text: "Pack".to_string(),
            completed: false,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_bounds_from_locations() {
        assert!(Bounds::from_locations(&[]).is_none());

        let locations = vec![
            Location {
                id: "a".to_string(),
                name: "A".to_string(),
                lat: 40.0,
                lng: -74.0,
                kind: LocationType::General,
                note: None,
                address: None,
                order: 1,
            },
            Location {
                id: "b".to_string(),
                name: "B".to_string(),
                lat: 42.0,
                lng: -70.0,
                kind: LocationType::Hotel,
                note: None,
                address: None,
                order: 2,
            },
        ];

        let bounds = Bounds::from_locations(&locations).unwrap();
        assert_eq!(bounds.min_lat, 40.0);
        assert_eq!(bounds.max_lat, 42.0);
        assert_eq!(bounds.center(), (41.0, -72.0));
    }
}
