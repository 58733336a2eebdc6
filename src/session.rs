//! Session bootstrap.
//!
//! On startup the client needs exactly two things before any synchronizer
//! can run: a store handle and an identity. Identity acquisition is
//! anonymous and requires no user interaction; if it fails, the failure is
//! logged and the caller stays in the [`ConnectionState::Connecting`] view
//! state indefinitely (no retry policy exists at this layer).
//!
//! The resulting [`SessionContext`] is the one shared, read-only context
//! threaded explicitly through every synchronizer; there are no ambient
//! globals.

use std::sync::Arc;

use log::{error, info};
use uuid::Uuid;

use crate::error::{Result, TripPlanError};
use crate::store::{child_path, DocumentStore};

/// The signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub anonymous: bool,
}

/// Identity acquisition seam.
pub trait IdentityProvider {
    /// The identity already attached to this client, if any.
    fn current(&self) -> Option<Identity>;

    /// Request a fresh anonymous identity.
    fn sign_in_anonymously(&self) -> Result<Identity>;
}

/// Default provider: mints anonymous identities locally.
#[derive(Debug, Clone, Default)]
pub struct AnonymousAuth;

impl AnonymousAuth {
    pub fn new() -> Self {
        Self
    }
}

impl IdentityProvider for AnonymousAuth {
    fn current(&self) -> Option<Identity> {
        None
    }

    fn sign_in_anonymously(&self) -> Result<Identity> {
        Ok(Identity {
            user_id: Uuid::new_v4().to_string(),
            anonymous: true,
        })
    }
}

/// Connection view state: everything before a successful bootstrap renders
/// as "connecting".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
}

/// Process-wide context shared by all synchronizers: the store handle, the
/// identity, and the trip the dashboard is scoped to. Read-only after
/// bootstrap.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn DocumentStore>,
    identity: Identity,
    trip_id: String,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("identity", &self.identity)
            .field("trip_id", &self.trip_id)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    // ------------------------------------------------------------------
    // Collection layout: trips/{tripId}/(checklist|budget|routes)/...,
    // locations nested one level deeper under their route.
    // ------------------------------------------------------------------

    pub fn trip_path(&self) -> String {
        child_path("trips", &self.trip_id)
    }

    pub fn checklist_path(&self) -> String {
        format!("{}/checklist", self.trip_path())
    }

    pub fn checklist_item_path(&self, item_id: &str) -> String {
        child_path(&self.checklist_path(), item_id)
    }

    pub fn budget_path(&self) -> String {
        format!("{}/budget", self.trip_path())
    }

    pub fn expense_path(&self, expense_id: &str) -> String {
        child_path(&self.budget_path(), expense_id)
    }

    pub fn routes_path(&self) -> String {
        format!("{}/routes", self.trip_path())
    }

    pub fn route_path(&self, route_id: &str) -> String {
        child_path(&self.routes_path(), route_id)
    }

    pub fn locations_path(&self, route_id: &str) -> String {
        format!("{}/locations", self.route_path(route_id))
    }

    pub fn location_path(&self, route_id: &str, location_id: &str) -> String {
        child_path(&self.locations_path(route_id), location_id)
    }
}

/// Acquire an identity and build the shared session context.
///
/// Uses the provider's current identity when one exists, otherwise signs
/// in anonymously. A failed sign-in is logged and reported as
/// [`TripPlanError::Initialization`]; the caller owns the perpetual
/// "connecting" view that results.
pub fn bootstrap(
    store: Arc<dyn DocumentStore>,
    provider: &dyn IdentityProvider,
    trip_id: &str,
) -> Result<SessionContext> {
    if trip_id.is_empty() || trip_id.contains('/') {
        return Err(TripPlanError::Initialization {
            message: format!("'{}' is not a valid trip id", trip_id),
        });
    }

    let identity = match provider.current() {
        Some(identity) => identity,
        None => provider.sign_in_anonymously().map_err(|e| {
            error!("[Session] anonymous sign-in failed: {}", e);
            TripPlanError::Initialization {
                message: e.to_string(),
            }
        })?,
    };

    info!(
        "[Session] ready: user {} (anonymous: {}), trip '{}'",
        identity.user_id, identity.anonymous, trip_id
    );

    Ok(SessionContext {
        store,
        identity,
        trip_id: trip_id.to_string(),
    })
}
