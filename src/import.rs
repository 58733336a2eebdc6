//! JSON import.
//!
//! A single JSON document with optional top-level `checklist`, `budget`,
//! and `routes` keys (each route may embed a `locations` array) is turned
//! into one atomic batch of creates. Import appends to whatever the trip
//! already holds; it never deletes existing documents. A malformed file is
//! rejected up front with no partial state change.

use log::info;
use serde::Deserialize;

use crate::error::{Result, TripPlanError};
use crate::session::SessionContext;
use crate::store::{to_fields, WriteBatch};
use crate::{ChecklistItem, Expense, Location, Route};

/// Parsed import file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportData {
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub budget: Vec<Expense>,
    #[serde(default)]
    pub routes: Vec<ImportRoute>,
}

/// A route entry in an import file, with its embedded locations.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRoute {
    pub name: String,
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// What an import wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub checklist_items: usize,
    pub expenses: usize,
    pub routes: usize,
    pub locations: usize,
}

impl ImportData {
    /// Parse an import file.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TripPlanError::Parse {
            message: e.to_string(),
        })
    }
}

/// Build the atomic batch of creates for an import.
pub fn import_batch(ctx: &SessionContext, data: &ImportData) -> Result<(WriteBatch, ImportSummary)> {
    let mut batch = WriteBatch::new();
    let mut summary = ImportSummary::default();
    let store = ctx.store();

    for item in &data.checklist {
        let id = store.allocate_id();
        batch.set(ctx.checklist_item_path(&id), to_fields(item)?);
        summary.checklist_items += 1;
    }

    for expense in &data.budget {
        let id = store.allocate_id();
        batch.set(ctx.expense_path(&id), to_fields(expense)?);
        summary.expenses += 1;
    }

    for route in &data.routes {
        let route_id = store.allocate_id();
        let doc = Route {
            id: String::new(),
            name: route.name.clone(),
        };
        batch.set(ctx.route_path(&route_id), to_fields(&doc)?);
        summary.routes += 1;

        for location in &route.locations {
            let location_id = store.allocate_id();
            batch.set(
                ctx.location_path(&route_id, &location_id),
                to_fields(location)?,
            );
            summary.locations += 1;
        }
    }

    Ok((batch, summary))
}

/// Parse and commit an import file in one atomic batch.
pub fn import_json(ctx: &SessionContext, json: &str) -> Result<ImportSummary> {
    let data = ImportData::from_json(json)?;
    let (batch, summary) = import_batch(ctx, &data)?;
    ctx.store().commit_batch(batch)?;
    info!(
        "[Import] merged {} checklist items, {} expenses, {} routes, {} locations",
        summary.checklist_items, summary.expenses, summary.routes, summary.locations
    );
    Ok(summary)
}
