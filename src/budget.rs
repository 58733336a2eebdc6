//! Budget synchronizer.
//!
//! Mirrors the `trips/{tripId}/budget` collection and owns the expense
//! lifecycle: validated adds, staged edits committed atomically, deletes,
//! and the derived spending totals. Edit widgets produce text, so amounts
//! arrive as strings and are coerced to numbers here before anything is
//! persisted.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{OptionExt, Result, TripPlanError};
use crate::notice::NoticeQueue;
use crate::planner::{EventSink, SyncEvent};
use crate::session::SessionContext;
use crate::store::{from_fields, to_fields, Document, WatchHandle};
use crate::{Expense, ExpenseCategory};

/// A staged, fully-local copy of one expense being edited.
///
/// The amount stays text until commit, exactly the way it sits in the edit
/// widget; all fields are written back in one update.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseDraft {
    pub id: String,
    pub description: String,
    pub amount: String,
    pub category: ExpenseCategory,
}

/// Derived spending values, recomputed on every read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetSummary {
    pub total_spent: f64,
    pub per_person: f64,
}

/// Synchronizer for expenses.
pub struct BudgetSync {
    ctx: SessionContext,
    state: Arc<Mutex<BudgetState>>,
    events: EventSink,
    notices: NoticeQueue,
}

#[derive(Default)]
struct BudgetState {
    expenses: Vec<Expense>,
    editing: Option<ExpenseDraft>,
    watch: Option<WatchHandle>,
    started: bool,
}

fn decode_expenses(docs: Vec<Document>) -> Vec<Expense> {
    docs.into_iter()
        .filter_map(|doc| match from_fields::<Expense>(&doc.data) {
            Ok(mut expense) => {
                expense.id = doc.id;
                Some(expense)
            }
            Err(e) => {
                warn!("[BudgetSync] skipping undecodable expense '{}': {}", doc.id, e);
                None
            }
        })
        .collect()
}

fn parse_amount(text: &str) -> Option<f64> {
    let parsed: f64 = text.trim().parse().ok()?;
    if parsed.is_finite() {
        Some(parsed)
    } else {
        None
    }
}

impl BudgetSync {
    pub(crate) fn new(ctx: SessionContext, events: EventSink, notices: NoticeQueue) -> Self {
        Self {
            ctx,
            state: Arc::new(Mutex::new(BudgetState::default())),
            events,
            notices,
        }
    }

    /// Open the live subscription to the budget collection.
    pub fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        let events = Arc::clone(&self.events);

        let handle = self.ctx.store().watch_collection(
            &self.ctx.budget_path(),
            Arc::new(move |docs| {
                state.lock().unwrap().expenses = decode_expenses(docs);
                events(SyncEvent::BudgetChanged);
            }),
        )?;

        let mut state = self.state.lock().unwrap();
        state.watch = Some(handle);
        state.started = true;
        Ok(())
    }

    /// Add a new expense.
    ///
    /// Description and amount must both be non-empty and the amount must be
    /// numeric; otherwise a validation notice is posted and nothing is
    /// written.
    pub fn add(&self, description: &str, amount: &str, category: ExpenseCategory) -> Result<()> {
        if !self.is_started() {
            debug!("[BudgetSync] add ignored, subscription not started");
            return Ok(());
        }

        if description.trim().is_empty() || amount.trim().is_empty() {
            self.notices.push("An expense needs a description and an amount.");
            return Err(TripPlanError::Validation {
                message: "description and amount are required".to_string(),
            });
        }
        let amount = match parse_amount(amount) {
            Some(amount) => amount,
            None => {
                self.notices.push("An expense needs a description and an amount.");
                return Err(TripPlanError::Validation {
                    message: format!("'{}' is not a valid amount", amount),
                });
            }
        };

        let expense = Expense {
            id: String::new(),
            description: description.trim().to_string(),
            amount,
            category,
        };
        self.ctx
            .store()
            .add_document(&self.ctx.budget_path(), to_fields(&expense)?)?;
        self.notices.push("Expense added.");
        Ok(())
    }

    /// Stage a full local copy of one expense for editing.
    pub fn begin_edit(&self, expense_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let expense = state
            .expenses
            .iter()
            .find(|e| e.id == expense_id)
            .cloned()
            .ok_or_not_found(&self.ctx.expense_path(expense_id))?;

        state.editing = Some(ExpenseDraft {
            id: expense.id,
            description: expense.description,
            amount: expense.amount.to_string(),
            category: expense.category,
        });
        Ok(())
    }

    /// The staged draft, if an edit is in progress.
    pub fn draft(&self) -> Option<ExpenseDraft> {
        self.state.lock().unwrap().editing.clone()
    }

    /// Replace the staged draft (the edit form writes back through this).
    pub fn stage_draft(&self, draft: ExpenseDraft) {
        self.state.lock().unwrap().editing = Some(draft);
    }

    /// Commit the staged draft: coerce the amount and update every field
    /// atomically. Clears the staging area on success.
    pub fn commit_edit(&self) -> Result<()> {
        let draft = {
            let state = self.state.lock().unwrap();
            state
                .editing
                .clone()
                .ok_or_validation("no expense edit in progress")?
        };

        let amount = match parse_amount(&draft.amount) {
            Some(amount) => amount,
            None => {
                self.notices.push("The amount must be a number.");
                return Err(TripPlanError::Validation {
                    message: format!("'{}' is not a valid amount", draft.amount),
                });
            }
        };

        let expense = Expense {
            id: String::new(),
            description: draft.description.clone(),
            amount,
            category: draft.category,
        };
        self.ctx
            .store()
            .update_document(&self.ctx.expense_path(&draft.id), to_fields(&expense)?)?;

        self.state.lock().unwrap().editing = None;
        self.notices.push("Expense updated.");
        Ok(())
    }

    /// Abandon the staged draft.
    pub fn cancel_edit(&self) {
        self.state.lock().unwrap().editing = None;
    }

    /// Delete an expense.
    pub fn remove(&self, expense_id: &str) -> Result<()> {
        if !self.is_started() {
            debug!("[BudgetSync] remove ignored, subscription not started");
            return Ok(());
        }

        self.ctx
            .store()
            .delete_document(&self.ctx.expense_path(expense_id))?;
        self.notices.push("Expense deleted.");
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

    /// The mirrored expenses.
    pub fn expenses(&self) -> Vec<Expense> {
        self.state.lock().unwrap().expenses.clone()
    }

    /// Sum of all expense amounts; 0 for an empty collection.
    pub fn total_spent(&self) -> f64 {
        self.state
            .lock()
            .unwrap()
            .expenses
            .iter()
            .map(|e| e.amount)
            .sum()
    }

    /// Derived totals for a given participant count.
    ///
    /// A non-positive participant count divides by 1 instead, so the
    /// per-person figure never blows up on fresh or malformed trip data.
    pub fn summary(&self, participants: i64) -> BudgetSummary {
        let total_spent = self.total_spent();
        let denominator = if participants <= 0 { 1 } else { participants };
        BudgetSummary {
            total_spent,
            per_person: total_spent / denominator as f64,
        }
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
    use crate::store::DocumentStore;

    fn sync_with_store() -> (BudgetSync, Arc<MemoryStore>, NoticeQueue) {
        let store = Arc::new(MemoryStore::new());
        let ctx = bootstrap(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            &AnonymousAuth::new(),
            "demo",
        )
        .unwrap();
        let notices = NoticeQueue::new();
        let sync = BudgetSync::new(ctx, Arc::new(|_| {}), notices.clone());
        (sync, store, notices)
    }

    #[test]
    fn test_add_and_totals() {
        let (sync, _store, _notices) = sync_with_store();
        sync.start().unwrap();

        assert_eq!(sync.total_spent(), 0.0);

        sync.add("Flights", "1200", ExpenseCategory::Flights).unwrap();
        sync.add("Hotel", "800.50", ExpenseCategory::Lodging).unwrap();

        assert_eq!(sync.expenses().len(), 2);
        assert!((sync.total_spent() - 2000.5).abs() < 1e-9);
    }

    #[test]
    fn test_add_validation_posts_notice_and_writes_nothing() {
        let (sync, store, notices) = sync_with_store();
        sync.start().unwrap();

        assert!(sync.add("", "100", ExpenseCategory::Other).is_err());
        assert!(sync.add("Dinner", "", ExpenseCategory::Food).is_err());
        assert!(sync.add("Dinner", "lots", ExpenseCategory::Food).is_err());

        assert_eq!(store.document_count(), 0);
        assert_eq!(notices.len(), 3);
    }

    #[test]
    fn test_staged_edit_commits_all_fields() {
        let (sync, _store, _notices) = sync_with_store();
        sync.start().unwrap();

        sync.add("Dinner", "40", ExpenseCategory::Food).unwrap();
        let id = sync.expenses()[0].id.clone();

        sync.begin_edit(&id).unwrap();
        let mut draft = sync.draft().unwrap();
        assert_eq!(draft.amount, "40");

        draft.description = "Team dinner".to_string();
        draft.amount = "55.25".to_string();
        draft.category = ExpenseCategory::Other;
        sync.stage_draft(draft);

        sync.commit_edit().unwrap();
        assert!(sync.draft().is_none());

        let expense = &sync.expenses()[0];
        assert_eq!(expense.description, "Team dinner");
        assert!((expense.amount - 55.25).abs() < 1e-9);
        assert_eq!(expense.category, ExpenseCategory::Other);
    }

    #[test]
    fn test_commit_edit_rejects_non_numeric_amount() {
        let (sync, _store, _notices) = sync_with_store();
        sync.start().unwrap();

        sync.add("Dinner", "40", ExpenseCategory::Food).unwrap();
        let id = sync.expenses()[0].id.clone();

        sync.begin_edit(&id).unwrap();
        let mut draft = sync.draft().unwrap();
        draft.amount = "a lot".to_string();
        sync.stage_draft(draft);

        assert!(sync.commit_edit().is_err());
        // The store still has the original value, and the draft survives
        // for the user to fix.
        assert!((sync.expenses()[0].amount - 40.0).abs() < 1e-9);
        assert!(sync.draft().is_some());
    }

    #[test]
    fn test_cancel_edit() {
        let (sync, _store, _notices) = sync_with_store();
        sync.start().unwrap();

        sync.add("Dinner", "40", ExpenseCategory::Food).unwrap();
        let id = sync.expenses()[0].id.clone();

        sync.begin_edit(&id).unwrap();
        sync.cancel_edit();
        assert!(sync.draft().is_none());
    }

    #[test]
    fn test_remove() {
        let (sync, _store, _notices) = sync_with_store();
        sync.start().unwrap();

        sync.add("Dinner", "40", ExpenseCategory::Food).unwrap();
        let id = sync.expenses()[0].id.clone();
        sync.remove(&id).unwrap();

        assert!(sync.expenses().is_empty());
        assert_eq!(sync.total_spent(), 0.0);
    }

    #[test]
    fn test_summary_guards_participant_count() {
        let (sync, _store, _notices) = sync_with_store();
        sync.start().unwrap();

        sync.add("Flights", "900", ExpenseCategory::Flights).unwrap();

        assert_eq!(sync.summary(3).per_person, 300.0);
        // Non-positive participant counts divide by 1.
        assert_eq!(sync.summary(0).per_person, 900.0);
        assert_eq!(sync.summary(-2).per_person, 900.0);
    }

    #[test]
    fn test_begin_edit_unknown_expense() {
        let (sync, _store, _notices) = sync_with_store();
        sync.start().unwrap();

        let err = sync.begin_edit("missing").unwrap_err();
        assert!(matches!(err, TripPlanError::NotFound { .. }));
    }
}
