use crate::context::{CallerContext, Permission};
use crate::entry::{
    compute_aggregates, derive_status, EntryDraft, EntryFilter, EntryPatch, EntryStatus,
    EntryType, FinancialEntry, LedgerAggregates, ORDER_SOURCE,
};
use crate::error::{FieldViolation, TesseraError};
use crate::normalize::sale_description;
use crate::store::LedgerStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a bulk expense deletion. Partial success is the contract: rows
/// that are not deletable are reported back, never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BulkDeleteOutcome {
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
}

/// Settlement event emitted by the sale pipeline; becomes a fully-paid
/// income entry carrying order provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub order_id: String,
    pub title: String,
    pub quantity: u32,
    pub amount_minor: u64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub related_party: Option<String>,
    pub event_id: Option<String>,
    pub owner_id: Option<String>,
    pub bank_account_id: Option<String>,
}

/// CRUD and compensating operations over the financial entry store.
///
/// Invariant handling:
/// - every write re-derives `status` through the single derivation rule;
/// - writes validate against the latest committed row (store-level CAS);
/// - income is never hard-deleted, only reverted; expenses are never
///   reverted, only deleted.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    pub async fn create_entry(
        &self,
        ctx: &CallerContext,
        draft: EntryDraft,
    ) -> Result<FinancialEntry, TesseraError> {
        ctx.require(Permission::ManageFinances)?;
        let violations = draft.validate();
        if !violations.is_empty() {
            return Err(TesseraError::Validation(violations));
        }
        let entry = FinancialEntry::from_draft(draft, Utc::now());
        self.store.insert(entry).await
    }

    pub async fn get_entry(&self, id: &str) -> Result<FinancialEntry, TesseraError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| TesseraError::not_found("financial entry", id))
    }

    pub async fn update_entry(
        &self,
        ctx: &CallerContext,
        id: &str,
        patch: EntryPatch,
    ) -> Result<FinancialEntry, TesseraError> {
        ctx.require(Permission::ManageFinances)?;
        let current = self.get_entry(id).await?;
        if current.is_cancelled() {
            return Err(TesseraError::InvalidOperation(format!(
                "entry '{id}' is cancelled and cannot be modified"
            )));
        }

        let mut updated = current.clone();
        if let Some(amount_minor) = patch.amount_minor {
            updated.amount_minor = amount_minor;
        }
        if let Some(amount_paid_minor) = patch.amount_paid_minor {
            updated.amount_paid_minor = amount_paid_minor;
        }
        if let Some(currency) = patch.currency {
            updated.currency = currency;
        }
        if let Some(description) = patch.description {
            updated.description = description;
        }
        if let Some(date) = patch.date {
            updated.date = date;
        }
        if let Some(due_date) = patch.due_date {
            updated.due_date = due_date;
        }
        if let Some(category) = patch.category {
            updated.category = category;
        }
        if let Some(payment_method) = patch.payment_method {
            updated.payment_method = payment_method;
        }
        if let Some(related_party) = patch.related_party {
            updated.related_party = related_party;
        }
        if let Some(notes) = patch.notes {
            updated.notes = notes;
        }
        if let Some(bank_account_id) = patch.bank_account_id {
            updated.bank_account_id = bank_account_id;
        }

        let violations = validate_resulting(&updated);
        if !violations.is_empty() {
            return Err(TesseraError::Validation(violations));
        }
        updated.status = derive_status(updated.amount_minor, updated.amount_paid_minor, false);

        let expected = patch.expected_updated_at.unwrap_or(current.updated_at);
        self.store.update(updated, expected).await
    }

    /// Explicit terminal cancellation; the only path into `Cancelled`.
    pub async fn cancel_entry(
        &self,
        ctx: &CallerContext,
        id: &str,
    ) -> Result<FinancialEntry, TesseraError> {
        ctx.require(Permission::ManageFinances)?;
        let current = self.get_entry(id).await?;
        if current.is_cancelled() {
            return Err(TesseraError::InvalidOperation(format!(
                "entry '{id}' is already cancelled"
            )));
        }
        let mut cancelled = current.clone();
        cancelled.status = EntryStatus::Cancelled;
        self.store.update(cancelled, current.updated_at).await
    }

    pub async fn delete_expense(
        &self,
        ctx: &CallerContext,
        id: &str,
    ) -> Result<(), TesseraError> {
        ctx.require(Permission::ManageFinances)?;
        let entry = self.get_entry(id).await?;
        if entry.entry_type != EntryType::Expense {
            return Err(TesseraError::InvalidOperation(format!(
                "entry '{id}' is income; only expenses can be deleted here - use revert for income"
            )));
        }
        if !self.store.delete(id).await? {
            return Err(TesseraError::not_found("financial entry", id));
        }
        Ok(())
    }

    /// Delete every deletable expense in `ids`, skipping the rest. Each row is
    /// deleted atomically; the batch as a whole is not all-or-nothing.
    pub async fn bulk_delete_expenses(
        &self,
        ctx: &CallerContext,
        ids: &[String],
    ) -> Result<BulkDeleteOutcome, TesseraError> {
        ctx.require(Permission::ManageFinances)?;
        let mut outcome = BulkDeleteOutcome::default();
        for id in ids {
            let deletable = matches!(
                self.store.get(id).await?,
                Some(entry) if entry.entry_type == EntryType::Expense
            );
            if deletable && self.store.delete(id).await? {
                outcome.deleted.push(id.clone());
            } else {
                outcome.skipped.push(id.clone());
            }
        }
        if !outcome.skipped.is_empty() {
            info!(
                caller = %ctx.caller_id,
                skipped = outcome.skipped.len(),
                deleted = outcome.deleted.len(),
                "bulk expense delete skipped non-deletable rows"
            );
        }
        Ok(outcome)
    }

    /// Undo a sale-to-ledger assignment without deleting the historical row:
    /// clears the order linkage and resets the settlement state. Idempotent.
    pub async fn revert_income_assignment(
        &self,
        ctx: &CallerContext,
        id: &str,
    ) -> Result<FinancialEntry, TesseraError> {
        ctx.require(Permission::ManageFinances)?;
        let current = self.get_entry(id).await?;
        if current.entry_type != EntryType::Income {
            return Err(TesseraError::InvalidOperation(format!(
                "entry '{id}' is an expense; only income assignments can be reverted"
            )));
        }
        if current.is_cancelled() {
            return Err(TesseraError::InvalidOperation(format!(
                "entry '{id}' is cancelled and cannot be reverted"
            )));
        }
        let mut reverted = current.clone();
        reverted.source_id = None;
        reverted.amount_paid_minor = 0;
        reverted.status = EntryStatus::Pending;
        self.store.update(reverted, current.updated_at).await
    }

    pub async fn record_sale(
        &self,
        ctx: &CallerContext,
        sale: SaleRecord,
    ) -> Result<FinancialEntry, TesseraError> {
        ctx.require(Permission::ManageFinances)?;
        let mut violations = Vec::new();
        if sale.order_id.trim().is_empty() {
            violations.push(FieldViolation::new("order_id", "must not be empty"));
        }
        if sale.quantity == 0 {
            violations.push(FieldViolation::new("quantity", "must be positive"));
        }
        if !violations.is_empty() {
            return Err(TesseraError::Validation(violations));
        }

        let mut draft = EntryDraft::income(
            sale.amount_minor,
            sale.currency,
            sale_description(&sale.title, sale.quantity, &sale.order_id),
        );
        draft.amount_paid_minor = sale.amount_minor;
        draft.source = Some(ORDER_SOURCE.to_string());
        draft.source_id = Some(sale.order_id);
        draft.category = Some("sales".to_string());
        draft.payment_method = sale.payment_method;
        draft.related_party = sale.related_party;
        draft.event_id = sale.event_id;
        draft.owner_id = sale.owner_id;
        draft.bank_account_id = sale.bank_account_id;

        let violations = draft.validate();
        if !violations.is_empty() {
            return Err(TesseraError::Validation(violations));
        }
        let entry = FinancialEntry::from_draft(draft, Utc::now());
        self.store.insert(entry).await
    }

    pub async fn list_entries(
        &self,
        ctx: &CallerContext,
        filter: &EntryFilter,
    ) -> Result<Vec<FinancialEntry>, TesseraError> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(TesseraError::validation(
                    "date_range",
                    "start date cannot be after end date",
                ));
            }
        }
        debug!(caller = %ctx.caller_id, "listing financial entries");
        self.store.list(filter).await
    }

    pub async fn summary(
        &self,
        ctx: &CallerContext,
        filter: &EntryFilter,
    ) -> Result<LedgerAggregates, TesseraError> {
        let entries = self.list_entries(ctx, filter).await?;
        Ok(compute_aggregates(&entries))
    }
}

/// Same validation as at creation, applied to the record an update would
/// produce.
fn validate_resulting(entry: &FinancialEntry) -> Vec<FieldViolation> {
    let mut draft = EntryDraft {
        entry_type: entry.entry_type,
        amount_minor: entry.amount_minor,
        amount_paid_minor: entry.amount_paid_minor,
        currency: entry.currency.clone(),
        description: entry.description.clone(),
        ..EntryDraft::default()
    };
    draft.date = Some(entry.date);
    draft.due_date = entry.due_date;
    draft.validate()
}
