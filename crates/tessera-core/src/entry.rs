use crate::error::FieldViolation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance tag for ledger rows created from a storefront order.
pub const ORDER_SOURCE: &str = "storefront_order";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Income,
    Expense,
}

impl Default for EntryType {
    fn default() -> Self {
        Self::Expense
    }
}

/// Stored-but-derived entry status. `Cancelled` is terminal and only ever set
/// explicitly; every other value is a function of (amount, paid).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    PartiallyPaid,
    Completed,
    Cancelled,
}

/// The single status derivation rule used by every write path.
pub fn derive_status(amount_minor: u64, amount_paid_minor: u64, explicit_cancel: bool) -> EntryStatus {
    if explicit_cancel {
        EntryStatus::Cancelled
    } else if amount_paid_minor == 0 {
        EntryStatus::Pending
    } else if amount_paid_minor < amount_minor {
        EntryStatus::PartiallyPaid
    } else {
        EntryStatus::Completed
    }
}

/// One ledger movement. `amount_minor` is the total obligation,
/// `amount_paid_minor` what has actually settled against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinancialEntry {
    pub id: String,
    pub entry_type: EntryType,
    pub amount_minor: u64,
    pub amount_paid_minor: u64,
    pub currency: String,
    pub description: String,
    pub status: EntryStatus,
    pub date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub related_party: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub bank_account_id: Option<String>,
    pub event_id: Option<String>,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinancialEntry {
    /// Materialize a validated draft into a fresh row. Status comes from the
    /// derivation rule unless the draft explicitly cancels.
    pub fn from_draft(draft: EntryDraft, now: DateTime<Utc>) -> Self {
        let status = derive_status(
            draft.amount_minor,
            draft.amount_paid_minor,
            draft.cancelled,
        );
        Self {
            id: Uuid::new_v4().to_string(),
            entry_type: draft.entry_type,
            amount_minor: draft.amount_minor,
            amount_paid_minor: draft.amount_paid_minor,
            currency: draft.currency,
            description: draft.description,
            status,
            date: draft.date.unwrap_or(now),
            due_date: draft.due_date,
            category: draft.category,
            payment_method: draft.payment_method,
            related_party: draft.related_party,
            notes: draft.notes,
            source: draft.source,
            source_id: draft.source_id,
            bank_account_id: draft.bank_account_id,
            event_id: draft.event_id,
            owner_id: draft.owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == EntryStatus::Cancelled
    }
}

/// Caller-supplied input for a new entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntryDraft {
    pub entry_type: EntryType,
    pub amount_minor: u64,
    #[serde(default)]
    pub amount_paid_minor: u64,
    pub currency: String,
    pub description: String,
    pub date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub related_party: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub bank_account_id: Option<String>,
    pub event_id: Option<String>,
    pub owner_id: Option<String>,
    /// Explicit terminal cancellation at creation; bypasses status derivation.
    #[serde(default)]
    pub cancelled: bool,
}

impl EntryDraft {
    pub fn income(amount_minor: u64, currency: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Income,
            amount_minor,
            currency: currency.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn expense(amount_minor: u64, currency: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Expense,
            amount_minor,
            currency: currency.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    /// All violations at once, so the caller can surface every broken field.
    pub fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if self.amount_minor == 0 {
            violations.push(FieldViolation::new(
                "amount_minor",
                "must be greater than zero",
            ));
        }
        if self.amount_paid_minor > self.amount_minor {
            violations.push(FieldViolation::new(
                "amount_paid_minor",
                "cannot exceed amount_minor",
            ));
        }
        if self.description.trim().is_empty() {
            violations.push(FieldViolation::new("description", "must not be empty"));
        }
        if self.currency.trim().is_empty() {
            violations.push(FieldViolation::new("currency", "must not be empty"));
        }
        if let (Some(date), Some(due_date)) = (self.date, self.due_date) {
            if due_date < date {
                violations.push(FieldViolation::new(
                    "due_date",
                    "must not be earlier than date",
                ));
            }
        }
        violations
    }
}

/// Partial update. `None` leaves a field untouched; `expected_updated_at`
/// carries the optimistic-concurrency token the caller last observed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntryPatch {
    pub amount_minor: Option<u64>,
    pub amount_paid_minor: Option<u64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub category: Option<Option<String>>,
    pub payment_method: Option<Option<String>>,
    pub related_party: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub bank_account_id: Option<Option<String>>,
    pub expected_updated_at: Option<DateTime<Utc>>,
}

/// Listing filter for the admin finance views.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub entry_type: Option<EntryType>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Aggregate totals over a set of entries, all in minor units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerAggregates {
    pub total_income_minor: u64,
    pub total_expense_minor: u64,
    pub paid_income_minor: u64,
    pub paid_expense_minor: u64,
    pub pending_income_minor: u64,
    pub pending_expense_minor: u64,
    pub net_balance_minor: i64,
}

/// Pure aggregate over an in-memory set; stable under any input ordering.
pub fn compute_aggregates(entries: &[FinancialEntry]) -> LedgerAggregates {
    let mut aggregates = LedgerAggregates::default();
    for entry in entries {
        match entry.entry_type {
            EntryType::Income => {
                aggregates.total_income_minor += entry.amount_minor;
                aggregates.paid_income_minor += entry.amount_paid_minor;
            }
            EntryType::Expense => {
                aggregates.total_expense_minor += entry.amount_minor;
                aggregates.paid_expense_minor += entry.amount_paid_minor;
            }
        }
    }
    aggregates.pending_income_minor = aggregates.total_income_minor - aggregates.paid_income_minor;
    aggregates.pending_expense_minor =
        aggregates.total_expense_minor - aggregates.paid_expense_minor;
    aggregates.net_balance_minor =
        aggregates.total_income_minor as i64 - aggregates.total_expense_minor as i64;
    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_derivation_covers_every_band() {
        assert_eq!(derive_status(1_000, 0, false), EntryStatus::Pending);
        assert_eq!(derive_status(1_000, 1, false), EntryStatus::PartiallyPaid);
        assert_eq!(derive_status(1_000, 999, false), EntryStatus::PartiallyPaid);
        assert_eq!(derive_status(1_000, 1_000, false), EntryStatus::Completed);
        assert_eq!(derive_status(1_000, 0, true), EntryStatus::Cancelled);
        assert_eq!(derive_status(1_000, 1_000, true), EntryStatus::Cancelled);
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut draft = EntryDraft::income(0, "", "");
        draft.amount_paid_minor = 10;

        let violations = draft.validate();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"amount_minor"));
        assert!(fields.contains(&"amount_paid_minor"));
        assert!(fields.contains(&"description"));
        assert!(fields.contains(&"currency"));
    }

    #[test]
    fn overpaid_draft_names_amount_paid() {
        let mut draft = EntryDraft::income(10_000, "USD", "deposit");
        draft.amount_paid_minor = 15_000;

        let violations = draft.validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "amount_paid_minor");
    }

    #[test]
    fn due_date_checked_only_when_both_present() {
        let now = Utc::now();
        let mut draft = EntryDraft::expense(5_000, "USD", "venue rental");
        draft.due_date = Some(now - chrono::Duration::days(1));
        assert!(draft.validate().is_empty());

        draft.date = Some(now);
        let violations = draft.validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "due_date");
    }

    #[test]
    fn aggregates_match_worked_example() {
        let now = Utc::now();
        let mut income = EntryDraft::income(100_000, "USD", "ticket sales");
        income.amount_paid_minor = 60_000;
        let mut expense = EntryDraft::expense(30_000, "USD", "catering");
        expense.amount_paid_minor = 30_000;

        let entries = vec![
            FinancialEntry::from_draft(income, now),
            FinancialEntry::from_draft(expense, now),
        ];

        let aggregates = compute_aggregates(&entries);
        assert_eq!(aggregates.total_income_minor, 100_000);
        assert_eq!(aggregates.paid_income_minor, 60_000);
        assert_eq!(aggregates.pending_income_minor, 40_000);
        assert_eq!(aggregates.total_expense_minor, 30_000);
        assert_eq!(aggregates.pending_expense_minor, 0);
        assert_eq!(aggregates.net_balance_minor, 70_000);
    }

    #[test]
    fn aggregates_are_order_insensitive() {
        let now = Utc::now();
        let mut entries = vec![
            FinancialEntry::from_draft(EntryDraft::income(1_000, "USD", "a"), now),
            FinancialEntry::from_draft(EntryDraft::expense(2_500, "USD", "b"), now),
            FinancialEntry::from_draft(EntryDraft::income(9_900, "USD", "c"), now),
        ];

        let forward = compute_aggregates(&entries);
        entries.reverse();
        assert_eq!(compute_aggregates(&entries), forward);
    }
}
