use crate::entry::{EntryFilter, FinancialEntry};
use crate::error::TesseraError;
use crate::postgres::{PostgresLedgerStore, PostgresTicketStore};
use crate::ticket::{Ticket, TicketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Local persistence backend selection: in-process memory for tests/dev,
/// PostgreSQL for deployments.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Memory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// The two local stores behind one bootstrap.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn LedgerStore>,
    pub tickets: Arc<dyn TicketStore>,
}

impl Stores {
    pub async fn bootstrap(config: StorageConfig) -> Result<Self, TesseraError> {
        match config {
            StorageConfig::Memory => Ok(Self {
                ledger: Arc::new(MemoryLedgerStore::new()),
                tickets: Arc::new(MemoryTicketStore::new()),
            }),
            StorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let pool =
                    crate::postgres::connect_pool(&database_url, max_connections).await?;
                let ledger = PostgresLedgerStore::new(pool.clone());
                ledger.ensure_schema().await?;
                let tickets = PostgresTicketStore::new(pool);
                tickets.ensure_schema().await?;
                Ok(Self {
                    ledger: Arc::new(ledger),
                    tickets: Arc::new(tickets),
                })
            }
        }
    }
}

/// Persistent table of financial entries.
///
/// Invariant handling: `update` is a compare-and-swap on the row's
/// `updated_at`, so two racing writers can never interleave into an
/// inconsistent (amount, paid, status) triple; the loser gets `Conflict`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert(&self, entry: FinancialEntry) -> Result<FinancialEntry, TesseraError>;

    async fn get(&self, id: &str) -> Result<Option<FinancialEntry>, TesseraError>;

    /// Persist `entry` if the stored row's `updated_at` still equals
    /// `expected_updated_at`; stamps a fresh `updated_at` on success.
    async fn update(
        &self,
        entry: FinancialEntry,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<FinancialEntry, TesseraError>;

    /// Hard delete. Returns whether a row existed.
    async fn delete(&self, id: &str) -> Result<bool, TesseraError>;

    async fn list(&self, filter: &EntryFilter) -> Result<Vec<FinancialEntry>, TesseraError>;

    async fn find_by_order(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Vec<FinancialEntry>, TesseraError>;

    /// Batch lookup keyed by `source_id`, for listing supplements.
    async fn find_by_orders(
        &self,
        source: &str,
        source_ids: &[String],
    ) -> Result<HashMap<String, Vec<FinancialEntry>>, TesseraError>;

    /// Most recently created entry for an order, if any.
    async fn latest_for_order(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<FinancialEntry>, TesseraError>;
}

/// Persistent table of issued fulfillment artifacts.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert(&self, ticket: Ticket) -> Result<Ticket, TesseraError>;

    async fn get(&self, id: &str) -> Result<Option<Ticket>, TesseraError>;

    async fn find_by_code(&self, redemption_code: &str) -> Result<Option<Ticket>, TesseraError>;

    async fn set_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, TesseraError>;

    async fn find_by_order(&self, order_id: &str) -> Result<Vec<Ticket>, TesseraError>;

    async fn find_by_orders(
        &self,
        order_ids: &[String],
    ) -> Result<HashMap<String, Vec<Ticket>>, TesseraError>;

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Ticket>, TesseraError>;

    /// Newest-first window over all tickets, optionally filtered by a free
    /// text query over order id and owner contact fields. Backs the
    /// offset-paginated local order listing.
    async fn list_recent(
        &self,
        offset: u32,
        limit: u32,
        query: Option<&str>,
    ) -> Result<Vec<Ticket>, TesseraError>;
}

/// In-process ledger store used by tests and the memory storage mode.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: RwLock<HashMap<String, FinancialEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(entry: &FinancialEntry, filter: &EntryFilter) -> bool {
    if let Some(start) = filter.start_date {
        if entry.date < start {
            return false;
        }
    }
    if let Some(end) = filter.end_date {
        if entry.date > end {
            return false;
        }
    }
    if let Some(entry_type) = filter.entry_type {
        if entry.entry_type != entry_type {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        if entry.category.as_deref() != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let in_description = entry.description.to_lowercase().contains(&needle);
        let in_category = entry
            .category
            .as_deref()
            .map(|c| c.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if !in_description && !in_category {
            return false;
        }
    }
    true
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert(&self, entry: FinancialEntry) -> Result<FinancialEntry, TesseraError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: &str) -> Result<Option<FinancialEntry>, TesseraError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn update(
        &self,
        mut entry: FinancialEntry,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<FinancialEntry, TesseraError> {
        let mut entries = self.entries.write().await;
        let current = entries
            .get(&entry.id)
            .ok_or_else(|| TesseraError::not_found("financial entry", &entry.id))?;
        if current.updated_at != expected_updated_at {
            return Err(TesseraError::Conflict(format!(
                "financial entry '{}' was modified concurrently",
                entry.id
            )));
        }
        entry.updated_at = Utc::now();
        entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn delete(&self, id: &str) -> Result<bool, TesseraError> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn list(&self, filter: &EntryFilter) -> Result<Vec<FinancialEntry>, TesseraError> {
        let entries = self.entries.read().await;
        let mut matched: Vec<FinancialEntry> = entries
            .values()
            .filter(|entry| matches_filter(entry, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| (b.date, a.id.as_str()).cmp(&(a.date, b.id.as_str())));
        Ok(matched)
    }

    async fn find_by_order(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Vec<FinancialEntry>, TesseraError> {
        let entries = self.entries.read().await;
        let mut matched: Vec<FinancialEntry> = entries
            .values()
            .filter(|entry| {
                entry.source.as_deref() == Some(source)
                    && entry.source_id.as_deref() == Some(source_id)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn find_by_orders(
        &self,
        source: &str,
        source_ids: &[String],
    ) -> Result<HashMap<String, Vec<FinancialEntry>>, TesseraError> {
        let mut grouped: HashMap<String, Vec<FinancialEntry>> = HashMap::new();
        for source_id in source_ids {
            let entries = self.find_by_order(source, source_id).await?;
            if !entries.is_empty() {
                grouped.insert(source_id.clone(), entries);
            }
        }
        Ok(grouped)
    }

    async fn latest_for_order(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<FinancialEntry>, TesseraError> {
        Ok(self
            .find_by_order(source, source_id)
            .await?
            .into_iter()
            .last())
    }
}

/// In-process ticket store used by tests and the memory storage mode.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: RwLock<HashMap<String, Ticket>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ticket_matches_query(ticket: &Ticket, query: &str) -> bool {
    let needle = query.to_lowercase();
    let order_hit = ticket
        .order_id
        .as_deref()
        .map(|id| id.contains(query))
        .unwrap_or(false);
    let owner = &ticket.owner;
    let owner_hit = owner.email.to_lowercase().contains(&needle)
        || owner
            .first_name
            .as_deref()
            .map(|n| n.to_lowercase().contains(&needle))
            .unwrap_or(false)
        || owner
            .last_name
            .as_deref()
            .map(|n| n.to_lowercase().contains(&needle))
            .unwrap_or(false);
    order_hit || owner_hit
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn insert(&self, ticket: Ticket) -> Result<Ticket, TesseraError> {
        let mut tickets = self.tickets.write().await;
        let duplicate = tickets
            .values()
            .any(|existing| existing.redemption_code == ticket.redemption_code);
        if duplicate {
            return Err(TesseraError::Conflict(format!(
                "redemption code '{}' already issued",
                ticket.redemption_code
            )));
        }
        tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(ticket)
    }

    async fn get(&self, id: &str) -> Result<Option<Ticket>, TesseraError> {
        Ok(self.tickets.read().await.get(id).cloned())
    }

    async fn find_by_code(&self, redemption_code: &str) -> Result<Option<Ticket>, TesseraError> {
        Ok(self
            .tickets
            .read()
            .await
            .values()
            .find(|ticket| ticket.redemption_code == redemption_code)
            .cloned())
    }

    async fn set_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, TesseraError> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(id)
            .ok_or_else(|| TesseraError::not_found("ticket", id))?;
        ticket.status = status;
        Ok(ticket.clone())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Vec<Ticket>, TesseraError> {
        let tickets = self.tickets.read().await;
        let mut matched: Vec<Ticket> = tickets
            .values()
            .filter(|ticket| ticket.order_id.as_deref() == Some(order_id))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn find_by_orders(
        &self,
        order_ids: &[String],
    ) -> Result<HashMap<String, Vec<Ticket>>, TesseraError> {
        let mut grouped: HashMap<String, Vec<Ticket>> = HashMap::new();
        for order_id in order_ids {
            let tickets = self.find_by_order(order_id).await?;
            if !tickets.is_empty() {
                grouped.insert(order_id.clone(), tickets);
            }
        }
        Ok(grouped)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Ticket>, TesseraError> {
        let tickets = self.tickets.read().await;
        let mut matched: Vec<Ticket> = tickets
            .values()
            .filter(|ticket| ticket.owner.id == owner_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn list_recent(
        &self,
        offset: u32,
        limit: u32,
        query: Option<&str>,
    ) -> Result<Vec<Ticket>, TesseraError> {
        let tickets = self.tickets.read().await;
        let mut matched: Vec<Ticket> = tickets
            .values()
            .filter(|ticket| query.map(|q| ticket_matches_query(ticket, q)).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by(|a, b| (b.created_at, a.id.as_str()).cmp(&(a.created_at, b.id.as_str())));
        Ok(matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryDraft, ORDER_SOURCE};
    use crate::ticket::{TicketDraft, TicketOwner};

    fn draft_ticket(order_id: &str, code: &str) -> Ticket {
        TicketDraft {
            order_id: Some(order_id.to_string()),
            owner: TicketOwner::new("user-1", "holder@example.com"),
            event_id: "event-1".to_string(),
            redemption_code: Some(code.to_string()),
            quantity: 1,
        }
        .into_ticket(Utc::now())
    }

    #[tokio::test]
    async fn update_rejects_stale_writers() {
        let store = MemoryLedgerStore::new();
        let entry = FinancialEntry::from_draft(
            EntryDraft::income(10_000, "USD", "deposit"),
            Utc::now(),
        );
        let stored = store.insert(entry).await.unwrap();

        let mut first = stored.clone();
        first.amount_paid_minor = 4_000;
        let committed = store.update(first, stored.updated_at).await.unwrap();

        // Second writer still holds the original token.
        let mut second = stored.clone();
        second.amount_paid_minor = 9_000;
        let result = store.update(second, stored.updated_at).await;
        assert!(matches!(result, Err(TesseraError::Conflict(_))));

        let current = store.get(&committed.id).await.unwrap().unwrap();
        assert_eq!(current.amount_paid_minor, 4_000);
    }

    #[tokio::test]
    async fn find_by_order_matches_provenance_pair() {
        let store = MemoryLedgerStore::new();
        let mut draft = EntryDraft::income(5_000, "USD", "sale");
        draft.source = Some(ORDER_SOURCE.to_string());
        draft.source_id = Some("1001".to_string());
        store
            .insert(FinancialEntry::from_draft(draft, Utc::now()))
            .await
            .unwrap();
        store
            .insert(FinancialEntry::from_draft(
                EntryDraft::income(7_000, "USD", "unrelated"),
                Utc::now(),
            ))
            .await
            .unwrap();

        let matched = store.find_by_order(ORDER_SOURCE, "1001").await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].amount_minor, 5_000);
        assert!(store
            .find_by_order("other_source", "1001")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn duplicate_redemption_codes_are_rejected() {
        let store = MemoryTicketStore::new();
        store.insert(draft_ticket("1001", "qr-1")).await.unwrap();
        let result = store.insert(draft_ticket("1002", "qr-1")).await;
        assert!(matches!(result, Err(TesseraError::Conflict(_))));
    }

    #[tokio::test]
    async fn list_recent_paginates_newest_first() {
        let store = MemoryTicketStore::new();
        for index in 0..5i64 {
            let mut ticket = draft_ticket("1001", &format!("qr-{index}"));
            ticket.created_at = Utc::now() + chrono::Duration::seconds(index);
            store.insert(ticket).await.unwrap();
        }

        let first_page = store.list_recent(0, 2, None).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].redemption_code, "qr-4");

        let second_page = store.list_recent(2, 2, None).await.unwrap();
        assert_eq!(second_page[0].redemption_code, "qr-2");
    }
}
