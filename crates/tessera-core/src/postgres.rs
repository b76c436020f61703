use crate::entry::{EntryFilter, EntryStatus, EntryType, FinancialEntry};
use crate::error::TesseraError;
use crate::store::{LedgerStore, TicketStore};
use crate::ticket::{Ticket, TicketOwner, TicketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, QueryBuilder, Row};
use std::collections::HashMap;

pub async fn connect_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, TesseraError> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(database_url)
        .await
        .map_err(|e| TesseraError::Persistence(format!("postgres connect failed: {e}")))
}

fn persistence(context: &str, e: sqlx::Error) -> TesseraError {
    TesseraError::Persistence(format!("postgres {context} failed: {e}"))
}

fn map_insert_error(context: &str, conflict: String, e: sqlx::Error) -> TesseraError {
    if let sqlx::Error::Database(db) = &e {
        if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return TesseraError::Conflict(conflict);
        }
    }
    persistence(context, e)
}

fn entry_type_to_str(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Income => "income",
        EntryType::Expense => "expense",
    }
}

fn parse_entry_type(value: &str) -> Result<EntryType, TesseraError> {
    match value {
        "income" => Ok(EntryType::Income),
        "expense" => Ok(EntryType::Expense),
        other => Err(TesseraError::Persistence(format!(
            "unknown entry type '{other}' in postgres"
        ))),
    }
}

fn status_to_str(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Pending => "pending",
        EntryStatus::PartiallyPaid => "partially_paid",
        EntryStatus::Completed => "completed",
        EntryStatus::Cancelled => "cancelled",
    }
}

fn parse_status(value: &str) -> Result<EntryStatus, TesseraError> {
    match value {
        "pending" => Ok(EntryStatus::Pending),
        "partially_paid" => Ok(EntryStatus::PartiallyPaid),
        "completed" => Ok(EntryStatus::Completed),
        "cancelled" => Ok(EntryStatus::Cancelled),
        other => Err(TesseraError::Persistence(format!(
            "unknown entry status '{other}' in postgres"
        ))),
    }
}

fn ticket_status_to_str(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Issued => "issued",
        TicketStatus::Redeemed => "redeemed",
        TicketStatus::Void => "void",
    }
}

fn parse_ticket_status(value: &str) -> Result<TicketStatus, TesseraError> {
    match value {
        "issued" => Ok(TicketStatus::Issued),
        "redeemed" => Ok(TicketStatus::Redeemed),
        "void" => Ok(TicketStatus::Void),
        other => Err(TesseraError::Persistence(format!(
            "unknown ticket status '{other}' in postgres"
        ))),
    }
}

fn minor_to_db(amount_minor: u64, column: &str) -> Result<i64, TesseraError> {
    amount_minor.try_into().map_err(|_| {
        TesseraError::Persistence(format!("{column} exceeds postgres BIGINT range"))
    })
}

fn minor_from_db(value: i64, column: &str) -> Result<u64, TesseraError> {
    value.try_into().map_err(|_| {
        TesseraError::Persistence(format!("negative {column} in postgres"))
    })
}

fn decode_err(column: &str, e: sqlx::Error) -> TesseraError {
    TesseraError::Persistence(format!("postgres decode {column} failed: {e}"))
}

fn decode_entry(row: &PgRow) -> Result<FinancialEntry, TesseraError> {
    let get = |column: &'static str| move |e: sqlx::Error| decode_err(column, e);
    let entry_type: String = row.try_get("entry_type").map_err(get("entry_type"))?;
    let status: String = row.try_get("status").map_err(get("status"))?;
    let amount: i64 = row.try_get("amount_minor").map_err(get("amount_minor"))?;
    let paid: i64 = row
        .try_get("amount_paid_minor")
        .map_err(get("amount_paid_minor"))?;

    Ok(FinancialEntry {
        id: row.try_get("id").map_err(get("id"))?,
        entry_type: parse_entry_type(&entry_type)?,
        amount_minor: minor_from_db(amount, "amount_minor")?,
        amount_paid_minor: minor_from_db(paid, "amount_paid_minor")?,
        currency: row.try_get("currency").map_err(get("currency"))?,
        description: row.try_get("description").map_err(get("description"))?,
        status: parse_status(&status)?,
        date: row.try_get("entry_date").map_err(get("entry_date"))?,
        due_date: row.try_get("due_date").map_err(get("due_date"))?,
        category: row.try_get("category").map_err(get("category"))?,
        payment_method: row
            .try_get("payment_method")
            .map_err(get("payment_method"))?,
        related_party: row
            .try_get("related_party")
            .map_err(get("related_party"))?,
        notes: row.try_get("notes").map_err(get("notes"))?,
        source: row.try_get("source").map_err(get("source"))?,
        source_id: row.try_get("source_id").map_err(get("source_id"))?,
        bank_account_id: row
            .try_get("bank_account_id")
            .map_err(get("bank_account_id"))?,
        event_id: row.try_get("event_id").map_err(get("event_id"))?,
        owner_id: row.try_get("owner_id").map_err(get("owner_id"))?,
        created_at: row.try_get("created_at").map_err(get("created_at"))?,
        updated_at: row.try_get("updated_at").map_err(get("updated_at"))?,
    })
}

const ENTRY_COLUMNS: &str = "id, entry_type, amount_minor, amount_paid_minor, currency, \
     description, status, entry_date, due_date, category, payment_method, related_party, \
     notes, source, source_id, bank_account_id, event_id, owner_id, created_at, updated_at";

/// PostgreSQL-backed ledger store.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), TesseraError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tessera_financial_entries (
                id TEXT PRIMARY KEY,
                entry_type TEXT NOT NULL,
                amount_minor BIGINT NOT NULL,
                amount_paid_minor BIGINT NOT NULL,
                currency TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_date TIMESTAMPTZ NOT NULL,
                due_date TIMESTAMPTZ NULL,
                category TEXT NULL,
                payment_method TEXT NULL,
                related_party TEXT NULL,
                notes TEXT NULL,
                source TEXT NULL,
                source_id TEXT NULL,
                bank_account_id TEXT NULL,
                event_id TEXT NULL,
                owner_id TEXT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CONSTRAINT paid_within_amount CHECK (
                    amount_paid_minor >= 0 AND amount_paid_minor <= amount_minor
                )
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| persistence("schema create", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tessera_entries_provenance \
             ON tessera_financial_entries (source, source_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| persistence("index create", e))?;

        Ok(())
    }

    async fn insert_row(&self, entry: &FinancialEntry) -> Result<(), TesseraError> {
        sqlx::query(
            r#"
            INSERT INTO tessera_financial_entries (
                id, entry_type, amount_minor, amount_paid_minor, currency, description,
                status, entry_date, due_date, category, payment_method, related_party,
                notes, source, source_id, bank_account_id, event_id, owner_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20)
            "#,
        )
        .bind(&entry.id)
        .bind(entry_type_to_str(entry.entry_type))
        .bind(minor_to_db(entry.amount_minor, "amount_minor")?)
        .bind(minor_to_db(entry.amount_paid_minor, "amount_paid_minor")?)
        .bind(&entry.currency)
        .bind(&entry.description)
        .bind(status_to_str(entry.status))
        .bind(entry.date)
        .bind(entry.due_date)
        .bind(&entry.category)
        .bind(&entry.payment_method)
        .bind(&entry.related_party)
        .bind(&entry.notes)
        .bind(&entry.source)
        .bind(&entry.source_id)
        .bind(&entry.bank_account_id)
        .bind(&entry.event_id)
        .bind(&entry.owner_id)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_insert_error(
                "entry insert",
                format!("financial entry '{}' already exists", entry.id),
                e,
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert(&self, entry: FinancialEntry) -> Result<FinancialEntry, TesseraError> {
        self.insert_row(&entry).await?;
        Ok(entry)
    }

    async fn get(&self, id: &str) -> Result<Option<FinancialEntry>, TesseraError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM tessera_financial_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("entry load", e))?;

        row.as_ref().map(decode_entry).transpose()
    }

    async fn update(
        &self,
        mut entry: FinancialEntry,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<FinancialEntry, TesseraError> {
        entry.updated_at = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE tessera_financial_entries SET
                amount_minor = $1,
                amount_paid_minor = $2,
                currency = $3,
                description = $4,
                status = $5,
                entry_date = $6,
                due_date = $7,
                category = $8,
                payment_method = $9,
                related_party = $10,
                notes = $11,
                source = $12,
                source_id = $13,
                bank_account_id = $14,
                updated_at = $15
            WHERE id = $16 AND updated_at = $17
            "#,
        )
        .bind(minor_to_db(entry.amount_minor, "amount_minor")?)
        .bind(minor_to_db(entry.amount_paid_minor, "amount_paid_minor")?)
        .bind(&entry.currency)
        .bind(&entry.description)
        .bind(status_to_str(entry.status))
        .bind(entry.date)
        .bind(entry.due_date)
        .bind(&entry.category)
        .bind(&entry.payment_method)
        .bind(&entry.related_party)
        .bind(&entry.notes)
        .bind(&entry.source)
        .bind(&entry.source_id)
        .bind(&entry.bank_account_id)
        .bind(entry.updated_at)
        .bind(&entry.id)
        .bind(expected_updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| persistence("entry update", e))?;

        if result.rows_affected() == 0 {
            // Distinguish a vanished row from a stale token.
            return match self.get(&entry.id).await? {
                Some(_) => Err(TesseraError::Conflict(format!(
                    "financial entry '{}' was modified concurrently",
                    entry.id
                ))),
                None => Err(TesseraError::not_found("financial entry", &entry.id)),
            };
        }
        Ok(entry)
    }

    async fn delete(&self, id: &str) -> Result<bool, TesseraError> {
        let result = sqlx::query("DELETE FROM tessera_financial_entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| persistence("entry delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &EntryFilter) -> Result<Vec<FinancialEntry>, TesseraError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {ENTRY_COLUMNS} FROM tessera_financial_entries WHERE 1 = 1"
        ));
        if let Some(start) = filter.start_date {
            builder.push(" AND entry_date >= ");
            builder.push_bind(start);
        }
        if let Some(end) = filter.end_date {
            builder.push(" AND entry_date <= ");
            builder.push_bind(end);
        }
        if let Some(entry_type) = filter.entry_type {
            builder.push(" AND entry_type = ");
            builder.push_bind(entry_type_to_str(entry_type));
        }
        if let Some(category) = &filter.category {
            builder.push(" AND category = ");
            builder.push_bind(category);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            builder.push(" AND (description ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR category ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        builder.push(" ORDER BY entry_date DESC, id ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| persistence("entry list", e))?;
        rows.iter().map(decode_entry).collect()
    }

    async fn find_by_order(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Vec<FinancialEntry>, TesseraError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM tessera_financial_entries \
             WHERE source = $1 AND source_id = $2 ORDER BY created_at ASC"
        ))
        .bind(source)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("entry provenance load", e))?;
        rows.iter().map(decode_entry).collect()
    }

    async fn find_by_orders(
        &self,
        source: &str,
        source_ids: &[String],
    ) -> Result<HashMap<String, Vec<FinancialEntry>>, TesseraError> {
        if source_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM tessera_financial_entries \
             WHERE source = $1 AND source_id = ANY($2) ORDER BY created_at ASC"
        ))
        .bind(source)
        .bind(source_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("entry batch load", e))?;

        let mut grouped: HashMap<String, Vec<FinancialEntry>> = HashMap::new();
        for row in &rows {
            let entry = decode_entry(row)?;
            if let Some(source_id) = entry.source_id.clone() {
                grouped.entry(source_id).or_default().push(entry);
            }
        }
        Ok(grouped)
    }

    async fn latest_for_order(
        &self,
        source: &str,
        source_id: &str,
    ) -> Result<Option<FinancialEntry>, TesseraError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM tessera_financial_entries \
             WHERE source = $1 AND source_id = $2 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("entry latest load", e))?;
        row.as_ref().map(decode_entry).transpose()
    }
}

const TICKET_COLUMNS: &str = "id, order_id, owner_id, owner_email, owner_first_name, \
     owner_last_name, event_id, redemption_code, quantity, status, created_at";

fn decode_ticket(row: &PgRow) -> Result<Ticket, TesseraError> {
    let get = |column: &'static str| move |e: sqlx::Error| decode_err(column, e);
    let status: String = row.try_get("status").map_err(get("status"))?;
    let quantity: i32 = row.try_get("quantity").map_err(get("quantity"))?;

    Ok(Ticket {
        id: row.try_get("id").map_err(get("id"))?,
        order_id: row.try_get("order_id").map_err(get("order_id"))?,
        owner: TicketOwner {
            id: row.try_get("owner_id").map_err(get("owner_id"))?,
            email: row.try_get("owner_email").map_err(get("owner_email"))?,
            first_name: row
                .try_get("owner_first_name")
                .map_err(get("owner_first_name"))?,
            last_name: row
                .try_get("owner_last_name")
                .map_err(get("owner_last_name"))?,
        },
        event_id: row.try_get("event_id").map_err(get("event_id"))?,
        redemption_code: row
            .try_get("redemption_code")
            .map_err(get("redemption_code"))?,
        quantity: quantity
            .try_into()
            .map_err(|_| TesseraError::Persistence("negative quantity in postgres".to_string()))?,
        status: parse_ticket_status(&status)?,
        created_at: row.try_get("created_at").map_err(get("created_at"))?,
    })
}

/// PostgreSQL-backed ticket store.
#[derive(Debug, Clone)]
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), TesseraError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tessera_tickets (
                id TEXT PRIMARY KEY,
                order_id TEXT NULL,
                owner_id TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                owner_first_name TEXT NULL,
                owner_last_name TEXT NULL,
                event_id TEXT NOT NULL,
                redemption_code TEXT NOT NULL UNIQUE,
                quantity INT NOT NULL CHECK (quantity > 0),
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| persistence("ticket schema create", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tessera_tickets_order \
             ON tessera_tickets (order_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| persistence("ticket index create", e))?;

        Ok(())
    }
}

#[async_trait]
impl TicketStore for PostgresTicketStore {
    async fn insert(&self, ticket: Ticket) -> Result<Ticket, TesseraError> {
        let quantity: i32 = ticket.quantity.try_into().map_err(|_| {
            TesseraError::Persistence("ticket quantity exceeds postgres INT range".to_string())
        })?;
        sqlx::query(
            r#"
            INSERT INTO tessera_tickets (
                id, order_id, owner_id, owner_email, owner_first_name, owner_last_name,
                event_id, redemption_code, quantity, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.order_id)
        .bind(&ticket.owner.id)
        .bind(&ticket.owner.email)
        .bind(&ticket.owner.first_name)
        .bind(&ticket.owner.last_name)
        .bind(&ticket.event_id)
        .bind(&ticket.redemption_code)
        .bind(quantity)
        .bind(ticket_status_to_str(ticket.status))
        .bind(ticket.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_insert_error(
                "ticket insert",
                format!("redemption code '{}' already issued", ticket.redemption_code),
                e,
            )
        })?;
        Ok(ticket)
    }

    async fn get(&self, id: &str) -> Result<Option<Ticket>, TesseraError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tessera_tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("ticket load", e))?;
        row.as_ref().map(decode_ticket).transpose()
    }

    async fn find_by_code(&self, redemption_code: &str) -> Result<Option<Ticket>, TesseraError> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tessera_tickets WHERE redemption_code = $1"
        ))
        .bind(redemption_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| persistence("ticket code load", e))?;
        row.as_ref().map(decode_ticket).transpose()
    }

    async fn set_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, TesseraError> {
        let result = sqlx::query("UPDATE tessera_tickets SET status = $1 WHERE id = $2")
            .bind(ticket_status_to_str(status))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| persistence("ticket status update", e))?;
        if result.rows_affected() == 0 {
            return Err(TesseraError::not_found("ticket", id));
        }
        self.get(id)
            .await?
            .ok_or_else(|| TesseraError::not_found("ticket", id))
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Vec<Ticket>, TesseraError> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tessera_tickets \
             WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("ticket order load", e))?;
        rows.iter().map(decode_ticket).collect()
    }

    async fn find_by_orders(
        &self,
        order_ids: &[String],
    ) -> Result<HashMap<String, Vec<Ticket>>, TesseraError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tessera_tickets \
             WHERE order_id = ANY($1) ORDER BY created_at ASC"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("ticket batch load", e))?;

        let mut grouped: HashMap<String, Vec<Ticket>> = HashMap::new();
        for row in &rows {
            let ticket = decode_ticket(row)?;
            if let Some(order_id) = ticket.order_id.clone() {
                grouped.entry(order_id).or_default().push(ticket);
            }
        }
        Ok(grouped)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Ticket>, TesseraError> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tessera_tickets \
             WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence("ticket owner load", e))?;
        rows.iter().map(decode_ticket).collect()
    }

    async fn list_recent(
        &self,
        offset: u32,
        limit: u32,
        query: Option<&str>,
    ) -> Result<Vec<Ticket>, TesseraError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {TICKET_COLUMNS} FROM tessera_tickets WHERE 1 = 1"
        ));
        if let Some(query) = query {
            let pattern = format!("%{query}%");
            builder.push(" AND (order_id LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR owner_email ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR owner_first_name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR owner_last_name ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        builder.push(" ORDER BY created_at DESC, id ASC LIMIT ");
        builder.push_bind(i64::from(limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(offset));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| persistence("ticket list", e))?;
        rows.iter().map(decode_ticket).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_enum_strings_roundtrip() {
        for entry_type in [EntryType::Income, EntryType::Expense] {
            assert_eq!(
                parse_entry_type(entry_type_to_str(entry_type)).unwrap(),
                entry_type
            );
        }
        for status in [
            EntryStatus::Pending,
            EntryStatus::PartiallyPaid,
            EntryStatus::Completed,
            EntryStatus::Cancelled,
        ] {
            assert_eq!(parse_status(status_to_str(status)).unwrap(), status);
        }
        for status in [TicketStatus::Issued, TicketStatus::Redeemed, TicketStatus::Void] {
            assert_eq!(
                parse_ticket_status(ticket_status_to_str(status)).unwrap(),
                status
            );
        }
    }

    #[test]
    fn minor_conversions_guard_ranges() {
        assert_eq!(minor_to_db(45_000, "amount_minor").unwrap(), 45_000);
        assert!(minor_to_db(u64::MAX, "amount_minor").is_err());
        assert_eq!(minor_from_db(45_000, "amount_minor").unwrap(), 45_000);
        assert!(minor_from_db(-1, "amount_minor").is_err());
    }
}
