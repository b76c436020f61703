use crate::entry::{FinancialEntry, ORDER_SOURCE};
use crate::error::TesseraError;
use crate::normalize::{
    local_fallback_view, local_list_item, numeric_order_id, remote_list_item, remote_order_view,
    sort_list_items,
};
use crate::order::{
    GatewayError, OrderGateway, OrderListMode, OrderListPage, OrderListParams, OrderView,
    PageInfo, RemoteOrder, RemoteOrderPage, RemoteOrderQuery, RemoteSortKey, SortOrder,
};
use crate::store::{LedgerStore, TicketStore};
use crate::ticket::Ticket;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Tuning for the remote boundary. The timeout is mandatory: a degraded
/// remote must never stall the whole request.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub remote_timeout: Duration,
    pub default_page_size: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(3),
            default_page_size: 10,
        }
    }
}

/// Produces one consistent order view from the remote platform and the two
/// local stores.
///
/// Source priority is strict: the remote wins whenever it answers, because it
/// is the system of record for money actually captured. Local rows are
/// enrichment (tickets) or forensic fallback only. Remote failures degrade;
/// local store failures are fatal, since there is no further fallback.
#[derive(Clone)]
pub struct ReconciliationService {
    gateway: Arc<dyn OrderGateway>,
    ledger: Arc<dyn LedgerStore>,
    tickets: Arc<dyn TicketStore>,
    config: ReconcileConfig,
}

impl ReconciliationService {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        ledger: Arc<dyn LedgerStore>,
        tickets: Arc<dyn TicketStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            gateway,
            ledger,
            tickets,
            config,
        }
    }

    /// Resolve one order id into its single normalized view.
    pub async fn get_order_view(&self, order_id: &str) -> Result<OrderView, TesseraError> {
        let numeric = numeric_order_id(order_id).to_string();

        // The three reads are independent; joining them is purely a latency
        // optimization.
        let (remote, entries, tickets) = tokio::join!(
            self.fetch_remote_with_retry(&numeric),
            self.ledger.find_by_order(ORDER_SOURCE, &numeric),
            self.tickets.find_by_order(&numeric),
        );
        let entries = entries?;
        let tickets = tickets?;

        match remote {
            Ok(Some(order)) => Ok(remote_order_view(order, &tickets, !entries.is_empty())),
            Ok(None) => self.local_or_not_found(&numeric, entries, tickets),
            Err(err) => {
                warn!(order_id = %numeric, error = %err, "remote order fetch degraded, serving local data");
                self.local_or_not_found(&numeric, entries, tickets)
            }
        }
    }

    fn local_or_not_found(
        &self,
        numeric_id: &str,
        entries: Vec<FinancialEntry>,
        tickets: Vec<Ticket>,
    ) -> Result<OrderView, TesseraError> {
        if entries.is_empty() && tickets.is_empty() {
            return Err(TesseraError::not_found("order", numeric_id));
        }
        Ok(local_fallback_view(numeric_id, &entries, &tickets))
    }

    async fn fetch_remote_with_retry(
        &self,
        numeric_id: &str,
    ) -> Result<Option<RemoteOrder>, GatewayError> {
        let mut last_error = GatewayError::Transient("remote fetch never attempted".to_string());
        for attempt in 0..2u8 {
            match timeout(
                self.config.remote_timeout,
                self.gateway.fetch_order(numeric_id),
            )
            .await
            {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(err)) => {
                    warn!(order_id = %numeric_id, attempt, error = %err, "remote order fetch failed");
                    last_error = err;
                }
                Err(_) => {
                    warn!(order_id = %numeric_id, attempt, "remote order fetch timed out");
                    last_error = GatewayError::Transient(format!(
                        "timed out after {:?}",
                        self.config.remote_timeout
                    ));
                }
            }
        }
        Err(last_error)
    }

    /// Serve one of the two independently paginated listings. The modes are
    /// selected explicitly because their cursors are incompatible: the remote
    /// cursor is opaque, the local cursor is a row offset.
    pub async fn list_order_views(
        &self,
        mode: OrderListMode,
        params: &OrderListParams,
    ) -> Result<OrderListPage, TesseraError> {
        match mode {
            OrderListMode::Local => self.list_local(params).await,
            OrderListMode::Remote => self.list_remote(params).await,
        }
    }

    async fn list_remote(&self, params: &OrderListParams) -> Result<OrderListPage, TesseraError> {
        let first = params.first.unwrap_or(self.config.default_page_size);
        let (sort_key, client_sort) = match params.sort_by.as_deref() {
            Some(field) => match RemoteSortKey::from_field(field) {
                Some(key) => (key, None),
                // The remote cannot order by this field: fetch in default
                // order, sort client-side after.
                None => (RemoteSortKey::default(), Some(field.to_string())),
            },
            None => (RemoteSortKey::default(), None),
        };
        let query = RemoteOrderQuery {
            first,
            after: params.after.clone(),
            search: params.query.clone(),
            sort_key,
            reverse: params.sort_order == SortOrder::Asc,
        };

        let mut last_error = GatewayError::Transient("remote listing never attempted".to_string());
        for attempt in 0..2u8 {
            match timeout(self.config.remote_timeout, self.gateway.list_orders(&query)).await {
                Ok(Ok(page)) => {
                    return self
                        .attach_supplements(page, client_sort, params.sort_order)
                        .await;
                }
                Ok(Err(err)) => {
                    warn!(attempt, error = %err, "remote order listing failed");
                    last_error = err;
                }
                Err(_) => {
                    warn!(attempt, "remote order listing timed out");
                    last_error = GatewayError::Transient(format!(
                        "timed out after {:?}",
                        self.config.remote_timeout
                    ));
                }
            }
        }

        warn!(error = %last_error, "remote order listing degraded, serving local orders");
        self.list_local(params).await
    }

    async fn attach_supplements(
        &self,
        page: RemoteOrderPage,
        client_sort: Option<String>,
        sort_order: SortOrder,
    ) -> Result<OrderListPage, TesseraError> {
        let numeric_ids: Vec<String> = page
            .orders
            .iter()
            .map(|order| numeric_order_id(&order.id).to_string())
            .collect();

        let (entries_by_order, tickets_by_order) = tokio::join!(
            self.ledger.find_by_orders(ORDER_SOURCE, &numeric_ids),
            self.tickets.find_by_orders(&numeric_ids),
        );
        let entries_by_order = entries_by_order?;
        let tickets_by_order = tickets_by_order?;

        let mut items: Vec<_> = page
            .orders
            .into_iter()
            .map(|order| {
                let numeric = numeric_order_id(&order.id).to_string();
                let tickets = tickets_by_order
                    .get(&numeric)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                remote_list_item(order, tickets, entries_by_order.contains_key(&numeric))
            })
            .collect();

        if let Some(field) = client_sort {
            sort_list_items(&mut items, &field, sort_order);
        }

        Ok(OrderListPage {
            items,
            page_info: page.page_info,
        })
    }

    /// Offset-paginated listing over locally issued tickets grouped by order.
    async fn list_local(&self, params: &OrderListParams) -> Result<OrderListPage, TesseraError> {
        let first = params.first.unwrap_or(self.config.default_page_size);
        let offset: u32 = match params.after.as_deref() {
            Some(cursor) => cursor.parse().map_err(|_| {
                TesseraError::validation("after", "local cursor must be a numeric offset")
            })?,
            None => 0,
        };

        // One extra row decides has_next_page, mirroring the ticket window
        // this cursor actually walks.
        let tickets = self
            .tickets
            .list_recent(offset, first + 1, params.query.as_deref())
            .await?;
        let has_next_page = tickets.len() as u32 > first;

        let mut groups: Vec<(String, Vec<Ticket>)> = Vec::new();
        for ticket in tickets.into_iter().take(first as usize) {
            let Some(order_id) = ticket.order_id.clone() else {
                continue;
            };
            match groups.iter_mut().find(|(id, _)| *id == order_id) {
                Some((_, group)) => group.push(ticket),
                None => groups.push((order_id, vec![ticket])),
            }
        }

        let mut items = Vec::with_capacity(groups.len());
        for (order_id, group) in &groups {
            let latest_entry = self.ledger.latest_for_order(ORDER_SOURCE, order_id).await?;
            items.push(local_list_item(order_id, group, latest_entry.as_ref()));
        }
        items.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));

        let start_cursor = (!items.is_empty()).then(|| offset.to_string());
        let end_cursor = has_next_page.then(|| (offset + first).to_string());

        Ok(OrderListPage {
            items,
            page_info: PageInfo {
                has_next_page,
                has_previous_page: offset > 0,
                start_cursor,
                end_cursor,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryDraft;
    use crate::money::Money;
    use crate::order::{OrderSource, RemoteLineItem};
    use crate::store::{MemoryLedgerStore, MemoryTicketStore};
    use crate::ticket::{TicketDraft, TicketOwner};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dt(ts: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).single().unwrap()
    }

    fn fixture_remote_order(numeric_id: &str, total_minor: u64) -> RemoteOrder {
        RemoteOrder {
            id: crate::normalize::order_gid(numeric_id),
            name: format!("#{numeric_id}"),
            processed_at: dt(1_736_000_000),
            created_at: dt(1_735_900_000),
            updated_at: dt(1_736_100_000),
            financial_status: "PAID".to_string(),
            fulfillment_status: "FULFILLED".to_string(),
            currency: "USD".to_string(),
            total: Money::new(total_minor, "USD"),
            current_total: None,
            subtotal: None,
            total_tax: None,
            total_shipping: None,
            total_refunded: None,
            shipping_address: None,
            billing_address: None,
            customer: None,
            line_items: vec![RemoteLineItem {
                id: "li-1".to_string(),
                title: "Gallery print".to_string(),
                quantity: 1,
                unit_price: Some(Money::new(total_minor, "USD")),
            }],
            line_items_count: None,
        }
    }

    /// Serves a fixed set of orders and counts calls.
    struct FixtureGateway {
        orders: HashMap<String, RemoteOrder>,
        calls: AtomicUsize,
    }

    impl FixtureGateway {
        fn with_orders(orders: Vec<RemoteOrder>) -> Self {
            Self {
                orders: orders
                    .into_iter()
                    .map(|order| {
                        (numeric_order_id(&order.id).to_string(), order)
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self::with_orders(Vec::new())
        }
    }

    #[async_trait]
    impl OrderGateway for FixtureGateway {
        async fn fetch_order(
            &self,
            order_id: &str,
        ) -> Result<Option<RemoteOrder>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.orders.get(numeric_order_id(order_id)).cloned())
        }

        async fn list_orders(
            &self,
            _query: &RemoteOrderQuery,
        ) -> Result<RemoteOrderPage, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut orders: Vec<RemoteOrder> = self.orders.values().cloned().collect();
            orders.sort_by(|a, b| (b.processed_at, a.id.as_str()).cmp(&(a.processed_at, b.id.as_str())));
            Ok(RemoteOrderPage {
                orders,
                page_info: PageInfo::default(),
            })
        }
    }

    /// Always fails transiently, counting attempts.
    struct UnreachableGateway {
        calls: AtomicUsize,
    }

    impl UnreachableGateway {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderGateway for UnreachableGateway {
        async fn fetch_order(
            &self,
            _order_id: &str,
        ) -> Result<Option<RemoteOrder>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Transient("connection refused".to_string()))
        }

        async fn list_orders(
            &self,
            _query: &RemoteOrderQuery,
        ) -> Result<RemoteOrderPage, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Transient("connection refused".to_string()))
        }
    }

    /// Every store call fails, simulating a down database.
    struct FailingLedgerStore;

    #[async_trait]
    impl LedgerStore for FailingLedgerStore {
        async fn insert(&self, _entry: FinancialEntry) -> Result<FinancialEntry, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
        async fn get(&self, _id: &str) -> Result<Option<FinancialEntry>, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
        async fn update(
            &self,
            _entry: FinancialEntry,
            _expected_updated_at: chrono::DateTime<Utc>,
        ) -> Result<FinancialEntry, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
        async fn delete(&self, _id: &str) -> Result<bool, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
        async fn list(
            &self,
            _filter: &crate::entry::EntryFilter,
        ) -> Result<Vec<FinancialEntry>, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
        async fn find_by_order(
            &self,
            _source: &str,
            _source_id: &str,
        ) -> Result<Vec<FinancialEntry>, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
        async fn find_by_orders(
            &self,
            _source: &str,
            _source_ids: &[String],
        ) -> Result<HashMap<String, Vec<FinancialEntry>>, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
        async fn latest_for_order(
            &self,
            _source: &str,
            _source_id: &str,
        ) -> Result<Option<FinancialEntry>, TesseraError> {
            Err(TesseraError::Persistence("ledger store offline".to_string()))
        }
    }

    struct Fixture {
        ledger: Arc<MemoryLedgerStore>,
        tickets: Arc<MemoryTicketStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ledger: Arc::new(MemoryLedgerStore::new()),
                tickets: Arc::new(MemoryTicketStore::new()),
            }
        }

        async fn seed_paid_entry(&self, order_id: &str, amount_minor: u64) {
            let mut draft = EntryDraft::income(
                amount_minor,
                "USD",
                crate::normalize::sale_description("Gallery print", 1, order_id),
            );
            draft.amount_paid_minor = amount_minor;
            draft.source = Some(ORDER_SOURCE.to_string());
            draft.source_id = Some(order_id.to_string());
            self.ledger
                .insert(FinancialEntry::from_draft(draft, Utc::now()))
                .await
                .unwrap();
        }

        async fn seed_ticket(&self, order_id: &str, code: &str) {
            self.tickets
                .insert(
                    TicketDraft {
                        order_id: Some(order_id.to_string()),
                        owner: TicketOwner::new("user-1", "holder@example.com"),
                        event_id: "event-1".to_string(),
                        redemption_code: Some(code.to_string()),
                        quantity: 1,
                    }
                    .into_ticket(Utc::now()),
                )
                .await
                .unwrap();
        }

        fn service(&self, gateway: Arc<dyn OrderGateway>) -> ReconciliationService {
            ReconciliationService::new(
                gateway,
                self.ledger.clone(),
                self.tickets.clone(),
                ReconcileConfig {
                    remote_timeout: Duration::from_millis(200),
                    default_page_size: 10,
                },
            )
        }
    }

    #[tokio::test]
    async fn remote_wins_even_when_local_rows_exist() {
        let fixture = Fixture::new();
        fixture.seed_paid_entry("1001", 99_999).await;
        fixture.seed_ticket("1001", "qr-1").await;
        let service = fixture.service(Arc::new(FixtureGateway::with_orders(vec![
            fixture_remote_order("1001", 45_000),
        ])));

        let view = service.get_order_view("1001").await.unwrap();

        assert_eq!(view.source, OrderSource::Remote);
        // Local amounts never override remote totals.
        assert_eq!(view.total.amount_minor, 45_000);
        assert!(view.has_local_supplement);
        assert_eq!(view.tickets.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remote_not_found_falls_back_to_local_rows() {
        let fixture = Fixture::new();
        fixture.seed_paid_entry("2002", 50_000).await;
        let service = fixture.service(Arc::new(FixtureGateway::empty()));

        let view = service.get_order_view("2002").await.unwrap();

        assert_eq!(view.source, OrderSource::LocalFallback);
        assert_eq!(view.total.amount_minor, 50_000);
        assert_eq!(view.financial_status, "PAID");
    }

    #[tokio::test]
    async fn transient_failure_retries_once_then_falls_back() {
        let fixture = Fixture::new();
        fixture.seed_ticket("3003", "qr-1").await;
        let gateway = Arc::new(UnreachableGateway::new());
        let service = fixture.service(gateway.clone());

        let view = service.get_order_view("3003").await.unwrap();

        assert_eq!(view.source, OrderSource::LocalFallback);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_data_anywhere_is_not_found() {
        let fixture = Fixture::new();
        let service = fixture.service(Arc::new(FixtureGateway::empty()));

        let result = service.get_order_view("4004").await;
        assert!(matches!(result, Err(TesseraError::NotFound(_))));
    }

    #[tokio::test]
    async fn local_store_failure_is_fatal_even_with_remote_answer() {
        let fixture = Fixture::new();
        let service = ReconciliationService::new(
            Arc::new(FixtureGateway::with_orders(vec![fixture_remote_order(
                "1001", 45_000,
            )])),
            Arc::new(FailingLedgerStore),
            fixture.tickets.clone(),
            ReconcileConfig::default(),
        );

        let result = service.get_order_view("1001").await;
        assert!(matches!(result, Err(TesseraError::Persistence(_))));
    }

    #[tokio::test]
    async fn gid_and_numeric_ids_resolve_to_the_same_view() {
        let fixture = Fixture::new();
        let service = fixture.service(Arc::new(FixtureGateway::with_orders(vec![
            fixture_remote_order("1001", 45_000),
        ])));

        let by_numeric = service.get_order_view("1001").await.unwrap();
        let by_gid = service
            .get_order_view("gid://commerce/Order/1001")
            .await
            .unwrap();
        assert_eq!(by_numeric.id, by_gid.id);
        assert_eq!(by_numeric.total, by_gid.total);
    }

    #[tokio::test]
    async fn remote_listing_attaches_supplements() {
        let fixture = Fixture::new();
        fixture.seed_ticket("1001", "qr-1").await;
        fixture.seed_paid_entry("1001", 45_000).await;
        let service = fixture.service(Arc::new(FixtureGateway::with_orders(vec![
            fixture_remote_order("1001", 45_000),
            fixture_remote_order("5005", 10_000),
        ])));

        let page = service
            .list_order_views(OrderListMode::Remote, &OrderListParams::default())
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        let supplemented = page
            .items
            .iter()
            .find(|item| item.id.ends_with("/1001"))
            .unwrap();
        assert!(supplemented.has_local_supplement);
        assert_eq!(supplemented.source, OrderSource::Remote);
        let bare = page
            .items
            .iter()
            .find(|item| item.id.ends_with("/5005"))
            .unwrap();
        assert!(!bare.has_local_supplement);
        assert!(bare.tickets.is_none());
    }

    #[tokio::test]
    async fn remote_listing_degrades_to_local_orders() {
        let fixture = Fixture::new();
        fixture.seed_ticket("1001", "qr-1").await;
        fixture.seed_ticket("1001", "qr-2").await;
        fixture.seed_paid_entry("1001", 45_000).await;
        let service = fixture.service(Arc::new(UnreachableGateway::new()));

        let page = service
            .list_order_views(OrderListMode::Remote, &OrderListParams::default())
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert_eq!(item.source, OrderSource::LocalFallback);
        assert_eq!(item.line_items_count, 2);
        assert_eq!(item.total.amount_minor, 45_000);
    }

    #[tokio::test]
    async fn local_mode_never_touches_the_gateway() {
        let fixture = Fixture::new();
        fixture.seed_ticket("1001", "qr-1").await;
        let gateway = Arc::new(FixtureGateway::with_orders(vec![fixture_remote_order(
            "1001", 45_000,
        )]));
        let service = fixture.service(gateway.clone());

        let page = service
            .list_order_views(OrderListMode::Local, &OrderListParams::default())
            .await
            .unwrap();

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].source, OrderSource::LocalFallback);
    }

    #[tokio::test]
    async fn local_listing_paginates_by_offset() {
        let fixture = Fixture::new();
        for index in 0..3 {
            let order_id = format!("10{index}");
            fixture.seed_ticket(&order_id, &format!("qr-{index}")).await;
        }
        let service = fixture.service(Arc::new(FixtureGateway::empty()));

        let params = OrderListParams {
            first: Some(2),
            ..OrderListParams::default()
        };
        let first_page = service
            .list_order_views(OrderListMode::Local, &params)
            .await
            .unwrap();
        assert_eq!(first_page.items.len(), 2);
        assert!(first_page.page_info.has_next_page);
        assert!(!first_page.page_info.has_previous_page);

        let next = OrderListParams {
            first: Some(2),
            after: first_page.page_info.end_cursor.clone(),
            ..OrderListParams::default()
        };
        let second_page = service
            .list_order_views(OrderListMode::Local, &next)
            .await
            .unwrap();
        assert_eq!(second_page.items.len(), 1);
        assert!(second_page.page_info.has_previous_page);
        assert!(!second_page.page_info.has_next_page);
    }

    #[tokio::test]
    async fn unsupported_sort_field_is_applied_client_side() {
        let fixture = Fixture::new();
        let mut bigger = fixture_remote_order("1001", 45_000);
        bigger.line_items_count = Some(3);
        let mut smaller = fixture_remote_order("5005", 10_000);
        smaller.line_items_count = Some(1);
        // Remote default order would put 5005 first; the client-side sort
        // must override it.
        smaller.processed_at = bigger.processed_at + chrono::Duration::hours(1);
        let service = fixture.service(Arc::new(FixtureGateway::with_orders(vec![bigger, smaller])));

        let params = OrderListParams {
            sort_by: Some("line_items_count".to_string()),
            sort_order: SortOrder::Desc,
            ..OrderListParams::default()
        };
        let page = service
            .list_order_views(OrderListMode::Remote, &params)
            .await
            .unwrap();

        assert!(page.items[0].line_items_count >= page.items[1].line_items_count);
        assert!(page.items[0].id.ends_with("/1001"));
    }
}
