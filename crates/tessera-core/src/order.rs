use crate::money::Money;
use crate::ticket::TicketStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an order view was assembled from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OrderSource {
    Remote,
    LocalFallback,
}

/// Postal address as the remote platform reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Address {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerRef {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Ticket fields attached to an order view; a projection of the stored row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketSummary {
    pub id: String,
    pub event_id: String,
    pub redemption_code: String,
    pub status: TicketStatus,
    pub quantity: u32,
}

/// Normalized single-order projection. Never persisted; exactly one view
/// exists per order identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderView {
    pub id: String,
    pub name: String,
    pub processed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub financial_status: String,
    pub fulfillment_status: String,
    pub currency: String,
    pub subtotal: Money,
    pub total: Money,
    pub total_tax: Money,
    pub total_shipping: Money,
    pub total_refunded: Money,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub customer: Option<CustomerRef>,
    pub line_items: Vec<LineItem>,
    pub tickets: Option<Vec<TicketSummary>>,
    pub source: OrderSource,
    pub has_local_supplement: bool,
}

/// One row of an order listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderListItem {
    pub id: String,
    pub name: String,
    pub processed_at: DateTime<Utc>,
    pub financial_status: String,
    pub fulfillment_status: String,
    pub total: Money,
    pub customer: Option<CustomerRef>,
    pub line_items_count: u32,
    pub source: OrderSource,
    pub has_local_supplement: bool,
    pub tickets: Option<Vec<TicketSummary>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderListPage {
    pub items: Vec<OrderListItem>,
    pub page_info: PageInfo,
}

/// Which of the two independently paginated read paths to serve.
///
/// The remote listing uses opaque cursors, the local listing offset cursors;
/// the two cannot be interleaved into one stable stream, so the caller picks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderListMode {
    #[default]
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing request shared by both modes.
#[derive(Debug, Clone, Default)]
pub struct OrderListParams {
    pub first: Option<u32>,
    pub after: Option<String>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

/// Sort keys the remote listing API accepts natively. Anything else is
/// applied as a client-side stable sort after fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteSortKey {
    Number,
    #[default]
    ProcessedAt,
    TotalPrice,
    CreatedAt,
    UpdatedAt,
    Id,
    Relevance,
}

impl RemoteSortKey {
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "name" => Some(Self::Number),
            "processed_at" => Some(Self::ProcessedAt),
            "total" => Some(Self::TotalPrice),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "id" => Some(Self::Id),
            "relevance" => Some(Self::Relevance),
            _ => None,
        }
    }
}

/// Authoritative order record as fetched from the remote commerce platform,
/// already normalized into typed money by the gateway implementation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteOrder {
    pub id: String,
    pub name: String,
    pub processed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub financial_status: String,
    pub fulfillment_status: String,
    pub currency: String,
    pub total: Money,
    /// Post-refund/edit total; preferred over `total` when present.
    pub current_total: Option<Money>,
    pub subtotal: Option<Money>,
    pub total_tax: Option<Money>,
    pub total_shipping: Option<Money>,
    pub total_refunded: Option<Money>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub customer: Option<CustomerRef>,
    pub line_items: Vec<RemoteLineItem>,
    /// Listing payloads carry a count without the items themselves.
    pub line_items_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteLineItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Option<Money>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteOrderQuery {
    pub first: u32,
    pub after: Option<String>,
    pub search: Option<String>,
    pub sort_key: RemoteSortKey,
    pub reverse: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteOrderPage {
    pub orders: Vec<RemoteOrder>,
    pub page_info: PageInfo,
}

/// Failures a gateway implementation can report. The reconciliation service
/// recovers both kinds by falling back to local data; the split exists so
/// degradation logs say what actually happened.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("remote platform unreachable: {0}")]
    Transient(String),

    #[error("remote platform protocol error: {0}")]
    Protocol(String),
}

/// Fallible client for the remote commerce platform's order records.
///
/// `fetch_order` returning `Ok(None)` is the remote's authoritative answer
/// that the order does not exist there; errors mean "unavailable".
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<RemoteOrder>, GatewayError>;

    async fn list_orders(&self, query: &RemoteOrderQuery) -> Result<RemoteOrderPage, GatewayError>;
}
