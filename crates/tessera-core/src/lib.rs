//! Hybrid order and financial reconciliation core.
//!
//! This crate produces a single consistent view of a commerce order and its
//! money flow: an authoritative-but-fallible remote order record merged with
//! the locally persisted financial ledger and fulfillment artifacts, under a
//! strict remote-wins source policy with local fallback.

#![deny(unsafe_code)]

pub mod context;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod money;
pub mod normalize;
pub mod order;
pub mod postgres;
pub mod recon;
pub mod store;
pub mod ticket;

pub use context::{CallerContext, Permission};
pub use entry::{
    compute_aggregates, derive_status, EntryDraft, EntryFilter, EntryPatch, EntryStatus,
    EntryType, FinancialEntry, LedgerAggregates, ORDER_SOURCE,
};
pub use error::{FieldViolation, TesseraError};
pub use ledger::{BulkDeleteOutcome, LedgerService, SaleRecord};
pub use money::{format_minor_decimal, parse_decimal_minor, Money, DEFAULT_CURRENCY};
pub use order::{
    Address, CustomerRef, GatewayError, LineItem, OrderGateway, OrderListItem, OrderListMode,
    OrderListPage, OrderListParams, OrderSource, OrderView, PageInfo, RemoteLineItem, RemoteOrder,
    RemoteOrderPage, RemoteOrderQuery, RemoteSortKey, SortOrder, TicketSummary,
};
pub use recon::{ReconcileConfig, ReconciliationService};
pub use store::{
    LedgerStore, MemoryLedgerStore, MemoryTicketStore, StorageConfig, Stores, TicketStore,
};
pub use ticket::{Ticket, TicketDraft, TicketOwner, TicketService, TicketStatus};
