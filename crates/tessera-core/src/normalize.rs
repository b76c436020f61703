use crate::entry::FinancialEntry;
use crate::money::{Money, DEFAULT_CURRENCY};
use crate::order::{
    CustomerRef, LineItem, OrderListItem, OrderSource, OrderView, RemoteOrder, SortOrder,
    TicketSummary,
};
use crate::ticket::Ticket;
use chrono::Utc;

/// Opaque order id prefix used by the remote platform's Admin API.
pub const ORDER_GID_PREFIX: &str = "gid://commerce/Order/";

/// Financial status reported for local-fallback views. A ledger row only
/// exists post-settlement in this flow, so local orders are paid by
/// convention.
pub const LOCAL_FINANCIAL_STATUS: &str = "PAID";
pub const LOCAL_FULFILLMENT_STATUS: &str = "UNFULFILLED";

const SALE_PREFIX: &str = "Sale of ";
const SALE_QTY_MARKER: &str = " (qty ";
const SALE_ORDER_MARKER: &str = " - order #";

/// Strip the platform GID wrapper, if present. The bare numeric form is the
/// join key shared with the local stores.
pub fn numeric_order_id(order_id: &str) -> &str {
    order_id.strip_prefix(ORDER_GID_PREFIX).unwrap_or(order_id)
}

pub fn order_gid(numeric_id: &str) -> String {
    format!("{ORDER_GID_PREFIX}{numeric_id}")
}

/// Boilerplate description written by the settlement pipeline for sale-created
/// income entries. `strip_sale_boilerplate` undoes exactly this shape.
pub fn sale_description(title: &str, quantity: u32, order_number: &str) -> String {
    format!("{SALE_PREFIX}{title}{SALE_QTY_MARKER}{quantity}){SALE_ORDER_MARKER}{order_number}")
}

/// Recover a display title from a sale entry description.
pub fn strip_sale_boilerplate(description: &str) -> String {
    let without_prefix = description.strip_prefix(SALE_PREFIX).unwrap_or(description);
    let end = without_prefix
        .find(SALE_QTY_MARKER)
        .or_else(|| without_prefix.find(SALE_ORDER_MARKER))
        .unwrap_or(without_prefix.len());
    without_prefix[..end].to_string()
}

pub fn ticket_summaries(tickets: &[Ticket]) -> Vec<TicketSummary> {
    tickets
        .iter()
        .map(|ticket| TicketSummary {
            id: ticket.id.clone(),
            event_id: ticket.event_id.clone(),
            redemption_code: ticket.redemption_code.clone(),
            status: ticket.status,
            quantity: ticket.quantity,
        })
        .collect()
}

fn attach(tickets: &[Ticket]) -> Option<Vec<TicketSummary>> {
    if tickets.is_empty() {
        None
    } else {
        Some(ticket_summaries(tickets))
    }
}

fn customer_from_ticket(tickets: &[Ticket]) -> Option<CustomerRef> {
    tickets.first().map(|ticket| CustomerRef {
        id: ticket.owner.id.clone(),
        email: Some(ticket.owner.email.clone()),
        first_name: ticket.owner.first_name.clone(),
        last_name: ticket.owner.last_name.clone(),
    })
}

/// Build the single-order view from an authoritative remote record.
///
/// Every field the remote owns comes from the remote, absent ones included;
/// local rows are attached as supplements, never merged in.
pub fn remote_order_view(
    order: RemoteOrder,
    tickets: &[Ticket],
    has_local_entries: bool,
) -> OrderView {
    let currency = order.currency.clone();
    let zero = Money::zero(currency.clone());
    let has_local_supplement = has_local_entries || !tickets.is_empty();
    let subtotal = order.subtotal.unwrap_or_else(|| order.total.clone());
    let total = order.current_total.unwrap_or_else(|| order.total.clone());
    let line_currency = currency.clone();
    let line_items = order
        .line_items
        .into_iter()
        .map(|item| LineItem {
            unit_price: item
                .unit_price
                .unwrap_or_else(|| Money::zero(line_currency.clone())),
            id: item.id,
            title: item.title,
            quantity: item.quantity,
        })
        .collect();

    OrderView {
        id: order.id,
        name: order.name,
        processed_at: order.processed_at,
        created_at: order.created_at,
        updated_at: order.updated_at,
        financial_status: order.financial_status,
        fulfillment_status: order.fulfillment_status,
        currency,
        subtotal,
        total,
        total_tax: order.total_tax.unwrap_or_else(|| zero.clone()),
        total_shipping: order.total_shipping.unwrap_or_else(|| zero.clone()),
        total_refunded: order.total_refunded.unwrap_or(zero),
        shipping_address: order.shipping_address,
        billing_address: order.billing_address,
        customer: order.customer,
        line_items,
        tickets: attach(tickets),
        source: OrderSource::Remote,
        has_local_supplement,
    }
}

/// Synthesize the single-order view purely from local rows. Callers must
/// guarantee at least one entry or ticket exists.
pub fn local_fallback_view(
    numeric_id: &str,
    entries: &[FinancialEntry],
    tickets: &[Ticket],
) -> OrderView {
    let now = Utc::now();
    let first_entry = entries.first();
    let first_ticket = tickets.first();
    let currency = first_entry
        .map(|entry| entry.currency.clone())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let total_minor: u64 = entries.iter().map(|entry| entry.amount_minor).sum();
    let total = Money::new(total_minor, currency.clone());

    let line_items = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| LineItem {
            id: format!("local-{numeric_id}-{index}"),
            title: strip_sale_boilerplate(&entry.description),
            quantity: 1,
            unit_price: Money::new(entry.amount_minor, entry.currency.clone()),
        })
        .collect();

    OrderView {
        id: order_gid(numeric_id),
        name: format!("#{numeric_id}"),
        processed_at: first_ticket
            .map(|ticket| ticket.created_at)
            .or_else(|| first_entry.map(|entry| entry.date))
            .unwrap_or(now),
        created_at: first_entry
            .map(|entry| entry.created_at)
            .or_else(|| first_ticket.map(|ticket| ticket.created_at))
            .unwrap_or(now),
        updated_at: first_entry
            .map(|entry| entry.updated_at)
            .or_else(|| first_ticket.map(|ticket| ticket.created_at))
            .unwrap_or(now),
        financial_status: LOCAL_FINANCIAL_STATUS.to_string(),
        fulfillment_status: LOCAL_FULFILLMENT_STATUS.to_string(),
        currency: currency.clone(),
        subtotal: total.clone(),
        total,
        total_tax: Money::zero(currency.clone()),
        total_shipping: Money::zero(currency.clone()),
        total_refunded: Money::zero(currency),
        shipping_address: None,
        billing_address: None,
        customer: customer_from_ticket(tickets),
        line_items,
        tickets: Some(ticket_summaries(tickets)),
        source: OrderSource::LocalFallback,
        has_local_supplement: true,
    }
}

/// One remote listing row plus its local supplements.
pub fn remote_list_item(
    order: RemoteOrder,
    tickets: &[Ticket],
    has_local_entries: bool,
) -> OrderListItem {
    let line_items_count = order
        .line_items_count
        .unwrap_or(order.line_items.len() as u32);
    let total = order.current_total.unwrap_or(order.total);

    OrderListItem {
        id: order.id,
        name: order.name,
        processed_at: order.processed_at,
        financial_status: order.financial_status,
        fulfillment_status: order.fulfillment_status,
        total,
        customer: order.customer,
        line_items_count,
        source: OrderSource::Remote,
        has_local_supplement: has_local_entries || !tickets.is_empty(),
        tickets: attach(tickets),
    }
}

/// One local listing row: a ticket group joined to its latest ledger entry.
pub fn local_list_item(
    numeric_id: &str,
    tickets: &[Ticket],
    latest_entry: Option<&FinancialEntry>,
) -> OrderListItem {
    let total = latest_entry
        .map(|entry| Money::new(entry.amount_minor, entry.currency.clone()))
        .unwrap_or_else(|| Money::zero(DEFAULT_CURRENCY));

    OrderListItem {
        id: order_gid(numeric_id),
        name: format!("#{numeric_id}"),
        processed_at: tickets
            .first()
            .map(|ticket| ticket.created_at)
            .unwrap_or_else(Utc::now),
        financial_status: LOCAL_FINANCIAL_STATUS.to_string(),
        fulfillment_status: LOCAL_FULFILLMENT_STATUS.to_string(),
        total,
        customer: customer_from_ticket(tickets),
        line_items_count: tickets.len() as u32,
        source: OrderSource::LocalFallback,
        has_local_supplement: true,
        tickets: Some(ticket_summaries(tickets)),
    }
}

/// Stable client-side sort for fields the remote listing API cannot order by.
/// Unknown fields leave the remote ordering untouched.
pub fn sort_list_items(items: &mut [OrderListItem], field: &str, order: SortOrder) {
    let compare: fn(&OrderListItem, &OrderListItem) -> std::cmp::Ordering = match field {
        "financial_status" => {
            |a: &OrderListItem, b: &OrderListItem| a.financial_status.cmp(&b.financial_status)
        }
        "fulfillment_status" => {
            |a: &OrderListItem, b: &OrderListItem| a.fulfillment_status.cmp(&b.fulfillment_status)
        }
        "line_items_count" => {
            |a: &OrderListItem, b: &OrderListItem| a.line_items_count.cmp(&b.line_items_count)
        }
        "customer_email" => |a: &OrderListItem, b: &OrderListItem| {
            let email = |item: &OrderListItem| {
                item.customer
                    .as_ref()
                    .and_then(|customer| customer.email.clone())
            };
            email(a).cmp(&email(b))
        },
        _ => return,
    };
    match order {
        SortOrder::Asc => items.sort_by(compare),
        SortOrder::Desc => items.sort_by(|a, b| compare(b, a)),
    }
}
