use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tessera_core::normalize::{numeric_order_id, order_gid};
use tessera_core::{
    parse_decimal_minor, Address, CustomerRef, GatewayError, Money, OrderGateway, PageInfo,
    RemoteLineItem, RemoteOrder, RemoteOrderPage, RemoteOrderQuery,
};
use tracing::debug;

const ACCESS_TOKEN_HEADER: &str = "X-Admin-Access-Token";

const ORDER_BY_ID_QUERY: &str = r#"
query OrderById($id: ID!) {
  order(id: $id) {
    id
    name
    processedAt
    createdAt
    updatedAt
    displayFinancialStatus
    displayFulfillmentStatus
    currencyCode
    totalPriceSet { shopMoney { amount currencyCode } }
    currentTotalPriceSet { shopMoney { amount currencyCode } }
    subtotalPriceSet { shopMoney { amount currencyCode } }
    totalTaxSet { shopMoney { amount currencyCode } }
    totalShippingPriceSet { shopMoney { amount currencyCode } }
    totalRefundedSet { shopMoney { amount currencyCode } }
    shippingAddress { firstName lastName address1 address2 city province country zip phone }
    billingAddress { firstName lastName address1 address2 city province country zip phone }
    customer { id email firstName lastName }
    lineItems(first: 50) {
      edges {
        node {
          id
          title
          quantity
          originalUnitPriceSet { shopMoney { amount currencyCode } }
        }
      }
    }
  }
}
"#;

const ORDERS_QUERY: &str = r#"
query Orders($first: Int!, $after: String, $query: String, $sortKey: OrderSortKeys, $reverse: Boolean) {
  orders(first: $first, after: $after, query: $query, sortKey: $sortKey, reverse: $reverse) {
    edges {
      node {
        id
        name
        processedAt
        createdAt
        updatedAt
        displayFinancialStatus
        displayFulfillmentStatus
        currencyCode
        totalPriceSet { shopMoney { amount currencyCode } }
        currentTotalPriceSet { shopMoney { amount currencyCode } }
        customer { id email firstName lastName }
        lineItemsCount
      }
    }
    pageInfo { hasNextPage hasPreviousPage startCursor endCursor }
  }
}
"#;

/// Connection settings for the platform's GraphQL Admin API.
#[derive(Debug, Clone)]
pub struct AdminApiConfig {
    pub endpoint: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl AdminApiConfig {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(3),
        }
    }
}

/// GraphQL Admin API client for the remote commerce platform.
///
/// Network-level failures and 5xx/429 responses are reported as `Transient`
/// so the reconciliation layer degrades to local data; malformed payloads are
/// `Protocol` errors.
pub struct AdminApiGateway {
    client: Client,
    config: AdminApiConfig,
}

impl AdminApiGateway {
    pub fn new(config: AdminApiConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Protocol(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header(ACCESS_TOKEN_HEADER, &self.config.access_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(GatewayError::Transient(format!(
                "remote admin API returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::Protocol(format!(
                "remote admin API returned {status}"
            )));
        }

        let envelope: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(format!("invalid admin API payload: {e}")))?;

        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                let messages: Vec<String> =
                    errors.into_iter().map(|error| error.message).collect();
                return Err(GatewayError::Protocol(format!(
                    "admin API errors: {}",
                    messages.join("; ")
                )));
            }
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::Protocol("admin API response missing data".to_string()))
    }
}

#[async_trait]
impl OrderGateway for AdminApiGateway {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<RemoteOrder>, GatewayError> {
        let gid = order_gid(numeric_order_id(order_id));
        debug!(order_id = %gid, "fetching order from admin API");
        let data: OrderByIdData = self
            .execute(ORDER_BY_ID_QUERY, json!({ "id": gid }))
            .await?;
        data.order.map(RemoteOrder::try_from).transpose()
    }

    async fn list_orders(&self, query: &RemoteOrderQuery) -> Result<RemoteOrderPage, GatewayError> {
        let variables = json!({
            "first": query.first,
            "after": query.after,
            "query": query.search,
            "sortKey": query.sort_key,
            "reverse": query.reverse,
        });
        let data: OrdersData = self.execute(ORDERS_QUERY, variables).await?;

        let orders = data
            .orders
            .edges
            .into_iter()
            .map(|edge| RemoteOrder::try_from(edge.node))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RemoteOrderPage {
            orders,
            page_info: data.orders.page_info.into(),
        })
    }
}

fn classify_request_error(e: reqwest::Error) -> GatewayError {
    if e.is_decode() {
        GatewayError::Protocol(format!("invalid admin API payload: {e}"))
    } else {
        GatewayError::Transient(format!("admin API request failed: {e}"))
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OrderByIdData {
    order: Option<OrderDto>,
}

#[derive(Debug, Deserialize)]
struct OrdersData {
    orders: OrdersConnectionDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrdersConnectionDto {
    edges: Vec<OrderEdgeDto>,
    page_info: PageInfoDto,
}

#[derive(Debug, Deserialize)]
struct OrderEdgeDto {
    node: OrderDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfoDto {
    has_next_page: bool,
    #[serde(default)]
    has_previous_page: bool,
    #[serde(default)]
    start_cursor: Option<String>,
    #[serde(default)]
    end_cursor: Option<String>,
}

impl From<PageInfoDto> for PageInfo {
    fn from(dto: PageInfoDto) -> Self {
        Self {
            has_next_page: dto.has_next_page,
            has_previous_page: dto.has_previous_page,
            start_cursor: dto.start_cursor,
            end_cursor: dto.end_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoneyDto {
    amount: String,
    currency_code: String,
}

impl MoneyDto {
    fn to_money(&self) -> Result<Money, GatewayError> {
        let amount_minor = parse_decimal_minor(&self.amount)
            .map_err(|e| GatewayError::Protocol(e.to_string()))?;
        Ok(Money::new(amount_minor, self.currency_code.clone()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoneyBagDto {
    shop_money: MoneyDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressDto {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    address1: Option<String>,
    #[serde(default)]
    address2: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    province: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

impl From<AddressDto> for Address {
    fn from(dto: AddressDto) -> Self {
        Self {
            first_name: dto.first_name,
            last_name: dto.last_name,
            address1: dto.address1,
            address2: dto.address2,
            city: dto.city,
            province: dto.province,
            country: dto.country,
            zip: dto.zip,
            phone: dto.phone,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerDto {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl From<CustomerDto> for CustomerRef {
    fn from(dto: CustomerDto) -> Self {
        Self {
            id: dto.id,
            email: dto.email,
            first_name: dto.first_name,
            last_name: dto.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemNodeDto {
    id: String,
    title: String,
    quantity: u32,
    #[serde(default)]
    original_unit_price_set: Option<MoneyBagDto>,
}

#[derive(Debug, Deserialize)]
struct LineItemEdgeDto {
    node: LineItemNodeDto,
}

#[derive(Debug, Deserialize)]
struct LineItemsDto {
    edges: Vec<LineItemEdgeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDto {
    id: String,
    name: String,
    processed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    display_financial_status: String,
    display_fulfillment_status: String,
    currency_code: String,
    total_price_set: MoneyBagDto,
    #[serde(default)]
    current_total_price_set: Option<MoneyBagDto>,
    #[serde(default)]
    subtotal_price_set: Option<MoneyBagDto>,
    #[serde(default)]
    total_tax_set: Option<MoneyBagDto>,
    #[serde(default)]
    total_shipping_price_set: Option<MoneyBagDto>,
    #[serde(default)]
    total_refunded_set: Option<MoneyBagDto>,
    #[serde(default)]
    shipping_address: Option<AddressDto>,
    #[serde(default)]
    billing_address: Option<AddressDto>,
    #[serde(default)]
    customer: Option<CustomerDto>,
    #[serde(default)]
    line_items: Option<LineItemsDto>,
    #[serde(default)]
    line_items_count: Option<u32>,
}

impl TryFrom<OrderDto> for RemoteOrder {
    type Error = GatewayError;

    fn try_from(dto: OrderDto) -> Result<Self, Self::Error> {
        let optional_money = |bag: &Option<MoneyBagDto>| -> Result<Option<Money>, GatewayError> {
            bag.as_ref().map(|bag| bag.shop_money.to_money()).transpose()
        };

        let line_items = dto
            .line_items
            .map(|items| {
                items
                    .edges
                    .into_iter()
                    .map(|edge| {
                        let unit_price = edge
                            .node
                            .original_unit_price_set
                            .as_ref()
                            .map(|bag| bag.shop_money.to_money())
                            .transpose()?;
                        Ok(RemoteLineItem {
                            id: edge.node.id,
                            title: edge.node.title,
                            quantity: edge.node.quantity,
                            unit_price,
                        })
                    })
                    .collect::<Result<Vec<_>, GatewayError>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(RemoteOrder {
            total: dto.total_price_set.shop_money.to_money()?,
            current_total: optional_money(&dto.current_total_price_set)?,
            subtotal: optional_money(&dto.subtotal_price_set)?,
            total_tax: optional_money(&dto.total_tax_set)?,
            total_shipping: optional_money(&dto.total_shipping_price_set)?,
            total_refunded: optional_money(&dto.total_refunded_set)?,
            id: dto.id,
            name: dto.name,
            processed_at: dto.processed_at,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
            financial_status: dto.display_financial_status,
            fulfillment_status: dto.display_fulfillment_status,
            currency: dto.currency_code,
            shipping_address: dto.shipping_address.map(Address::from),
            billing_address: dto.billing_address.map(Address::from),
            customer: dto.customer.map(CustomerRef::from),
            line_items,
            line_items_count: dto.line_items_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_JSON: &str = r##"
    {
        "id": "gid://commerce/Order/1001",
        "name": "#1001",
        "processedAt": "2025-01-04T12:00:00Z",
        "createdAt": "2025-01-04T11:58:00Z",
        "updatedAt": "2025-01-05T09:30:00Z",
        "displayFinancialStatus": "PAID",
        "displayFulfillmentStatus": "FULFILLED",
        "currencyCode": "USD",
        "totalPriceSet": { "shopMoney": { "amount": "450.00", "currencyCode": "USD" } },
        "currentTotalPriceSet": { "shopMoney": { "amount": "430.00", "currencyCode": "USD" } },
        "customer": { "id": "gid://commerce/Customer/7", "email": "buyer@example.com" },
        "lineItems": {
            "edges": [
                {
                    "node": {
                        "id": "gid://commerce/LineItem/1",
                        "title": "Gallery print",
                        "quantity": 2,
                        "originalUnitPriceSet": {
                            "shopMoney": { "amount": "215.00", "currencyCode": "USD" }
                        }
                    }
                }
            ]
        }
    }
    "##;

    #[test]
    fn order_payload_maps_to_typed_remote_order() {
        let dto: OrderDto = serde_json::from_str(ORDER_JSON).unwrap();
        let order = RemoteOrder::try_from(dto).unwrap();

        assert_eq!(order.total.amount_minor, 45_000);
        assert_eq!(order.current_total.as_ref().unwrap().amount_minor, 43_000);
        assert_eq!(order.line_items.len(), 1);
        assert_eq!(order.line_items[0].quantity, 2);
        assert_eq!(
            order.line_items[0].unit_price.as_ref().unwrap().amount_minor,
            21_500
        );
        assert_eq!(order.customer.as_ref().unwrap().email.as_deref(), Some("buyer@example.com"));
        assert!(order.subtotal.is_none());
    }

    #[test]
    fn malformed_amount_is_a_protocol_error() {
        let json = ORDER_JSON.replace("\"450.00\"", "\"not-a-number\"");
        let dto: OrderDto = serde_json::from_str(&json).unwrap();
        let result = RemoteOrder::try_from(dto);
        assert!(matches!(result, Err(GatewayError::Protocol(_))));
    }

    #[test]
    fn graphql_errors_surface_their_messages() {
        let payload = r#"{ "data": null, "errors": [{ "message": "throttled" }] }"#;
        let envelope: GraphQlResponse<OrderByIdData> = serde_json::from_str(payload).unwrap();
        assert_eq!(envelope.errors.unwrap()[0].message, "throttled");
    }
}
