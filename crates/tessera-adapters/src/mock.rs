use async_trait::async_trait;
use std::collections::HashMap;
use tessera_core::normalize::numeric_order_id;
use tessera_core::{
    GatewayError, OrderGateway, PageInfo, RemoteOrder, RemoteOrderPage, RemoteOrderQuery,
};

/// Deterministic gateway serving a fixed order set. Used by tests and by the
/// service when no remote endpoint is configured (local-only mode: every
/// fetch is an authoritative not-found).
#[derive(Debug, Clone, Default)]
pub struct StaticOrderGateway {
    orders: HashMap<String, RemoteOrder>,
}

impl StaticOrderGateway {
    pub fn new(orders: Vec<RemoteOrder>) -> Self {
        Self {
            orders: orders
                .into_iter()
                .map(|order| (numeric_order_id(&order.id).to_string(), order))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderGateway for StaticOrderGateway {
    async fn fetch_order(&self, order_id: &str) -> Result<Option<RemoteOrder>, GatewayError> {
        Ok(self.orders.get(numeric_order_id(order_id)).cloned())
    }

    async fn list_orders(&self, query: &RemoteOrderQuery) -> Result<RemoteOrderPage, GatewayError> {
        let mut orders: Vec<RemoteOrder> = self.orders.values().cloned().collect();
        orders.sort_by(|a, b| {
            (b.processed_at, a.id.as_str()).cmp(&(a.processed_at, b.id.as_str()))
        });
        orders.truncate(query.first as usize);
        Ok(RemoteOrderPage {
            orders,
            page_info: PageInfo::default(),
        })
    }
}

/// Gateway that fails every call transiently. Useful for exercising the
/// degradation path end to end.
#[derive(Debug, Clone)]
pub struct UnreachableGateway {
    reason: String,
}

impl UnreachableGateway {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for UnreachableGateway {
    fn default() -> Self {
        Self::new("remote platform unreachable")
    }
}

#[async_trait]
impl OrderGateway for UnreachableGateway {
    async fn fetch_order(&self, _order_id: &str) -> Result<Option<RemoteOrder>, GatewayError> {
        Err(GatewayError::Transient(self.reason.clone()))
    }

    async fn list_orders(
        &self,
        _query: &RemoteOrderQuery,
    ) -> Result<RemoteOrderPage, GatewayError> {
        Err(GatewayError::Transient(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tessera_core::normalize::order_gid;
    use tessera_core::Money;

    fn fixture_order(numeric_id: &str) -> RemoteOrder {
        RemoteOrder {
            id: order_gid(numeric_id),
            name: format!("#{numeric_id}"),
            processed_at: Utc.timestamp_opt(1_736_000_000, 0).single().unwrap(),
            created_at: Utc.timestamp_opt(1_735_900_000, 0).single().unwrap(),
            updated_at: Utc.timestamp_opt(1_736_100_000, 0).single().unwrap(),
            financial_status: "PAID".to_string(),
            fulfillment_status: "FULFILLED".to_string(),
            currency: "USD".to_string(),
            total: Money::new(45_000, "USD"),
            current_total: None,
            subtotal: None,
            total_tax: None,
            total_shipping: None,
            total_refunded: None,
            shipping_address: None,
            billing_address: None,
            customer: None,
            line_items: Vec::new(),
            line_items_count: Some(1),
        }
    }

    #[tokio::test]
    async fn static_gateway_resolves_both_id_forms() {
        let gateway = StaticOrderGateway::new(vec![fixture_order("1001")]);

        assert!(gateway.fetch_order("1001").await.unwrap().is_some());
        assert!(gateway
            .fetch_order("gid://commerce/Order/1001")
            .await
            .unwrap()
            .is_some());
        assert!(gateway.fetch_order("9999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_gateway_is_always_transient() {
        let gateway = UnreachableGateway::default();
        let result = gateway.fetch_order("1001").await;
        assert!(matches!(result, Err(GatewayError::Transient(_))));
    }
}
