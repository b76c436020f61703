#![deny(unsafe_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tessera_adapters::{AdminApiConfig, AdminApiGateway, StaticOrderGateway};
use tessera_core::{
    CallerContext, EntryDraft, EntryFilter, EntryPatch, EntryType, GatewayError, LedgerService,
    OrderGateway, OrderListMode, OrderListParams, Permission, ReconcileConfig,
    ReconciliationService, SaleRecord, SortOrder, StorageConfig, Stores, TesseraError,
    TicketDraft, TicketService,
};
use thiserror::Error;
use tracing::{error, warn};

const CALLER_ID_HEADER: &str = "x-caller-id";
const CALLER_ROLES_HEADER: &str = "x-caller-roles";
const CALLER_PERMISSIONS_HEADER: &str = "x-caller-permissions";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    /// Remote Admin API connection; `None` runs local-only (every remote
    /// fetch is an authoritative not-found).
    pub admin_api: Option<AdminApiConfig>,
    pub remote_timeout: Duration,
    pub default_page_size: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::Memory,
            admin_api: None,
            remote_timeout: Duration::from_secs(3),
            default_page_size: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core error: {0}")]
    Core(#[from] TesseraError),
    #[error("gateway init error: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Clone)]
pub struct ServiceState {
    pub ledger: LedgerService,
    pub tickets: TicketService,
    pub recon: ReconciliationService,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let stores = Stores::bootstrap(config.storage).await?;

        let gateway: Arc<dyn OrderGateway> = match config.admin_api {
            Some(admin_api) => Arc::new(AdminApiGateway::new(admin_api)?),
            None => {
                warn!("no remote admin API configured, serving orders from local data only");
                Arc::new(StaticOrderGateway::empty())
            }
        };

        let recon = ReconciliationService::new(
            gateway,
            stores.ledger.clone(),
            stores.tickets.clone(),
            ReconcileConfig {
                remote_timeout: config.remote_timeout,
                default_page_size: config.default_page_size,
            },
        );

        Ok(Self {
            ledger: LedgerService::new(stores.ledger),
            tickets: TicketService::new(stores.tickets),
            recon,
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/orders", get(list_orders))
        .route("/v1/orders/:order_id", get(get_order))
        .route("/v1/finance/entries", get(list_entries).post(create_entry))
        .route("/v1/finance/entries/:id", put(update_entry))
        .route("/v1/finance/entries/:id/cancel", post(cancel_entry))
        .route("/v1/finance/expenses", delete(bulk_delete_expenses))
        .route("/v1/finance/expenses/:id", delete(delete_expense))
        .route("/v1/finance/income/:id/revert", post(revert_income))
        .route("/v1/finance/sales", post(record_sale))
        .route("/v1/finance/summary", get(summary))
        .route("/v1/tickets", get(list_tickets).post(issue_ticket))
        .route("/v1/tickets/redeem", post(redeem_ticket))
        .route("/v1/tickets/:id/void", post(void_ticket))
        .with_state(state)
}

/// Delivery-layer error: the core taxonomy plus the missing-identity case.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("caller identity missing")]
    Unauthenticated,
    #[error(transparent)]
    Core(#[from] TesseraError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "message": self.to_string() }),
            ),
            ApiError::Core(core) => match core {
                TesseraError::Validation(violations) => (
                    StatusCode::BAD_REQUEST,
                    serde_json::json!({ "message": core.to_string(), "fields": violations }),
                ),
                TesseraError::PermissionDenied(_) => (
                    StatusCode::FORBIDDEN,
                    serde_json::json!({ "message": core.to_string() }),
                ),
                TesseraError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    serde_json::json!({ "message": core.to_string() }),
                ),
                TesseraError::InvalidOperation(_) | TesseraError::Conflict(_) => (
                    StatusCode::CONFLICT,
                    serde_json::json!({ "message": core.to_string() }),
                ),
                TesseraError::TransientRemote(_) => {
                    // The reconciliation layer recovers these; one reaching
                    // the HTTP layer is a bug worth flagging loudly.
                    error!(error = %core, "transient remote error escaped reconciliation");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        serde_json::json!({ "message": "internal error" }),
                    )
                }
                TesseraError::Persistence(_) | TesseraError::Serialization(_) => {
                    error!(error = %core, "internal failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        serde_json::json!({ "message": "internal error" }),
                    )
                }
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Resolve the caller the identity layer injected as headers.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<CallerContext, ApiError> {
    let caller_id = headers
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::Unauthenticated)?;

    let roles = header_csv(headers, CALLER_ROLES_HEADER);
    let permissions = header_csv(headers, CALLER_PERMISSIONS_HEADER)
        .iter()
        .filter_map(|value| Permission::parse(value))
        .collect();

    Ok(CallerContext::new(caller_id)
        .with_roles(roles)
        .with_permissions(permissions))
}

fn header_csv(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct OrdersQuery {
    mode: Option<OrderListMode>,
    first: Option<u32>,
    after: Option<String>,
    query: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<SortOrder>,
}

async fn list_orders(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<OrdersQuery>,
) -> Result<Response, ApiError> {
    caller_from_headers(&headers)?;
    let list_params = OrderListParams {
        first: params.first,
        after: params.after,
        query: params.query,
        sort_by: params.sort_by,
        sort_order: params.sort_order.unwrap_or_default(),
    };
    let page = state
        .recon
        .list_order_views(params.mode.unwrap_or_default(), &list_params)
        .await?;
    Ok(Json(page).into_response())
}

async fn get_order(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Response, ApiError> {
    caller_from_headers(&headers)?;
    let view = state.recon.get_order_view(&order_id).await?;
    Ok(Json(view).into_response())
}

#[derive(Debug, Deserialize)]
struct EntriesQuery {
    start_date: Option<chrono::DateTime<chrono::Utc>>,
    end_date: Option<chrono::DateTime<chrono::Utc>>,
    entry_type: Option<EntryType>,
    category: Option<String>,
    search: Option<String>,
}

impl From<EntriesQuery> for EntryFilter {
    fn from(query: EntriesQuery) -> Self {
        Self {
            start_date: query.start_date,
            end_date: query.end_date,
            entry_type: query.entry_type,
            category: query.category,
            search: query.search,
        }
    }
}

async fn list_entries(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<EntriesQuery>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let entries = state.ledger.list_entries(&ctx, &params.into()).await?;
    Ok(Json(entries).into_response())
}

async fn create_entry(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(draft): Json<EntryDraft>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let entry = state.ledger.create_entry(&ctx, draft).await?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

async fn update_entry(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<EntryPatch>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let entry = state.ledger.update_entry(&ctx, &id, patch).await?;
    Ok(Json(entry).into_response())
}

async fn cancel_entry(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let entry = state.ledger.cancel_entry(&ctx, &id).await?;
    Ok(Json(entry).into_response())
}

async fn delete_expense(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    state.ledger.delete_expense(&ctx, &id).await?;
    Ok(Json(serde_json::json!({ "deleted_id": id })).into_response())
}

#[derive(Debug, Deserialize)]
struct BulkDeleteRequest {
    expense_ids: Vec<String>,
}

async fn bulk_delete_expenses(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    if request.expense_ids.is_empty() {
        return Err(TesseraError::validation("expense_ids", "must not be empty").into());
    }
    let outcome = state
        .ledger
        .bulk_delete_expenses(&ctx, &request.expense_ids)
        .await?;
    Ok(Json(outcome).into_response())
}

async fn revert_income(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let entry = state.ledger.revert_income_assignment(&ctx, &id).await?;
    Ok(Json(entry).into_response())
}

async fn record_sale(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(sale): Json<SaleRecord>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let entry = state.ledger.record_sale(&ctx, sale).await?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

#[derive(Debug, Deserialize)]
struct SummaryQuery {
    start_date: Option<chrono::DateTime<chrono::Utc>>,
    end_date: Option<chrono::DateTime<chrono::Utc>>,
}

async fn summary(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<SummaryQuery>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let filter = EntryFilter {
        start_date: params.start_date,
        end_date: params.end_date,
        ..EntryFilter::default()
    };
    let aggregates = state.ledger.summary(&ctx, &filter).await?;
    Ok(Json(aggregates).into_response())
}

#[derive(Debug, Deserialize)]
struct TicketsQuery {
    owner_id: Option<String>,
    order_id: Option<String>,
}

async fn list_tickets(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<TicketsQuery>,
) -> Result<Response, ApiError> {
    caller_from_headers(&headers)?;
    let tickets = match (params.owner_id, params.order_id) {
        (Some(owner_id), _) => state.tickets.tickets_for_owner(&owner_id).await?,
        (None, Some(order_id)) => state.tickets.tickets_for_order(&order_id).await?,
        (None, None) => {
            return Err(TesseraError::validation(
                "owner_id",
                "owner_id or order_id is required",
            )
            .into());
        }
    };
    Ok(Json(tickets).into_response())
}

async fn issue_ticket(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(draft): Json<TicketDraft>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let ticket = state.tickets.issue_ticket(&ctx, draft).await?;
    Ok((StatusCode::CREATED, Json(ticket)).into_response())
}

#[derive(Debug, Deserialize)]
struct RedeemRequest {
    redemption_code: String,
}

async fn redeem_ticket(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<RedeemRequest>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let ticket = state.tickets.redeem(&ctx, &request.redemption_code).await?;
    Ok(Json(ticket).into_response())
}

async fn void_ticket(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let ctx = caller_from_headers(&headers)?;
    let ticket = state.tickets.void(&ctx, &id).await?;
    Ok(Json(ticket).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn memory_state() -> ServiceState {
        ServiceState::bootstrap(ServiceConfig::default())
            .await
            .unwrap()
    }

    fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CALLER_ID_HEADER, "admin-1")
            .header(
                CALLER_PERMISSIONS_HEADER,
                "manage_finances, manage_events",
            );
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[test]
    fn error_mapping_follows_the_taxonomy() {
        let cases = [
            (
                ApiError::Core(TesseraError::validation("amount_minor", "bad")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Core(TesseraError::not_found("order", "1")),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Core(TesseraError::InvalidOperation("nope".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Core(TesseraError::PermissionDenied("nope".to_string())),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::Core(TesseraError::Persistence("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn caller_headers_parse_roles_and_permissions() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_ID_HEADER, "admin-1".parse().unwrap());
        headers.insert(CALLER_ROLES_HEADER, "admin,finance".parse().unwrap());
        headers.insert(
            CALLER_PERMISSIONS_HEADER,
            "manage_finances,unknown_perm".parse().unwrap(),
        );

        let ctx = caller_from_headers(&headers).unwrap();
        assert_eq!(ctx.caller_id, "admin-1");
        assert_eq!(ctx.roles, vec!["admin", "finance"]);
        assert_eq!(ctx.permissions, vec![Permission::ManageFinances]);

        assert!(caller_from_headers(&HeaderMap::new()).is_err());
    }

    #[tokio::test]
    async fn create_and_fetch_entry_over_http() {
        let app = build_router(memory_state().await);

        let create = admin_request(
            "POST",
            "/v1/finance/entries",
            Some(serde_json::json!({
                "entry_type": "income",
                "amount_minor": 45_000,
                "amount_paid_minor": 45_000,
                "currency": "USD",
                "description": "deposit"
            })),
        );
        let response = app.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let listing = admin_request("GET", "/v1/finance/entries", None);
        let response = app.oneshot(listing).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn writes_without_permission_are_forbidden() {
        let app = build_router(memory_state().await);

        let request = Request::builder()
            .method("POST")
            .uri("/v1/finance/entries")
            .header(CALLER_ID_HEADER, "viewer-1")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "entry_type": "income",
                    "amount_minor": 1_000,
                    "currency": "USD",
                    "description": "deposit"
                })
                .to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_caller_identity_is_unauthorized() {
        let app = build_router(memory_state().await);
        let request = Request::builder()
            .method("GET")
            .uri("/v1/orders/1001")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found_end_to_end() {
        let app = build_router(memory_state().await);
        let response = app
            .oneshot(admin_request("GET", "/v1/orders/4004", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bulk_delete_round_trips_partial_outcome() {
        let app = build_router(memory_state().await);

        let create = admin_request(
            "POST",
            "/v1/finance/entries",
            Some(serde_json::json!({
                "entry_type": "expense",
                "amount_minor": 3_000,
                "currency": "USD",
                "description": "catering"
            })),
        );
        let response = app.clone().oneshot(create).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let expense_id = created["id"].as_str().unwrap().to_string();

        let request = admin_request(
            "DELETE",
            "/v1/finance/expenses",
            Some(serde_json::json!({ "expense_ids": [expense_id, "missing"] })),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let outcome: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(outcome["deleted"].as_array().unwrap().len(), 1);
        assert_eq!(outcome["skipped"], serde_json::json!(["missing"]));
    }
}
