use crate::context::{CallerContext, Permission};
use crate::error::{FieldViolation, TesseraError};
use crate::store::TicketStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Issuance lifecycle of a fulfillment artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    Redeemed,
    Void,
}

/// Contact snapshot of the ticket holder, captured at issuance time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketOwner {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl TicketOwner {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
        }
    }
}

/// One issued fulfillment artifact tied to an order.
///
/// Redemption transitions `status` only; `order_id` and `quantity` never
/// change after issuance, and tickets are never merged across orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub order_id: Option<String>,
    pub owner: TicketOwner,
    pub event_id: String,
    pub redemption_code: String,
    pub quantity: u32,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for issuing a new ticket. A missing redemption code gets generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDraft {
    pub order_id: Option<String>,
    pub owner: TicketOwner,
    pub event_id: String,
    pub redemption_code: Option<String>,
    pub quantity: u32,
}

impl TicketDraft {
    pub fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if self.quantity == 0 {
            violations.push(FieldViolation::new("quantity", "must be positive"));
        }
        if self.event_id.trim().is_empty() {
            violations.push(FieldViolation::new("event_id", "must not be empty"));
        }
        if self.owner.id.trim().is_empty() {
            violations.push(FieldViolation::new("owner.id", "must not be empty"));
        }
        violations
    }

    pub fn into_ticket(self, now: DateTime<Utc>) -> Ticket {
        Ticket {
            id: Uuid::new_v4().to_string(),
            order_id: self.order_id,
            owner: self.owner,
            event_id: self.event_id,
            redemption_code: self
                .redemption_code
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            quantity: self.quantity,
            status: TicketStatus::Issued,
            created_at: now,
        }
    }
}

/// Issuance and redemption over the ticket store.
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn TicketStore> {
        self.store.clone()
    }

    pub async fn issue_ticket(
        &self,
        ctx: &CallerContext,
        draft: TicketDraft,
    ) -> Result<Ticket, TesseraError> {
        ctx.require(Permission::ManageEvents)?;
        let violations = draft.validate();
        if !violations.is_empty() {
            return Err(TesseraError::Validation(violations));
        }
        self.store.insert(draft.into_ticket(Utc::now())).await
    }

    /// Redeem by code. Only `Issued` tickets transition; everything else is
    /// an invalid operation so the door scanner can say why.
    pub async fn redeem(
        &self,
        ctx: &CallerContext,
        redemption_code: &str,
    ) -> Result<Ticket, TesseraError> {
        ctx.require(Permission::ManageEvents)?;
        let ticket = self
            .store
            .find_by_code(redemption_code)
            .await?
            .ok_or_else(|| {
                TesseraError::not_found("ticket with code", redemption_code)
            })?;
        match ticket.status {
            TicketStatus::Issued => {
                self.store
                    .set_status(&ticket.id, TicketStatus::Redeemed)
                    .await
            }
            TicketStatus::Redeemed => Err(TesseraError::InvalidOperation(format!(
                "ticket '{}' was already redeemed",
                ticket.id
            ))),
            TicketStatus::Void => Err(TesseraError::InvalidOperation(format!(
                "ticket '{}' is void",
                ticket.id
            ))),
        }
    }

    pub async fn void(
        &self,
        ctx: &CallerContext,
        id: &str,
    ) -> Result<Ticket, TesseraError> {
        ctx.require(Permission::ManageEvents)?;
        let ticket = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| TesseraError::not_found("ticket", id))?;
        if ticket.status == TicketStatus::Void {
            return Err(TesseraError::InvalidOperation(format!(
                "ticket '{id}' is already void"
            )));
        }
        self.store.set_status(id, TicketStatus::Void).await
    }

    pub async fn tickets_for_order(
        &self,
        order_id: &str,
    ) -> Result<Vec<Ticket>, TesseraError> {
        self.store.find_by_order(order_id).await
    }

    pub async fn tickets_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Ticket>, TesseraError> {
        self.store.find_by_owner(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTicketStore;

    fn staff() -> CallerContext {
        CallerContext::new("staff-1").with_permissions(vec![Permission::ManageEvents])
    }

    fn service() -> TicketService {
        TicketService::new(Arc::new(MemoryTicketStore::new()))
    }

    fn draft(code: Option<&str>) -> TicketDraft {
        TicketDraft {
            order_id: Some("1001".to_string()),
            owner: TicketOwner::new("user-1", "holder@example.com"),
            event_id: "event-1".to_string(),
            redemption_code: code.map(str::to_string),
            quantity: 2,
        }
    }

    #[tokio::test]
    async fn redeem_transitions_issued_only() {
        let tickets = service();
        tickets
            .issue_ticket(&staff(), draft(Some("qr-1")))
            .await
            .unwrap();

        let redeemed = tickets.redeem(&staff(), "qr-1").await.unwrap();
        assert_eq!(redeemed.status, TicketStatus::Redeemed);

        let again = tickets.redeem(&staff(), "qr-1").await;
        assert!(matches!(again, Err(TesseraError::InvalidOperation(_))));

        let unknown = tickets.redeem(&staff(), "qr-unknown").await;
        assert!(matches!(unknown, Err(TesseraError::NotFound(_))));
    }

    #[tokio::test]
    async fn void_is_terminal() {
        let tickets = service();
        let issued = tickets
            .issue_ticket(&staff(), draft(Some("qr-1")))
            .await
            .unwrap();

        tickets.void(&staff(), &issued.id).await.unwrap();
        assert!(matches!(
            tickets.void(&staff(), &issued.id).await,
            Err(TesseraError::InvalidOperation(_))
        ));
        assert!(matches!(
            tickets.redeem(&staff(), "qr-1").await,
            Err(TesseraError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn issue_requires_manage_events() {
        let tickets = service();
        let result = tickets
            .issue_ticket(&CallerContext::new("viewer-1"), draft(None))
            .await;
        assert!(matches!(result, Err(TesseraError::PermissionDenied(_))));
    }

    #[test]
    fn draft_generates_redemption_code_when_absent() {
        let draft = TicketDraft {
            order_id: Some("1001".to_string()),
            owner: TicketOwner::new("user-1", "holder@example.com"),
            event_id: "event-1".to_string(),
            redemption_code: None,
            quantity: 2,
        };

        assert!(draft.validate().is_empty());
        let ticket = draft.into_ticket(Utc::now());
        assert!(!ticket.redemption_code.is_empty());
        assert_eq!(ticket.status, TicketStatus::Issued);
        assert_eq!(ticket.quantity, 2);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let draft = TicketDraft {
            order_id: None,
            owner: TicketOwner::new("user-1", "holder@example.com"),
            event_id: "event-1".to_string(),
            redemption_code: Some("qr-1".to_string()),
            quantity: 0,
        };

        let violations = draft.validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "quantity");
    }
}
