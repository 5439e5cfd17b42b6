use crate::shared::error::ServiceError;
use crate::shared::models::{Ticket, TicketMessage, TicketPriority, TicketStatus};
use crate::shared::schema::{support_tickets, ticket_messages};
use crate::shared::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub merchant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MerchantQuery {
    pub merchant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub merchant_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePriorityRequest {
    pub merchant_id: String,
    pub priority: String,
}

fn require_merchant(merchant_id: &str) -> Result<&str, ServiceError> {
    let merchant = merchant_id.trim();
    if merchant.is_empty() {
        return Err(ServiceError::Validation("merchant_id is required".to_string()));
    }
    Ok(merchant)
}

fn parse_status(value: &str) -> Result<TicketStatus, ServiceError> {
    TicketStatus::parse(value).ok_or_else(|| {
        ServiceError::Validation(format!(
            "invalid status '{value}', expected one of: open, in_progress, resolved, closed"
        ))
    })
}

fn parse_priority(value: &str) -> Result<TicketPriority, ServiceError> {
    TicketPriority::parse(value).ok_or_else(|| {
        ServiceError::Validation(format!(
            "invalid priority '{value}', expected one of: low, medium, high, urgent"
        ))
    })
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Ticket>>, ServiceError> {
    let merchant = require_merchant(query.merchant_id.as_deref().unwrap_or(""))?.to_string();
    let mut conn = state.conn.get()?;

    let tickets: Vec<Ticket> = support_tickets::table
        .filter(support_tickets::merchant_id.eq(&merchant))
        .order(support_tickets::created_at.desc())
        .load(&mut conn)
        .map_err(|e| ServiceError::Database(format!("Query error: {e}")))?;

    Ok(Json(tickets))
}

/// A mismatched merchant looks identical to a missing ticket.
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<MerchantQuery>,
) -> Result<Json<Ticket>, ServiceError> {
    let merchant = require_merchant(&query.merchant_id)?.to_string();
    let mut conn = state.conn.get()?;

    let ticket: Ticket = support_tickets::table
        .filter(support_tickets::id.eq(id))
        .filter(support_tickets::merchant_id.eq(&merchant))
        .first(&mut conn)
        .map_err(|_| ServiceError::NotFound("Ticket not found".to_string()))?;

    Ok(Json(ticket))
}

/// Unguarded setter; only escalate/resolve carry transition guards.
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<Ticket>, ServiceError> {
    let merchant = require_merchant(&req.merchant_id)?.to_string();
    let status = parse_status(&req.status)?;
    let mut conn = state.conn.get()?;

    let updated = diesel::update(
        support_tickets::table
            .filter(support_tickets::id.eq(id))
            .filter(support_tickets::merchant_id.eq(&merchant)),
    )
    .set((
        support_tickets::status.eq(status.as_str()),
        support_tickets::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)
    .map_err(|e| ServiceError::Database(format!("Update error: {e}")))?;

    if updated == 0 {
        return Err(ServiceError::NotFound("Ticket not found".to_string()));
    }

    let ticket: Ticket = support_tickets::table
        .filter(support_tickets::id.eq(id))
        .first(&mut conn)?;
    Ok(Json(ticket))
}

pub async fn change_priority(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangePriorityRequest>,
) -> Result<Json<Ticket>, ServiceError> {
    let merchant = require_merchant(&req.merchant_id)?.to_string();
    let priority = parse_priority(&req.priority)?;
    let mut conn = state.conn.get()?;

    let updated = diesel::update(
        support_tickets::table
            .filter(support_tickets::id.eq(id))
            .filter(support_tickets::merchant_id.eq(&merchant)),
    )
    .set((
        support_tickets::priority.eq(priority.as_str()),
        support_tickets::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)
    .map_err(|e| ServiceError::Database(format!("Update error: {e}")))?;

    if updated == 0 {
        return Err(ServiceError::NotFound("Ticket not found".to_string()));
    }

    let ticket: Ticket = support_tickets::table
        .filter(support_tickets::id.eq(id))
        .first(&mut conn)?;
    Ok(Json(ticket))
}

pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TicketMessage>>, ServiceError> {
    let mut conn = state.conn.get()?;

    support_tickets::table
        .filter(support_tickets::id.eq(id))
        .select(support_tickets::id)
        .first::<Uuid>(&mut conn)
        .map_err(|_| ServiceError::NotFound("Ticket not found".to_string()))?;

    let messages: Vec<TicketMessage> = ticket_messages::table
        .filter(ticket_messages::ticket_id.eq(id))
        .order(ticket_messages::created_at.asc())
        .load(&mut conn)
        .map_err(|e| ServiceError::Database(format!("Query error: {e}")))?;

    Ok(Json(messages))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tickets", get(list_tickets))
        .route("/tickets/:id", get(get_ticket))
        .route("/tickets/:id/status", patch(change_status))
        .route("/tickets/:id/priority", patch(change_priority))
        .route("/chat-history/:id", get(chat_history))
}
