use crate::shared::error::ServiceError;
use crate::shared::models::{MessageSender, Ticket, TicketMessage, TicketStatus};
use crate::shared::schema::{support_tickets, ticket_messages};
use crate::shared::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Escalation is allowed exactly once, from the AI-handled state. A second
/// escalate conflicts instead of silently reassigning the ticket.
fn ensure_can_escalate(ticket: &Ticket) -> Result<(), ServiceError> {
    if ticket.escalated {
        return Err(ServiceError::Conflict(
            "Ticket is already escalated".to_string(),
        ));
    }
    Ok(())
}

/// Resolution requires an escalated ticket that is still open or being
/// worked; anything else is an illegal lifecycle move.
fn ensure_can_resolve(ticket: &Ticket) -> Result<(), ServiceError> {
    if !ticket.escalated {
        return Err(ServiceError::Conflict(
            "Ticket has not been escalated".to_string(),
        ));
    }
    match TicketStatus::parse(&ticket.status) {
        Some(TicketStatus::Open) | Some(TicketStatus::InProgress) => Ok(()),
        _ => Err(ServiceError::Conflict(
            "Ticket is not in an open escalated state".to_string(),
        )),
    }
}

fn load_ticket(conn: &mut PgConnection, id: Uuid) -> Result<Ticket, ServiceError> {
    support_tickets::table
        .filter(support_tickets::id.eq(id))
        .first(conn)
        .map_err(|_| ServiceError::NotFound("Ticket not found".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct AssignedQuery {
    pub admin_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    pub admin_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AdminMessageRequest {
    pub content: String,
}

/// Operator-facing, so no merchant scoping.
pub async fn list_assigned_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssignedQuery>,
) -> Result<Json<Vec<Ticket>>, ServiceError> {
    let mut conn = state.conn.get()?;

    let mut q = support_tickets::table
        .filter(support_tickets::escalated.eq(true))
        .into_boxed();

    if let Some(admin_id) = query.admin_id {
        q = q.filter(support_tickets::assigned_admin_id.eq(admin_id));
    }

    let tickets: Vec<Ticket> = q
        .order(support_tickets::updated_at.desc())
        .load(&mut conn)
        .map_err(|e| ServiceError::Database(format!("Query error: {e}")))?;

    Ok(Json(tickets))
}

/// The human takeover channel: appends a sender=admin message and never
/// calls the AI webhook. The row is committed before the response.
pub async fn post_admin_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdminMessageRequest>,
) -> Result<Json<TicketMessage>, ServiceError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ServiceError::Validation(
            "content must not be empty".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;
    let ticket = load_ticket(&mut conn, id)?;

    let message = TicketMessage::new(ticket.id, MessageSender::Admin, &content);
    diesel::insert_into(ticket_messages::table)
        .values(&message)
        .execute(&mut conn)
        .map_err(|e| ServiceError::Database(format!("Insert error: {e}")))?;

    diesel::update(support_tickets::table.filter(support_tickets::id.eq(ticket.id)))
        .set(support_tickets::updated_at.eq(Utc::now()))
        .execute(&mut conn)
        .map_err(|e| ServiceError::Database(format!("Update error: {e}")))?;

    Ok(Json(message))
}

pub async fn escalate_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<EscalateRequest>>,
) -> Result<Json<Ticket>, ServiceError> {
    let admin_id = body.and_then(|Json(req)| req.admin_id);
    let mut conn = state.conn.get()?;

    let ticket = load_ticket(&mut conn, id)?;
    ensure_can_escalate(&ticket)?;

    diesel::update(support_tickets::table.filter(support_tickets::id.eq(id)))
        .set((
            support_tickets::escalated.eq(true),
            support_tickets::assigned_admin_id.eq(admin_id),
            support_tickets::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(|e| ServiceError::Database(format!("Update error: {e}")))?;

    info!("Ticket {} escalated to admin {:?}", id, admin_id);

    let ticket = load_ticket(&mut conn, id)?;
    Ok(Json(ticket))
}

pub async fn resolve_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, ServiceError> {
    let mut conn = state.conn.get()?;

    let ticket = load_ticket(&mut conn, id)?;
    ensure_can_resolve(&ticket)?;

    diesel::update(support_tickets::table.filter(support_tickets::id.eq(id)))
        .set((
            support_tickets::status.eq(TicketStatus::Resolved.as_str()),
            support_tickets::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(|e| ServiceError::Database(format!("Update error: {e}")))?;

    info!("Ticket {} resolved", id);

    let ticket = load_ticket(&mut conn, id)?;
    Ok(Json(ticket))
}

pub fn configure_admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/assigned-tickets", get(list_assigned_tickets))
        .route("/admin/tickets/:id/message", post(post_admin_message))
        .route("/admin/tickets/:id/escalate", post(escalate_ticket))
        .route("/admin/tickets/:id/resolve", patch(resolve_ticket))
}
