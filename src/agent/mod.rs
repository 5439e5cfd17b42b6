use crate::shared::error::ServiceError;
use crate::shared::models::{MessageSender, Ticket, TicketMessage};
use crate::shared::schema::{support_tickets, ticket_messages};
use crate::shared::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Canned reply when the AI webhook is unreachable, times out, or answers
/// non-2xx. The outage never surfaces to the chat UI as a 5xx.
pub const FALLBACK_AGENT_MESSAGE: &str = "Sorry, our assistant is temporarily unavailable. \
Your message has been saved and a support agent will follow up shortly.";

/// Payload forwarded to the external AI webhook.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "_id")]
    id: Uuid,
    merchant_id: &'a str,
    message: WebhookMessage<'a>,
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Reply produced by the AI webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentReply {
    pub ticket_id: String,
    pub agent_message: String,
    #[serde(default)]
    pub cards: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    webhook_url: String,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

impl AgentClient {
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(AgentClient { http, webhook_url })
    }

    /// Timeouts and non-2xx statuses both come back as errors; the caller
    /// decides how to degrade.
    pub async fn send(
        &self,
        ticket_id: Uuid,
        merchant_id: &str,
        content: &str,
    ) -> anyhow::Result<AgentReply> {
        let payload = WebhookPayload {
            id: ticket_id,
            merchant_id,
            message: WebhookMessage { content },
        };
        let response = self.http.post(&self.webhook_url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned HTTP {status}");
        }
        Ok(response.json::<AgentReply>().await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentMessageRequest {
    pub ticket_id: Option<String>,
    pub merchant_id: String,
    pub message: InboundMessage,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AgentMessageResponse {
    pub success: bool,
    pub ticket_id: String,
    pub agent_message: String,
    pub cards: Vec<serde_json::Value>,
}

/// Only a missing row is the client's fault; any other error on the ticket
/// lookup is a real database fault and must not report as a 400.
fn ticket_lookup_error(err: diesel::result::Error) -> ServiceError {
    match err {
        diesel::result::Error::NotFound => ServiceError::Validation(
            "ticket_id does not match a ticket for this merchant".to_string(),
        ),
        other => other.into(),
    }
}

fn degraded_response(ticket_id: Uuid) -> AgentMessageResponse {
    AgentMessageResponse {
        success: false,
        ticket_id: ticket_id.to_string(),
        agent_message: FALLBACK_AGENT_MESSAGE.to_string(),
        cards: Vec::new(),
    }
}

/// Find-or-create the ticket, append the user message, then proxy to the
/// AI webhook. The user message is durable before the webhook is contacted.
pub async fn send_agent_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AgentMessageRequest>,
) -> Result<Json<AgentMessageResponse>, ServiceError> {
    let merchant = req.merchant_id.trim().to_string();
    if merchant.is_empty() {
        return Err(ServiceError::Validation("merchant_id is required".to_string()));
    }
    let content = req.message.content.trim().to_string();
    if content.is_empty() {
        return Err(ServiceError::Validation(
            "message.content must not be empty".to_string(),
        ));
    }
    let requested_id = match req.ticket_id.as_deref().filter(|v| !v.is_empty()) {
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
            ServiceError::Validation("ticket_id is not a valid UUID".to_string())
        })?),
        None => None,
    };

    let ticket: Ticket = {
        let mut conn = state.conn.get()?;
        let ticket = match requested_id {
            Some(id) => support_tickets::table
                .filter(support_tickets::id.eq(id))
                .filter(support_tickets::merchant_id.eq(&merchant))
                .first(&mut conn)
                .map_err(ticket_lookup_error)?,
            None => {
                let ticket = Ticket::new(&merchant);
                diesel::insert_into(support_tickets::table)
                    .values(&ticket)
                    .execute(&mut conn)
                    .map_err(|e| ServiceError::Database(format!("Insert error: {e}")))?;
                info!("Opened ticket {} for merchant {}", ticket.id, merchant);
                ticket
            }
        };

        let user_message = TicketMessage::new(ticket.id, MessageSender::User, &content);
        diesel::insert_into(ticket_messages::table)
            .values(&user_message)
            .execute(&mut conn)
            .map_err(|e| ServiceError::Database(format!("Insert error: {e}")))?;
        diesel::update(support_tickets::table.filter(support_tickets::id.eq(ticket.id)))
            .set(support_tickets::updated_at.eq(Utc::now()))
            .execute(&mut conn)
            .map_err(|e| ServiceError::Database(format!("Update error: {e}")))?;
        ticket
    };

    match state.agent.send(ticket.id, &merchant, &content).await {
        Ok(reply) => {
            let mut conn = state.conn.get()?;
            let ai_message = TicketMessage::new(ticket.id, MessageSender::Ai, &reply.agent_message);
            diesel::insert_into(ticket_messages::table)
                .values(&ai_message)
                .execute(&mut conn)
                .map_err(|e| ServiceError::Database(format!("Insert error: {e}")))?;
            Ok(Json(AgentMessageResponse {
                success: true,
                ticket_id: reply.ticket_id,
                agent_message: reply.agent_message,
                cards: reply.cards,
            }))
        }
        Err(e) => {
            warn!("Agent webhook failed for ticket {}: {}", ticket.id, e);
            Ok(Json(degraded_response(ticket.id)))
        }
    }
}

pub fn configure_agent_routes() -> Router<Arc<AppState>> {
    Router::new().route("/agent", post(send_agent_message))
}
