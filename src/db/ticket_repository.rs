use async_trait::async_trait;

use crate::models::ticket::{NewTicket, Ticket, TicketMessage};

/// Result of trying to open a user ticket while holding the per-user lock.
#[derive(Debug, Clone)]
pub enum OpenTicketOutcome {
    Opened(Ticket),
    AlreadyOpen,
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// All tickets owned by the user, newest first.
    async fn list_tickets_for_user(&self, user_id: i64) -> Result<Vec<Ticket>, sqlx::Error>;
    async fn find_ticket_for_user(
        &self,
        ticket_id: i64,
        user_id: i64,
    ) -> Result<Option<Ticket>, sqlx::Error>;
    /// Messages of a ticket in posting order.
    async fn list_messages(&self, ticket_id: i64) -> Result<Vec<TicketMessage>, sqlx::Error>;
    async fn find_last_message(&self, ticket_id: i64)
        -> Result<Option<TicketMessage>, sqlx::Error>;
    /// Creates the ticket and its first message unless the owner already has
    /// an open ticket. The check and both inserts share one transaction.
    async fn open_ticket(
        &self,
        ticket: NewTicket,
        message: &str,
    ) -> Result<OpenTicketOutcome, sqlx::Error>;
    /// Creates a ticket and its first message without the open-ticket check.
    async fn create_ticket_with_message(
        &self,
        ticket: NewTicket,
        message: &str,
    ) -> Result<Ticket, sqlx::Error>;
    /// Appends a message and touches the ticket's `updated_at`.
    async fn append_message(
        &self,
        ticket_id: i64,
        user_id: i64,
        message: &str,
    ) -> Result<TicketMessage, sqlx::Error>;
    /// Marks the ticket closed. Returns `None` when the user does not own it.
    async fn close_ticket(
        &self,
        ticket_id: i64,
        user_id: i64,
    ) -> Result<Option<Ticket>, sqlx::Error>;
}
