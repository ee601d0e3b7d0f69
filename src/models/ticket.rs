use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown ticket {field} value {value}")]
pub struct UnknownTicketValue {
    pub field: &'static str,
    pub value: i16,
}

/// Ticket lifecycle. Stored as SMALLINT: 0 open, 1 closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            TicketStatus::Open => 0,
            TicketStatus::Closed => 1,
        }
    }
}

impl From<TicketStatus> for i16 {
    fn from(value: TicketStatus) -> Self {
        value.as_i16()
    }
}

impl TryFrom<i16> for TicketStatus {
    type Error = UnknownTicketValue;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TicketStatus::Open),
            1 => Ok(TicketStatus::Closed),
            other => Err(UnknownTicketValue {
                field: "status",
                value: other,
            }),
        }
    }
}

/// Priority chosen by the user when opening a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum TicketLevel {
    Low,
    Medium,
    High,
}

impl TicketLevel {
    pub fn as_i16(self) -> i16 {
        match self {
            TicketLevel::Low => 0,
            TicketLevel::Medium => 1,
            TicketLevel::High => 2,
        }
    }
}

impl From<TicketLevel> for i16 {
    fn from(value: TicketLevel) -> Self {
        value.as_i16()
    }
}

impl TryFrom<i16> for TicketLevel {
    type Error = UnknownTicketValue;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TicketLevel::Low),
            1 => Ok(TicketLevel::Medium),
            2 => Ok(TicketLevel::High),
            other => Err(UnknownTicketValue {
                field: "level",
                value: other,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub user_id: i64,
    pub subject: String,
    #[sqlx(try_from = "i16")]
    pub level: TicketLevel,
    #[sqlx(try_from = "i16")]
    pub status: TicketStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Ticket {
    pub fn is_closed(&self) -> bool {
        self.status == TicketStatus::Closed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub user_id: i64,
    pub subject: String,
    pub level: TicketLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketMessage {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A message as shown to the ticket owner.
#[derive(Debug, Clone, Serialize)]
pub struct TicketMessageView {
    #[serde(flatten)]
    pub message: TicketMessage,
    pub is_me: bool,
}

/// Single ticket with its thread, in the shape the panel frontend expects.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub message: Vec<TicketMessageView>,
}

impl TicketDetail {
    pub fn new(ticket: Ticket, messages: Vec<TicketMessage>) -> Self {
        let owner = ticket.user_id;
        let message = messages
            .into_iter()
            .map(|message| TicketMessageView {
                is_me: message.user_id == owner,
                message,
            })
            .collect();
        Self { ticket, message }
    }
}
