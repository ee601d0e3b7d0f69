use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;

use super::ticket_repository::{OpenTicketOutcome, TicketRepository};
use super::user_repository::UserRepository;
use crate::models::ticket::{NewTicket, Ticket, TicketMessage, TicketStatus};
use crate::models::user::UserProfile;

/// Rows held by [`MockDb`]. Ids are assigned sequentially like BIGSERIAL.
#[derive(Debug, Default)]
pub struct MockStore {
    pub tickets: Vec<Ticket>,
    pub messages: Vec<TicketMessage>,
    pub profiles: HashMap<i64, UserProfile>,
    next_ticket_id: i64,
    next_message_id: i64,
}

impl MockStore {
    fn insert_ticket(&mut self, ticket: &NewTicket) -> Ticket {
        self.next_ticket_id += 1;
        let now = OffsetDateTime::now_utc();
        let created = Ticket {
            id: self.next_ticket_id,
            user_id: ticket.user_id,
            subject: ticket.subject.clone(),
            level: ticket.level,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.tickets.push(created.clone());
        created
    }

    fn insert_message(&mut self, ticket_id: i64, user_id: i64, message: &str) -> TicketMessage {
        self.next_message_id += 1;
        let created = TicketMessage {
            id: self.next_message_id,
            ticket_id,
            user_id,
            message: message.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.messages.push(created.clone());
        created
    }
}

/// In-memory stand-in for both repositories. A single lock guards every
/// table, so multi-row writes are atomic just like a transaction.
#[derive(Debug, Default)]
pub struct MockDb {
    pub store: Mutex<MockStore>,
    pub should_fail: bool,
    /// Fails the message insert after the ticket insert, then discards the
    /// ticket as a rolled back transaction would.
    pub fail_message_insert: bool,
}

impl MockDb {
    pub fn with_profile(profile: UserProfile) -> Self {
        let db = Self::default();
        db.insert_profile(profile);
        db
    }

    pub fn insert_profile(&self, profile: UserProfile) {
        self.store
            .lock()
            .unwrap()
            .profiles
            .insert(profile.id, profile);
    }

    /// Inserts a message as another party (e.g. support staff) would.
    pub fn push_message(&self, ticket_id: i64, user_id: i64, message: &str) -> TicketMessage {
        self.store
            .lock()
            .unwrap()
            .insert_message(ticket_id, user_id, message)
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.store.lock().unwrap().tickets.clone()
    }

    pub fn messages(&self) -> Vec<TicketMessage> {
        self.store.lock().unwrap().messages.clone()
    }

    fn check(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(())
    }

    fn create_with_message(
        &self,
        store: &mut MockStore,
        ticket: &NewTicket,
        message: &str,
    ) -> Result<Ticket, sqlx::Error> {
        let created = store.insert_ticket(ticket);
        if self.fail_message_insert {
            store.tickets.retain(|t| t.id != created.id);
            return Err(sqlx::Error::Protocol("Mock message insert failure".into()));
        }
        store.insert_message(created.id, ticket.user_id, message);
        Ok(created)
    }
}

#[async_trait]
impl TicketRepository for MockDb {
    async fn list_tickets_for_user(&self, user_id: i64) -> Result<Vec<Ticket>, sqlx::Error> {
        self.check()?;
        let store = self.store.lock().unwrap();
        let mut tickets: Vec<Ticket> = store
            .tickets
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tickets)
    }

    async fn find_ticket_for_user(
        &self,
        ticket_id: i64,
        user_id: i64,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        self.check()?;
        let store = self.store.lock().unwrap();
        Ok(store
            .tickets
            .iter()
            .find(|t| t.id == ticket_id && t.user_id == user_id)
            .cloned())
    }

    async fn list_messages(&self, ticket_id: i64) -> Result<Vec<TicketMessage>, sqlx::Error> {
        self.check()?;
        let store = self.store.lock().unwrap();
        let mut messages: Vec<TicketMessage> = store
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn find_last_message(
        &self,
        ticket_id: i64,
    ) -> Result<Option<TicketMessage>, sqlx::Error> {
        self.check()?;
        let store = self.store.lock().unwrap();
        Ok(store
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .max_by_key(|m| m.id)
            .cloned())
    }

    async fn open_ticket(
        &self,
        ticket: NewTicket,
        message: &str,
    ) -> Result<OpenTicketOutcome, sqlx::Error> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        let already_open = store
            .tickets
            .iter()
            .any(|t| t.user_id == ticket.user_id && t.status == TicketStatus::Open);
        if already_open {
            return Ok(OpenTicketOutcome::AlreadyOpen);
        }
        let created = self.create_with_message(&mut store, &ticket, message)?;
        Ok(OpenTicketOutcome::Opened(created))
    }

    async fn create_ticket_with_message(
        &self,
        ticket: NewTicket,
        message: &str,
    ) -> Result<Ticket, sqlx::Error> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        self.create_with_message(&mut store, &ticket, message)
    }

    async fn append_message(
        &self,
        ticket_id: i64,
        user_id: i64,
        message: &str,
    ) -> Result<TicketMessage, sqlx::Error> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        let created = store.insert_message(ticket_id, user_id, message);
        if let Some(ticket) = store.tickets.iter_mut().find(|t| t.id == ticket_id) {
            ticket.updated_at = created.created_at;
        }
        Ok(created)
    }

    async fn close_ticket(
        &self,
        ticket_id: i64,
        user_id: i64,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        Ok(store
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id && t.user_id == user_id)
            .map(|ticket| {
                ticket.status = TicketStatus::Closed;
                ticket.updated_at = OffsetDateTime::now_utc();
                ticket.clone()
            }))
    }
}

#[async_trait]
impl UserRepository for MockDb {
    async fn find_user_profile(&self, user_id: i64) -> Result<Option<UserProfile>, sqlx::Error> {
        self.check()?;
        Ok(self.store.lock().unwrap().profiles.get(&user_id).cloned())
    }
}
