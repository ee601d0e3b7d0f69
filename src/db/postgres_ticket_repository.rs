use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::models::ticket::{NewTicket, Ticket, TicketMessage, TicketStatus};

use super::ticket_repository::{OpenTicketOutcome, TicketRepository};

const TICKET_COLUMNS: &str = "id, user_id, subject, level, status, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, ticket_id, user_id, message, created_at";

pub struct PostgresTicketRepository {
    pub pool: PgPool,
}

async fn insert_ticket(conn: &mut PgConnection, ticket: &NewTicket) -> Result<Ticket, sqlx::Error> {
    sqlx::query_as::<_, Ticket>(&format!(
        r#"
        INSERT INTO tickets (user_id, subject, level, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, now(), now())
        RETURNING {TICKET_COLUMNS}
        "#
    ))
    .bind(ticket.user_id)
    .bind(&ticket.subject)
    .bind(ticket.level.as_i16())
    .bind(TicketStatus::Open.as_i16())
    .fetch_one(conn)
    .await
}

async fn insert_message(
    conn: &mut PgConnection,
    ticket_id: i64,
    user_id: i64,
    message: &str,
) -> Result<TicketMessage, sqlx::Error> {
    sqlx::query_as::<_, TicketMessage>(&format!(
        r#"
        INSERT INTO ticket_messages (ticket_id, user_id, message, created_at)
        VALUES ($1, $2, $3, now())
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(ticket_id)
    .bind(user_id)
    .bind(message)
    .fetch_one(conn)
    .await
}

#[async_trait]
impl TicketRepository for PostgresTicketRepository {
    async fn list_tickets_for_user(&self, user_id: i64) -> Result<Vec<Ticket>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(&format!(
            r#"
            SELECT {TICKET_COLUMNS}
            FROM tickets
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_ticket_for_user(
        &self,
        ticket_id: i64,
        user_id: i64,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 AND user_id = $2"
        ))
        .bind(ticket_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_messages(&self, ticket_id: i64) -> Result<Vec<TicketMessage>, sqlx::Error> {
        sqlx::query_as::<_, TicketMessage>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM ticket_messages WHERE ticket_id = $1 ORDER BY id ASC"
        ))
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_last_message(
        &self,
        ticket_id: i64,
    ) -> Result<Option<TicketMessage>, sqlx::Error> {
        sqlx::query_as::<_, TicketMessage>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM ticket_messages
            WHERE ticket_id = $1
            ORDER BY id DESC
            LIMIT 1
            "#
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn open_ticket(
        &self,
        ticket: NewTicket,
        message: &str,
    ) -> Result<OpenTicketOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Serialises concurrent opens for the same user; COUNT(*) cannot
        // carry FOR UPDATE itself.
        let owner: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(ticket.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner.is_none() {
            tx.rollback().await?;
            return Err(sqlx::Error::RowNotFound);
        }

        let open_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE user_id = $1 AND status = $2")
                .bind(ticket.user_id)
                .bind(TicketStatus::Open.as_i16())
                .fetch_one(&mut *tx)
                .await?;
        if open_count > 0 {
            tx.rollback().await?;
            return Ok(OpenTicketOutcome::AlreadyOpen);
        }

        let created = insert_ticket(&mut tx, &ticket).await?;
        insert_message(&mut tx, created.id, ticket.user_id, message).await?;

        tx.commit().await?;
        Ok(OpenTicketOutcome::Opened(created))
    }

    async fn create_ticket_with_message(
        &self,
        ticket: NewTicket,
        message: &str,
    ) -> Result<Ticket, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let created = insert_ticket(&mut tx, &ticket).await?;
        insert_message(&mut tx, created.id, ticket.user_id, message).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn append_message(
        &self,
        ticket_id: i64,
        user_id: i64,
        message: &str,
    ) -> Result<TicketMessage, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let created = insert_message(&mut tx, ticket_id, user_id, message).await?;
        sqlx::query("UPDATE tickets SET updated_at = now() WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn close_ticket(
        &self,
        ticket_id: i64,
        user_id: i64,
    ) -> Result<Option<Ticket>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(&format!(
            r#"
            UPDATE tickets
            SET status = $3, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(user_id)
        .bind(TicketStatus::Closed.as_i16())
        .fetch_optional(&self.pool)
        .await
    }
}
