use std::net::IpAddr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::db::ticket_repository::OpenTicketOutcome;
use crate::models::ticket::{NewTicket, Ticket, TicketDetail, TicketLevel, TicketMessage};
use crate::responses::JsonResponse;
use crate::services::ticket_notice;
use crate::state::AppState;

pub const WITHDRAW_TICKET_SUBJECT: &str =
    "[Commission Withdrawal Request] This ticket is opened by the system";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl TicketError {
    fn invalid(msg: &str) -> Self {
        TicketError::InvalidInput(msg.to_string())
    }

    fn ticket_not_found() -> Self {
        TicketError::NotFound("Ticket does not exist".to_string())
    }
}

impl IntoResponse for TicketError {
    fn into_response(self) -> Response {
        match &self {
            TicketError::InvalidInput(msg) => JsonResponse::bad_request(msg).into_response(),
            TicketError::NotFound(msg) => JsonResponse::not_found(msg).into_response(),
            TicketError::Conflict(msg) => JsonResponse::conflict(msg).into_response(),
            TicketError::ServiceUnavailable(msg) => {
                JsonResponse::service_unavailable(msg).into_response()
            }
            TicketError::Internal(msg) => JsonResponse::server_error(msg).into_response(),
        }
    }
}

impl From<JsonRejection> for TicketError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(reason = %rejection.body_text(), "rejected ticket request body");
        TicketError::invalid("Invalid parameter")
    }
}

impl From<QueryRejection> for TicketError {
    fn from(rejection: QueryRejection) -> Self {
        debug!(reason = %rejection.body_text(), "rejected ticket query");
        TicketError::invalid("Invalid parameter")
    }
}

/// Who is acting and where the request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub client_ip: Option<IpAddr>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketSavePayload {
    pub subject: Option<String>,
    pub level: Option<i16>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketReplyPayload {
    pub id: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketClosePayload {
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketWithdrawPayload {
    pub withdraw_method: Option<String>,
    pub withdraw_account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTicketInput {
    pub subject: String,
    pub level: TicketLevel,
    pub message: String,
}

/// Keeps the text as submitted; only all-whitespace input counts as empty.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TicketSavePayload {
    pub fn validate(self) -> Result<OpenTicketInput, TicketError> {
        let subject =
            non_blank(self.subject).ok_or_else(|| TicketError::invalid("Ticket subject cannot be empty"))?;
        let level = self
            .level
            .ok_or_else(|| TicketError::invalid("Ticket level cannot be empty"))
            .and_then(|raw| {
                TicketLevel::try_from(raw).map_err(|_| TicketError::invalid("Incorrect ticket level format"))
            })?;
        let message =
            non_blank(self.message).ok_or_else(|| TicketError::invalid("Message cannot be empty"))?;
        Ok(OpenTicketInput {
            subject,
            level,
            message,
        })
    }
}

impl TicketReplyPayload {
    pub fn validate(self) -> Result<(i64, String), TicketError> {
        let id = self.id.ok_or_else(|| TicketError::invalid("Invalid parameter"))?;
        let message =
            non_blank(self.message).ok_or_else(|| TicketError::invalid("Message cannot be empty"))?;
        Ok((id, message))
    }
}

impl TicketClosePayload {
    pub fn validate(self) -> Result<i64, TicketError> {
        self.id.ok_or_else(|| TicketError::invalid("Invalid parameter"))
    }
}

impl TicketWithdrawPayload {
    pub fn validate(self) -> Result<(String, String), TicketError> {
        let method = non_blank(self.withdraw_method)
            .ok_or_else(|| TicketError::invalid("The withdrawal method cannot be empty"))?;
        let account = non_blank(self.withdraw_account)
            .ok_or_else(|| TicketError::invalid("The withdrawal account cannot be empty"))?;
        Ok((method, account))
    }
}

/// Payload of `fetch`: one ticket with its thread, or the caller's list.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TicketFetch {
    One(TicketDetail),
    All(Vec<Ticket>),
}

fn storage_error(err: sqlx::Error, ctx: &RequestContext, action: &str, msg: &str) -> TicketError {
    error!(?err, user_id = ctx.user_id, action, "ticket storage failure");
    TicketError::Internal(msg.to_string())
}

pub async fn fetch_tickets(
    state: &AppState,
    ctx: &RequestContext,
    ticket_id: Option<i64>,
) -> Result<TicketFetch, TicketError> {
    let Some(ticket_id) = ticket_id else {
        let tickets = state
            .ticket_repo
            .list_tickets_for_user(ctx.user_id)
            .await
            .map_err(|err| storage_error(err, ctx, "list", "Failed to load tickets"))?;
        return Ok(TicketFetch::All(tickets));
    };

    let ticket = state
        .ticket_repo
        .find_ticket_for_user(ticket_id, ctx.user_id)
        .await
        .map_err(|err| storage_error(err, ctx, "fetch", "Failed to load ticket"))?
        .ok_or_else(TicketError::ticket_not_found)?;

    let messages = state
        .ticket_repo
        .list_messages(ticket.id)
        .await
        .map_err(|err| storage_error(err, ctx, "fetch", "Failed to load ticket"))?;

    Ok(TicketFetch::One(TicketDetail::new(ticket, messages)))
}

pub async fn open_ticket(
    state: &AppState,
    ctx: &RequestContext,
    payload: TicketSavePayload,
) -> Result<Ticket, TicketError> {
    let input = payload.validate()?;
    let new_ticket = NewTicket {
        user_id: ctx.user_id,
        subject: input.subject,
        level: input.level,
    };

    let outcome = state
        .ticket_repo
        .open_ticket(new_ticket, &input.message)
        .await
        .map_err(|err| storage_error(err, ctx, "open", "Failed to open ticket"))?;

    let ticket = match outcome {
        OpenTicketOutcome::Opened(ticket) => ticket,
        OpenTicketOutcome::AlreadyOpen => {
            return Err(TicketError::Conflict(
                "There are other unresolved tickets".to_string(),
            ))
        }
    };

    info!(user_id = ctx.user_id, ticket_id = ticket.id, "ticket opened");
    ticket_notice::dispatch(state, &ticket, &input.message, ctx).await;
    Ok(ticket)
}

pub async fn reply_ticket(
    state: &AppState,
    ctx: &RequestContext,
    payload: TicketReplyPayload,
) -> Result<TicketMessage, TicketError> {
    let (ticket_id, message) = payload.validate()?;

    let ticket = state
        .ticket_repo
        .find_ticket_for_user(ticket_id, ctx.user_id)
        .await
        .map_err(|err| storage_error(err, ctx, "reply", "Ticket reply failed"))?
        .ok_or_else(TicketError::ticket_not_found)?;

    if ticket.is_closed() {
        return Err(TicketError::Conflict(
            "The ticket is closed and cannot be replied".to_string(),
        ));
    }

    let last = state
        .ticket_repo
        .find_last_message(ticket.id)
        .await
        .map_err(|err| storage_error(err, ctx, "reply", "Ticket reply failed"))?;
    if last.is_some_and(|last| last.user_id == ctx.user_id) {
        return Err(TicketError::Conflict(
            "Please wait for the technical engineer to reply".to_string(),
        ));
    }

    let created = state
        .ticket_repo
        .append_message(ticket.id, ctx.user_id, &message)
        .await
        .map_err(|err| storage_error(err, ctx, "reply", "Ticket reply failed"))?;

    ticket_notice::dispatch(state, &ticket, &message, ctx).await;
    Ok(created)
}

/// Closing an already closed ticket succeeds without further effect.
pub async fn close_ticket(
    state: &AppState,
    ctx: &RequestContext,
    payload: TicketClosePayload,
) -> Result<Ticket, TicketError> {
    let ticket_id = payload.validate()?;

    let closed = state
        .ticket_repo
        .close_ticket(ticket_id, ctx.user_id)
        .await
        .map_err(|err| storage_error(err, ctx, "close", "Close failed"))?
        .ok_or_else(TicketError::ticket_not_found)?;

    info!(user_id = ctx.user_id, ticket_id = closed.id, "ticket closed");
    Ok(closed)
}

pub fn withdraw_message(method: &str, account: &str) -> String {
    format!("Withdrawal method: {method}\r\nWithdrawal account: {account}")
}

pub async fn request_withdrawal(
    state: &AppState,
    ctx: &RequestContext,
    payload: TicketWithdrawPayload,
) -> Result<Ticket, TicketError> {
    let settings = &state.config.withdraw;
    if settings.close_enabled {
        return Err(TicketError::ServiceUnavailable(
            "Withdrawals are not supported at the moment".to_string(),
        ));
    }

    let (method, account) = payload.validate()?;
    if !settings.allows_method(&method) {
        return Err(TicketError::invalid("Unsupported withdrawal method"));
    }

    let profile = state
        .user_repo
        .find_user_profile(ctx.user_id)
        .await
        .map_err(|err| storage_error(err, ctx, "withdraw", "Failed to open ticket"))?
        .ok_or_else(|| TicketError::NotFound("The user does not exist".to_string()))?;

    // Balance is stored in minor units, the limit in whole units.
    if profile.commission_balance < settings.limit.saturating_mul(100) {
        return Err(TicketError::Conflict(format!(
            "The current required minimum withdrawal commission is {}",
            settings.limit
        )));
    }

    let message = withdraw_message(&method, &account);
    let ticket = state
        .ticket_repo
        .create_ticket_with_message(
            NewTicket {
                user_id: ctx.user_id,
                subject: WITHDRAW_TICKET_SUBJECT.to_string(),
                level: TicketLevel::High,
            },
            &message,
        )
        .await
        .map_err(|err| storage_error(err, ctx, "withdraw", "Failed to open ticket"))?;

    info!(user_id = ctx.user_id, ticket_id = ticket.id, %method, "withdrawal ticket opened");
    ticket_notice::dispatch(state, &ticket, &message, ctx).await;
    Ok(ticket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::MockDb;
    use crate::models::ticket::TicketStatus;
    use crate::models::user::UserProfile;
    use crate::services::notifier::MockNotifier;
    use crate::state::test_support::{state_with, test_config};
    use std::sync::Arc;
    use std::time::Duration;

    const USER: i64 = 1;
    const OTHER_USER: i64 = 2;
    const STAFF: i64 = 99;

    fn ctx(user_id: i64) -> RequestContext {
        RequestContext {
            user_id,
            client_ip: Some("127.0.0.1".parse().unwrap()),
        }
    }

    fn profile(user_id: i64, commission_balance: i64) -> UserProfile {
        UserProfile {
            id: user_id,
            commission_balance,
            transfer_enable: 10 * 1024 * 1024 * 1024,
            upload: 0,
            download: 0,
            expired_at: None,
            plan_name: Some("Basic".into()),
        }
    }

    fn save(subject: &str, level: i16, message: &str) -> TicketSavePayload {
        TicketSavePayload {
            subject: Some(subject.into()),
            level: Some(level),
            message: Some(message.into()),
        }
    }

    fn reply(id: i64, message: &str) -> TicketReplyPayload {
        TicketReplyPayload {
            id: Some(id),
            message: Some(message.into()),
        }
    }

    fn withdraw(method: &str, account: &str) -> TicketWithdrawPayload {
        TicketWithdrawPayload {
            withdraw_method: Some(method.into()),
            withdraw_account: Some(account.into()),
        }
    }

    fn setup() -> (AppState, Arc<MockDb>, Arc<MockNotifier>) {
        let db = Arc::new(MockDb::with_profile(profile(USER, 50_000)));
        let notifier = Arc::new(MockNotifier::default());
        let state = state_with(db.clone(), notifier.clone(), test_config());
        (state, db, notifier)
    }

    #[tokio::test]
    async fn open_creates_ticket_and_first_message() {
        let (state, db, notifier) = setup();

        let ticket = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .expect("open should succeed");

        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.level, TicketLevel::Medium);
        let tickets = db.tickets();
        let messages = db.messages();
        assert_eq!(tickets.len(), 1);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].ticket_id, ticket.id);
        assert_eq!(messages[0].user_id, USER);
        assert_eq!(messages[0].message, "hi");

        let sent = notifier.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(&format!("Ticket #{}", ticket.id)));
        assert!(sent[0].contains("Subject: `Help`"));
    }

    #[tokio::test]
    async fn open_keeps_text_as_submitted() {
        let (state, db, _) = setup();

        let ticket = open_ticket(&state, &ctx(USER), save("  Help  ", 1, "    indented\nlog\n"))
            .await
            .unwrap();

        assert_eq!(ticket.subject, "  Help  ");
        assert_eq!(db.messages()[0].message, "    indented\nlog\n");

        let err = reply_ticket(&state, &ctx(USER), reply(ticket.id, " \n\t"))
            .await
            .unwrap_err();
        assert_eq!(err, TicketError::invalid("Message cannot be empty"));
    }

    #[tokio::test]
    async fn second_open_is_rejected_until_closed() {
        let (state, db, _) = setup();

        let first = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap();
        let err = open_ticket(&state, &ctx(USER), save("Again", 0, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::Conflict(_)));
        assert_eq!(db.tickets().len(), 1);

        close_ticket(&state, &ctx(USER), TicketClosePayload { id: Some(first.id) })
            .await
            .unwrap();
        open_ticket(&state, &ctx(USER), save("Again", 0, "hello"))
            .await
            .expect("open after close should succeed");
        assert_eq!(db.tickets().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_opens_leave_a_single_open_ticket() {
        let (state, db, _) = setup();

        let mut handles = Vec::new();
        for i in 0..16 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                let caller = ctx(USER);
                let result =
                    open_ticket(&state, &caller, save(&format!("Race {i}"), 0, "hi")).await;
                result
            }));
        }

        let mut opened = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => opened += 1,
                Err(TicketError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(opened, 1);
        assert_eq!(conflicts, 15);
        let open_count = db
            .tickets()
            .iter()
            .filter(|t| t.user_id == USER && t.status == TicketStatus::Open)
            .count();
        assert_eq!(open_count, 1);
        assert_eq!(db.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_message_insert_leaves_no_rows() {
        let db = Arc::new(MockDb {
            fail_message_insert: true,
            ..Default::default()
        });
        let notifier = Arc::new(MockNotifier::default());
        let state = state_with(db.clone(), notifier.clone(), test_config());

        let err = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, TicketError::Internal(_)));
        assert!(db.tickets().is_empty());
        assert!(db.messages().is_empty());
        assert!(notifier.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn open_validates_payload() {
        let (state, db, _) = setup();

        for payload in [
            save("  ", 1, "hi"),
            save("Help", 3, "hi"),
            save("Help", 1, "   "),
            TicketSavePayload::default(),
        ] {
            let err = open_ticket(&state, &ctx(USER), payload).await.unwrap_err();
            assert!(matches!(err, TicketError::InvalidInput(_)), "{err:?}");
        }
        assert!(db.tickets().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_does_not_fail_open() {
        let db = Arc::new(MockDb::default());
        let notifier = Arc::new(MockNotifier::failing());
        let state = state_with(db.clone(), notifier, test_config());

        open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .expect("notification failures are swallowed");
        assert_eq!(db.tickets().len(), 1);
    }

    #[tokio::test]
    async fn slow_notifier_is_cut_off_by_timeout() {
        let db = Arc::new(MockDb::default());
        let notifier = Arc::new(MockNotifier {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let mut config = test_config();
        config.notify_timeout = Duration::from_millis(50);
        let state = state_with(db.clone(), notifier.clone(), config);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            open_ticket(&state, &ctx(USER), save("Help", 1, "hi")),
        )
        .await
        .expect("open should not wait for the notifier");

        assert!(result.is_ok());
        assert!(notifier.sent_texts().is_empty());
        assert_eq!(db.tickets().len(), 1);
    }

    #[tokio::test]
    async fn reply_enforces_turn_taking() {
        let (state, db, notifier) = setup();
        let ticket = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap();

        let err = reply_ticket(&state, &ctx(USER), reply(ticket.id, "anyone?"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TicketError::Conflict("Please wait for the technical engineer to reply".into())
        );

        db.push_message(ticket.id, STAFF, "looking into it");
        let created = reply_ticket(&state, &ctx(USER), reply(ticket.id, "thanks"))
            .await
            .expect("reply after staff should succeed");
        assert_eq!(created.user_id, USER);
        assert_eq!(db.messages().len(), 3);
        assert_eq!(notifier.sent_texts().len(), 2);
    }

    #[tokio::test]
    async fn reply_to_foreign_or_missing_ticket_is_not_found() {
        let (state, _, _) = setup();
        let ticket = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap();

        let foreign = reply_ticket(&state, &ctx(OTHER_USER), reply(ticket.id, "hello"))
            .await
            .unwrap_err();
        let missing = reply_ticket(&state, &ctx(OTHER_USER), reply(9999, "hello"))
            .await
            .unwrap_err();

        assert_eq!(foreign, TicketError::NotFound("Ticket does not exist".into()));
        assert_eq!(foreign, missing);
    }

    #[tokio::test]
    async fn reply_validates_payload() {
        let (state, _, _) = setup();
        let err = reply_ticket(&state, &ctx(USER), TicketReplyPayload::default())
            .await
            .unwrap_err();
        assert_eq!(err, TicketError::InvalidInput("Invalid parameter".into()));

        let err = reply_ticket(&state, &ctx(USER), reply(1, " "))
            .await
            .unwrap_err();
        assert_eq!(err, TicketError::InvalidInput("Message cannot be empty".into()));
    }

    #[tokio::test]
    async fn closed_ticket_rejects_replies_and_closes_idempotently() {
        let (state, db, _) = setup();
        let ticket = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap();
        db.push_message(ticket.id, STAFF, "fixed");

        let closed = close_ticket(&state, &ctx(USER), TicketClosePayload { id: Some(ticket.id) })
            .await
            .unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);

        let again = close_ticket(&state, &ctx(USER), TicketClosePayload { id: Some(ticket.id) })
            .await
            .expect("closing twice succeeds");
        assert_eq!(again.status, TicketStatus::Closed);

        let err = reply_ticket(&state, &ctx(USER), reply(ticket.id, "one more thing"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TicketError::Conflict("The ticket is closed and cannot be replied".into())
        );
    }

    #[tokio::test]
    async fn close_requires_ownership() {
        let (state, db, _) = setup();
        let ticket = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap();

        let err = close_ticket(&state, &ctx(OTHER_USER), TicketClosePayload { id: Some(ticket.id) })
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
        assert_eq!(db.tickets()[0].status, TicketStatus::Open);

        let err = close_ticket(&state, &ctx(USER), TicketClosePayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn fetch_returns_thread_with_is_me_flags() {
        let (state, db, _) = setup();
        let ticket = open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap();
        db.push_message(ticket.id, STAFF, "hello from support");

        let TicketFetch::One(detail) = fetch_tickets(&state, &ctx(USER), Some(ticket.id))
            .await
            .unwrap()
        else {
            panic!("expected a single ticket");
        };
        assert_eq!(detail.ticket.id, ticket.id);
        let flags: Vec<bool> = detail.message.iter().map(|m| m.is_me).collect();
        assert_eq!(flags, vec![true, false]);

        let err = fetch_tickets(&state, &ctx(OTHER_USER), Some(ticket.id))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_lists_newest_first() {
        let (state, _, _) = setup();
        let first = open_ticket(&state, &ctx(USER), save("First", 0, "a"))
            .await
            .unwrap();
        close_ticket(&state, &ctx(USER), TicketClosePayload { id: Some(first.id) })
            .await
            .unwrap();
        let second = open_ticket(&state, &ctx(USER), save("Second", 0, "b"))
            .await
            .unwrap();

        let TicketFetch::All(tickets) = fetch_tickets(&state, &ctx(USER), None).await.unwrap()
        else {
            panic!("expected a list");
        };
        let ids: Vec<i64> = tickets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let TicketFetch::All(none) = fetch_tickets(&state, &ctx(OTHER_USER), None).await.unwrap()
        else {
            panic!("expected a list");
        };
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn withdraw_opens_system_ticket() {
        let (state, db, notifier) = setup();

        let ticket = request_withdrawal(&state, &ctx(USER), withdraw("USDT", "T-123"))
            .await
            .expect("withdraw should succeed");

        assert_eq!(ticket.subject, WITHDRAW_TICKET_SUBJECT);
        assert_eq!(ticket.level, TicketLevel::High);
        let messages = db.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].message,
            "Withdrawal method: USDT\r\nWithdrawal account: T-123"
        );
        assert_eq!(notifier.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn withdraw_below_minimum_is_rejected_without_rows() {
        let db = Arc::new(MockDb::with_profile(profile(USER, 9_999)));
        let state = state_with(db.clone(), Arc::new(MockNotifier::default()), test_config());

        let err = request_withdrawal(&state, &ctx(USER), withdraw("USDT", "T-123"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TicketError::Conflict("The current required minimum withdrawal commission is 100".into())
        );
        assert!(db.tickets().is_empty());
        assert!(db.messages().is_empty());
    }

    #[tokio::test]
    async fn withdraw_at_exact_minimum_is_accepted() {
        let db = Arc::new(MockDb::with_profile(profile(USER, 10_000)));
        let state = state_with(db.clone(), Arc::new(MockNotifier::default()), test_config());

        request_withdrawal(&state, &ctx(USER), withdraw("Paypal", "me@example.com"))
            .await
            .expect("balance equal to the limit is enough");
        assert_eq!(db.tickets().len(), 1);
    }

    #[tokio::test]
    async fn withdraw_rejects_unknown_method_and_disabled_feature() {
        let (state, db, _) = setup();
        let err = request_withdrawal(&state, &ctx(USER), withdraw("Cash", "x"))
            .await
            .unwrap_err();
        assert_eq!(err, TicketError::InvalidInput("Unsupported withdrawal method".into()));

        let mut config = test_config();
        config.withdraw.close_enabled = true;
        let disabled = state_with(db.clone(), Arc::new(MockNotifier::default()), config);
        let err = request_withdrawal(&disabled, &ctx(USER), withdraw("USDT", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketError::ServiceUnavailable(_)));
        assert!(db.tickets().is_empty());
    }

    #[tokio::test]
    async fn withdraw_does_not_require_closing_open_tickets() {
        let (state, db, _) = setup();
        open_ticket(&state, &ctx(USER), save("Help", 1, "hi"))
            .await
            .unwrap();
        request_withdrawal(&state, &ctx(USER), withdraw("USDT", "T-123"))
            .await
            .unwrap();
        assert_eq!(db.tickets().len(), 2);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_internal_errors() {
        let db = Arc::new(MockDb {
            should_fail: true,
            ..Default::default()
        });
        let state = state_with(db, Arc::new(MockNotifier::default()), test_config());

        let err = fetch_tickets(&state, &ctx(USER), None).await.unwrap_err();
        assert_eq!(err, TicketError::Internal("Failed to load tickets".into()));
    }
}
