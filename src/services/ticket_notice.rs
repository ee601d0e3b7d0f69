//! Admin notice sent after a ticket write.
//!
//! Delivery is best-effort: every failure is logged here and never reaches
//! the caller of the ticket operation.

use std::fmt::Write as _;
use std::net::IpAddr;

use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, warn};

use crate::models::{ticket::Ticket, user::UserProfile};
use crate::services::notifier::NotifyError;
use crate::services::tickets::RequestContext;
use crate::state::AppState;
use crate::utils::ip::lookup_location;

pub const UNKNOWN_LOCATION: &str = "Unable to determine user location";
pub const NO_PLAN: &str = "No active plan";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Human readable traffic: megabytes below 1024 MB, gigabytes from there on,
/// rounded to two decimals without trailing zeros.
pub fn format_traffic(bytes: i64) -> String {
    let megabytes = bytes as f64 / BYTES_PER_MB;
    let (value, unit) = if megabytes >= 1024.0 {
        (megabytes / 1024.0, "GB")
    } else {
        (megabytes, "MB")
    };
    format!("{}{unit}", trim_decimals(value))
}

/// Half-way cases round away from zero.
fn trim_decimals(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let fixed = format!("{rounded:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn format_expiry(expired_at: Option<OffsetDateTime>) -> String {
    let Some(at) = expired_at else {
        return "never".to_string();
    };
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(&format).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub struct TicketNotice<'a> {
    pub ticket: &'a Ticket,
    pub message: &'a str,
    pub user_id: i64,
    pub client_ip: Option<IpAddr>,
    pub location: Option<&'a str>,
    pub profile: Option<&'a UserProfile>,
}

impl TicketNotice<'_> {
    pub fn render(&self) -> String {
        let mut text = format!("📮Ticket #{}\n———————————————\n", self.ticket.id);
        let ip = self
            .client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let location = self.location.unwrap_or(UNKNOWN_LOCATION);

        let _ = writeln!(text, "User ID: `{}`", self.user_id);
        let _ = writeln!(text, "Location/IP: `{location} {ip}`");

        match self.profile {
            Some(profile) if profile.has_plan() => {
                let _ = writeln!(
                    text,
                    "Plan: `{} {}/{}`",
                    profile.plan_name.as_deref().unwrap_or_default(),
                    format_traffic(profile.remaining_traffic()),
                    format_traffic(profile.transfer_enable)
                );
                let _ = writeln!(text, "Expires: `{}`", format_expiry(profile.expired_at));
            }
            _ => {
                let _ = writeln!(text, "Plan & traffic: \n`{NO_PLAN}`");
            }
        }

        let _ = write!(
            text,
            "Subject: `{}`\nMessage:\n`{}`\n",
            self.ticket.subject, self.message
        );
        text
    }
}

/// Builds and sends the admin notice for `ticket`, bounded by
/// `config.notify_timeout`.
pub async fn dispatch(state: &AppState, ticket: &Ticket, message: &str, ctx: &RequestContext) {
    let timeout = state.config.notify_timeout;
    match tokio::time::timeout(timeout, deliver(state, ticket, message, ctx)).await {
        Ok(Ok(())) => debug!(ticket_id = ticket.id, "ticket notice delivered"),
        Ok(Err(NotifyError::NotConfigured)) => {
            debug!(ticket_id = ticket.id, "admin notifier not configured, skipping notice")
        }
        Ok(Err(err)) => warn!(?err, ticket_id = ticket.id, "failed to deliver ticket notice"),
        Err(_) => warn!(ticket_id = ticket.id, ?timeout, "ticket notice timed out"),
    }
}

async fn deliver(
    state: &AppState,
    ticket: &Ticket,
    message: &str,
    ctx: &RequestContext,
) -> Result<(), NotifyError> {
    let profile = match state.user_repo.find_user_profile(ctx.user_id).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!(?err, user_id = ctx.user_id, "failed to load user profile for ticket notice");
            None
        }
    };

    let location = match ctx.client_ip {
        Some(ip) => lookup_location(&state.http_client, &state.config.ip_lookup, ip).await,
        None => None,
    };

    let text = TicketNotice {
        ticket,
        message,
        user_id: ctx.user_id,
        client_ip: ctx.client_ip,
        location: location.as_deref(),
        profile: profile.as_ref(),
    }
    .render();

    state.notifier.send_message_with_admin(&text, true).await
}
