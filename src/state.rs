use crate::config::Config;
use crate::db::{ticket_repository::TicketRepository, user_repository::UserRepository};
use crate::services::notifier::AdminNotifier;
use crate::utils::jwt::SessionVerifier;
use reqwest::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ticket_repo: Arc<dyn TicketRepository>,
    pub user_repo: Arc<dyn UserRepository>,
    pub notifier: Arc<dyn AdminNotifier>,
    pub http_client: Arc<Client>,
    pub config: Arc<Config>,
    pub sessions: Arc<SessionVerifier>,
}
