use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Json, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use crate::{
    responses::JsonResponse,
    routes::auth::session::AuthSession,
    services::tickets::{
        self, RequestContext, TicketClosePayload, TicketError, TicketReplyPayload,
        TicketSavePayload, TicketWithdrawPayload,
    },
    state::AppState,
    utils::ip::resolve_client_ip,
};

#[derive(Debug, Deserialize)]
pub struct FetchTicketQuery {
    pub id: Option<i64>,
}

fn request_context(session: &AuthSession, headers: &HeaderMap, peer: SocketAddr) -> RequestContext {
    RequestContext {
        user_id: session.user_id(),
        client_ip: resolve_client_ip(headers, Some(peer)),
    }
}

pub async fn fetch(
    State(state): State<AppState>,
    session: AuthSession,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    WithRejection(Query(query), _): WithRejection<Query<FetchTicketQuery>, TicketError>,
) -> Result<Response, TicketError> {
    let ctx = request_context(&session, &headers, peer);
    let payload = tickets::fetch_tickets(&state, &ctx, query.id).await?;
    Ok(JsonResponse::data(payload).into_response())
}

pub async fn save(
    State(state): State<AppState>,
    session: AuthSession,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    WithRejection(Json(payload), _): WithRejection<Json<TicketSavePayload>, TicketError>,
) -> Result<Response, TicketError> {
    let ctx = request_context(&session, &headers, peer);
    tickets::open_ticket(&state, &ctx, payload).await?;
    Ok(JsonResponse::data(true).into_response())
}

pub async fn reply(
    State(state): State<AppState>,
    session: AuthSession,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    WithRejection(Json(payload), _): WithRejection<Json<TicketReplyPayload>, TicketError>,
) -> Result<Response, TicketError> {
    let ctx = request_context(&session, &headers, peer);
    tickets::reply_ticket(&state, &ctx, payload).await?;
    Ok(JsonResponse::data(true).into_response())
}

pub async fn close(
    State(state): State<AppState>,
    session: AuthSession,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    WithRejection(Json(payload), _): WithRejection<Json<TicketClosePayload>, TicketError>,
) -> Result<Response, TicketError> {
    let ctx = request_context(&session, &headers, peer);
    tickets::close_ticket(&state, &ctx, payload).await?;
    Ok(JsonResponse::data(true).into_response())
}

pub async fn withdraw(
    State(state): State<AppState>,
    session: AuthSession,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    WithRejection(Json(payload), _): WithRejection<Json<TicketWithdrawPayload>, TicketError>,
) -> Result<Response, TicketError> {
    let ctx = request_context(&session, &headers, peer);
    tickets::request_withdrawal(&state, &ctx, payload).await?;
    Ok(JsonResponse::data(true).into_response())
}
