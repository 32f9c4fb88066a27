use crate::constants::*;
use crate::error::NodeError;
use crate::node::Node;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use powchain_core::{Block, TransactionRequest};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

type AppState = Arc<Node>;

#[derive(Deserialize)]
struct RegisterIn {
    address: String,
}

/// Body extraction failures surface as `NodeError::Validation` (400) rather
/// than axum's default 422 plain-text response.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, NodeError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| NodeError::Validation(rejection.body_text()))
}

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route(ROUTE_NEW_TRANSACTION, post(new_transaction))
        .route(ROUTE_PENDING_TRANSACTIONS, get(pending_transactions))
        .route(ROUTE_CHAIN, get(full_chain))
        .route(ROUTE_CHAIN_HEAD, get(chain_head))
        .route(ROUTE_MINERS, get(active_peers))
        .route(ROUTE_PEERS, get(active_peers))
        .route(ROUTE_REGISTER, post(register))
        .route(ROUTE_RECEIVE_BLOCK, post(receive_block))
        .route(ROUTE_RECEIVE_TRANSACTION, post(receive_transaction))
        .route(ROUTE_HEALTH, get(health))
        .with_state(node)
}

async fn new_transaction(
    State(node): State<AppState>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, NodeError> {
    let tx = node.submit_transaction(body(payload)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Transaction added", "transaction": tx })),
    ))
}

async fn pending_transactions(State(node): State<AppState>) -> impl IntoResponse {
    Json(node.pending_transactions().await)
}

async fn full_chain(State(node): State<AppState>) -> impl IntoResponse {
    Json(node.chain().await)
}

async fn chain_head(State(node): State<AppState>) -> impl IntoResponse {
    Json(node.head().await)
}

async fn active_peers(State(node): State<AppState>) -> impl IntoResponse {
    Json(json!({ "active_miners": node.active_peers().await }))
}

async fn register(
    State(node): State<AppState>,
    payload: Result<Json<RegisterIn>, JsonRejection>,
) -> Result<impl IntoResponse, NodeError> {
    let RegisterIn { address } = body(payload)?;
    let peers = node.register_peer(&address).await?;
    Ok((StatusCode::CREATED, Json(json!({ "peers": peers }))))
}

async fn receive_block(
    State(node): State<AppState>,
    payload: Result<Json<Block>, JsonRejection>,
) -> Result<impl IntoResponse, NodeError> {
    node.receive_block(body(payload)?).await?;
    Ok(Json(json!({ "message": "Block added" })))
}

async fn receive_transaction(
    State(node): State<AppState>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, NodeError> {
    node.receive_transaction(body(payload)?).await?;
    Ok(Json(json!({ "message": "Transaction received" })))
}

async fn health(State(node): State<AppState>) -> impl IntoResponse {
    Json(node.health())
}
