use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{AppError, LedgerError, Result};
use crate::models::{month, Card, CardStatus, Identity};
use crate::store::{Page, PageRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    pub owner_username: String,
    pub initial_balance: Decimal,
    #[serde(with = "month::mm_yy")]
    pub expiration_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_card_id: Uuid,
    pub to_card_id: Uuid,
    pub sum: Decimal,
}

/// Public representation of a card; the number is always masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: Uuid,
    pub card_number: String,
    pub owner_name: String,
    pub card_status: CardStatus,
    #[serde(with = "month::mm_yy")]
    pub expiration_date: NaiveDate,
    pub balance: Decimal,
}

impl CardView {
    fn new(card: &Card, owner_name: String) -> Self {
        Self {
            id: card.id,
            card_number: card.masked_number(),
            owner_name,
            card_status: card.status,
            expiration_date: card.expiration_date,
            balance: card.balance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Owner username filter, honored for administrators only.
    pub user: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cards/new", post(create_card))
        .route("/cards/view/:id", get(view_card))
        .route("/cards/list", get(list_cards))
        .route("/cards/block/:id", patch(block_card))
        .route("/cards/delete/:id", delete(delete_card))
        .route("/cards/sendblockrequest/:card_id", post(send_block_request))
        .route("/cards/transfer", post(transfer))
}

fn require_admin(state: &AppState, identity: &Identity) -> Result<()> {
    if state.guard.is_privileged(identity) {
        Ok(())
    } else {
        Err(LedgerError::PermissionDenied("administrator role required".to_string()).into())
    }
}

async fn owner_name(state: &AppState, owner_id: Uuid) -> Result<String> {
    Ok(state
        .store
        .find_user_by_id(owner_id)
        .await?
        .map(|user| user.username)
        .unwrap_or_else(|| "unknown".to_string()))
}

/// Issues a new card (administrators only).
async fn create_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateCardRequest>,
) -> Result<impl IntoResponse> {
    require_admin(&state, &identity)?;

    let card = state
        .ledger
        .issue(
            &request.owner_username,
            request.initial_balance,
            request.expiration_date,
        )
        .await?;

    let view = CardView::new(&card, request.owner_username);
    let location = format!("/cards/view/{}", card.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(view),
    ))
}

async fn view_card(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<CardView>> {
    let card = state.ledger.get(id).await?;
    let owner = owner_name(&state, card.owner_id).await?;
    Ok(Json(CardView::new(&card, owner)))
}

/// Administrators see every card, optionally filtered by owner; plain
/// users always get their own cards only.
async fn list_cards(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<CardView>>> {
    let page = PageRequest {
        page: params.page.unwrap_or(0),
        size: params.size.unwrap_or(20),
    };

    let owner_filter = match &params.user {
        Some(username) if state.guard.is_privileged(&identity) && !username.is_empty() => {
            match state.store.find_user_by_username(username).await? {
                Some(user) => Some(user.id),
                None => return Ok(Json(Page::empty(page))),
            }
        }
        _ => None,
    };

    let cards = state.ledger.list(&identity, owner_filter, page).await?;

    let mut names: HashMap<Uuid, String> = HashMap::new();
    for card in &cards.items {
        if !names.contains_key(&card.owner_id) {
            let name = owner_name(&state, card.owner_id).await?;
            names.insert(card.owner_id, name);
        }
    }

    let views = cards.map(|card| {
        let owner = names
            .get(&card.owner_id)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        CardView::new(&card, owner)
    });
    Ok(Json(views))
}

/// Blocks a card directly, approving any pending block request in the
/// same transaction (administrators only, enforced by the workflow).
async fn block_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>> {
    let (card, _request) = state.blocks.approve(&identity, id).await?;
    Ok(Json(ActionResponse {
        message: format!("card {} has been blocked", card.id),
    }))
}

/// Administrative side-channel; the ledger core itself never deletes.
async fn delete_card(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>> {
    require_admin(&state, &identity)?;
    if !state.store.delete_card(id).await? {
        return Err(AppError::Ledger(LedgerError::CardNotFound(id)));
    }
    Ok(Json(ActionResponse {
        message: format!("card {id} has been deleted"),
    }))
}

async fn send_block_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<ActionResponse>> {
    let outcome = state.blocks.file_request(&identity, card_id).await?;
    Ok(Json(ActionResponse {
        message: outcome.message().to_string(),
    }))
}

/// Transfers money between two cards of the current user.
async fn transfer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<ActionResponse>> {
    let receipt = state
        .transfers
        .transfer(
            &identity,
            request.from_card_id,
            request.to_card_id,
            request.sum,
        )
        .await?;
    Ok(Json(ActionResponse {
        message: receipt.message(),
    }))
}
