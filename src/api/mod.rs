// API module - HTTP endpoints

pub mod auth;
pub mod cards;
pub mod middleware;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::config::Config;
use crate::services::block_request::BlockRequestWorkflow;
use crate::services::card_number::CardNumberGenerator;
use crate::services::ledger::CardLedger;
use crate::services::ownership::OwnershipGuard;
use crate::services::transfer::TransferEngine;
use crate::services::users::AuthService;
use crate::store::CardStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CardStore>,
    pub clock: Arc<dyn Clock>,
    pub ledger: Arc<CardLedger>,
    pub transfers: Arc<TransferEngine>,
    pub blocks: Arc<BlockRequestWorkflow>,
    pub auth: Arc<AuthService>,
    pub guard: OwnershipGuard,
}

impl AppState {
    pub fn new(store: Arc<dyn CardStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let numbers = CardNumberGenerator::new(config.card_number_prefix.clone());
        let ledger = Arc::new(CardLedger::new(store.clone(), clock.clone(), numbers));
        let transfers = Arc::new(TransferEngine::new(ledger.clone()));
        let blocks = Arc::new(BlockRequestWorkflow::new(store.clone(), clock.clone()));
        let auth = Arc::new(AuthService::new(
            store.clone(),
            clock.clone(),
            config.jwt_secret.clone(),
        ));
        Self {
            store,
            clock,
            ledger,
            transfers,
            blocks,
            auth,
            guard: OwnershipGuard,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = cards::router().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::auth::require_auth,
    ));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(auth::router())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
