// Store module - transactional persistence for cards and block requests

pub mod memory;
pub mod postgres;

pub use memory::MemoryCardStore;
pub use postgres::PgCardStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{BlockRequest, Card, User};

/// Mutation applied to a locked card row inside a scoped transaction.
/// Returning an error rolls the transaction back.
pub type CardMutation<'a> = &'a (dyn Fn(&Card) -> Result<Card, LedgerError> + Send + Sync);

/// Mutation applied to two locked card rows; receives and returns the
/// cards in caller order.
pub type CardPairMutation<'a> =
    &'a (dyn Fn(&Card, &Card) -> Result<(Card, Card), LedgerError> + Send + Sync);

/// Mutation applied to a locked card row together with its pending
/// block request, if one exists.
pub type CardRequestMutation<'a> = &'a (dyn Fn(&Card, Option<&BlockRequest>) -> Result<(Card, Option<BlockRequest>), LedgerError>
         + Send
         + Sync);

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

impl PageRequest {
    pub fn limit(&self) -> i64 {
        i64::from(self.size.clamp(1, 100))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * self.limit()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty(request: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            page: request.page,
            size: request.size,
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
        }
    }
}

/// Transactional store for cards, block requests and users.
///
/// Single-row and multi-row update operations are exposed as scoped
/// transactions: the store locks the rows, applies the mutation and
/// commits, or rolls back when the mutation returns an error. Multi-row
/// locks are always acquired in canonical (ascending id) order.
#[async_trait]
pub trait CardStore: Send + Sync {
    // -- cards ---------------------------------------------------------

    async fn insert_card(&self, card: &Card) -> Result<(), LedgerError>;

    async fn get_card(&self, id: Uuid) -> Result<Option<Card>, LedgerError>;

    async fn list_cards(
        &self,
        owner: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Page<Card>, LedgerError>;

    /// Administrative side-channel; returns whether a row was removed.
    async fn delete_card(&self, id: Uuid) -> Result<bool, LedgerError>;

    async fn card_number_exists(&self, number: &str) -> Result<bool, LedgerError>;

    /// Ids of active cards whose expiration month is strictly before
    /// `month` (both normalized to the first day of the month).
    async fn find_active_expiring_before(&self, month: NaiveDate) -> Result<Vec<Uuid>, LedgerError>;

    // -- scoped transactions -------------------------------------------

    async fn update_card(&self, id: Uuid, apply: CardMutation<'_>) -> Result<Card, LedgerError>;

    async fn update_card_pair(
        &self,
        from: Uuid,
        to: Uuid,
        apply: CardPairMutation<'_>,
    ) -> Result<(Card, Card), LedgerError>;

    async fn update_card_and_pending_request(
        &self,
        card_id: Uuid,
        apply: CardRequestMutation<'_>,
    ) -> Result<(Card, Option<BlockRequest>), LedgerError>;

    // -- block requests ------------------------------------------------

    async fn insert_block_request(&self, request: &BlockRequest) -> Result<(), LedgerError>;

    async fn pending_request_exists(&self, card_id: Uuid) -> Result<bool, LedgerError>;

    async fn find_pending_request(
        &self,
        card_id: Uuid,
    ) -> Result<Option<BlockRequest>, LedgerError>;

    // -- users ---------------------------------------------------------

    async fn insert_user(&self, user: &User) -> Result<(), LedgerError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, LedgerError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, LedgerError>;
}
