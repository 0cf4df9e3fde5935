//! In-memory store, used by the test suite and as an executable
//! reference of the transactional semantics the Postgres store provides.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{LedgerError, StoreError};
use crate::models::{BlockRequest, Card, User};

use super::{
    CardMutation, CardPairMutation, CardRequestMutation, CardStore, Page, PageRequest,
};

#[derive(Default)]
struct Inner {
    cards: HashMap<Uuid, Card>,
    requests: HashMap<Uuid, BlockRequest>,
    users: HashMap<Uuid, User>,
}

/// A single mutex stands in for the database's row locks: every scoped
/// transaction runs to completion under the lock, which is the
/// degenerate form of canonical lock ordering.
#[derive(Default)]
pub struct MemoryCardStore {
    inner: Mutex<Inner>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LedgerError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()).into())
    }
}

#[cfg(test)]
impl MemoryCardStore {
    pub fn block_request_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.requests.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CardStore for MemoryCardStore {
    async fn insert_card(&self, card: &Card) -> Result<(), LedgerError> {
        let mut inner = self.lock()?;
        if inner.cards.values().any(|c| c.number == card.number) {
            return Err(StoreError::Unavailable(format!(
                "card number {} already exists",
                card.number
            ))
            .into());
        }
        inner.cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn get_card(&self, id: Uuid) -> Result<Option<Card>, LedgerError> {
        Ok(self.lock()?.cards.get(&id).cloned())
    }

    async fn list_cards(
        &self,
        owner: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Page<Card>, LedgerError> {
        let inner = self.lock()?;
        let mut cards: Vec<Card> = inner
            .cards
            .values()
            .filter(|card| owner.map_or(true, |owner| card.owner_id == owner))
            .cloned()
            .collect();
        cards.sort_by_key(|card| card.id);

        let total = cards.len() as u64;
        let items = cards
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn delete_card(&self, id: Uuid) -> Result<bool, LedgerError> {
        let mut inner = self.lock()?;
        inner.requests.retain(|_, request| request.card_id != id);
        Ok(inner.cards.remove(&id).is_some())
    }

    async fn card_number_exists(&self, number: &str) -> Result<bool, LedgerError> {
        Ok(self.lock()?.cards.values().any(|card| card.number == number))
    }

    async fn find_active_expiring_before(
        &self,
        month: NaiveDate,
    ) -> Result<Vec<Uuid>, LedgerError> {
        Ok(self
            .lock()?
            .cards
            .values()
            .filter(|card| card.is_active() && card.expiration_date < month)
            .map(|card| card.id)
            .collect())
    }

    async fn update_card(&self, id: Uuid, apply: CardMutation<'_>) -> Result<Card, LedgerError> {
        let mut inner = self.lock()?;
        let current = inner
            .cards
            .get(&id)
            .cloned()
            .ok_or(LedgerError::CardNotFound(id))?;
        let updated = apply(&current)?;
        inner.cards.insert(id, updated.clone());
        Ok(updated)
    }

    async fn update_card_pair(
        &self,
        from: Uuid,
        to: Uuid,
        apply: CardPairMutation<'_>,
    ) -> Result<(Card, Card), LedgerError> {
        if from == to {
            return Err(LedgerError::Validation(
                "cannot update a card pair against itself".to_string(),
            ));
        }
        let mut inner = self.lock()?;
        let from_card = inner
            .cards
            .get(&from)
            .cloned()
            .ok_or(LedgerError::CardNotFound(from))?;
        let to_card = inner
            .cards
            .get(&to)
            .cloned()
            .ok_or(LedgerError::CardNotFound(to))?;
        let (from_card, to_card) = apply(&from_card, &to_card)?;
        inner.cards.insert(from, from_card.clone());
        inner.cards.insert(to, to_card.clone());
        Ok((from_card, to_card))
    }

    async fn update_card_and_pending_request(
        &self,
        card_id: Uuid,
        apply: CardRequestMutation<'_>,
    ) -> Result<(Card, Option<BlockRequest>), LedgerError> {
        let mut inner = self.lock()?;
        let card = inner
            .cards
            .get(&card_id)
            .cloned()
            .ok_or(LedgerError::CardNotFound(card_id))?;
        let pending = inner
            .requests
            .values()
            .find(|request| request.card_id == card_id && request.is_pending())
            .cloned();
        let (card, request) = apply(&card, pending.as_ref())?;
        inner.cards.insert(card_id, card.clone());
        if let Some(request) = &request {
            inner.requests.insert(request.id, request.clone());
        }
        Ok((card, request))
    }

    async fn insert_block_request(&self, request: &BlockRequest) -> Result<(), LedgerError> {
        let mut inner = self.lock()?;
        // mirrors the partial unique index on (card_id) where pending
        if request.is_pending()
            && inner
                .requests
                .values()
                .any(|r| r.card_id == request.card_id && r.is_pending())
        {
            return Err(StoreError::Unavailable(
                "a pending block request already exists for this card".to_string(),
            )
            .into());
        }
        inner.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn pending_request_exists(&self, card_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self
            .lock()?
            .requests
            .values()
            .any(|request| request.card_id == card_id && request.is_pending()))
    }

    async fn find_pending_request(
        &self,
        card_id: Uuid,
    ) -> Result<Option<BlockRequest>, LedgerError> {
        Ok(self
            .lock()?
            .requests
            .values()
            .find(|request| request.card_id == card_id && request.is_pending())
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), LedgerError> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Unavailable(format!(
                "username {} already exists",
                user.username
            ))
            .into());
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, LedgerError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, LedgerError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }
}
