//! The card ledger: single source of truth for card issuance, state
//! transitions and balance mutation. All balance changes flow through
//! `adjust_balance` / `move_balance`, each a single atomic
//! read-modify-write against the store.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LedgerError, StoreError};
use crate::models::{month, Card, CardStatus, Identity};
use crate::services::card_number::CardNumberGenerator;
use crate::services::ownership::OwnershipGuard;
use crate::store::{CardStore, Page, PageRequest};

const NUMBER_GENERATION_ATTEMPTS: usize = 8;

pub struct CardLedger {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
    numbers: CardNumberGenerator,
    guard: OwnershipGuard,
}

impl CardLedger {
    pub fn new(
        store: Arc<dyn CardStore>,
        clock: Arc<dyn Clock>,
        numbers: CardNumberGenerator,
    ) -> Self {
        Self {
            store,
            clock,
            numbers,
            guard: OwnershipGuard,
        }
    }

    /// Issues a new active card for the named owner.
    #[tracing::instrument(skip(self))]
    pub async fn issue(
        &self,
        owner_username: &str,
        initial_balance: Decimal,
        expiration_date: NaiveDate,
    ) -> Result<Card, LedgerError> {
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "initial balance must not be negative".to_string(),
            ));
        }
        if initial_balance.scale() > 2 {
            return Err(LedgerError::Validation(
                "balance precision is limited to 2 decimal places".to_string(),
            ));
        }
        let expiration = month::truncate(expiration_date);
        if expiration <= self.clock.current_month() {
            return Err(LedgerError::Validation(
                "expiration date must be in the future".to_string(),
            ));
        }

        let owner = self
            .store
            .find_user_by_username(owner_username)
            .await?
            .ok_or_else(|| LedgerError::OwnerNotFound(owner_username.to_string()))?;

        let number = self.unique_number().await?;
        let card = Card {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            balance: initial_balance,
            status: CardStatus::Active,
            expiration_date: expiration,
            number,
        };
        self.store.insert_card(&card).await?;

        tracing::info!(card_id = %card.id, owner = %owner.username, "card issued");
        Ok(card)
    }

    async fn unique_number(&self) -> Result<String, LedgerError> {
        for _ in 0..NUMBER_GENERATION_ATTEMPTS {
            let number = self.numbers.generate();
            if !self.store.card_number_exists(&number).await? {
                return Ok(number);
            }
        }
        Err(StoreError::Unavailable("could not allocate a unique card number".to_string()).into())
    }

    pub async fn get(&self, card_id: Uuid) -> Result<Card, LedgerError> {
        self.store
            .get_card(card_id)
            .await?
            .ok_or(LedgerError::CardNotFound(card_id))
    }

    /// Lists cards one page at a time. Unprivileged callers only ever
    /// see their own cards, whatever owner filter they request.
    pub async fn list(
        &self,
        identity: &Identity,
        owner: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Page<Card>, LedgerError> {
        let owner = if self.guard.is_privileged(identity) {
            owner
        } else {
            Some(identity.user_id)
        };
        self.store.list_cards(owner, page).await
    }

    /// Applies the monotone transition table. Illegal transitions (from
    /// a terminal state, or to the same state) are a no-op returning the
    /// current row unchanged.
    pub async fn set_status(
        &self,
        card_id: Uuid,
        new_status: CardStatus,
    ) -> Result<Card, LedgerError> {
        self.store
            .update_card(card_id, &|card| Ok(card.with_status(new_status)))
            .await
    }

    /// The sole single-card balance primitive. Fails with
    /// `InsufficientFunds` when the result would be negative, leaving
    /// the balance untouched.
    pub async fn adjust_balance(&self, card_id: Uuid, delta: Decimal) -> Result<Card, LedgerError> {
        self.store
            .update_card(card_id, &|card| {
                let balance = card.balance + delta;
                if balance < Decimal::ZERO {
                    return Err(LedgerError::InsufficientFunds);
                }
                Ok(Card {
                    balance,
                    ..card.clone()
                })
            })
            .await
    }

    /// The two-card balance primitive behind transfers: debit and credit
    /// commit together or not at all. Status and sufficiency are
    /// re-validated under the row locks.
    pub async fn move_balance(
        &self,
        from: Uuid,
        to: Uuid,
        amount: Decimal,
    ) -> Result<(Card, Card), LedgerError> {
        self.store
            .update_card_pair(from, to, &|from_card, to_card| {
                if !from_card.is_active() {
                    return Err(LedgerError::CardNotActive(from_card.status));
                }
                if !to_card.is_active() {
                    return Err(LedgerError::CardNotActive(to_card.status));
                }
                if from_card.balance < amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                Ok((
                    Card {
                        balance: from_card.balance - amount,
                        ..from_card.clone()
                    },
                    Card {
                        balance: to_card.balance + amount,
                        ..to_card.clone()
                    },
                ))
            })
            .await
    }
}
