//! Atomic balance movement between two cards of the same owner.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::Identity;
use crate::services::ledger::CardLedger;
use crate::services::ownership::OwnershipGuard;

/// Confirmation of a committed transfer, safe to show to the caller.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub from_card: String,
    pub to_card: String,
    pub amount: Decimal,
}

impl TransferReceipt {
    pub fn message(&self) -> String {
        format!(
            "transferred {} from card {} to card {}",
            self.amount, self.from_card, self.to_card
        )
    }
}

pub struct TransferEngine {
    ledger: Arc<CardLedger>,
    guard: OwnershipGuard,
}

impl TransferEngine {
    pub fn new(ledger: Arc<CardLedger>) -> Self {
        Self {
            ledger,
            guard: OwnershipGuard,
        }
    }

    /// Moves `amount` between two cards of the acting identity. Debit
    /// and credit commit together or not at all; a failed transfer
    /// leaves both balances unchanged.
    #[tracing::instrument(skip(self, identity), fields(user = %identity.username))]
    pub async fn transfer(
        &self,
        identity: &Identity,
        from_card_id: Uuid,
        to_card_id: Uuid,
        amount: Decimal,
    ) -> Result<TransferReceipt, LedgerError> {
        let from_card = self.ledger.get(from_card_id).await?;
        let to_card = self.ledger.get(to_card_id).await?;

        if from_card_id == to_card_id {
            return Err(LedgerError::Validation(
                "cannot transfer to the same card".to_string(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "transfer amount must be positive".to_string(),
            ));
        }
        if amount.scale() > 2 {
            return Err(LedgerError::Validation(
                "amount precision is limited to 2 decimal places".to_string(),
            ));
        }

        // Transfers always require ownership of both endpoints; the
        // administrator role grants no override here.
        if !self.guard.owns(identity, &from_card) || !self.guard.owns(identity, &to_card) {
            return Err(LedgerError::PermissionDenied(
                "one or more cards belong to another user".to_string(),
            ));
        }

        if !from_card.is_active() {
            return Err(LedgerError::CardNotActive(from_card.status));
        }
        if !to_card.is_active() {
            return Err(LedgerError::CardNotActive(to_card.status));
        }
        if amount > from_card.balance {
            return Err(LedgerError::InsufficientFunds);
        }

        let (from_card, to_card) = self
            .ledger
            .move_balance(from_card_id, to_card_id, amount)
            .await?;

        tracing::info!(
            from = %from_card.id,
            to = %to_card.id,
            %amount,
            "transfer committed"
        );

        Ok(TransferReceipt {
            from_card: from_card.masked_number(),
            to_card: to_card.masked_number(),
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::clock::{Clock, FixedClock};
    use crate::models::{Card, CardStatus, Role, User};
    use crate::services::card_number::CardNumberGenerator;
    use crate::store::{CardStore, MemoryCardStore};

    struct Harness {
        store: Arc<MemoryCardStore>,
        ledger: Arc<CardLedger>,
        engine: TransferEngine,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Arc::new(MemoryCardStore::new());
            let clock: Arc<dyn Clock> =
                Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 8, 8, 12, 0, 0).unwrap()));
            let ledger = Arc::new(CardLedger::new(
                store.clone(),
                clock,
                CardNumberGenerator::default(),
            ));
            let engine = TransferEngine::new(ledger.clone());
            Self {
                store,
                ledger,
                engine,
            }
        }

        async fn user(&self, username: &str) -> User {
            let user = User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                password_hash: String::new(),
                role: Role::User,
            };
            self.store.insert_user(&user).await.unwrap();
            user
        }

        async fn card(&self, owner: &User, balance: Decimal) -> Card {
            self.ledger
                .issue(
                    &owner.username,
                    balance,
                    NaiveDate::from_ymd_opt(2030, 12, 1).unwrap(),
                )
                .await
                .unwrap()
        }

        async fn balance(&self, card_id: Uuid) -> Decimal {
            self.ledger.get(card_id).await.unwrap().balance
        }
    }

    #[tokio::test]
    async fn successful_transfer_conserves_the_total() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let from = h.card(&owner, Decimal::new(50_000, 2)).await;
        let to = h.card(&owner, Decimal::new(10_000, 2)).await;

        let receipt = h
            .engine
            .transfer(&owner.identity(), from.id, to.id, Decimal::new(15_000, 2))
            .await
            .unwrap();

        assert_eq!(h.balance(from.id).await, Decimal::new(35_000, 2));
        assert_eq!(h.balance(to.id).await, Decimal::new(25_000, 2));
        assert_eq!(
            h.balance(from.id).await + h.balance(to.id).await,
            Decimal::new(60_000, 2)
        );
        assert_eq!(receipt.from_card, from.masked_number());
        assert_eq!(receipt.to_card, to.masked_number());
    }

    #[tokio::test]
    async fn rejects_transfer_to_the_same_card() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let card = h.card(&owner, Decimal::new(50_000, 2)).await;

        let result = h
            .engine
            .transfer(&owner.identity(), card.id, card.id, Decimal::ONE)
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert_eq!(h.balance(card.id).await, Decimal::new(50_000, 2));
    }

    #[tokio::test]
    async fn rejects_non_positive_and_over_precise_amounts() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let from = h.card(&owner, Decimal::new(50_000, 2)).await;
        let to = h.card(&owner, Decimal::new(10_000, 2)).await;

        for amount in [Decimal::ZERO, Decimal::new(-100, 2), Decimal::new(1_0001, 4)] {
            let result = h
                .engine
                .transfer(&owner.identity(), from.id, to.id, amount)
                .await;
            assert!(matches!(result, Err(LedgerError::Validation(_))));
        }
        assert_eq!(h.balance(from.id).await, Decimal::new(50_000, 2));
        assert_eq!(h.balance(to.id).await, Decimal::new(10_000, 2));
    }

    #[tokio::test]
    async fn requires_ownership_of_both_endpoints() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let other = h.user("maria_silver").await;
        let from = h.card(&owner, Decimal::new(50_000, 2)).await;
        let to = h.card(&other, Decimal::new(10_000, 2)).await;

        let result = h
            .engine
            .transfer(&owner.identity(), from.id, to.id, Decimal::new(1_000, 2))
            .await;
        assert!(matches!(result, Err(LedgerError::PermissionDenied(_))));
        assert_eq!(h.balance(from.id).await, Decimal::new(50_000, 2));
        assert_eq!(h.balance(to.id).await, Decimal::new(10_000, 2));
    }

    #[tokio::test]
    async fn administrators_get_no_ownership_override() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let from = h.card(&owner, Decimal::new(50_000, 2)).await;
        let to = h.card(&owner, Decimal::new(10_000, 2)).await;

        let admin = User {
            id: Uuid::new_v4(),
            username: "root".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
        };
        h.store.insert_user(&admin).await.unwrap();

        let result = h
            .engine
            .transfer(&admin.identity(), from.id, to.id, Decimal::new(1_000, 2))
            .await;
        assert!(matches!(result, Err(LedgerError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn rejects_inactive_cards_with_the_offending_status() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let from = h.card(&owner, Decimal::new(50_000, 2)).await;
        let to = h.card(&owner, Decimal::new(10_000, 2)).await;
        h.ledger.set_status(to.id, CardStatus::Blocked).await.unwrap();

        let result = h
            .engine
            .transfer(&owner.identity(), from.id, to.id, Decimal::new(1_000, 2))
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::CardNotActive(CardStatus::Blocked))
        ));
        assert_eq!(h.balance(from.id).await, Decimal::new(50_000, 2));
    }

    #[tokio::test]
    async fn insufficient_funds_leave_both_balances_unchanged() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let from = h.card(&owner, Decimal::new(1_000, 2)).await;
        let to = h.card(&owner, Decimal::new(0, 2)).await;

        let result = h
            .engine
            .transfer(&owner.identity(), from.id, to.id, Decimal::new(1_500, 2))
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientFunds)));
        assert_eq!(h.balance(from.id).await, Decimal::new(1_000, 2));
        assert_eq!(h.balance(to.id).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn missing_cards_are_reported_before_anything_else() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let from = h.card(&owner, Decimal::new(1_000, 2)).await;
        let missing = Uuid::new_v4();

        let result = h
            .engine
            .transfer(&owner.identity(), from.id, missing, Decimal::ONE)
            .await;
        assert!(matches!(result, Err(LedgerError::CardNotFound(id)) if id == missing));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_opposite_transfers_serialize() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold").await;
        let a = h.card(&owner, Decimal::new(50_000, 2)).await;
        let b = h.card(&owner, Decimal::new(50_000, 2)).await;

        let engine = Arc::new(TransferEngine::new(h.ledger.clone()));
        let identity = owner.identity();

        let forward = {
            let engine = engine.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                engine
                    .transfer(&identity, a.id, b.id, Decimal::new(10_000, 2))
                    .await
            })
        };
        let backward = {
            let engine = engine.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                engine
                    .transfer(&identity, b.id, a.id, Decimal::new(3_000, 2))
                    .await
            })
        };

        forward.await.unwrap().unwrap();
        backward.await.unwrap().unwrap();

        let a_final = h.balance(a.id).await;
        let b_final = h.balance(b.id).await;
        assert_eq!(a_final, Decimal::new(43_000, 2));
        assert_eq!(b_final, Decimal::new(57_000, 2));
        assert_eq!(a_final + b_final, Decimal::new(100_000, 2));
    }
}
