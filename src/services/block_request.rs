//! The block-request workflow: a card owner files a request, an
//! administrator approves it. Per card the request moves
//! `NoRequest -> Pending -> Approved`; there is no rejected state.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::LedgerError;
use crate::models::{BlockRequest, Card, CardStatus, Identity};
use crate::services::ownership::OwnershipGuard;
use crate::store::CardStore;

/// Outcome of filing a block request. A duplicate filing is a success
/// carrying an informational message, not an error; callers rely on
/// the non-error status.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// A new request is now pending review.
    Filed(BlockRequest),
    /// A request for this card was already pending; nothing was created.
    AlreadyPending,
}

impl FileOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            FileOutcome::Filed(_) => "block request submitted, awaiting review",
            FileOutcome::AlreadyPending => {
                "a block request for this card is already pending, awaiting review"
            }
        }
    }
}

pub struct BlockRequestWorkflow {
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
    guard: OwnershipGuard,
}

impl BlockRequestWorkflow {
    pub fn new(store: Arc<dyn CardStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            guard: OwnershipGuard,
        }
    }

    /// Files a block request for a card the identity owns. Filing twice
    /// is an idempotent no-op.
    #[tracing::instrument(skip(self, identity), fields(user = %identity.username))]
    pub async fn file_request(
        &self,
        identity: &Identity,
        card_id: Uuid,
    ) -> Result<FileOutcome, LedgerError> {
        let card = self
            .store
            .get_card(card_id)
            .await?
            .ok_or(LedgerError::CardNotFound(card_id))?;

        if !self.guard.owns(identity, &card) {
            return Err(LedgerError::PermissionDenied(
                "you do not own this card".to_string(),
            ));
        }

        if self.store.pending_request_exists(card_id).await? {
            tracing::debug!(card_id = %card_id, "duplicate block request ignored");
            return Ok(FileOutcome::AlreadyPending);
        }

        if !card.is_active() {
            return Err(LedgerError::CardNotActive(card.status));
        }

        let request = BlockRequest::new(card_id, identity.user_id, self.clock.now());
        self.store.insert_block_request(&request).await?;

        tracing::info!(card_id = %card_id, request_id = %request.id, "block request filed");
        Ok(FileOutcome::Filed(request))
    }

    /// Blocks the card and, when a request is pending, approves it in
    /// the same atomic unit. This is also the only path by which an
    /// administrator blocks a card without a prior request; the card
    /// transition is idempotent.
    #[tracing::instrument(skip(self, identity), fields(user = %identity.username))]
    pub async fn approve(
        &self,
        identity: &Identity,
        card_id: Uuid,
    ) -> Result<(Card, Option<BlockRequest>), LedgerError> {
        if !self.guard.is_privileged(identity) {
            return Err(LedgerError::PermissionDenied(
                "approving a block requires administrator privileges".to_string(),
            ));
        }

        let approved_by = identity.user_id;
        let approved_at = self.clock.now();

        let (card, request) = self
            .store
            .update_card_and_pending_request(card_id, &|card, pending| {
                let card = card.with_status(CardStatus::Blocked);
                let request = pending.map(|request| request.approve(approved_by, approved_at));
                Ok((card, request))
            })
            .await?;

        tracing::info!(
            card_id = %card.id,
            approved_request = request.is_some(),
            "card blocked"
        );
        Ok((card, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::clock::FixedClock;
    use crate::models::{Role, User};
    use crate::services::card_number::CardNumberGenerator;
    use crate::services::ledger::CardLedger;
    use crate::store::MemoryCardStore;

    struct Harness {
        store: Arc<MemoryCardStore>,
        ledger: CardLedger,
        workflow: BlockRequestWorkflow,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Arc::new(MemoryCardStore::new());
            let clock: Arc<dyn Clock> =
                Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 8, 8, 12, 0, 0).unwrap()));
            let ledger = CardLedger::new(
                store.clone(),
                clock.clone(),
                CardNumberGenerator::default(),
            );
            let workflow = BlockRequestWorkflow::new(store.clone(), clock);
            Self {
                store,
                ledger,
                workflow,
            }
        }

        async fn user(&self, username: &str, role: Role) -> User {
            let user = User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                password_hash: String::new(),
                role,
            };
            self.store.insert_user(&user).await.unwrap();
            user
        }

        async fn card_for(&self, owner: &User) -> Card {
            self.ledger
                .issue(
                    &owner.username,
                    Decimal::ZERO,
                    NaiveDate::from_ymd_opt(2030, 12, 1).unwrap(),
                )
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn owner_files_a_pending_request() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let card = h.card_for(&owner).await;

        let outcome = h
            .workflow
            .file_request(&owner.identity(), card.id)
            .await
            .unwrap();
        let request = match outcome {
            FileOutcome::Filed(request) => request,
            FileOutcome::AlreadyPending => panic!("expected a new request"),
        };
        assert!(request.is_pending());
        assert_eq!(request.requester_id, owner.id);
        assert_eq!(request.card_id, card.id);
    }

    #[tokio::test]
    async fn duplicate_filing_is_an_acknowledged_no_op() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let card = h.card_for(&owner).await;

        h.workflow
            .file_request(&owner.identity(), card.id)
            .await
            .unwrap();
        let second = h
            .workflow
            .file_request(&owner.identity(), card.id)
            .await
            .unwrap();

        assert!(matches!(second, FileOutcome::AlreadyPending));
        assert_eq!(h.store.block_request_count(), 1);
    }

    #[tokio::test]
    async fn only_the_owner_may_file() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let stranger = h.user("maria_silver", Role::User).await;
        let card = h.card_for(&owner).await;

        let result = h.workflow.file_request(&stranger.identity(), card.id).await;
        assert!(matches!(result, Err(LedgerError::PermissionDenied(_))));
        assert_eq!(h.store.block_request_count(), 0);
    }

    #[tokio::test]
    async fn filing_distinguishes_blocked_from_expired_cards() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;

        let blocked = h.card_for(&owner).await;
        h.ledger
            .set_status(blocked.id, CardStatus::Blocked)
            .await
            .unwrap();
        let result = h.workflow.file_request(&owner.identity(), blocked.id).await;
        assert!(matches!(
            result,
            Err(LedgerError::CardNotActive(CardStatus::Blocked))
        ));

        let expired = h.card_for(&owner).await;
        h.ledger
            .set_status(expired.id, CardStatus::Expired)
            .await
            .unwrap();
        let result = h.workflow.file_request(&owner.identity(), expired.id).await;
        assert!(matches!(
            result,
            Err(LedgerError::CardNotActive(CardStatus::Expired))
        ));
    }

    #[tokio::test]
    async fn filing_for_a_missing_card_fails() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let missing = Uuid::new_v4();
        let result = h.workflow.file_request(&owner.identity(), missing).await;
        assert!(matches!(result, Err(LedgerError::CardNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn approval_blocks_the_card_and_approves_the_request_together() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let admin = h.user("root", Role::Admin).await;
        let card = h.card_for(&owner).await;

        h.workflow
            .file_request(&owner.identity(), card.id)
            .await
            .unwrap();
        let (card, request) = h
            .workflow
            .approve(&admin.identity(), card.id)
            .await
            .unwrap();

        assert_eq!(card.status, CardStatus::Blocked);
        let request = request.expect("pending request should have been approved");
        assert!(!request.is_pending());
        assert_eq!(request.approved_by, Some(admin.id));
        assert!(request.approved_at.is_some());

        // nothing is left pending for the card
        assert!(!h.store.pending_request_exists(card.id).await.unwrap());
    }

    #[tokio::test]
    async fn direct_block_without_a_request_touches_no_request() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let admin = h.user("root", Role::Admin).await;
        let card = h.card_for(&owner).await;

        let (card, request) = h
            .workflow
            .approve(&admin.identity(), card.id)
            .await
            .unwrap();
        assert_eq!(card.status, CardStatus::Blocked);
        assert!(request.is_none());
        assert_eq!(h.store.block_request_count(), 0);
    }

    #[tokio::test]
    async fn approval_is_idempotent_on_an_already_blocked_card() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let admin = h.user("root", Role::Admin).await;
        let card = h.card_for(&owner).await;

        h.workflow.approve(&admin.identity(), card.id).await.unwrap();
        let (card, request) = h
            .workflow
            .approve(&admin.identity(), card.id)
            .await
            .unwrap();
        assert_eq!(card.status, CardStatus::Blocked);
        assert!(request.is_none());
    }

    #[tokio::test]
    async fn approval_requires_the_administrator_role() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let card = h.card_for(&owner).await;

        let result = h.workflow.approve(&owner.identity(), card.id).await;
        assert!(matches!(result, Err(LedgerError::PermissionDenied(_))));
        assert!(h.ledger.get(card.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn a_filed_request_survives_until_approved() {
        let h = Harness::new().await;
        let owner = h.user("ivan_gold", Role::User).await;
        let admin = h.user("root", Role::Admin).await;
        let card = h.card_for(&owner).await;

        h.workflow
            .file_request(&owner.identity(), card.id)
            .await
            .unwrap();
        let pending = h
            .store
            .find_pending_request(card.id)
            .await
            .unwrap()
            .expect("request should be pending");

        let (_, approved) = h
            .workflow
            .approve(&admin.identity(), card.id)
            .await
            .unwrap();
        let approved = approved.unwrap();
        assert_eq!(approved.id, pending.id);
        assert_eq!(approved.created_at, pending.created_at);
    }
}
