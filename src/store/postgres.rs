//! PostgreSQL store. Scoped transactions take `FOR UPDATE` row locks,
//! acquiring multi-row locks in ascending-id order, and commit only
//! after the mutation succeeds; a mutation error rolls back.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{LedgerError, StoreError};
use crate::models::{BlockRequest, Card, User};

use super::{
    CardMutation, CardPairMutation, CardRequestMutation, CardStore, Page, PageRequest,
};

pub struct PgCardStore {
    pool: PgPool,
}

impl PgCardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn card_from_row(row: &PgRow) -> Result<Card, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Card {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        balance: row.try_get("balance")?,
        status: status
            .parse()
            .map_err(|e: crate::models::card::ParseCardStatusError| {
                StoreError::Decode(e.to_string())
            })?,
        expiration_date: row.try_get("expiration_date")?,
        number: row.try_get("card_number")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<BlockRequest, StoreError> {
    Ok(BlockRequest {
        id: row.try_get("id")?,
        card_id: row.try_get("card_id")?,
        requester_id: row.try_get("requester_id")?,
        created_at: row.try_get("created_at")?,
        approved_at: row.try_get("approved_at")?,
        approved_by: row.try_get("approved_by")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: role
            .parse()
            .map_err(|e: crate::models::user::ParseRoleError| StoreError::Decode(e.to_string()))?,
    })
}

async fn fetch_card_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Card, LedgerError> {
    let row = sqlx::query(
        "SELECT id, owner_id, balance, status, expiration_date, card_number \
         FROM cards WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(StoreError::from)?;

    match row {
        Some(row) => Ok(card_from_row(&row)?),
        None => Err(LedgerError::CardNotFound(id)),
    }
}

async fn save_card(tx: &mut Transaction<'_, Postgres>, card: &Card) -> Result<(), StoreError> {
    // id, owner and number are immutable; this is the full replace of
    // the mutable columns.
    sqlx::query("UPDATE cards SET balance = $2, status = $3, expiration_date = $4 WHERE id = $1")
        .bind(card.id)
        .bind(card.balance)
        .bind(card.status.as_str())
        .bind(card.expiration_date)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn save_block_request(
    tx: &mut Transaction<'_, Postgres>,
    request: &BlockRequest,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE block_requests \
         SET card_id = $2, requester_id = $3, created_at = $4, approved_at = $5, approved_by = $6 \
         WHERE id = $1",
    )
    .bind(request.id)
    .bind(request.card_id)
    .bind(request.requester_id)
    .bind(request.created_at)
    .bind(request.approved_at)
    .bind(request.approved_by)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl CardStore for PgCardStore {
    async fn insert_card(&self, card: &Card) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO cards (id, owner_id, balance, status, expiration_date, card_number) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(card.id)
        .bind(card.owner_id)
        .bind(card.balance)
        .bind(card.status.as_str())
        .bind(card.expiration_date)
        .bind(&card.number)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_card(&self, id: Uuid) -> Result<Option<Card>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, owner_id, balance, status, expiration_date, card_number \
             FROM cards WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.as_ref().map(card_from_row).transpose()?)
    }

    async fn list_cards(
        &self,
        owner: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Page<Card>, LedgerError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cards WHERE ($1::uuid IS NULL OR owner_id = $1)")
                .bind(owner)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)?;

        let rows = sqlx::query(
            "SELECT id, owner_id, balance, status, expiration_date, card_number \
             FROM cards WHERE ($1::uuid IS NULL OR owner_id = $1) \
             ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(owner)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let items = rows
            .iter()
            .map(card_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total: total.max(0) as u64,
        })
    }

    async fn delete_card(&self, id: Uuid) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        sqlx::query("DELETE FROM block_requests WHERE card_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        let result = sqlx::query("DELETE FROM cards WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn card_number_exists(&self, number: &str) -> Result<bool, LedgerError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM cards WHERE card_number = $1)")
                .bind(number)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)?;
        Ok(exists)
    }

    async fn find_active_expiring_before(
        &self,
        month: NaiveDate,
    ) -> Result<Vec<Uuid>, LedgerError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM cards WHERE status = 'ACTIVE' AND expiration_date < $1",
        )
        .bind(month)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(ids)
    }

    async fn update_card(&self, id: Uuid, apply: CardMutation<'_>) -> Result<Card, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let current = fetch_card_for_update(&mut tx, id).await?;
        let updated = apply(&current)?;
        save_card(&mut tx, &updated).await?;
        tx.commit().await.map_err(StoreError::from)?;
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

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // Lock in ascending-id order so opposite-direction updates on
        // the same pair cannot deadlock.
        let (lo, hi) = if from < to { (from, to) } else { (to, from) };
        let lo_card = fetch_card_for_update(&mut tx, lo).await?;
        let hi_card = fetch_card_for_update(&mut tx, hi).await?;
        let (from_card, to_card) = if lo == from {
            (lo_card, hi_card)
        } else {
            (hi_card, lo_card)
        };

        let (from_card, to_card) = apply(&from_card, &to_card)?;
        save_card(&mut tx, &from_card).await?;
        save_card(&mut tx, &to_card).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok((from_card, to_card))
    }

    async fn update_card_and_pending_request(
        &self,
        card_id: Uuid,
        apply: CardRequestMutation<'_>,
    ) -> Result<(Card, Option<BlockRequest>), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let card = fetch_card_for_update(&mut tx, card_id).await?;

        let row = sqlx::query(
            "SELECT id, card_id, requester_id, created_at, approved_at, approved_by \
             FROM block_requests WHERE card_id = $1 AND approved_at IS NULL FOR UPDATE",
        )
        .bind(card_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from)?;
        let pending = row.as_ref().map(request_from_row).transpose()?;

        let (card, request) = apply(&card, pending.as_ref())?;
        save_card(&mut tx, &card).await?;
        if let Some(request) = &request {
            save_block_request(&mut tx, request).await?;
        }
        tx.commit().await.map_err(StoreError::from)?;
        Ok((card, request))
    }

    async fn insert_block_request(&self, request: &BlockRequest) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO block_requests (id, card_id, requester_id, created_at, approved_at, approved_by) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(request.id)
        .bind(request.card_id)
        .bind(request.requester_id)
        .bind(request.created_at)
        .bind(request.approved_at)
        .bind(request.approved_by)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn pending_request_exists(&self, card_id: Uuid) -> Result<bool, LedgerError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM block_requests WHERE card_id = $1 AND approved_at IS NULL)",
        )
        .bind(card_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(exists)
    }

    async fn find_pending_request(
        &self,
        card_id: Uuid,
    ) -> Result<Option<BlockRequest>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, card_id, requester_id, created_at, approved_at, approved_by \
             FROM block_requests WHERE card_id = $1 AND approved_at IS NULL",
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.as_ref().map(request_from_row).transpose()?)
    }

    async fn insert_user(&self, user: &User) -> Result<(), LedgerError> {
        sqlx::query("INSERT INTO users (id, username, password_hash, role) VALUES ($1, $2, $3, $4)")
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, LedgerError> {
        let row = sqlx::query("SELECT id, username, password_hash, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, LedgerError> {
        let row =
            sqlx::query("SELECT id, username, password_hash, role FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }
}
