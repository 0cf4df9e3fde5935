use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::card_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Active,
    Blocked,
    Expired,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "ACTIVE",
            CardStatus::Blocked => "BLOCKED",
            CardStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CardStatus::Active => "active",
            CardStatus::Blocked => "blocked",
            CardStatus::Expired => "expired",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown card status: {0}")]
pub struct ParseCardStatusError(String);

impl FromStr for CardStatus {
    type Err = ParseCardStatusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "ACTIVE" => Ok(CardStatus::Active),
            "BLOCKED" => Ok(CardStatus::Blocked),
            "EXPIRED" => Ok(CardStatus::Expired),
            other => Err(ParseCardStatusError(other.to_string())),
        }
    }
}

/// A bank card row. Immutable value object: every mutation produces a
/// replacement value that is persisted through the store as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub balance: Decimal,
    pub status: CardStatus,
    /// First day of the expiration month.
    pub expiration_date: NaiveDate,
    /// Full 16-digit number; exposed to callers only in masked form.
    pub number: String,
}

impl Card {
    pub fn is_active(&self) -> bool {
        self.status == CardStatus::Active
    }

    /// Applies the monotone transition table: only an active card leaves
    /// its state, and never back to `Active`. Every other combination
    /// returns the card unchanged.
    pub fn with_status(&self, new_status: CardStatus) -> Card {
        if self.status == CardStatus::Active && new_status != CardStatus::Active {
            Card {
                status: new_status,
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }

    pub fn masked_number(&self) -> String {
        card_number::mask(&self.number)
    }
}
