use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A user's request to block one of their cards, reviewed by an
/// administrator. `approved_at` and `approved_by` are set together,
/// exactly once; an approved request is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRequest {
    pub id: Uuid,
    pub card_id: Uuid,
    pub requester_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
}

impl BlockRequest {
    pub fn new(card_id: Uuid, requester_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            requester_id,
            created_at,
            approved_at: None,
            approved_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.approved_at.is_none()
    }

    /// Returns the approved copy of this request.
    pub fn approve(&self, approved_by: Uuid, approved_at: DateTime<Utc>) -> Self {
        Self {
            approved_at: Some(approved_at),
            approved_by: Some(approved_by),
            ..self.clone()
        }
    }
}
