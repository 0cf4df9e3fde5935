use crate::error::LedgerError;
use crate::models::{Card, Identity, Role};

/// Stateless authorization predicate consulted before any mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipGuard;

impl OwnershipGuard {
    pub fn owns(&self, identity: &Identity, card: &Card) -> bool {
        identity.user_id == card.owner_id
    }

    pub fn is_privileged(&self, identity: &Identity) -> bool {
        identity.role == Role::Admin
    }

    /// Permits the action when the identity owns the card or holds the
    /// administrator role.
    pub fn authorize_card_action(
        &self,
        identity: &Identity,
        card: &Card,
    ) -> Result<(), LedgerError> {
        if self.owns(identity, card) || self.is_privileged(identity) {
            Ok(())
        } else {
            Err(LedgerError::PermissionDenied(
                "you do not own this card".to_string(),
            ))
        }
    }
}
