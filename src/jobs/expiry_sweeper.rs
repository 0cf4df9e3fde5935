//! Background job that expires lapsed cards.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::clock::Clock;
use crate::error::LedgerError;
use crate::models::CardStatus;
use crate::services::ledger::CardLedger;
use crate::store::CardStore;

#[derive(Debug, Default)]
pub struct SweepStats {
    pub checked: usize,
    pub expired: usize,
    pub failed: usize,
}

pub struct ExpirySweeper {
    ledger: Arc<CardLedger>,
    store: Arc<dyn CardStore>,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    pub fn new(ledger: Arc<CardLedger>, store: Arc<dyn CardStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            store,
            clock,
        }
    }

    /// Sweeps with the clock's current month; the scheduled entry point.
    pub async fn sweep_now(&self) -> Result<SweepStats, LedgerError> {
        self.sweep(self.clock.current_month()).await
    }

    /// Transitions every active card whose expiration month is strictly
    /// before `current_month` to `Expired`. Each card is handled
    /// independently; a failure on one card never aborts the batch.
    /// Re-running with the same month is a no-op: swept cards are no
    /// longer active, so the transition guard short-circuits.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, current_month: NaiveDate) -> Result<SweepStats, LedgerError> {
        let ids = self.store.find_active_expiring_before(current_month).await?;
        let mut stats = SweepStats {
            checked: ids.len(),
            ..SweepStats::default()
        };

        for id in ids {
            match self.ledger.set_status(id, CardStatus::Expired).await {
                Ok(card) if card.status == CardStatus::Expired => stats.expired += 1,
                // lost the race to another transition; nothing to do
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(card_id = %id, error = %e, "failed to expire card");
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            checked = stats.checked,
            expired = stats.expired,
            failed = stats.failed,
            "expiry sweep completed"
        );
        Ok(stats)
    }
}
