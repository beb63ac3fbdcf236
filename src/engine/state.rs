use tracing::debug;

use crate::model::{ItemId, UserId};

/// Progress of one purchase attempt through the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseState {
    Started,
    PriceAndStockChecked,
    Debited,
    Completed,
    /// Debit (and reservation, if any) undone; the attempt failed cleanly.
    CompensatedAndFailed,
    /// Compensation could not be persisted.
    Stranded,
}

impl PurchaseState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseState::Completed | PurchaseState::CompensatedAndFailed | PurchaseState::Stranded
        )
    }

    pub fn can_advance_to(self, next: PurchaseState) -> bool {
        use PurchaseState::*;
        matches!(
            (self, next),
            (Started, PriceAndStockChecked)
                | (PriceAndStockChecked, Debited)
                | (Debited, Completed)
                | (Debited, CompensatedAndFailed)
                | (Debited, Stranded)
                // debit outcome unknown
                | (PriceAndStockChecked, Stranded)
        )
    }
}

/// One purchase attempt, tracking where it is in the saga.
#[derive(Debug)]
pub struct PurchaseAttempt {
    pub user_id: UserId,
    pub item_id: ItemId,
    state: PurchaseState,
}

impl PurchaseAttempt {
    pub fn new(user_id: UserId, item_id: ItemId) -> Self {
        Self {
            user_id,
            item_id,
            state: PurchaseState::Started,
        }
    }

    pub fn state(&self) -> PurchaseState {
        self.state
    }

    pub fn advance(&mut self, next: PurchaseState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal purchase transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(user = %self.user_id, item = %self.item_id, from = ?self.state, to = ?next, "purchase state");
        self.state = next;
    }
}
