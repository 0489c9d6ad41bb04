//! Credit ledger seam and in-memory reference implementation.
//!
//! The ledger follows a reserve/commit/refund discipline: the dispatcher
//! reserves the tool cost before any provider call, then either commits the
//! reservation (on success) or refunds it (on failure). Reserve+commit and
//! reserve+refund are each idempotent per reservation handle, and concurrent
//! reserves for the same user serialize, so two simultaneous requests can
//! never both pass a balance check that only one can afford.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use vidgo_models::{CreditBalance, CreditDraw, CreditTransaction, ToolType};

/// Opaque handle to a held reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(uuid::Uuid);

impl ReservationId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a committed charge was for, recorded as a transaction.
#[derive(Debug, Clone)]
pub struct CommitContext {
    pub tool_type: ToolType,
    pub description: String,
    pub generation_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    #[error("Reservation {0} already settled the other way")]
    ReservationConflict(ReservationId),

    #[error("Ledger backend error: {0}")]
    Backend(String),
}

/// Credit accounting seam.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Atomically hold `amount` credits against the user's balance.
    async fn reserve(&self, user_id: &str, amount: u32) -> Result<ReservationId, LedgerError>;

    /// Convert a held reservation into a committed charge.
    async fn commit(
        &self,
        reservation: ReservationId,
        context: CommitContext,
    ) -> Result<(), LedgerError>;

    /// Release a held reservation back to the balance.
    async fn refund(&self, reservation: ReservationId) -> Result<(), LedgerError>;

    /// Current balance for a user.
    async fn balance(&self, user_id: &str) -> Result<CreditBalance, LedgerError>;

    /// Most recent committed transactions, newest first.
    async fn history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, LedgerError>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReservationPhase {
    Held,
    Committed,
    Refunded,
}

#[derive(Debug)]
struct ReservationEntry {
    draw: CreditDraw,
    phase: ReservationPhase,
}

#[derive(Debug)]
struct Account {
    balance: CreditBalance,
    reservations: HashMap<ReservationId, ReservationEntry>,
    transactions: Vec<CreditTransaction>,
}

/// In-memory ledger.
///
/// Each account lives behind its own async mutex; holding it across the whole
/// reserve/commit/refund body is what serializes concurrent charges per user.
#[derive(Default)]
pub struct MemoryLedger {
    accounts: RwLock<HashMap<String, Arc<Mutex<Account>>>>,
    // reservation -> owning user, so settle calls need only the handle
    index: RwLock<HashMap<ReservationId, String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a user's balance (test fixtures, admin top-ups).
    pub async fn seed_user(&self, balance: CreditBalance) {
        let mut accounts = self.accounts.write().await;
        accounts.insert(
            balance.user_id.clone(),
            Arc::new(Mutex::new(Account {
                balance,
                reservations: HashMap::new(),
                transactions: Vec::new(),
            })),
        );
    }

    async fn account(&self, user_id: &str) -> Result<Arc<Mutex<Account>>, LedgerError> {
        let accounts = self.accounts.read().await;
        accounts
            .get(user_id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))
    }

    async fn account_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> Result<Arc<Mutex<Account>>, LedgerError> {
        let user_id = {
            let index = self.index.read().await;
            index
                .get(&reservation)
                .cloned()
                .ok_or(LedgerError::UnknownReservation(reservation))?
        };
        self.account(&user_id).await
    }

    /// Drain buckets in order: bonus, then subscription, then purchased.
    fn draw_from(balance: &mut CreditBalance, amount: u32) -> CreditDraw {
        let bonus = amount.min(balance.bonus_credits);
        let mut remaining = amount - bonus;
        let subscription = remaining.min(balance.subscription_credits);
        remaining -= subscription;
        let purchased = remaining.min(balance.purchased_credits);

        balance.bonus_credits -= bonus;
        balance.subscription_credits -= subscription;
        balance.purchased_credits -= purchased;

        CreditDraw {
            bonus,
            subscription,
            purchased,
        }
    }

    fn restore(balance: &mut CreditBalance, draw: CreditDraw) {
        balance.bonus_credits += draw.bonus;
        balance.subscription_credits += draw.subscription;
        balance.purchased_credits += draw.purchased;
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn reserve(&self, user_id: &str, amount: u32) -> Result<ReservationId, LedgerError> {
        let account = self.account(user_id).await?;
        let mut account = account.lock().await;

        let available = account.balance.total();
        if amount > available {
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available,
            });
        }

        let draw = Self::draw_from(&mut account.balance, amount);
        let reservation = ReservationId::new();
        account.reservations.insert(
            reservation,
            ReservationEntry {
                draw,
                phase: ReservationPhase::Held,
            },
        );
        drop(account);

        let mut index = self.index.write().await;
        index.insert(reservation, user_id.to_string());

        debug!(user_id = %user_id, amount = amount, reservation = %reservation, "Reserved credits");
        Ok(reservation)
    }

    async fn commit(
        &self,
        reservation: ReservationId,
        context: CommitContext,
    ) -> Result<(), LedgerError> {
        let account = self.account_for_reservation(reservation).await?;
        let mut account = account.lock().await;

        let entry = account
            .reservations
            .get_mut(&reservation)
            .ok_or(LedgerError::UnknownReservation(reservation))?;

        match entry.phase {
            ReservationPhase::Committed => return Ok(()), // idempotent retry
            ReservationPhase::Refunded => {
                return Err(LedgerError::ReservationConflict(reservation))
            }
            ReservationPhase::Held => entry.phase = ReservationPhase::Committed,
        }
        let amount = entry.draw.total();

        let balance_after = account.balance.total();
        let user_id = account.balance.user_id.clone();
        let mut tx = CreditTransaction::new(
            user_id.clone(),
            context.tool_type,
            amount,
            context.description,
            balance_after,
        );
        if let Some(generation_id) = context.generation_id {
            tx = tx.with_generation_id(generation_id);
        }
        account.transactions.push(tx);

        info!(user_id = %user_id, credits = amount, balance_after = balance_after, "Committed credit charge");
        Ok(())
    }

    async fn refund(&self, reservation: ReservationId) -> Result<(), LedgerError> {
        let account = self.account_for_reservation(reservation).await?;
        let mut account = account.lock().await;

        let entry = account
            .reservations
            .get_mut(&reservation)
            .ok_or(LedgerError::UnknownReservation(reservation))?;

        let draw = match entry.phase {
            ReservationPhase::Refunded => return Ok(()), // idempotent retry
            ReservationPhase::Committed => {
                return Err(LedgerError::ReservationConflict(reservation))
            }
            ReservationPhase::Held => {
                entry.phase = ReservationPhase::Refunded;
                entry.draw
            }
        };

        Self::restore(&mut account.balance, draw);
        debug!(user_id = %account.balance.user_id, credits = draw.total(), reservation = %reservation, "Refunded reservation");
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> Result<CreditBalance, LedgerError> {
        let account = self.account(user_id).await?;
        let account = account.lock().await;
        Ok(account.balance.clone())
    }

    async fn history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, LedgerError> {
        let account = self.account(user_id).await?;
        let account = account.lock().await;
        Ok(account
            .transactions
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CommitContext {
        CommitContext {
            tool_type: ToolType::ShortVideo,
            description: "Short video generation".to_string(),
            generation_id: Some("g-1".to_string()),
        }
    }

    async fn ledger_with(user: &str, balance: CreditBalance) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        let mut balance = balance;
        balance.user_id = user.to_string();
        ledger.seed_user(balance).await;
        ledger
    }

    #[tokio::test]
    async fn test_reserve_commit_charges_once() {
        let ledger = ledger_with("u1", CreditBalance::subscription("u1", 50)).await;

        let reservation = ledger.reserve("u1", 25).await.unwrap();
        assert_eq!(ledger.balance("u1").await.unwrap().total(), 25);

        ledger.commit(reservation, context()).await.unwrap();
        assert_eq!(ledger.balance("u1").await.unwrap().total(), 25);

        let history = ledger.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].credits_amount, 25);
        assert_eq!(history[0].balance_after, 25);
        assert_eq!(history[0].generation_id.as_deref(), Some("g-1"));
    }

    #[tokio::test]
    async fn test_reserve_refund_nets_zero() {
        let ledger = ledger_with("u1", CreditBalance::subscription("u1", 50)).await;

        let reservation = ledger.reserve("u1", 25).await.unwrap();
        ledger.refund(reservation).await.unwrap();

        assert_eq!(ledger.balance("u1").await.unwrap().total(), 50);
        assert!(ledger.history("u1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_credits() {
        let ledger = ledger_with("u1", CreditBalance::subscription("u1", 5)).await;
        let err = ledger.reserve("u1", 20).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                required: 20,
                available: 5
            }
        ));
        // Balance untouched by a failed reserve
        assert_eq!(ledger.balance("u1").await.unwrap().total(), 5);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent_and_refund_conflicts() {
        let ledger = ledger_with("u1", CreditBalance::subscription("u1", 50)).await;
        let reservation = ledger.reserve("u1", 10).await.unwrap();

        ledger.commit(reservation, context()).await.unwrap();
        ledger.commit(reservation, context()).await.unwrap();
        // Only one transaction despite the retry
        assert_eq!(ledger.history("u1", 10).await.unwrap().len(), 1);

        let err = ledger.refund(reservation).await.unwrap_err();
        assert!(matches!(err, LedgerError::ReservationConflict(_)));
    }

    #[tokio::test]
    async fn test_refund_is_idempotent() {
        let ledger = ledger_with("u1", CreditBalance::subscription("u1", 50)).await;
        let reservation = ledger.reserve("u1", 10).await.unwrap();

        ledger.refund(reservation).await.unwrap();
        ledger.refund(reservation).await.unwrap();
        assert_eq!(ledger.balance("u1").await.unwrap().total(), 50);
    }

    #[tokio::test]
    async fn test_draw_order_bonus_then_subscription_then_purchased() {
        let balance = CreditBalance {
            user_id: "u1".to_string(),
            subscription_credits: 10,
            purchased_credits: 10,
            bonus_credits: 5,
        };
        let ledger = ledger_with("u1", balance).await;

        let reservation = ledger.reserve("u1", 12).await.unwrap();
        let after = ledger.balance("u1").await.unwrap();
        assert_eq!(after.bonus_credits, 0);
        assert_eq!(after.subscription_credits, 3);
        assert_eq!(after.purchased_credits, 10);

        // Refund restores the exact draw
        ledger.refund(reservation).await.unwrap();
        let restored = ledger.balance("u1").await.unwrap();
        assert_eq!(restored.bonus_credits, 5);
        assert_eq!(restored.subscription_credits, 10);
        assert_eq!(restored.purchased_credits, 10);
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_overspend() {
        let ledger = Arc::new(ledger_with("u1", CreditBalance::subscription("u1", 30)).await);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(
                async move { ledger.reserve("u1", 20).await },
            ));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        // 30 credits can cover exactly one 20-credit hold
        assert_eq!(successes, 1);
        assert_eq!(ledger.balance("u1").await.unwrap().total(), 10);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let ledger = MemoryLedger::new();
        assert!(matches!(
            ledger.reserve("ghost", 1).await.unwrap_err(),
            LedgerError::UnknownUser(_)
        ));
    }
}
