//! Credit balance and transaction data models.
//!
//! A user's balance is split across three buckets: subscription credits
//! (granted monthly by the plan), purchased credits (one-time packs), and
//! bonus credits (promotions, referral rewards). Reservations drain bonus
//! first, then subscription, then purchased.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tool::ToolType;

/// A user's credit balance across the three buckets.
///
/// Invariant: no bucket is ever negative; charges are atomic with respect
/// to concurrent charges for the same user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditBalance {
    pub user_id: String,
    pub subscription_credits: u32,
    pub purchased_credits: u32,
    pub bonus_credits: u32,
}

impl CreditBalance {
    /// Create a balance holding only subscription credits.
    pub fn subscription(user_id: impl Into<String>, credits: u32) -> Self {
        Self {
            user_id: user_id.into(),
            subscription_credits: credits,
            purchased_credits: 0,
            bonus_credits: 0,
        }
    }

    /// Total spendable credits across all buckets.
    pub fn total(&self) -> u32 {
        self.bonus_credits
            .saturating_add(self.subscription_credits)
            .saturating_add(self.purchased_credits)
    }
}

/// How much a reservation drew from each bucket.
///
/// Refunds restore exactly this draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditDraw {
    pub bonus: u32,
    pub subscription: u32,
    pub purchased: u32,
}

impl CreditDraw {
    /// Total credits drawn.
    pub fn total(&self) -> u32 {
        self.bonus + self.subscription + self.purchased
    }
}

/// A committed credit charge.
///
/// Recorded once per successful live generation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreditTransaction {
    /// Unique identifier (UUID).
    pub id: String,

    /// User who was charged.
    pub user_id: String,

    /// Tool the credits paid for.
    pub tool_type: ToolType,

    /// Number of credits charged.
    pub credits_amount: u32,

    /// Human-readable description of the operation.
    pub description: String,

    /// Total spendable credits remaining after this transaction.
    pub balance_after: u32,

    /// Generation record this charge belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,

    /// When the charge was committed.
    pub timestamp: DateTime<Utc>,
}

impl CreditTransaction {
    /// Create a new transaction stamped with the current time.
    pub fn new(
        user_id: impl Into<String>,
        tool_type: ToolType,
        credits_amount: u32,
        description: impl Into<String>,
        balance_after: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            tool_type,
            credits_amount,
            description: description.into(),
            balance_after,
            generation_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the generation record id.
    pub fn with_generation_id(mut self, generation_id: impl Into<String>) -> Self {
        self.generation_id = Some(generation_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_total() {
        let balance = CreditBalance {
            user_id: "u1".to_string(),
            subscription_credits: 50,
            purchased_credits: 20,
            bonus_credits: 5,
        };
        assert_eq!(balance.total(), 75);
    }

    #[test]
    fn test_subscription_constructor() {
        let balance = CreditBalance::subscription("u1", 500);
        assert_eq!(balance.total(), 500);
        assert_eq!(balance.purchased_credits, 0);
    }

    #[test]
    fn test_draw_total() {
        let draw = CreditDraw {
            bonus: 5,
            subscription: 10,
            purchased: 0,
        };
        assert_eq!(draw.total(), 15);
    }
}
