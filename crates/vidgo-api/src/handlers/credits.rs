//! Credit balance and history handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vidgo_models::CreditTransaction;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

/// Maximum allowed limit for credit history queries.
const MAX_LIMIT: usize = 100;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub subscription_credits: u32,
    pub purchased_credits: u32,
    pub bonus_credits: u32,
    pub total: u32,
}

/// Get the authenticated user's credit balance.
pub async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<BalanceResponse>> {
    state.ensure_account(&user.user_id, user.plan).await;
    let balance = state.ledger.balance(&user.user_id).await?;

    Ok(Json(BalanceResponse {
        subscription_credits: balance.subscription_credits,
        purchased_credits: balance.purchased_credits,
        bonus_credits: balance.bonus_credits,
        total: balance.total(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreditHistoryQuery {
    /// Maximum number of transactions to return (clamped to 1..100).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct CreditTransactionResponse {
    pub id: String,
    pub timestamp: String,
    pub tool_type: String,
    pub credits_amount: u32,
    pub description: String,
    pub balance_after: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,
}

impl From<CreditTransaction> for CreditTransactionResponse {
    fn from(tx: CreditTransaction) -> Self {
        Self {
            id: tx.id,
            timestamp: tx.timestamp.to_rfc3339(),
            tool_type: tx.tool_type.as_str().to_string(),
            credits_amount: tx.credits_amount,
            description: tx.description,
            balance_after: tx.balance_after,
            generation_id: tx.generation_id,
        }
    }
}

#[derive(Serialize)]
pub struct CreditHistoryResponse {
    pub transactions: Vec<CreditTransactionResponse>,
}

/// Get committed credit charges for the authenticated user, newest first.
pub async fn get_credit_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CreditHistoryQuery>,
) -> ApiResult<Json<CreditHistoryResponse>> {
    state.ensure_account(&user.user_id, user.plan).await;
    let limit = query.limit.clamp(1, MAX_LIMIT);

    let transactions = state.ledger.history(&user.user_id, limit).await?;
    Ok(Json(CreditHistoryResponse {
        transactions: transactions.into_iter().map(Into::into).collect(),
    }))
}
