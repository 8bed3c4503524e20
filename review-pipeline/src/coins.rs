use std::sync::Arc;

use async_trait::async_trait;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::coin_account::CoinAccount},
};

/// Virtual currency operations the review flow needs for refunds.
#[async_trait]
pub trait CoinLedger: Send + Sync {
    /// Credits `amount` to `user_id` and returns the new balance.
    async fn add_coins(&self, user_id: &str, amount: i64, reason: &str) -> Result<i64, AppError>;
}

/// Ledger backed by the `coin_account` table.
#[derive(Clone)]
pub struct SurrealCoinLedger {
    db: Arc<SurrealDbClient>,
}

impl SurrealCoinLedger {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CoinLedger for SurrealCoinLedger {
    async fn add_coins(&self, user_id: &str, amount: i64, reason: &str) -> Result<i64, AppError> {
        CoinAccount::add_coins(&self.db, user_id, amount, reason).await
    }
}
