use tracing::info;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

// Keyed by the Discord user id.
stored_object!(CoinAccount, "coin_account", {
    user_id: String,
    balance: i64
});

/// Row of the append-only `coin_transaction` log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoinTransaction {
    pub user_id: String,
    pub amount: i64,
    pub reason: String,
}

impl CoinAccount {
    pub async fn get_balance(db: &SurrealDbClient, user_id: &str) -> Result<i64, AppError> {
        let account = db.get_item::<Self>(user_id).await?;
        Ok(account.map(|a| a.balance).unwrap_or(0))
    }

    /// Credits `amount` and appends a transaction row in one transaction. Returns the new balance.
    pub async fn add_coins(
        db: &SurrealDbClient,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<i64, AppError> {
        if amount <= 0 {
            return Err(AppError::Validation("amount to add must be positive".into()));
        }

        db.client
            .query(
                "BEGIN TRANSACTION;
                 UPSERT type::thing($table, $user_id)
                 SET user_id = $user_id,
                     balance = (balance ?? 0) + $amount,
                     created_at = created_at ?? time::now(),
                     updated_at = time::now();
                 CREATE coin_transaction CONTENT {
                     user_id: $user_id,
                     amount: $amount,
                     reason: $reason,
                     created_at: time::now()
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_owned()))
            .bind(("amount", amount))
            .bind(("reason", reason.to_owned()))
            .await?
            .check()?;

        let balance = Self::get_balance(db, user_id).await?;
        info!(%user_id, amount, %reason, balance, "coins added");
        Ok(balance)
    }

    /// Credit history of a user, oldest first. Only tests read the log back.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn transactions(
        db: &SurrealDbClient,
        user_id: &str,
    ) -> Result<Vec<CoinTransaction>, AppError> {
        let rows: Vec<CoinTransaction> = db
            .client
            .query(
                "SELECT user_id, amount, reason, created_at FROM coin_transaction
                 WHERE user_id = $user_id ORDER BY created_at ASC",
            )
            .bind(("user_id", user_id.to_owned()))
            .await?
            .take(0)?;

        Ok(rows)
    }
}
