//! PostgreSQL state manager

use super::{StoredSwap, SwapStore};
use crate::config::DatabaseConfig;
use crate::error::{AgentError, AgentResult};
use crate::swap::{Action, ActionRecord, ChainKind, Direction, SwapRecord};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// State manager for PostgreSQL persistence
pub struct StateManager {
    pool: PgPool,
}

impl StateManager {
    /// Create a new state manager
    pub async fn new(config: &DatabaseConfig) -> AgentResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables if missing
    pub async fn run_migrations(&self) -> AgentResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swap_events (
                hash_x VARCHAR(66) PRIMARY KEY,
                token VARCHAR(64) NOT NULL,
                direction SMALLINT NOT NULL,
                x VARCHAR(66),
                value VARCHAR(78) NOT NULL,
                cross_address VARCHAR(42) NOT NULL,
                storeman_approve_tx_hash VARCHAR(66),
                storeman_lock_tx_hash VARCHAR(66),
                storeman_refund_tx_hash VARCHAR(66),
                storeman_revoke_tx_hash VARCHAR(66),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_swap_events_token
            ON swap_events (token, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_state (
                chain VARCHAR(16) PRIMARY KEY,
                block_number BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }
}

#[async_trait]
impl SwapStore for StateManager {
    async fn save_swap(&self, token: &str, direction: Direction, record: &SwapRecord) -> AgentResult<()> {
        sqlx::query(
            r#"
            INSERT INTO swap_events (hash_x, token, direction, x, value, cross_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (hash_x)
            DO UPDATE SET
                token = $2,
                direction = $3,
                x = COALESCE($4, swap_events.x),
                value = $5,
                cross_address = $6,
                updated_at = NOW()
            "#,
        )
        .bind(format!("{:#x}", record.hash_key))
        .bind(token)
        .bind(u8::from(direction) as i16)
        .bind(record.key.map(|k| format!("{:#x}", k)))
        .bind(record.amount.to_string())
        .bind(format!("{:#x}", record.cross_address))
        .execute(&self.pool)
        .await?;

        debug!("Saved swap {:#x} ({} {})", record.hash_key, token, direction);
        Ok(())
    }

    async fn get_swap(&self, hash_key: H256) -> AgentResult<Option<StoredSwap>> {
        let row = sqlx::query("SELECT * FROM swap_events WHERE hash_x = $1")
            .bind(format!("{:#x}", hash_key))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(stored_swap_from_row).transpose()
    }

    async fn save_action_record(&self, hash_key: H256, record: &ActionRecord) -> AgentResult<()> {
        let column = action_column(record.action());
        let query = format!(
            "UPDATE swap_events SET {} = $1, updated_at = NOW() WHERE hash_x = $2",
            column
        );

        let result = sqlx::query(&query)
            .bind(record.tx_hash())
            .bind(format!("{:#x}", hash_key))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AgentError::SwapNotFound {
                hash_key: format!("{:#x}", hash_key),
            });
        }

        debug!("Saved {} = {} for {:#x}", record.field(), record.tx_hash(), hash_key);
        Ok(())
    }

    async fn save_scanned_block(&self, chain: ChainKind, block_number: u64) -> AgentResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_state (chain, block_number, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain)
            DO UPDATE SET block_number = $2, updated_at = NOW()
            "#,
        )
        .bind(chain.as_str())
        .bind(block_number as i64)
        .execute(&self.pool)
        .await?;

        debug!("Saved scanned block for {} chain: {}", chain, block_number);
        Ok(())
    }

    async fn get_scanned_block(&self, chain: ChainKind, default: u64) -> AgentResult<u64> {
        let row = sqlx::query("SELECT block_number FROM scan_state WHERE chain = $1")
            .bind(chain.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.get::<i64, _>("block_number") as u64)
            .unwrap_or(default))
    }

    async fn event_history(&self, token: &str) -> AgentResult<Vec<StoredSwap>> {
        let rows = sqlx::query("SELECT * FROM swap_events WHERE token = $1 ORDER BY created_at DESC")
            .bind(token)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(stored_swap_from_row).collect()
    }

    async fn health_check(&self) -> AgentResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn action_column(action: Action) -> &'static str {
    match action {
        Action::Approve => "storeman_approve_tx_hash",
        Action::Lock => "storeman_lock_tx_hash",
        Action::Refund => "storeman_refund_tx_hash",
        Action::Revoke => "storeman_revoke_tx_hash",
    }
}

fn stored_swap_from_row(row: &PgRow) -> AgentResult<StoredSwap> {
    let hash_x: String = row.try_get("hash_x")?;
    let x: Option<String> = row.try_get("x")?;
    let value: String = row.try_get("value")?;
    let cross_address: String = row.try_get("cross_address")?;
    let direction: i16 = row.try_get("direction")?;

    let direction = u8::try_from(direction)
        .map_err(|_| AgentError::Internal(format!("stored direction {} out of range", direction)))
        .and_then(Direction::try_from)?;

    let mut record = SwapRecord::new(
        parse_h256(&hash_x)?,
        U256::from_dec_str(&value)
            .map_err(|e| AgentError::Internal(format!("stored value {}: {}", value, e)))?,
        Address::from_str(&cross_address)
            .map_err(|e| AgentError::Internal(format!("stored address {}: {}", cross_address, e)))?,
    );
    if let Some(x) = x {
        record = record.with_key(parse_h256(&x)?);
    }

    let mut actions = Vec::new();
    for action in Action::ALL {
        let tx_hash: Option<String> = row.try_get(action_column(action))?;
        if let Some(tx_hash) = tx_hash {
            actions.push(ActionRecord::new(action, &tx_hash));
        }
    }

    Ok(StoredSwap {
        token: row.try_get("token")?,
        direction,
        record,
        actions,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_h256(value: &str) -> AgentResult<H256> {
    H256::from_str(value).map_err(|e| AgentError::Internal(format!("stored hash {}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_columns_are_distinct() {
        let columns: std::collections::HashSet<_> = Action::ALL.into_iter().map(action_column).collect();
        assert_eq!(columns.len(), 4);
        assert_eq!(action_column(Action::Lock), "storeman_lock_tx_hash");
    }

    #[test]
    fn test_hash_text_round_trip() {
        let hash = H256::repeat_byte(0xab);
        assert_eq!(parse_h256(&format!("{:#x}", hash)).unwrap(), hash);
        assert!(matches!(parse_h256("0xnothex"), Err(AgentError::Internal(_))));
    }
}
