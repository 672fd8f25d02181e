use super::{CategoryLog, Frequency, RateSample, TradeLog, TradeStats, addr_to_string};
use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;

const CURSOR_ID: i16 = 1;

// ==========================================
// CURSOR OPERATIONS
// ==========================================

/// Last block whose logs were fully stored, zero before the first cycle.
pub async fn get_last_block(pool: &PgPool) -> Result<u64> {
    let block: Option<i64> = sqlx::query_scalar("SELECT block FROM log_cursor WHERE id = $1")
        .bind(CURSOR_ID)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch log cursor")?;

    Ok(block.unwrap_or(0).max(0) as u64)
}

pub async fn upsert_last_block(pool: &PgPool, block: u64, timepoint: u64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO log_cursor (id, block, updated_at) VALUES ($1, $2, $3)
        ON CONFLICT (id)
        DO UPDATE SET
            block = EXCLUDED.block,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(CURSOR_ID)
    .bind(block as i64)
    .bind(timepoint as i64)
    .execute(pool)
    .await
    .context("Failed to update log cursor")?;

    Ok(())
}

// ==========================================
// CHAIN LOG OPERATIONS
// ==========================================

/// Insert a trade log; replays of the same log are ignored
pub async fn insert_trade_log(pool: &PgPool, trade: &TradeLog, timepoint: u64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trade_logs (
            tx_hash, log_index, block_number, transaction_index, timestamp,
            src_address, dest_address, src_amount, dest_amount,
            reserve_address, wallet_address, user_address,
            burn_fee, wallet_fee, fiat_amount, stored_at, extra_fees
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8::numeric, $9::numeric,
            $10, $11, $12, $13::numeric, $14::numeric, $15, $16, $17
        )
        ON CONFLICT (tx_hash, log_index) DO NOTHING
        "#,
    )
    .bind(trade.tx_hash.to_string())
    .bind(trade.log_index as i64)
    .bind(trade.block_number as i64)
    .bind(trade.transaction_index as i64)
    .bind(trade.timestamp as i64)
    .bind(addr_to_string(&trade.src_address))
    .bind(addr_to_string(&trade.dest_address))
    .bind(trade.src_amount.to_string())
    .bind(trade.dest_amount.to_string())
    .bind(addr_to_string(&trade.reserve_address))
    .bind(addr_to_string(&trade.wallet_address))
    .bind(addr_to_string(&trade.user_address))
    .bind(trade.burn_fee.map(|f| f.to_string()))
    .bind(trade.wallet_fee.map(|f| f.to_string()))
    .bind(trade.fiat_amount)
    .bind(timepoint as i64)
    .bind(Json(&trade.extra_fees))
    .execute(pool)
    .await
    .context("Failed to insert trade log")?;

    Ok(())
}

pub async fn insert_category_log(pool: &PgPool, log: &CategoryLog) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO category_logs (
            tx_hash, log_index, block_number, transaction_index, address, category
        ) VALUES ($1, $2, $3, $4, $5, $6::numeric)
        ON CONFLICT (tx_hash, log_index) DO NOTHING
        "#,
    )
    .bind(log.tx_hash.to_string())
    .bind(log.log_index as i64)
    .bind(log.block_number as i64)
    .bind(log.transaction_index as i64)
    .bind(addr_to_string(&log.address))
    .bind(log.category.to_string())
    .execute(pool)
    .await
    .context("Failed to insert category log")?;

    Ok(())
}

// ==========================================
// STATS OPERATIONS
// ==========================================

/// Add every entry of `stats` into its bucket, all or nothing
pub async fn accumulate_trade_stats(
    pool: &PgPool,
    metric: &str,
    freq: Frequency,
    timestamp: u64,
    stats: &TradeStats,
) -> Result<()> {
    if stats.is_empty() {
        return Ok(());
    }

    let bucket = freq.bucket(timestamp) as i64;
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin trade stats transaction")?;

    for (key, value) in stats {
        sqlx::query(
            r#"
            INSERT INTO trade_stats (metric, freq, bucket, dim_key, value)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (metric, freq, bucket, dim_key)
            DO UPDATE SET value = trade_stats.value + EXCLUDED.value
            "#,
        )
        .bind(metric)
        .bind(freq.as_str())
        .bind(bucket)
        .bind(key)
        .bind(*value)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to accumulate {} {} stat for {}", metric, freq.as_str(), key))?;
    }

    tx.commit().await.context("Failed to commit trade stats")?;
    Ok(())
}

// ==========================================
// RATE LOG OPERATIONS
// ==========================================

pub async fn get_rate_log(pool: &PgPool, month: u64) -> Result<Vec<RateSample>> {
    let samples: Option<Json<Vec<RateSample>>> =
        sqlx::query_scalar("SELECT samples FROM rate_logs WHERE month = $1")
            .bind(month as i64)
            .fetch_optional(pool)
            .await
            .context("Failed to fetch rate log")?;

    Ok(samples.map(|s| s.0).unwrap_or_default())
}

/// Replace the whole month log
pub async fn upsert_rate_log(pool: &PgPool, samples: &[RateSample], month: u64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO rate_logs (month, samples) VALUES ($1, $2)
        ON CONFLICT (month)
        DO UPDATE SET samples = EXCLUDED.samples
        "#,
    )
    .bind(month as i64)
    .bind(Json(samples))
    .execute(pool)
    .await
    .context("Failed to store rate log")?;

    Ok(())
}
