use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::rotation::RotationState;
use crate::errors::Result;

#[derive(Debug, FromRow)]
struct RotationStateRow {
    asset_id: String,
    last_refresh_at: Option<DateTime<Utc>>,
    priority_level: i32,
    in_top50: bool,
    cooldown_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    refresh_count: i64,
}

impl From<RotationStateRow> for RotationState {
    fn from(row: RotationStateRow) -> Self {
        RotationState {
            asset_id: row.asset_id,
            last_refresh_at: row.last_refresh_at,
            priority_level: row.priority_level,
            in_top50: row.in_top50,
            cooldown_until: row.cooldown_until,
            last_error: row.last_error,
            refresh_count: row.refresh_count,
        }
    }
}

pub async fn get_rotation_state(pool: &SqlitePool, asset_id: &str) -> Result<Option<RotationState>> {
    let row = sqlx::query_as::<_, RotationStateRow>("SELECT * FROM rotation_state WHERE asset_id = ?")
        .bind(asset_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(RotationState::from))
}

/// Upsert-increment: insert a fresh row on first refresh, otherwise
/// bump `refresh_count` and overwrite the timestamp/flags (spec §4.9 /
/// §4.7 step 3 "update rotation_state"). One statement, no prior read,
/// for the same reason quota increments avoid a read-then-write.
#[allow(clippy::too_many_arguments)]
pub async fn record_refresh(
    pool: &SqlitePool,
    asset_id: &str,
    priority_level: i32,
    in_top50: bool,
    cooldown_until: Option<DateTime<Utc>>,
    last_error: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO rotation_state (
            asset_id, last_refresh_at, priority_level, in_top50, cooldown_until, last_error, refresh_count
        ) VALUES (?, ?, ?, ?, ?, ?, 1)
        ON CONFLICT(asset_id) DO UPDATE SET
            last_refresh_at = excluded.last_refresh_at,
            priority_level = excluded.priority_level,
            in_top50 = excluded.in_top50,
            cooldown_until = excluded.cooldown_until,
            last_error = excluded.last_error,
            refresh_count = rotation_state.refresh_count + 1
        "#,
    )
    .bind(asset_id)
    .bind(now.to_rfc3339())
    .bind(priority_level)
    .bind(in_top50)
    .bind(cooldown_until.map(|d| d.to_rfc3339()))
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}
