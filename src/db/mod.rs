pub mod models;
pub mod writer;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use self::models::{HistoryRow, HistorySample, RoomState};

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Write-through persistence for the room state store.
#[derive(Debug, Clone)]
pub struct RoomRepository {
    pool: PgPool,
}

impl RoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load_states(&self) -> Result<Vec<RoomState>> {
        let rows = sqlx::query_as::<_, RoomState>(
            r#"
            SELECT room_id, display_name, room_temp, set_temp, delta,
                   hvac_state, mode, captured_at, raw_hex, created_at, updated_at
            FROM room_states
            ORDER BY room_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Newest `limit` samples per room, returned oldest-first within each room.
    pub async fn load_history(&self, limit: usize) -> Result<Vec<HistoryRow>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT room_id, room_temp, set_temp, recorded_at
            FROM (
                SELECT room_id, room_temp, set_temp, recorded_at,
                       ROW_NUMBER() OVER (PARTITION BY room_id ORDER BY recorded_at DESC) AS rn
                FROM room_history
            ) recent
            WHERE rn <= $1
            ORDER BY room_id, recorded_at ASC
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn save_state(&self, state: &RoomState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO room_states (room_id, display_name, room_temp, set_temp, delta,
                                     hvac_state, mode, captured_at, raw_hex, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (room_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                room_temp    = EXCLUDED.room_temp,
                set_temp     = EXCLUDED.set_temp,
                delta        = EXCLUDED.delta,
                hvac_state   = EXCLUDED.hvac_state,
                mode         = EXCLUDED.mode,
                captured_at  = EXCLUDED.captured_at,
                raw_hex      = EXCLUDED.raw_hex,
                updated_at   = EXCLUDED.updated_at
            "#,
        )
        .bind(&state.room_id)
        .bind(&state.display_name)
        .bind(state.room_temp)
        .bind(state.set_temp)
        .bind(state.delta)
        .bind(&state.hvac_state)
        .bind(state.mode)
        .bind(state.captured_at)
        .bind(&state.raw_hex)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert one sample and drop all but the newest `keep` rows for the room.
    pub async fn append_history(&self, room_id: &str, sample: &HistorySample, keep: usize) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO room_history (room_id, room_temp, set_temp, recorded_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(room_id)
        .bind(sample.room_temp)
        .bind(sample.set_temp)
        .bind(sample.time)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM room_history
            WHERE room_id = $1
              AND id NOT IN (
                  SELECT id FROM room_history
                  WHERE room_id = $1
                  ORDER BY recorded_at DESC, id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(room_id)
        .bind(keep as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
