use analysis_core::{
    AnalysisError, NewTrade, StrategyScore, TradeActivity, TradeDirection, TradeHistory,
    TradeOutcome, TradeRecord,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn encode_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(column: &str, raw: &str) -> Result<DateTime<Utc>, AnalysisError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| AnalysisError::DatabaseError(format!("bad {column} '{raw}': {e}")))
}

fn db_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

/// DB row with text dates and JSON snapshots (sqlx `Any` friendly).
#[derive(Debug, FromRow)]
struct TradeRow {
    id: i64,
    asset: String,
    direction: String,
    entry_price: f64,
    exit_price: Option<f64>,
    opened_at: String,
    closed_at: Option<String>,
    outcome: String,
    score_json: String,
    indicators_json: String,
    journal: String,
}

impl TradeRow {
    fn into_record(self) -> Result<TradeRecord, AnalysisError> {
        let direction = TradeDirection::parse(&self.direction).ok_or_else(|| {
            AnalysisError::DatabaseError(format!(
                "trade {} has direction '{}'",
                self.id, self.direction
            ))
        })?;
        let outcome = TradeOutcome::parse(&self.outcome).ok_or_else(|| {
            AnalysisError::DatabaseError(format!(
                "trade {} has outcome '{}'",
                self.id, self.outcome
            ))
        })?;
        let score = serde_json::from_str(&self.score_json)
            .map_err(|e| AnalysisError::DatabaseError(format!("trade {} score: {e}", self.id)))?;
        let indicators = serde_json::from_str(&self.indicators_json).map_err(|e| {
            AnalysisError::DatabaseError(format!("trade {} indicators: {e}", self.id))
        })?;

        Ok(TradeRecord {
            id: self.id,
            asset: self.asset,
            direction,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            opened_at: decode_time("opened_at", &self.opened_at)?,
            closed_at: self
                .closed_at
                .as_deref()
                .map(|s| decode_time("closed_at", s))
                .transpose()?,
            outcome,
            score,
            indicators,
            journal: self.journal,
        })
    }
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: i64,
    opened_at: String,
    closed_at: Option<String>,
    outcome: String,
    score_json: String,
    journal: String,
}

impl ActivityRow {
    fn into_activity(self) -> Result<TradeActivity, AnalysisError> {
        let score: StrategyScore = serde_json::from_str(&self.score_json)
            .map_err(|e| AnalysisError::DatabaseError(format!("trade {} score: {e}", self.id)))?;
        Ok(TradeActivity {
            opened_at: decode_time("opened_at", &self.opened_at)?,
            closed_at: self
                .closed_at
                .as_deref()
                .map(|s| decode_time("closed_at", s))
                .transpose()?,
            outcome: TradeOutcome::parse(&self.outcome).ok_or_else(|| {
                AnalysisError::DatabaseError(format!("unknown outcome '{}'", self.outcome))
            })?,
            entry_score: score.final_score,
            entry_trap_risk: score.psychology_penalty,
            journaled: !self.journal.trim().is_empty(),
        })
    }
}

const SELECT_TRADE: &str = "SELECT id, asset, direction, entry_price, exit_price, opened_at, \
     closed_at, outcome, score_json, indicators_json, journal FROM trades";

/// Journal backed by a `trades` table.
pub struct SqliteTradeJournal {
    pool: sqlx::AnyPool,
}

impl SqliteTradeJournal {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }

    /// Open `database_url` (e.g. `sqlite://journal.db?mode=rwc` or
    /// `sqlite::memory:`) and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open trade journal at {database_url}"))?;
        let journal = Self::new(pool);
        journal.init_tables().await?;
        Ok(journal)
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                outcome TEXT NOT NULL DEFAULT 'OPEN',
                score_json TEXT NOT NULL,
                indicators_json TEXT NOT NULL,
                journal TEXT NOT NULL DEFAULT ''
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trades_outcome_closed ON trades (outcome, closed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<TradeRecord>, AnalysisError> {
        let row: Option<TradeRow> = sqlx::query_as(&format!("{SELECT_TRADE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(TradeRow::into_record).transpose()
    }
}

#[async_trait]
impl TradeHistory for SqliteTradeJournal {
    async fn open_trade(&self, trade: NewTrade) -> Result<TradeRecord, AnalysisError> {
        if !trade.entry_price.is_finite() {
            return Err(AnalysisError::InvalidData(format!(
                "entry price {} for {}",
                trade.entry_price, trade.asset
            )));
        }
        let score_json = serde_json::to_string(&trade.score)
            .map_err(|e| AnalysisError::InvalidData(e.to_string()))?;
        let indicators_json = serde_json::to_string(&trade.indicators)
            .map_err(|e| AnalysisError::InvalidData(e.to_string()))?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO trades (
                asset, direction, entry_price, opened_at, outcome,
                score_json, indicators_json, journal
            )
            VALUES (?, ?, ?, ?, 'OPEN', ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&trade.asset)
        .bind(trade.direction.as_str())
        .bind(trade.entry_price)
        .bind(encode_time(trade.opened_at))
        .bind(&score_json)
        .bind(&indicators_json)
        .bind(&trade.journal)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        tracing::debug!(
            trade_id = id,
            asset = %trade.asset,
            direction = trade.direction.as_str(),
            "trade opened"
        );
        Ok(TradeRecord::open(id, trade))
    }

    async fn close_trade(
        &self,
        id: i64,
        exit_price: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<TradeRecord, AnalysisError> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| AnalysisError::TradeState(format!("trade {id} not found")))?;
        let outcome = record.close(exit_price, closed_at)?;

        // Only an OPEN row may change; a racing close loses here.
        let result = sqlx::query(
            r#"
            UPDATE trades
            SET exit_price = ?, closed_at = ?, outcome = ?
            WHERE id = ? AND outcome = 'OPEN'
            "#,
        )
        .bind(exit_price)
        .bind(encode_time(closed_at))
        .bind(outcome.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(AnalysisError::TradeState(format!(
                "trade {id} was closed concurrently"
            )));
        }

        tracing::debug!(trade_id = id, outcome = outcome.as_str(), "trade closed");
        Ok(record)
    }

    async fn closed_trades(&self) -> Result<Vec<TradeRecord>, AnalysisError> {
        let rows: Vec<TradeRow> = sqlx::query_as(&format!(
            "{SELECT_TRADE} WHERE outcome != 'OPEN' ORDER BY closed_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TradeRow::into_record).collect()
    }

    async fn closed_count(&self) -> Result<usize, AnalysisError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades WHERE outcome != 'OPEN'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.max(0) as usize)
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<TradeActivity>, AnalysisError> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            r#"
            SELECT id, opened_at, closed_at, outcome, score_json, journal
            FROM trades
            ORDER BY COALESCE(closed_at, opened_at) DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut activity = rows
            .into_iter()
            .map(ActivityRow::into_activity)
            .collect::<Result<Vec<_>, AnalysisError>>()?;
        activity.reverse();
        Ok(activity)
    }
}
