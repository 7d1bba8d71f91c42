use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AnalysisError, Candle, NewTrade, Timeframe, TradeActivity, TradeRecord};

/// Price-feed collaborator.
///
/// `Ok(None)` means the feed has nothing for the pair, which is different from
/// an empty or all-zero series.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn candles(
        &self,
        asset: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Option<Vec<Candle>>, AnalysisError>;
}

/// Trade-history collaborator. Closed records are immutable once their outcome is set.
#[async_trait]
pub trait TradeHistory: Send + Sync {
    async fn open_trade(&self, trade: NewTrade) -> Result<TradeRecord, AnalysisError>;

    async fn close_trade(
        &self,
        id: i64,
        exit_price: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<TradeRecord, AnalysisError>;

    /// Closed trades ordered by close time.
    async fn closed_trades(&self) -> Result<Vec<TradeRecord>, AnalysisError>;

    async fn closed_count(&self) -> Result<usize, AnalysisError>;

    /// Most recently opened or closed trades, newest last.
    async fn recent_activity(&self, limit: usize) -> Result<Vec<TradeActivity>, AnalysisError>;
}
