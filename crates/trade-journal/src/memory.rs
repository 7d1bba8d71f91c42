use analysis_core::{AnalysisError, NewTrade, TradeActivity, TradeHistory, TradeRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    trades: Vec<TradeRecord>,
}

/// Process-local journal. Ids start at 1 and increase by one per trade.
#[derive(Debug, Default)]
pub struct InMemoryTradeJournal {
    inner: RwLock<Inner>,
}

impl InMemoryTradeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.trades.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: i64) -> Option<TradeRecord> {
        self.inner.read().await.trades.iter().find(|t| t.id == id).cloned()
    }
}

#[async_trait]
impl TradeHistory for InMemoryTradeJournal {
    async fn open_trade(&self, trade: NewTrade) -> Result<TradeRecord, AnalysisError> {
        if !trade.entry_price.is_finite() {
            return Err(AnalysisError::InvalidData(format!(
                "entry price {} for {}",
                trade.entry_price, trade.asset
            )));
        }
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let record = TradeRecord::open(inner.next_id, trade);
        inner.trades.push(record.clone());
        Ok(record)
    }

    async fn close_trade(
        &self,
        id: i64,
        exit_price: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<TradeRecord, AnalysisError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .trades
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| AnalysisError::TradeState(format!("trade {id} not found")))?;
        record.close(exit_price, closed_at)?;
        Ok(record.clone())
    }

    async fn closed_trades(&self) -> Result<Vec<TradeRecord>, AnalysisError> {
        let inner = self.inner.read().await;
        let mut closed: Vec<TradeRecord> =
            inner.trades.iter().filter(|t| !t.is_open()).cloned().collect();
        closed.sort_by_key(|t| (t.closed_at, t.id));
        Ok(closed)
    }

    async fn closed_count(&self) -> Result<usize, AnalysisError> {
        Ok(self.inner.read().await.trades.iter().filter(|t| !t.is_open()).count())
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<TradeActivity>, AnalysisError> {
        let inner = self.inner.read().await;
        let mut activity: Vec<(DateTime<Utc>, i64, TradeActivity)> = inner
            .trades
            .iter()
            .map(|t| (t.closed_at.unwrap_or(t.opened_at), t.id, t.activity()))
            .collect();
        activity.sort_by_key(|(at, id, _)| (*at, *id));
        let skip = activity.len().saturating_sub(limit);
        Ok(activity.into_iter().skip(skip).map(|(_, _, a)| a).collect())
    }
}
