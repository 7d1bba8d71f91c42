use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, IndicatorValues, StrategyScore, TrendDirection};

/// Binary option direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeDirection {
    Call,
    Put,
}

impl TradeDirection {
    pub fn from_trend(trend: TrendDirection) -> Option<Self> {
        match trend {
            TrendDirection::Bullish => Some(TradeDirection::Call),
            TrendDirection::Bearish => Some(TradeDirection::Put),
            TrendDirection::Neutral => None,
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            TradeDirection::Call => 1.0,
            TradeDirection::Put => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Call => "CALL",
            TradeDirection::Put => "PUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CALL" | "BUY" => Some(TradeDirection::Call),
            "PUT" | "SELL" => Some(TradeDirection::Put),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeOutcome {
    Open,
    Win,
    Loss,
}

impl TradeOutcome {
    /// A close exactly at the entry price counts as a loss.
    pub fn resolve(direction: TradeDirection, entry_price: f64, exit_price: f64) -> Self {
        let won = match direction {
            TradeDirection::Call => exit_price > entry_price,
            TradeDirection::Put => exit_price < entry_price,
        };
        if won {
            TradeOutcome::Win
        } else {
            TradeOutcome::Loss
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOutcome::Open => "OPEN",
            TradeOutcome::Win => "WIN",
            TradeOutcome::Loss => "LOSS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(TradeOutcome::Open),
            "WIN" => Some(TradeOutcome::Win),
            "LOSS" => Some(TradeOutcome::Loss),
            _ => None,
        }
    }
}

/// Trade about to be recorded; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrade {
    pub asset: String,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub opened_at: DateTime<Utc>,
    pub score: StrategyScore,
    pub indicators: IndicatorValues,
    #[serde(default)]
    pub journal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    pub asset: String,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub outcome: TradeOutcome,
    pub score: StrategyScore,
    pub indicators: IndicatorValues,
    pub journal: String,
}

impl TradeRecord {
    pub fn open(id: i64, trade: NewTrade) -> Self {
        Self {
            id,
            asset: trade.asset,
            direction: trade.direction,
            entry_price: trade.entry_price,
            exit_price: None,
            opened_at: trade.opened_at,
            closed_at: None,
            outcome: TradeOutcome::Open,
            score: trade.score,
            indicators: trade.indicators,
            journal: trade.journal,
        }
    }

    pub fn is_open(&self) -> bool {
        self.outcome == TradeOutcome::Open
    }

    /// Close the trade exactly once.
    pub fn close(
        &mut self,
        exit_price: f64,
        closed_at: DateTime<Utc>,
    ) -> Result<TradeOutcome, AnalysisError> {
        if !self.is_open() {
            return Err(AnalysisError::TradeState(format!(
                "trade {} is already closed as {}",
                self.id,
                self.outcome.as_str()
            )));
        }
        if !exit_price.is_finite() {
            return Err(AnalysisError::InvalidData(format!(
                "exit price {exit_price} for trade {}",
                self.id
            )));
        }
        if closed_at < self.opened_at {
            return Err(AnalysisError::InvalidData(format!(
                "trade {} closed before it opened",
                self.id
            )));
        }

        let outcome = TradeOutcome::resolve(self.direction, self.entry_price, exit_price);
        self.exit_price = Some(exit_price);
        self.closed_at = Some(closed_at);
        self.outcome = outcome;
        Ok(outcome)
    }

    pub fn activity(&self) -> TradeActivity {
        TradeActivity {
            opened_at: self.opened_at,
            closed_at: self.closed_at,
            outcome: self.outcome,
            entry_score: self.score.final_score,
            entry_trap_risk: self.score.psychology_penalty,
            journaled: !self.journal.trim().is_empty(),
        }
    }
}

/// Compact view of a trade for cadence and discipline checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeActivity {
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub outcome: TradeOutcome,
    /// Strategy score when the trade was taken
    #[serde(default)]
    pub entry_score: f64,
    /// Trap risk (psychology penalty) when the trade was taken
    #[serde(default)]
    pub entry_trap_risk: f64,
    /// Whether the trade carries a journal note
    #[serde(default)]
    pub journaled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Crossover, Grade, MarketSession, PatternLabel};
    use chrono::{Duration, TimeZone};

    fn values() -> IndicatorValues {
        IndicatorValues {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
            close: 1.1,
            rsi: 55.0,
            ema_fast: 1.1,
            ema_slow: 1.09,
            macd_line: 0.001,
            macd_signal: 0.0005,
            macd_histogram: 0.0005,
            bb_upper: 1.12,
            bb_middle: 1.1,
            bb_lower: 1.08,
            volatility_ratio: 1.0,
            pattern: PatternLabel::None,
            pattern_bias: TrendDirection::Neutral,
            trend: TrendDirection::Bullish,
            ema_crossover: Crossover::None,
        }
    }

    fn score() -> StrategyScore {
        StrategyScore {
            trend_component: 75.0,
            momentum_component: 75.0,
            volatility_component: 70.0,
            pattern_component: 50.0,
            session_component: 100.0,
            psychology_penalty: 0.0,
            final_score: 75.0,
            grade: Grade::Acceptable,
            session: MarketSession::London,
            trend: TrendDirection::Bullish,
            notes: vec![],
        }
    }

    fn open_call() -> TradeRecord {
        TradeRecord::open(
            1,
            NewTrade {
                asset: "EURUSD".to_string(),
                direction: TradeDirection::Call,
                entry_price: 1.1,
                opened_at: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
                score: score(),
                indicators: values(),
                journal: String::new(),
            },
        )
    }

    #[test]
    fn test_outcome_resolution() {
        assert_eq!(TradeOutcome::resolve(TradeDirection::Call, 1.0, 1.1), TradeOutcome::Win);
        assert_eq!(TradeOutcome::resolve(TradeDirection::Call, 1.0, 0.9), TradeOutcome::Loss);
        assert_eq!(TradeOutcome::resolve(TradeDirection::Put, 1.0, 0.9), TradeOutcome::Win);
        assert_eq!(TradeOutcome::resolve(TradeDirection::Put, 1.0, 1.0), TradeOutcome::Loss);
    }

    #[test]
    fn test_open_trade_has_no_exit() {
        let t = open_call();
        assert!(t.is_open());
        assert!(t.exit_price.is_none());
        assert!(t.closed_at.is_none());
    }

    #[test]
    fn test_close_only_once() {
        let mut t = open_call();
        let closed_at = t.opened_at + Duration::minutes(5);
        assert_eq!(t.close(1.2, closed_at).unwrap(), TradeOutcome::Win);
        assert_eq!(t.exit_price, Some(1.2));

        let err = t.close(0.5, closed_at).unwrap_err();
        assert!(matches!(err, AnalysisError::TradeState(_)));
        assert_eq!(t.outcome, TradeOutcome::Win);
        assert_eq!(t.exit_price, Some(1.2));
    }

    #[test]
    fn test_close_before_open_rejected() {
        let mut t = open_call();
        let before = t.opened_at - Duration::minutes(1);
        assert!(t.close(1.2, before).is_err());
        assert!(t.is_open());
    }

    #[test]
    fn test_activity_carries_entry_context() {
        let mut t = open_call();
        let a = t.activity();
        assert_eq!(a.entry_score, 75.0);
        assert_eq!(a.entry_trap_risk, 0.0);
        assert!(!a.journaled);

        t.journal = "  pullback to EMA 21 ".to_string();
        t.close(1.0, t.opened_at + Duration::minutes(5)).unwrap();
        let a = t.activity();
        assert!(a.journaled);
        assert_eq!(a.outcome, TradeOutcome::Loss);
        assert_eq!(a.closed_at, t.closed_at);
    }

    #[test]
    fn test_direction_from_trend() {
        assert_eq!(TradeDirection::from_trend(TrendDirection::Bullish), Some(TradeDirection::Call));
        assert_eq!(TradeDirection::from_trend(TrendDirection::Bearish), Some(TradeDirection::Put));
        assert_eq!(TradeDirection::from_trend(TrendDirection::Neutral), None);
    }
}
