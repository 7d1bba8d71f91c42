use analysis_core::{
    IndicatorValues, TradeActivity, TradeOutcome, TrapAssessment, TrendDirection,
};
use chrono::{DateTime, Duration, Utc};

use crate::models::{SignalVotes, TrapThresholds};

fn direction_of(value: f64) -> TrendDirection {
    if value > 0.0 {
        TrendDirection::Bullish
    } else if value < 0.0 {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    }
}

/// Directional reading of each tracked indicator.
pub fn signal_votes(v: &IndicatorValues, thresholds: &TrapThresholds) -> SignalVotes {
    let rsi = if v.rsi < thresholds.rsi_oversold {
        TrendDirection::Bullish
    } else if v.rsi > thresholds.rsi_overbought {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };

    SignalVotes {
        rsi,
        ema: v.trend,
        macd: direction_of(v.macd_line - v.macd_signal),
        bollinger: direction_of(v.close - v.bb_middle),
        candle: v.pattern_bias,
    }
}

/// Flags manipulation and behavioural trap signatures on a setup.
#[derive(Debug, Clone, Default)]
pub struct TrapAssessor {
    thresholds: TrapThresholds,
}

impl TrapAssessor {
    pub fn new(thresholds: TrapThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TrapThresholds {
        &self.thresholds
    }

    /// Evaluate every rule at instant `now`. `activity` is the recent trade
    /// history in any order.
    pub fn assess(
        &self,
        values: &IndicatorValues,
        activity: &[TradeActivity],
        now: DateTime<Utc>,
    ) -> TrapAssessment {
        let t = &self.thresholds;
        let sev = &t.severities;
        let mut out = TrapAssessment::default();
        let mut risk = 0.0;

        let votes = signal_votes(values, t);

        let alignment = votes.alignment();
        if alignment >= t.perfect_setup_alignment {
            out.perfect_setup_flag = true;
            risk += sev.perfect_setup;
            out.warnings.push(format!(
                "Setup looks too perfect: {:.0}% of indicators agree; \
                 over-aligned setups often fail",
                alignment * 100.0
            ));
        }

        if values.volatility_ratio >= t.volatility_spike_ratio {
            out.volatility_spike_flag = true;
            risk += sev.volatility_spike;
            out.warnings.push(format!(
                "Volatility spike: current range is {:.1}x the recent average; \
                 spikes often precede stop hunts",
                values.volatility_ratio
            ));
        }

        if let Some(completed) = self.late_entry_completion(values) {
            out.late_entry_flag = true;
            risk += sev.late_entry;
            out.warnings.push(format!(
                "Late entry: {:.0}% of the expected Bollinger move is already complete",
                completed * 100.0
            ));
        }

        if let Some(since_loss) = self.revenge_window(activity, now) {
            out.revenge_trade_flag = true;
            risk += sev.revenge_trade;
            out.warnings.push(format!(
                "Revenge trade risk: last trade was a loss {}s ago (cooldown {}s)",
                since_loss.num_seconds(),
                t.revenge_cooldown_secs
            ));
        }

        let recent = self.trades_in_window(activity, now);
        if recent > t.overtrading_max_trades {
            out.overtrading_flag = true;
            risk += sev.overtrading;
            out.warnings.push(format!(
                "Overtrading: {} trades in the last {} minutes (limit {})",
                recent, t.overtrading_window_mins, t.overtrading_max_trades
            ));
        }

        let (bulls, bears) = votes.split();
        if bulls >= 2 && bears >= 2 {
            out.conflicting_signals_flag = true;
            risk += sev.conflicting_signals;
            out.warnings.push(format!(
                "Conflicting signals: {bulls} bullish vs {bears} bearish indicators"
            ));
        }

        out.risk_score = risk.min(100.0);

        if out.any_fired() {
            tracing::debug!(
                risk_score = out.risk_score,
                flags = out.warnings.len(),
                "trap flags fired"
            );
        }

        out
    }

    /// Share of the band range already travelled in the trend direction, when
    /// it reaches the late-entry threshold. A neutral trend checks both sides.
    fn late_entry_completion(&self, values: &IndicatorValues) -> Option<f64> {
        let pct_b = values.percent_b();
        let completed = match values.trend {
            TrendDirection::Bullish => pct_b,
            TrendDirection::Bearish => 1.0 - pct_b,
            TrendDirection::Neutral => pct_b.max(1.0 - pct_b),
        };
        (completed >= self.thresholds.late_entry_completion).then_some(completed)
    }

    /// Time since the most recent close, when that close was a loss inside the cooldown.
    fn revenge_window(&self, activity: &[TradeActivity], now: DateTime<Utc>) -> Option<Duration> {
        let last_closed = activity
            .iter()
            .filter_map(|a| a.closed_at.map(|closed| (closed, a.outcome)))
            .filter(|(closed, _)| *closed <= now)
            .max_by_key(|(closed, _)| *closed)?;

        let (closed_at, outcome) = last_closed;
        let elapsed = now - closed_at;
        (outcome == TradeOutcome::Loss
            && elapsed < Duration::seconds(self.thresholds.revenge_cooldown_secs))
        .then_some(elapsed)
    }

    fn trades_in_window(&self, activity: &[TradeActivity], now: DateTime<Utc>) -> usize {
        let start = now - Duration::minutes(self.thresholds.overtrading_window_mins);
        activity
            .iter()
            .filter(|a| a.opened_at > start && a.opened_at <= now)
            .count()
    }
}
