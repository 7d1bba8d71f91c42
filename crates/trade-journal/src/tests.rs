#[cfg(test)]
mod trade_journal_tests {
    use crate::{InMemoryTradeJournal, SqliteTradeJournal};
    use analysis_core::{
        AnalysisError, Crossover, Grade, IndicatorValues, MarketSession, NewTrade, PatternLabel,
        StrategyScore, TradeDirection, TradeHistory, TradeOutcome, TrendDirection,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn new_trade(direction: TradeDirection, entry: f64, opened_at: DateTime<Utc>) -> NewTrade {
        NewTrade {
            asset: "EURUSD".to_string(),
            direction,
            entry_price: entry,
            opened_at,
            score: StrategyScore {
                trend_component: 85.0,
                momentum_component: 75.0,
                volatility_component: 70.0,
                pattern_component: 80.0,
                session_component: 100.0,
                psychology_penalty: 0.0,
                final_score: 80.88,
                grade: Grade::HighQuality,
                session: MarketSession::London,
                trend: TrendDirection::Bullish,
                notes: vec!["Pullback in trend".to_string()],
            },
            indicators: IndicatorValues {
                timestamp: opened_at,
                close: entry,
                rsi: 28.0,
                ema_fast: 1.0852,
                ema_slow: 1.0849,
                macd_line: 0.0004,
                macd_signal: 0.0002,
                macd_histogram: 0.0002,
                bb_upper: 1.0870,
                bb_middle: 1.0850,
                bb_lower: 1.0830,
                volatility_ratio: 1.1,
                pattern: PatternLabel::Hammer,
                pattern_bias: TrendDirection::Bullish,
                trend: TrendDirection::Bullish,
                ema_crossover: Crossover::None,
            },
            journal: "london open pullback".to_string(),
        }
    }

    async fn sqlite() -> SqliteTradeJournal {
        SqliteTradeJournal::connect("sqlite::memory:").await.unwrap()
    }

    async fn open_close_roundtrip(journal: &dyn TradeHistory) {
        let a = journal
            .open_trade(new_trade(TradeDirection::Call, 1.0850, t0()))
            .await
            .unwrap();
        let b = journal
            .open_trade(new_trade(TradeDirection::Put, 1.0850, t0() + Duration::minutes(1)))
            .await
            .unwrap();
        assert!(b.id > a.id);
        assert!(a.is_open());
        assert_eq!(a.exit_price, None);
        assert_eq!(journal.closed_count().await.unwrap(), 0);

        let closed_b = journal
            .close_trade(b.id, 1.0860, t0() + Duration::minutes(3))
            .await
            .unwrap();
        assert_eq!(closed_b.outcome, TradeOutcome::Loss);
        let closed_a = journal
            .close_trade(a.id, 1.0860, t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(closed_a.outcome, TradeOutcome::Win);
        assert_eq!(closed_a.exit_price, Some(1.0860));

        let closed = journal.closed_trades().await.unwrap();
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].id, b.id);
        assert_eq!(closed[1].id, a.id);
        assert_eq!(closed[1].score, closed_a.score);
        assert_eq!(closed[1].indicators, closed_a.indicators);
        assert_eq!(closed[1].journal, "london open pullback");
        assert_eq!(journal.closed_count().await.unwrap(), 2);
    }

    async fn second_close_rejected(journal: &dyn TradeHistory) {
        let t = journal
            .open_trade(new_trade(TradeDirection::Call, 1.0, t0()))
            .await
            .unwrap();
        journal.close_trade(t.id, 1.1, t0() + Duration::minutes(1)).await.unwrap();

        let err = journal
            .close_trade(t.id, 0.9, t0() + Duration::minutes(2))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::TradeState(_)));

        let missing = journal.close_trade(9999, 1.0, t0()).await.unwrap_err();
        assert!(matches!(missing, AnalysisError::TradeState(_)));

        let before_open = journal
            .open_trade(new_trade(TradeDirection::Put, 1.0, t0()))
            .await
            .unwrap();
        let err = journal
            .close_trade(before_open.id, 1.0, t0() - Duration::minutes(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));

        let closed = journal.closed_trades().await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].outcome, TradeOutcome::Win);
    }

    async fn activity_newest_last(journal: &dyn TradeHistory) {
        for i in 0..4 {
            journal
                .open_trade(new_trade(TradeDirection::Call, 1.0, t0() + Duration::minutes(i)))
                .await
                .unwrap();
        }
        // closing the first trade makes it the most recent event
        journal.close_trade(1, 0.9, t0() + Duration::minutes(10)).await.unwrap();

        let recent = journal.recent_activity(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[2].outcome, TradeOutcome::Loss);
        assert_eq!(recent[2].closed_at, Some(t0() + Duration::minutes(10)));
        assert_eq!(recent[1].opened_at, t0() + Duration::minutes(3));
        assert_eq!(recent[0].opened_at, t0() + Duration::minutes(2));
        assert!((recent[2].entry_score - 80.88).abs() < 1e-9);
        assert_eq!(recent[2].entry_trap_risk, 0.0);
        assert!(recent.iter().all(|a| a.journaled));

        assert_eq!(journal.recent_activity(50).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_memory_open_close() {
        open_close_roundtrip(&InMemoryTradeJournal::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_open_close() {
        open_close_roundtrip(&sqlite().await).await;
    }

    #[tokio::test]
    async fn test_memory_close_once() {
        second_close_rejected(&InMemoryTradeJournal::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_close_once() {
        second_close_rejected(&sqlite().await).await;
    }

    #[tokio::test]
    async fn test_memory_recent_activity() {
        activity_newest_last(&InMemoryTradeJournal::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_recent_activity() {
        activity_newest_last(&sqlite().await).await;
    }

    #[tokio::test]
    async fn test_non_finite_entry_rejected() {
        let journal = InMemoryTradeJournal::new();
        let err = journal
            .open_trade(new_trade(TradeDirection::Call, f64::NAN, t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
        assert!(journal.is_empty().await);
    }

    #[tokio::test]
    async fn test_sqlite_get_and_schema_idempotent() {
        let journal = sqlite().await;
        journal.init_tables().await.unwrap();

        let t = journal
            .open_trade(new_trade(TradeDirection::Put, 1.2, t0()))
            .await
            .unwrap();
        let loaded = journal.get(t.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, t.id);
        assert_eq!(loaded.direction, TradeDirection::Put);
        assert_eq!(loaded.entry_price, 1.2);
        assert_eq!(loaded.opened_at, t0());
        assert_eq!(loaded.outcome, TradeOutcome::Open);
        assert_eq!(loaded.score.grade, Grade::HighQuality);
        assert_eq!(loaded.indicators.pattern, PatternLabel::Hammer);
        assert!(journal.get(t.id + 100).await.unwrap().is_none());
    }
}
