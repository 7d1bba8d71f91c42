#[cfg(test)]
mod tests {
    use super::super::indicators::*;
    use analysis_core::Candle;
    use chrono::{Duration, TimeZone, Utc};

    // Helper function to create sample price data
    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    // Helper function to create sample candles (steady 3-point ranges)
    fn sample_candles() -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        (0..20)
            .map(|i| {
                let open = 100.0 + i as f64;
                Candle {
                    timestamp: start + Duration::minutes(i),
                    open,
                    high: open + 2.0,
                    low: open - 1.0,
                    close: open + 1.0,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 0.001); // (1+2+3)/3 = 2
        assert!((result[1] - 3.0).abs() < 0.001); // (2+3+4)/3 = 3
        assert!((result[2] - 4.0).abs() < 0.001); // (3+4+5)/3 = 4
    }

    #[test]
    fn test_sma_insufficient_data() {
        let data = vec![1.0, 2.0];
        let result = sma(&data, 5);

        assert_eq!(result.len(), 0);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let data = vec![22.0, 24.0, 23.0, 25.0, 26.0];
        let result = ema(&data, 3);

        assert_eq!(result.len(), 3);
        let first_sma = (22.0 + 24.0 + 23.0) / 3.0;
        assert!((result[0] - first_sma).abs() < 0.001);
        // k = 0.5: 23 + (25 - 23) * 0.5 = 24
        assert!((result[1] - 24.0).abs() < 0.001);
        // 24 + (26 - 24) * 0.5 = 25
        assert!((result[2] - 25.0).abs() < 0.001);
    }

    #[test]
    fn test_ema_short_series_is_empty() {
        assert!(ema(&[], 5).is_empty());
        assert!(ema(&[1.0, 2.0, 3.0], 9).is_empty());
        assert_eq!(ema(&[1.0; 9], 9).len(), 1);
    }

    #[test]
    fn test_ema_increases_with_uptrend() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let result = ema(&data, 3);

        for i in 1..result.len() {
            assert!(result[i] > result[i - 1]);
        }
    }

    #[test]
    fn test_rsi_bounds() {
        let prices = sample_prices();
        let result = rsi(&prices, 14);

        // 20 closes, 19 changes: first value after 14 changes, then 5 smoothed
        assert_eq!(result.len(), 6);
        for &value in &result {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_rsi_needs_period_plus_one_closes() {
        assert!(rsi(&[1.0; 14], 14).is_empty());
        assert_eq!(rsi(&[1.0; 15], 14).len(), 1);
    }

    #[test]
    fn test_rsi_flat_series_is_midpoint() {
        let result = rsi(&[5.0; 20], 14);
        assert!(result.iter().all(|v| (v - 50.0).abs() < 1e-9));
    }

    #[test]
    fn test_rsi_extremes() {
        let uptrend: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(*rsi(&uptrend, 14).last().unwrap(), 100.0);

        let downtrend: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert!(*rsi(&downtrend, 14).last().unwrap() < 1e-9);
    }

    #[test]
    fn test_rsi_wilder_first_value() {
        // 7 gains of 1 and 7 losses of 1 alternate: avg gain == avg loss
        let mut data = vec![10.0];
        for i in 0..14 {
            let last = data[data.len() - 1];
            data.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let result = rsi(&data, 14);
        assert!((result[0] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_alignment() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let result = macd(&prices, 12, 26, 9);

        assert_eq!(result.macd_line.len(), 15);
        assert_eq!(result.signal_line.len(), 7);
        assert_eq!(result.histogram.len(), result.signal_line.len());
        let offset = result.macd_line.len() - result.signal_line.len();
        for (i, &hist) in result.histogram.iter().enumerate() {
            let expected = result.macd_line[i + offset] - result.signal_line[i];
            assert!((hist - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_macd_short_line_uses_mean_signal() {
        let prices: Vec<f64> = (0..28).map(|i| 100.0 + i as f64).collect();
        let result = macd(&prices, 12, 26, 9);

        assert_eq!(result.macd_line.len(), 3);
        assert_eq!(result.signal_line.len(), 1);
        let mean = result.macd_line.iter().sum::<f64>() / 3.0;
        assert!((result.signal_line[0] - mean).abs() < 1e-12);
    }

    #[test]
    fn test_macd_insufficient_data() {
        let result = macd(&sample_prices(), 12, 26, 9);
        assert!(result.macd_line.is_empty());
        assert!(result.histogram.is_empty());
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 0.5).collect();
        let result = macd(&prices, 12, 26, 9);
        assert!(*result.macd_line.last().unwrap() > 0.0);
    }

    #[test]
    fn test_bollinger_bands_basic() {
        let prices = sample_prices();
        let result = bollinger_bands(&prices, 20, 2.0);

        assert_eq!(result.upper.len(), 1);
        assert_eq!(result.upper.len(), result.middle.len());
        assert_eq!(result.middle.len(), result.lower.len());
    }

    #[test]
    fn test_bollinger_bands_ordering() {
        let prices = sample_prices();
        let result = bollinger_bands(&prices, 10, 2.0);

        for i in 0..result.upper.len() {
            assert!(result.upper[i] > result.middle[i]);
            assert!(result.middle[i] > result.lower[i]);
        }
    }

    #[test]
    fn test_bollinger_population_std() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let result = bollinger_bands(&data, 8, 2.0);
        // mean 5, population std 2
        assert!((result.middle[0] - 5.0).abs() < 1e-9);
        assert!((result.upper[0] - 9.0).abs() < 1e-9);
        assert!((result.lower[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_constant_prices_collapse() {
        let result = bollinger_bands(&[100.0; 20], 10, 2.0);
        for i in 0..result.upper.len() {
            assert_eq!(result.upper[i], result.lower[i]);
        }
    }

    #[test]
    fn test_true_ranges_use_previous_close() {
        let candles = sample_candles();
        let trs = true_ranges(&candles);

        assert_eq!(trs.len(), candles.len() - 1);
        // high - low = 3, gap from previous close never exceeds it
        assert!(trs.iter().all(|tr| (tr - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_volatility_ratio_steady() {
        let ratio = volatility_ratio(&sample_candles(), 14).unwrap();
        assert!((ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_ratio_spike() {
        let mut candles = sample_candles();
        let last = candles.len() - 1;
        candles[last].high += 12.0;
        let ratio = volatility_ratio(&candles, 14).unwrap();
        // last TR 15 against mean (13 * 3 + 15) / 14
        let expected = 15.0 / ((13.0 * 3.0 + 15.0) / 14.0);
        assert!((ratio - expected).abs() < 1e-9);
        assert!(ratio >= 2.0);
    }

    #[test]
    fn test_volatility_ratio_insufficient() {
        assert!(volatility_ratio(&sample_candles()[..14], 14).is_none());
        assert!(volatility_ratio(&sample_candles()[..15], 14).is_some());
    }
}
