use analysis_core::{stats, Candle};

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(sum / period as f64);
    }
    result
}

/// Exponential Moving Average, seeded with the SMA of the first `period` values.
///
/// Output is aligned to `data[period - 1..]`; empty when the window is not filled.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut result = Vec::with_capacity(data.len() - period + 1);

    let seed = data[..period].iter().sum::<f64>() / period as f64;
    result.push(seed);

    for &value in &data[period..] {
        let prev = result[result.len() - 1];
        result.push((value - prev) * multiplier + prev);
    }

    result
}

/// Relative Strength Index (Wilder smoothing).
///
/// Needs `period + 1` closes; the first value is the plain average of the first
/// `period` changes. Output is aligned to `data[period..]`.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);

    for pair in data.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(data.len() - period);
    rsi_values.push(rsi_from_averages(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        rsi_values.push(rsi_from_averages(avg_gain, avg_loss));
    }

    rsi_values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // flat window: no gains and no losses
        if avg_gain == 0.0 {
            return 50.0;
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// MACD (Moving Average Convergence Divergence)
#[derive(Debug, Clone, Default)]
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD line is aligned to `data[slow_period - 1..]`. The signal line and
/// histogram are aligned to the tail of the MACD line.
///
/// While the line is shorter than `signal_period`, the signal is the mean of
/// the line values so far (a single point aligned with the latest one).
pub fn macd(
    data: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdResult {
    if fast_period == 0 || signal_period == 0 || slow_period <= fast_period {
        return MacdResult::default();
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);
    if ema_slow.is_empty() {
        return MacdResult::default();
    }

    let offset = slow_period - fast_period;
    let macd_line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, slow)| ema_fast[i + offset] - slow)
        .collect();

    let signal_line = if macd_line.len() < signal_period {
        vec![stats::mean(&macd_line)]
    } else {
        ema(&macd_line, signal_period)
    };

    let hist_offset = macd_line.len() - signal_line.len();
    let histogram = signal_line
        .iter()
        .enumerate()
        .map(|(i, signal)| macd_line[i + hist_offset] - signal)
        .collect();

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands
#[derive(Debug, Clone, Default)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// SMA +/- `std_dev` population standard deviations.
pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands::default();
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for (i, mean) in middle.iter().enumerate() {
        let std = stats::population_std_dev(&data[i..i + period]);
        upper.push(mean + std_dev * std);
        lower.push(mean - std_dev * std);
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// True range per candle after the first (which has no previous close).
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| pair[1].true_range(Some(pair[0].close)))
        .collect()
}

/// Latest true range over the mean of the trailing `period` true ranges.
///
/// `None` until `period + 1` candles exist. A dead-flat window reports 1.0.
pub fn volatility_ratio(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let trs = true_ranges(candles);
    let window = &trs[trs.len() - period..];
    let current = window[window.len() - 1];
    Some(stats::safe_ratio(current, stats::mean(window), 1.0))
}
