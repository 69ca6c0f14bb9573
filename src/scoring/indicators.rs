/// Simple Moving Average, aligned with `values`: `None` until `window`
/// values have accumulated.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    values
        .iter()
        .enumerate()
        .scan(0.0_f64, move |sum, (i, &v)| {
            *sum += v;
            if i >= window {
                *sum -= values[i - window];
            }
            Some(if i + 1 >= window { Some(*sum / window as f64) } else { None })
        })
        .collect()
}

/// Wilder's RSI(14). Returns `None` for the first `period` values and
/// whenever fewer than `period + 1` closes are available at all (spec
/// §4.6 "tolerant to short history, returning absent values").
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (mut avg_gain, mut avg_loss) = deltas[..period].iter().fold((0.0, 0.0), |(g, l), &d| {
        if d > 0.0 { (g + d, l) } else { (g, l - d) }
    });
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for &d in &deltas[period..] {
        let (gain, loss) = if d > 0.0 { (d, 0.0) } else { (0.0, -d) };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Percent distance of the last close from its `period`-length SMA.
pub fn price_vs_sma(closes: &[f64], period: usize) -> Option<f64> {
    let smas = sma(closes, period);
    let last_sma = *smas.last()?;
    last_sma.and_then(|avg| {
        let last = *closes.last()?;
        if avg == 0.0 { None } else { Some((last - avg) / avg * 100.0) }
    })
}

fn stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// `(last close − SMA20) / StdDev20` over the trailing 20-close window.
pub fn zscore(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    let mean = tail.iter().sum::<f64>() / window as f64;
    let sd = stddev(tail)?;
    if sd == 0.0 {
        return None;
    }
    let last = *closes.last()?;
    Some((last - mean) / sd)
}

/// `StdDev(daily returns, last min(252, N)) * sqrt(252) * 100`.
pub fn volatility_annual(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    let window = returns.len().min(252);
    if window < 2 {
        return None;
    }
    let tail = &returns[returns.len() - window..];
    stddev(tail).map(|sd| sd * 252.0_f64.sqrt() * 100.0)
}

/// Worst peak-to-trough decline over the last `period` closes, as a
/// positive percentage.
pub fn max_drawdown(closes: &[f64], period: usize) -> Option<f64> {
    if closes.is_empty() {
        return None;
    }
    let tail = &closes[closes.len().saturating_sub(period)..];
    let (worst, _) = tail.iter().fold((0.0_f64, f64::MIN), |(worst, peak), &price| {
        let peak = peak.max(price);
        let drawdown = if peak > 0.0 { (peak - price) / peak * 100.0 } else { 0.0 };
        (worst.max(drawdown), peak)
    });
    Some(worst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_withholds_until_window_filled() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(out, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn rsi_is_100_when_no_losses() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn rsi_absent_on_short_history() {
        assert_eq!(rsi(&[1.0, 2.0], 14), None);
    }

    #[test]
    fn max_drawdown_detects_peak_to_trough() {
        let closes = vec![100.0, 120.0, 60.0, 90.0];
        assert_eq!(max_drawdown(&closes, 252), Some(50.0));
    }

    #[test]
    fn zscore_absent_when_stddev_zero() {
        let closes = vec![10.0; 20];
        assert_eq!(zscore(&closes, 20), None);
    }
}
