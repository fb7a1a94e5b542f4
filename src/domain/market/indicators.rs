//! Incremental indicator computations shared across strategies (spec §4.1).
//!
//! Every consumer that needs a stop distance when ATR is degenerate must go
//! through [`atr_fallback`] — duplicating that guard per strategy is
//! prohibited by spec §4.1.

use crate::domain::trading::types::Candle;
use std::collections::VecDeque;

/// Centralised ATR-zero fallback (spec §4.1): when ATR is zero or below
/// `min_atr_value`, substitute `max(min_stop_distance_pct * price,
/// default_atr_pct * price)`.
pub fn atr_fallback(
    atr: f64,
    price: f64,
    min_atr_value: f64,
    min_stop_distance_pct: f64,
    default_atr_pct: f64,
) -> f64 {
    if atr > min_atr_value {
        atr
    } else {
        (min_stop_distance_pct * price).max(default_atr_pct * price)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AdxState {
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,
    smoothed_tr: f64,
    adx: f64,
    initialized: bool,
}

/// Running state for one `(symbol, timeframe)` pair (spec §3, §4.1).
///
/// `update` must be called exactly once per new candle in chronological
/// order; re-applying the same `t_open` is a no-op (idempotence, spec §3/§8).
#[derive(Debug, Clone)]
pub struct IndicatorState {
    symbol: String,
    short_period: usize,
    long_period: usize,
    atr_period: usize,
    adx_period: usize,
    donchian_period: usize,
    max_period: usize,

    candles: VecDeque<Candle>,

    ema_short: Option<f64>,
    ema_long: Option<f64>,
    atr: Option<f64>,
    adx_state: AdxState,
    last_t_open: Option<i64>,

    // Slope adaptation thresholds (spec §4.1).
    slope_high_vol_threshold: f64,
    slope_low_vol_threshold: f64,
    slope_k_small: usize,
    slope_k_default: usize,
    slope_k_large: usize,
}

impl IndicatorState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        short_period: usize,
        long_period: usize,
        atr_period: usize,
        adx_period: usize,
        donchian_period: usize,
    ) -> Self {
        let max_period = [long_period, atr_period, adx_period, donchian_period]
            .into_iter()
            .max()
            .unwrap_or(1)
            + 1;
        Self {
            symbol: symbol.into(),
            short_period,
            long_period,
            atr_period,
            adx_period,
            donchian_period,
            max_period,
            candles: VecDeque::with_capacity(max_period + 8),
            ema_short: None,
            ema_long: None,
            atr: None,
            adx_state: AdxState::default(),
            last_t_open: None,
            slope_high_vol_threshold: 6.0,
            slope_low_vol_threshold: 2.0,
            slope_k_small: 3,
            slope_k_default: 5,
            slope_k_large: 8,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bar_count(&self) -> usize {
        self.candles.len()
    }

    pub fn has_warmed_up(&self) -> bool {
        self.candles.len() >= self.max_period
    }

    /// Idempotent, chronologically-ordered update (spec §3 invariant).
    pub fn update(&mut self, candle: Candle) {
        if let Some(last) = self.last_t_open {
            if candle.t_open == last {
                return; // idempotent re-application of the same bar
            }
            debug_assert!(
                candle.t_open > last,
                "candles must arrive in non-decreasing t_open order"
            );
        }

        let prev_close = self.candles.back().map(|c| to_f64(c.close));
        let high = to_f64(candle.high);
        let low = to_f64(candle.low);
        let close = to_f64(candle.close);

        self.update_ema(close);
        self.update_atr(high, low, prev_close);
        self.update_adx(high, low, prev_close);

        self.last_t_open = Some(candle.t_open);
        self.candles.push_back(candle);
        let cap = self.max_period + 8;
        while self.candles.len() > cap {
            self.candles.pop_front();
        }
    }

    fn update_ema(&mut self, close: f64) {
        self.ema_short = Some(ema_step(self.ema_short, close, self.short_period));
        self.ema_long = Some(ema_step(self.ema_long, close, self.long_period));
    }

    fn update_atr(&mut self, high: f64, low: f64, prev_close: Option<f64>) {
        let tr = true_range(high, low, prev_close);
        self.atr = Some(match self.atr {
            None => tr,
            Some(prev_atr) => {
                let n = self.atr_period as f64;
                ((n - 1.0) * prev_atr + tr) / n
            }
        });
    }

    fn update_adx(&mut self, high: f64, low: f64, prev_close: Option<f64>) {
        let prev_high = self.candles.back().map(|c| to_f64(c.high));
        let prev_low = self.candles.back().map(|c| to_f64(c.low));

        let (plus_dm, minus_dm) = match (prev_high, prev_low) {
            (Some(ph), Some(pl)) => {
                let up_move = high - ph;
                let down_move = pl - low;
                let plus = if up_move > down_move && up_move > 0.0 {
                    up_move
                } else {
                    0.0
                };
                let minus = if down_move > up_move && down_move > 0.0 {
                    down_move
                } else {
                    0.0
                };
                (plus, minus)
            }
            _ => (0.0, 0.0),
        };
        let tr = true_range(high, low, prev_close);

        let n = self.adx_period as f64;
        let st = &mut self.adx_state;
        if !st.initialized {
            st.smoothed_plus_dm = plus_dm;
            st.smoothed_minus_dm = minus_dm;
            st.smoothed_tr = tr;
            st.initialized = true;
        } else {
            st.smoothed_plus_dm = st.smoothed_plus_dm - (st.smoothed_plus_dm / n) + plus_dm;
            st.smoothed_minus_dm = st.smoothed_minus_dm - (st.smoothed_minus_dm / n) + minus_dm;
            st.smoothed_tr = st.smoothed_tr - (st.smoothed_tr / n) + tr;
        }

        let (plus_di, minus_di) = if st.smoothed_tr > 0.0 {
            (
                100.0 * st.smoothed_plus_dm / st.smoothed_tr,
                100.0 * st.smoothed_minus_dm / st.smoothed_tr,
            )
        } else {
            (0.0, 0.0)
        };

        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        st.adx = ((n - 1.0) * st.adx + dx) / n;
    }

    pub fn ema_short(&self) -> Option<f64> {
        self.ema_short
    }

    pub fn ema_long(&self) -> Option<f64> {
        self.ema_long
    }

    pub fn atr(&self) -> Option<f64> {
        self.atr
    }

    pub fn atr_pct(&self) -> Option<f64> {
        let price = to_f64(self.candles.back()?.close);
        if price == 0.0 {
            return Some(0.0);
        }
        Some(self.atr? / price * 100.0)
    }

    pub fn adx(&self) -> Option<f64> {
        if self.adx_state.initialized {
            Some(self.adx_state.adx)
        } else {
            None
        }
    }

    pub fn plus_di(&self) -> Option<f64> {
        if self.adx_state.smoothed_tr > 0.0 {
            Some(100.0 * self.adx_state.smoothed_plus_dm / self.adx_state.smoothed_tr)
        } else {
            None
        }
    }

    pub fn minus_di(&self) -> Option<f64> {
        if self.adx_state.smoothed_tr > 0.0 {
            Some(100.0 * self.adx_state.smoothed_minus_dm / self.adx_state.smoothed_tr)
        } else {
            None
        }
    }

    /// Donchian high/low/mid over the last `period` *completed* bars (spec §4.1).
    /// `exclude_current` drops the most recent bar, matching the breakout
    /// rule's `Donchian_high(P_prev)` usage in spec §4.4.
    pub fn donchian(&self, period: usize, exclude_current: bool) -> Option<(f64, f64, f64)> {
        let len = self.candles.len();
        let usable = if exclude_current {
            len.saturating_sub(1)
        } else {
            len
        };
        if usable < period {
            return None;
        }
        let start = usable - period;
        let slice: Vec<&Candle> = self
            .candles
            .iter()
            .skip(start)
            .take(period)
            .collect();
        let high = slice
            .iter()
            .map(|c| to_f64(c.high))
            .fold(f64::MIN, f64::max);
        let low = slice.iter().map(|c| to_f64(c.low)).fold(f64::MAX, f64::min);
        Some((high, low, (high + low) / 2.0))
    }

    /// Adaptive-window linear-regression slope of EMA(short), in degrees
    /// (spec §4.1). `unit_price` anchors the x/y scale so the slope is
    /// comparable across symbols with different absolute price levels.
    pub fn ema_slope_degrees(&mut self) -> Option<f64> {
        let k = self.adaptive_slope_window();
        if self.candles.len() < k + self.short_period {
            return None;
        }
        let samples = self.recent_ema_short_samples(k)?;
        let n = samples.len() as f64;
        let xs: Vec<f64> = (0..samples.len()).map(|i| i as f64).collect();
        let x_mean = xs.iter().sum::<f64>() / n;
        let y_mean = samples.iter().sum::<f64>() / n;
        let mut num = 0.0;
        let mut den = 0.0;
        for (x, y) in xs.iter().zip(samples.iter()) {
            num += (x - x_mean) * (y - y_mean);
            den += (x - x_mean).powi(2);
        }
        if den == 0.0 {
            return Some(0.0);
        }
        let slope = num / den;
        let unit_price = samples.last().copied().unwrap_or(1.0).max(1e-9);
        Some(slope.atan2(unit_price).to_degrees())
    }

    fn adaptive_slope_window(&self) -> usize {
        match self.atr_pct() {
            Some(pct) if pct > self.slope_high_vol_threshold => self.slope_k_small,
            Some(pct) if pct < self.slope_low_vol_threshold => self.slope_k_large,
            _ => self.slope_k_default,
        }
    }

    /// Recomputes an EMA(short) series for the last `k` bars by replaying
    /// the seeded EMA recurrence over the stored window. This keeps the
    /// slope calculation self-contained without needing a second ring
    /// buffer of historical EMA values.
    fn recent_ema_short_samples(&self, k: usize) -> Option<Vec<f64>> {
        let len = self.candles.len();
        if len < k {
            return None;
        }
        let warmup = len - k;
        let closes: Vec<f64> = self.candles.iter().map(|c| to_f64(c.close)).collect();
        let mut ema = if warmup >= self.short_period {
            let seed: f64 = closes[..self.short_period].iter().sum::<f64>()
                / self.short_period as f64;
            let mut e = seed;
            for &c in &closes[self.short_period..warmup] {
                e = ema_step(Some(e), c, self.short_period);
            }
            e
        } else {
            closes[..warmup.max(1)].iter().sum::<f64>() / warmup.max(1) as f64
        };
        let mut out = Vec::with_capacity(k);
        for &c in &closes[warmup..] {
            ema = ema_step(Some(ema), c, self.short_period);
            out.push(ema);
        }
        Some(out)
    }
}

fn ema_step(prev: Option<f64>, close: f64, period: usize) -> f64 {
    let alpha = 2.0 / (period as f64 + 1.0);
    match prev {
        Some(p) => alpha * close + (1.0 - alpha) * p,
        None => close,
    }
}

fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    match prev_close {
        Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
        None => high - low,
    }
}

fn to_f64(d: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Timeframe;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn candle(t: i64, close: f64) -> Candle {
        let c = Decimal::try_from(close).unwrap();
        Candle::new(
            "SOL/USDT",
            Timeframe::OneHour,
            t,
            c,
            c + dec!(0.5),
            c - dec!(0.5),
            c,
            dec!(1000),
        )
        .unwrap()
    }

    #[test]
    fn update_is_idempotent_for_same_timestamp() {
        let mut state = IndicatorState::new("SOL/USDT", 10, 20, 14, 14, 20);
        state.update(candle(0, 100.0));
        let atr_before = state.atr();
        let ema_before = state.ema_short();
        state.update(candle(0, 999.0)); // same t_open, must be ignored
        assert_eq!(state.atr(), atr_before);
        assert_eq!(state.ema_short(), ema_before);
    }

    #[test]
    fn ema_tracks_rising_prices() {
        let mut state = IndicatorState::new("SOL/USDT", 5, 10, 14, 14, 20);
        for i in 0..20 {
            state.update(candle(i * 3600_000, 100.0 + i as f64));
        }
        let short = state.ema_short().unwrap();
        let long = state.ema_long().unwrap();
        assert!(short > long, "fast EMA should lead in an uptrend");
    }

    #[test]
    fn atr_fallback_substitutes_when_degenerate() {
        let d = atr_fallback(0.0, 100.0, 0.0001, 0.01, 0.02);
        assert_eq!(d, 2.0); // default_atr_pct dominates
        let d2 = atr_fallback(5.0, 100.0, 0.0001, 0.01, 0.02);
        assert_eq!(d2, 5.0); // real ATR passes through untouched
    }

    #[test]
    fn donchian_excludes_current_bar_when_requested() {
        let mut state = IndicatorState::new("SOL/USDT", 5, 10, 14, 14, 3);
        for (i, price) in [100.0, 101.0, 102.0, 50.0].into_iter().enumerate() {
            state.update(candle(i as i64 * 3600_000, price));
        }
        let (high_excl, _, _) = state.donchian(3, true).unwrap();
        assert_eq!(high_excl, 102.5); // last bar (50.0) excluded
    }

    #[test]
    fn adx_rises_in_a_clean_uptrend() {
        let mut state = IndicatorState::new("SOL/USDT", 5, 10, 14, 14, 20);
        for i in 0..40 {
            state.update(candle(i * 3600_000, 100.0 + i as f64 * 1.5));
        }
        assert!(state.adx().unwrap() > 20.0);
    }
}
