//! Rolling and expanding window operators over float series.
//!
//! All operators return a series of the same length as the input. Positions
//! without a full window are NaN, and a NaN anywhere inside a window makes the
//! window's value NaN. Nothing here looks ahead: the value at `i` depends only
//! on inputs at positions `<= i`.

fn window_apply(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = f(slice);
    }
    out
}

pub fn delay(values: &[f64], periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| if i >= periods { values[i - periods] } else { f64::NAN })
        .collect()
}

pub fn delta(values: &[f64], periods: usize) -> Vec<f64> {
    let lagged = delay(values, periods);
    values.iter().zip(lagged).map(|(v, l)| v - l).collect()
}

/// Simple percentage change: x(i) / x(i-1) - 1.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let lagged = delay(values, 1);
    values.iter().zip(lagged).map(|(v, l)| v / l - 1.0).collect()
}

pub fn sum(values: &[f64], window: usize) -> Vec<f64> {
    window_apply(values, window, |w| w.iter().sum())
}

pub fn product(values: &[f64], window: usize) -> Vec<f64> {
    window_apply(values, window, |w| w.iter().product())
}

pub fn mean(values: &[f64], window: usize) -> Vec<f64> {
    window_apply(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Rolling standard deviation with `ddof` degrees of freedom (0 = population).
pub fn stddev(values: &[f64], window: usize, ddof: usize) -> Vec<f64> {
    window_apply(values, window, |w| {
        if w.len() <= ddof {
            return f64::NAN;
        }
        let m = w.iter().sum::<f64>() / w.len() as f64;
        let ss: f64 = w.iter().map(|v| (v - m).powi(2)).sum();
        (ss / (w.len() - ddof) as f64).sqrt()
    })
}

pub fn min(values: &[f64], window: usize) -> Vec<f64> {
    window_apply(values, window, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

pub fn max(values: &[f64], window: usize) -> Vec<f64> {
    window_apply(values, window, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Offset of the window maximum, 0 = oldest element; ties resolve to the oldest.
pub fn ts_argmax(values: &[f64], window: usize) -> Vec<f64> {
    window_apply(values, window, |w| {
        let mut best = 0;
        for (i, v) in w.iter().enumerate() {
            if *v > w[best] {
                best = i;
            }
        }
        best as f64
    })
}

/// Offset of the window minimum, 0 = oldest element; ties resolve to the oldest.
pub fn ts_argmin(values: &[f64], window: usize) -> Vec<f64> {
    window_apply(values, window, |w| {
        let mut best = 0;
        for (i, v) in w.iter().enumerate() {
            if *v < w[best] {
                best = i;
            }
        }
        best as f64
    })
}

fn pairwise_apply(x: &[f64], y: &[f64], window: usize, f: impl Fn(&[f64], &[f64]) -> f64) -> Vec<f64> {
    let n = x.len().min(y.len());
    let mut out = vec![f64::NAN; x.len()];
    if window == 0 {
        return out;
    }
    for i in (window.saturating_sub(1))..n {
        let xs = &x[i + 1 - window..=i];
        let ys = &y[i + 1 - window..=i];
        if xs.iter().chain(ys).any(|v| v.is_nan()) {
            continue;
        }
        out[i] = f(xs, ys);
    }
    out
}

/// Rolling sample covariance (n - 1 denominator).
pub fn covariance(x: &[f64], y: &[f64], window: usize) -> Vec<f64> {
    pairwise_apply(x, y, window, |xs, ys| {
        if xs.len() < 2 {
            return f64::NAN;
        }
        let mx = xs.iter().sum::<f64>() / xs.len() as f64;
        let my = ys.iter().sum::<f64>() / ys.len() as f64;
        let cov: f64 = xs.iter().zip(ys).map(|(a, b)| (a - mx) * (b - my)).sum();
        cov / (xs.len() - 1) as f64
    })
}

/// Rolling Pearson correlation; NaN when either side has no variance.
pub fn correlation(x: &[f64], y: &[f64], window: usize) -> Vec<f64> {
    pairwise_apply(x, y, window, |xs, ys| {
        let mx = xs.iter().sum::<f64>() / xs.len() as f64;
        let my = ys.iter().sum::<f64>() / ys.len() as f64;
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        let mut syy = 0.0;
        for (a, b) in xs.iter().zip(ys) {
            sxy += (a - mx) * (b - my);
            sxx += (a - mx).powi(2);
            syy += (b - my).powi(2);
        }
        if sxx == 0.0 || syy == 0.0 {
            return f64::NAN;
        }
        sxy / (sxx * syy).sqrt()
    })
}

/// Expanding percentile rank in (0, 1]; ties share their average rank.
///
/// NaN inputs stay NaN and are left out of later ranks.
pub fn expanding_pct_rank(values: &[f64]) -> Vec<f64> {
    // kept sorted so each step costs two binary searches
    let mut sorted: Vec<f64> = Vec::with_capacity(values.len());
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                return f64::NAN;
            }
            let less = sorted.partition_point(|&s| s < v);
            let not_greater = sorted.partition_point(|&s| s <= v);
            sorted.insert(not_greater, v);
            let equal = (not_greater - less + 1) as f64;
            let avg_rank = less as f64 + (equal + 1.0) / 2.0;
            avg_rank / sorted.len() as f64
        })
        .collect()
}

/// Expanding z-score against the values seen so far (population stddev).
pub fn expanding_zscore(values: &[f64]) -> Vec<f64> {
    let mut count = 0.0;
    let mut total = 0.0;
    let mut total_sq = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                return f64::NAN;
            }
            count += 1.0;
            total += v;
            total_sq += v * v;
            let m = total / count;
            let var = (total_sq / count - m * m).max(0.0);
            if var == 0.0 {
                f64::NAN
            } else {
                (v - m) / var.sqrt()
            }
        })
        .collect()
}
