use crate::functions::primitives::average_ranks;
use ndarray::{Array2, Axis};

/// Pearson correlation; `None` when either side has no dispersion.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom > 0.0 && denom.is_finite() {
        Some(cov / denom)
    } else {
        None
    }
}

/// Spearman rank correlation with average ranks for ties.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Mean per-period cross-sectional correlation between `factor` and
/// `forward` over cells where both are finite. Periods without two usable
/// cells or without dispersion are skipped; zero when none remain.
pub fn panel_ic(factor: &Array2<f64>, forward: &Array2<f64>, ranked: bool) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;

    for (f_row, r_row) in factor.axis_iter(Axis(0)).zip(forward.axis_iter(Axis(0))) {
        let (xs, ys): (Vec<f64>, Vec<f64>) = f_row
            .iter()
            .zip(r_row.iter())
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .map(|(a, b)| (*a, *b))
            .unzip();

        let corr = if ranked {
            spearman(&xs, &ys)
        } else {
            pearson(&xs, &ys)
        };
        if let Some(c) = corr {
            total += c;
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
