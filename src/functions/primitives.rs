//! Elementwise and cross-sectional kernels.
//!
//! Missing cells are NaN and every kernel propagates them, including the
//! comparisons where `f64::max` / `f64::min` would silently drop a NaN.

use ndarray::{Array2, Axis, Zip};

/// Added to every denominator of `DIV`.
pub const DIV_EPSILON: f64 = 1e-6;

pub fn add(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    x + y
}

pub fn sub(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    x - y
}

pub fn mul(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    x * y
}

pub fn div(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    Zip::from(x)
        .and(y)
        .map_collect(|&a, &b| a / (b + DIV_EPSILON))
}

pub fn neg(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| -v)
}

pub fn abs(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(f64::abs)
}

pub fn sign(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| {
        if v.is_nan() {
            f64::NAN
        } else if v > 0.0 {
            1.0
        } else if v < 0.0 {
            -1.0
        } else {
            0.0
        }
    })
}

/// `x` where `c > 0`, else `y`.
pub fn gate(c: &Array2<f64>, x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    Zip::from(c).and(x).and(y).map_collect(|&c, &a, &b| {
        if c.is_nan() {
            f64::NAN
        } else if c > 0.0 {
            a
        } else {
            b
        }
    })
}

pub fn max(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    Zip::from(x).and(y).map_collect(|&a, &b| {
        if a.is_nan() || b.is_nan() {
            f64::NAN
        } else {
            a.max(b)
        }
    })
}

pub fn min(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    Zip::from(x).and(y).map_collect(|&a, &b| {
        if a.is_nan() || b.is_nan() {
            f64::NAN
        } else {
            a.min(b)
        }
    })
}

/// Percentile rank of each instrument within its period, in (0, 1].
pub fn cs_rank(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::from_elem(x.dim(), f64::NAN);
    for (row, mut out_row) in x.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        let values: Vec<f64> = row.to_vec();
        let finite: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
        if finite.is_empty() {
            continue;
        }
        let subset: Vec<f64> = finite.iter().map(|&i| values[i]).collect();
        let ranks = average_ranks(&subset);
        let count = subset.len() as f64;
        for (&i, rank) in finite.iter().zip(ranks) {
            out_row[i] = rank / count;
        }
    }
    out
}

/// Cross-sectional z-score per period; flat periods map to zero.
pub fn cs_zscore(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::from_elem(x.dim(), f64::NAN);
    for (row, mut out_row) in x.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        let finite: Vec<f64> = row.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            continue;
        }
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let std = (finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        for (o, &v) in out_row.iter_mut().zip(row.iter()) {
            if v.is_finite() {
                *o = if std > 0.0 { (v - mean) / std } else { 0.0 };
            }
        }
    }
    out
}

/// 1-based ranks with ties sharing their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end share ranks start+1..=end
        let shared = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = shared;
        }
        start = end;
    }
    ranks
}
