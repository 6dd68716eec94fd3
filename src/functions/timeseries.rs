//! Windowed kernels, applied per instrument (column) along the time axis.
//!
//! A cell whose window reaches before the first period, or contains a
//! missing value, is NaN.

use ndarray::{Array2, Axis};

fn rolling<F>(x: &Array2<f64>, window: usize, f: F) -> Array2<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = Array2::from_elem(x.dim(), f64::NAN);
    if window == 0 {
        return out;
    }

    for (col, mut out_col) in x.axis_iter(Axis(1)).zip(out.axis_iter_mut(Axis(1))) {
        let series = col.to_vec();
        for t in (window - 1)..series.len() {
            let slice = &series[t + 1 - window..=t];
            if slice.iter().all(|v| v.is_finite()) {
                out_col[t] = f(slice);
            }
        }
    }
    out
}

pub fn delay(x: &Array2<f64>, periods: usize) -> Array2<f64> {
    rolling(x, periods + 1, |w| w[0])
}

pub fn delta(x: &Array2<f64>, periods: usize) -> Array2<f64> {
    rolling(x, periods + 1, |w| w[w.len() - 1] - w[0])
}

pub fn mean(x: &Array2<f64>, window: usize) -> Array2<f64> {
    rolling(x, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Population standard deviation over the window.
pub fn std(x: &Array2<f64>, window: usize) -> Array2<f64> {
    rolling(x, window, |w| {
        let n = w.len() as f64;
        let mean = w.iter().sum::<f64>() / n;
        (w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
    })
}

/// Weighted mean with weights 1..=window, newest heaviest.
pub fn decay_linear(x: &Array2<f64>, window: usize) -> Array2<f64> {
    let total = (window * (window + 1)) as f64 / 2.0;
    rolling(x, window, |w| {
        w.iter()
            .enumerate()
            .map(|(i, v)| (i + 1) as f64 * v)
            .sum::<f64>()
            / total
    })
}

pub fn ts_max(x: &Array2<f64>, window: usize) -> Array2<f64> {
    rolling(x, window, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}
