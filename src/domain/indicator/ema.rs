//! Exponential moving average.
//!
//! alpha = 2/(n+1). The series is seeded with the first present value; a
//! missing input carries the previous EMA forward unchanged. Before the seed
//! the EMA is undefined.

pub fn ema(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;

    values
        .iter()
        .map(|&v| {
            prev = match (prev, v) {
                (None, seed) => seed,
                (Some(p), Some(x)) => Some(alpha * x + (1.0 - alpha) * p),
                (Some(p), None) => Some(p),
            };
            prev
        })
        .collect()
}
