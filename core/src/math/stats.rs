pub struct StatsHelper;

impl StatsHelper {
    /// Arithmetic mean, zero for an empty slice.
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Fraction of `span` covered at `offset`, clamped to `[0, 1]`.
    ///
    /// An empty or negative span yields zero.
    pub fn progress(offset: f64, span: f64) -> f64 {
        if !(span > 0.0) {
            return 0.0;
        }
        (offset / span).clamp(0.0, 1.0)
    }
}
