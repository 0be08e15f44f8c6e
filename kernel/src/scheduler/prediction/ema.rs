//! EMA (Exponential Moving Average) burst prediction
//!
//! `predicted' = (1 - ratio) * predicted + ratio * burst`

/// Default smoothing ratio (0.5 = equal weight to history and new burst)
pub const DEFAULT_PREDICTION_RATIO: f64 = 0.5;

/// EMA predictor for CPU burst lengths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstPredictor {
    ratio: f64,
}

impl BurstPredictor {
    pub const fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Ratio must lie in (0, 1]
    pub fn is_valid(&self) -> bool {
        self.ratio > 0.0 && self.ratio <= 1.0
    }

    /// Next prediction after observing `burst`
    pub fn predict(&self, previous: f64, burst: u64) -> f64 {
        (1.0 - self.ratio) * previous + self.ratio * burst as f64
    }

    /// Estimation error of `previous` against the observed `burst`
    pub fn error(&self, previous: f64, burst: u64) -> f64 {
        (previous - burst as f64).abs()
    }
}

impl Default for BurstPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_PREDICTION_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_half_ratio_update() {
        let predictor = BurstPredictor::default();
        assert_eq!(predictor.predict(0.0, 100), 50.0);
        assert_eq!(predictor.predict(50.0, 100), 75.0);
        assert_eq!(predictor.error(75.0, 100), 25.0);
    }

    #[test]
    fn test_ratio_bounds() {
        assert!(BurstPredictor::new(1.0).is_valid());
        assert!(!BurstPredictor::new(0.0).is_valid());
        assert!(!BurstPredictor::new(1.5).is_valid());
    }

    proptest! {
        #[test]
        fn test_converges_to_constant_burst(ratio in 0.05f64..1.0, burst in 1u64..10_000) {
            let predictor = BurstPredictor::new(ratio);
            let mut predicted = 0.0;
            // (1 - ratio)^n * burst < 1 once n > ln(burst) / -ln(1 - ratio)
            let bound = ((burst as f64).ln() / -(1.0 - ratio).ln()).ceil() as usize + 1;
            for _ in 0..bound {
                predicted = predictor.predict(predicted, burst);
            }
            prop_assert!((predicted - burst as f64).abs() < 1.0);
        }

        #[test]
        fn test_error_shrinks_monotonically(ratio in 0.05f64..1.0, burst in 1u64..10_000) {
            let predictor = BurstPredictor::new(ratio);
            let mut predicted = 0.0;
            let mut last_error = predictor.error(predicted, burst);
            for _ in 0..20 {
                predicted = predictor.predict(predicted, burst);
                let error = predictor.error(predicted, burst);
                // allow float rounding once the prediction has settled
                prop_assert!(error <= last_error + 1e-6);
                last_error = error;
            }
        }
    }
}
