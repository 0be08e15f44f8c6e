//! Prediction algorithms for scheduler

pub mod decay;
pub mod ema;

pub use decay::{DecayParams, DEFAULT_DECAY_DIVISOR};
pub use ema::{BurstPredictor, DEFAULT_PREDICTION_RATIO};
