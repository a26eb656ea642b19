//! Feature Engineering Engine
//!
//! Turns validated payment transactions into the fixed-order feature vector
//! consumed by the fraud classifier.

mod features;
mod imputation;
pub mod signals;

pub use features::{
    FeatureExtractor, FeatureName, FeatureVector, FEATURE_DIMENSION, MAX_FAILED_ATTEMPTS,
    MAX_TX_COUNT_1H, MAX_TX_COUNT_24H, MAX_VELOCITY_AMOUNT,
};
pub use imputation::ImputationDefaults;
