pub mod progressive_reduction;
pub mod token_estimation;

pub use progressive_reduction::ProgressiveReducer;
pub use token_estimation::TokenEstimator;
