pub mod metrics;
pub mod models;
pub mod reconciler;
pub mod utils;
