mod analyze;
mod batch;
mod health;
mod metrics;

pub use analyze::analyze_handler;
pub use batch::batch_handler;
pub use health::{health_handler, index_handler};
pub use metrics::metrics_handler;
