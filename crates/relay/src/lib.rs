pub mod config;
pub mod planner;

pub use config::RelayConfig;
pub use planner::PartialDeliveryPlanner;
