pub mod config;
pub mod planner;
pub mod strategy;

pub use config::{RouteConstraints, RoutingConfig};
pub use planner::{PlanOutcome, RouteAdjustments, RouteMetrics, RoutePlanner};
pub use strategy::{GeneticStrategy, NearestNeighborStrategy, OptimizationStrategy};
