pub mod collaborators;
pub mod config;
pub mod scheduler;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use collaborators::{Notifier, PaymentGateway};
pub use config::{SchedulerConfig, WorkflowConfig};
pub use scheduler::TaskScheduler;
pub use workflow::DispatchWorkflow;
