pub mod scheduler;
pub mod types;

pub use scheduler::RetryScheduler;
pub use types::{RetryStats, RetryStrategy, RetryTask, TaskStatus};
