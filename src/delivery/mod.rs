pub mod queue;
pub mod sender;
pub mod types;

pub use queue::MessageDeliveryQueue;
pub use sender::Sender;
pub use types::{DeliveryStatus, MessagePriority, MessageRequest, MessageResult, QueueStats};
