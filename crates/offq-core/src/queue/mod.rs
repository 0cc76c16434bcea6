//! Queue module: processing passes, retry policy and the retry timer.

mod processor;
mod retry;
mod timer;

pub use processor::{EnqueueOptions, OfflineQueue};
pub(crate) use processor::QueueParts;
pub use retry::{RetryDecision, RetryPolicy, SessionRetries};
