pub mod keyed_lock;
pub mod retry;

pub use keyed_lock::KeyedLock;
pub use retry::{retry_transient, RetryPolicy};
