//! Cross-cutting helpers shared by every layer

pub mod pagination;
pub mod retry;
pub mod shutdown;

pub use pagination::{Page, PageRequest};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use shutdown::*;
