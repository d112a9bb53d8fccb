//! Key resolution, priority policy and the reconciliation fold.
//!
//! # Responsibility
//! - Turn raw feed events into canonical, deduplicated notifications.
//! - Keep the fold order-independent under replay and reordering.

pub mod key;
pub mod priority;
pub mod reducer;
pub mod retention;
