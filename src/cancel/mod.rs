//! Propagating cancellation: tokens, fan-in combination, and sources.
//!
//! Cancellation in Fibra is cooperative. A cancelled token runs its
//! subscribers immediately; fibers governed by a token observe the
//! cancellation at their next yield or checkpoint. Subscriptions are
//! released on settlement so long-lived tokens do not leak.

pub mod combined;
pub mod source;
pub mod token;

pub use source::CancelSource;
pub use token::{CancelToken, Registration};
