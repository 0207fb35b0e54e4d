//! Deferred-value primitives: promise state, the promise engine, and the
//! externally controlled producer side.
//!
//! - [`state`]: the three-state settlement tag
//! - [`core`]: the chainable [`Promise`] engine
//! - [`deferred`]: [`Deferred`], the strict producer wrapper

pub mod core;
pub mod deferred;
pub mod state;

pub use self::core::Promise;
pub use deferred::Deferred;
pub use state::PromiseState;
