//! Combinators layered over promises, fibers, and timers.
//!
//! - [`join`]: all / all_keyed / race / any / all_settled
//! - [`pool`]: bounded-concurrency pools and sequential execution
//! - [`retry`]: exponential-backoff retry inside a fiber
//! - [`timeout`]: deadline-governed fibers and delayed values
//! - [`rate`]: debounce and throttle

pub mod join;
pub mod pool;
pub mod rate;
pub mod retry;
pub mod timeout;

pub use join::{all, all_keyed, all_settled, any, race, Settlement};
pub use pool::{pool, sequence, Task};
pub use rate::{debounce, throttle, Debounced, Throttled};
pub use retry::retry;
pub use timeout::{delay, timeout};
