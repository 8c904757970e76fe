//! Convergence polling.
//!
//! Freshly booted instance groups and freshly joined cluster members show
//! up eventually, not immediately. [`do_with_retry`] and [`Poller`] encode
//! "try a bounded number of times with fixed spacing" once, instead of an
//! ad hoc sleep loop at every call site.

mod retry;

pub use retry::{
    do_with_retry, should_retry, BackoffStrategy, Poller, RetryConfig, RetryDecision, RetryState,
};
