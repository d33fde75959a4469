//! Write-once promises with chained combinators.
//!
//! A [`Deferred`] is the write side: it is resolved (or failed) exactly once.
//! Its [`Promise`] is the read side and may be cloned and shared freely.
//! Readers can block on the outcome, `.await` it, or register callbacks and
//! build new promises from it with [`Promise::then`], [`Promise::map`],
//! [`Promise::recover`] and friends. [`all`] folds many promises into one.
//!
//! Callbacks run on whichever thread resolves the promise, or right away on
//! the registering thread when the promise is already resolved.
//!
//! # Examples
//!
//! ```
//! use promise_out::Deferred;
//! use std::thread;
//!
//! let deferred = Deferred::<String>::new();
//! let greeting = deferred.promise().map(|name| Ok(format!("Hi {}", name)));
//!
//! let task = thread::spawn(move || deferred.resolve("🍓".into()));
//! assert_eq!(greeting.get_value().unwrap(), "Hi 🍓");
//! task.join().expect("The task thread has panicked.").unwrap();
//! ```
mod all;
mod cell;
mod combinators;
mod deferred;
mod promise;
mod timer;

pub use all::{all, FailedPromises};
pub use deferred::Deferred;
pub use promise::{FailureFn, Promise, SuccessFn};

use std::sync::Arc;
use thiserror::Error;

/// The failure a promise is resolved with.
///
/// Every reader of a failed promise observes the same error object.
pub type Failure = Arc<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("promise is already resolved")]
    AlreadyResolved,
    #[error("promise can no longer be resolved")]
    Interrupted,
    #[error("promise resolved with a failure: {0}")]
    ResolutionFailed(#[source] Failure),
    #[error("predicate does not accept value")]
    NoSuchElement,
    #[error("callback panicked: {0}")]
    CallbackFailure(String),
    #[error("{} of {} aggregated promises failed", .0.len(), .0.total())]
    AggregateFailure(FailedPromises),
    #[error("promise was not resolved in time")]
    Timeout,
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Arc::new(err)
    }
}

/// Wraps any error as a [`Failure`].
pub fn failure<E>(err: E) -> Failure
where
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(err)
}
