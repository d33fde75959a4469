//! Aggregation of many promises into one.
use crate::cell::Cell;
use crate::promise::settle;
use crate::{Deferred, Error, Failure, Promise};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::mem;
use std::sync::Arc;

/// A promise of every value of `promises`, in input order.
///
/// If any input fails, the returned promise fails with
/// [`Error::AggregateFailure`] once every input has resolved, listing every
/// input that failed. An empty input resolves right away to an empty `Vec`.
///
/// ```
/// use promise_out::{all, Deferred, Promise};
/// let first = Deferred::new();
/// let joined = all(vec![first.promise(), Promise::resolved("b")]);
/// assert!(!joined.is_done());
/// first.resolve("a").unwrap();
/// assert_eq!(joined.get_value().unwrap(), vec!["a", "b"]);
/// ```
pub fn all<T, I>(promises: I) -> Promise<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T>>,
{
    let promises: Vec<Promise<T>> = promises.into_iter().collect();
    let total = promises.len();
    if total == 0 {
        return Promise::resolved(Vec::new());
    }

    let tally = Arc::new(Tally {
        total,
        aggregate: Deferred::new(),
        progress: Mutex::new(Progress {
            values: (0..total).map(|_| None).collect(),
            succeeded: 0,
            failed: Vec::new(),
        }),
    });
    let aggregate = tally.aggregate.promise();
    for (index, promise) in promises.into_iter().enumerate() {
        let on_success = Arc::clone(&tally);
        let on_failure = Arc::clone(&tally);
        promise.then(
            move |resolved: &Promise<T>| {
                on_success.record(index, Ok(resolved.get_value()?));
                Ok(None::<Promise<()>>)
            },
            move |resolved| {
                let failure = resolved.get_failure()?.ok_or(Error::Interrupted)?;
                on_failure.record(index, Err(FailedPromise::new(index, failure, resolved)));
                Ok(())
            },
        );
    }
    aggregate
}

struct Tally<T> {
    total: usize,
    aggregate: Deferred<Vec<T>>,
    progress: Mutex<Progress<T>>,
}

struct Progress<T> {
    values: Vec<Option<T>>,
    succeeded: usize,
    failed: Vec<FailedPromise>,
}

enum Completion<T> {
    Succeeded(Vec<T>),
    Failed(FailedPromises),
}

impl<T> Tally<T> {
    /// Records one input; the input that completes the set resolves the
    /// aggregate. Only one input can observe the set complete.
    fn record(&self, index: usize, entry: Result<T, FailedPromise>) {
        let completion = {
            let mut progress = self.progress.lock();
            match entry {
                Ok(value) => {
                    progress.values[index] = Some(value);
                    progress.succeeded += 1;
                }
                Err(failed) => progress.failed.push(failed),
            }
            if progress.succeeded == self.total {
                Some(Completion::Succeeded(
                    mem::take(&mut progress.values).into_iter().flatten().collect(),
                ))
            } else if progress.succeeded + progress.failed.len() == self.total {
                Some(Completion::Failed(FailedPromises::new(
                    mem::take(&mut progress.failed),
                    self.total,
                )))
            } else {
                None
            }
        };

        match completion {
            Some(Completion::Succeeded(values)) => {
                tracing::trace!(total = self.total, "all promises resolved");
                settle(self.aggregate.resolve(values));
            }
            Some(Completion::Failed(failed)) => {
                tracing::debug!(
                    total = self.total,
                    failed = failed.len(),
                    "aggregated promises failed"
                );
                settle(self.aggregate.fail(Error::AggregateFailure(failed).into()));
            }
            None => {}
        }
    }
}

#[derive(Clone)]
struct FailedPromise {
    index: usize,
    failure: Failure,
    cell: Arc<dyn Any + Send + Sync>,
}

impl FailedPromise {
    fn new<T: Send + 'static>(index: usize, failure: Failure, promise: &Promise<T>) -> Self {
        FailedPromise {
            index,
            failure,
            cell: promise.cell().clone(),
        }
    }

    fn address(&self) -> *const () {
        Arc::as_ptr(&self.cell) as *const ()
    }
}

/// The inputs of an [`all`] call that failed, ordered by input position.
#[derive(Clone)]
pub struct FailedPromises {
    failed: Vec<FailedPromise>,
    total: usize,
}

impl FailedPromises {
    fn new(mut failed: Vec<FailedPromise>, total: usize) -> Self {
        failed.sort_by_key(|failed| failed.index);
        FailedPromises { failed, total }
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of promises passed to [`all`].
    pub fn total(&self) -> usize {
        self.total
    }

    /// Input positions of the failed promises.
    pub fn indices(&self) -> Vec<usize> {
        self.failed.iter().map(|failed| failed.index).collect()
    }

    /// Input position and failure of each failed promise.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &Failure)> {
        self.failed.iter().map(|failed| (failed.index, &failed.failure))
    }

    pub fn contains<T: Send + 'static>(&self, promise: &Promise<T>) -> bool {
        let address = Arc::as_ptr(promise.cell()) as *const ();
        self.failed.iter().any(|failed| failed.address() == address)
    }

    /// The failed promises as `Promise<T>`. Empty when `T` is not the value
    /// type of the aggregated promises.
    pub fn promises<T: Send + 'static>(&self) -> Vec<Promise<T>> {
        self.failed
            .iter()
            .filter_map(|failed| Arc::clone(&failed.cell).downcast::<Cell<T>>().ok())
            .map(Promise::from_cell)
            .collect()
    }
}

impl fmt::Debug for FailedPromises {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailedPromises")
            .field("total", &self.total)
            .field(
                "failed",
                &self
                    .failed
                    .iter()
                    .map(|failed| (failed.index, failed.failure.to_string()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
