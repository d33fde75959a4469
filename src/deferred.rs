use crate::cell::{Cell, Resolution};
use crate::promise::settle;
use crate::{Error, Failure, Promise};
use std::fmt;
use std::sync::Arc;

/// The write side of a [`Promise`].
///
/// A `Deferred` resolves its promise at most once. It may be cloned so that
/// several threads can race to resolve it: the first `resolve`/`fail` wins
/// and every other attempt gets [`Error::AlreadyResolved`].
///
/// If every clone is dropped while the promise is still pending, the promise
/// is abandoned: blocked readers and awaiters get [`Error::Interrupted`].
///
/// # Examples
///
/// ```
/// use promise_out::Deferred;
/// use futures::executor::block_on;
/// use std::thread;
/// let deferred = Deferred::<String>::new();
/// let promise = deferred.promise();
///
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", promise.await);
/// }));
/// deferred.resolve("Hi".into()).unwrap();
/// task1.join().expect("The task1 thread has panicked.");
/// ```
pub struct Deferred<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        let cell = Arc::new(Cell::new());
        cell.attach_writer();
        Deferred { cell }
    }

    /// The read side. Every call hands out a handle to the same promise.
    pub fn promise(&self) -> Promise<T> {
        Promise::from_cell(Arc::clone(&self.cell))
    }

    /// Resolves the promise successfully with `value`.
    ///
    /// ```
    /// use promise_out::{Deferred, Error};
    /// let deferred = Deferred::new();
    /// deferred.resolve("🍓").unwrap();
    /// assert!(matches!(deferred.resolve("💥"), Err(Error::AlreadyResolved)));
    /// assert_eq!(deferred.promise().get_value().unwrap(), "🍓");
    /// ```
    pub fn resolve(&self, value: T) -> Result<(), Error> {
        self.cell.complete(Resolution::Success(value))
    }

    /// Resolves the promise with `failure`.
    ///
    /// ```
    /// use promise_out::{failure, Deferred, Error};
    /// let deferred = Deferred::<()>::new();
    /// deferred.fail(failure(Error::Timeout)).unwrap();
    /// assert!(matches!(
    ///     deferred.promise().get_value(),
    ///     Err(Error::ResolutionFailed(_))
    /// ));
    /// ```
    pub fn fail(&self, failure: Failure) -> Result<(), Error> {
        self.cell.complete(Resolution::Failure(failure))
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Resolves this deferred with the eventual outcome of `with`.
    ///
    /// The returned promise succeeds once the outcome has been handed over,
    /// or fails with [`Error::AlreadyResolved`] when this deferred was
    /// resolved by someone else first.
    pub fn resolve_with(&self, with: &Promise<T>) -> Promise<()> {
        let tracker = Deferred::new();
        let tracked = tracker.promise();
        let target = self.clone();
        with.on_resolve(move |resolved| {
            let handed_over = match resolved.outcome() {
                Some(Ok(value)) => target.resolve(value),
                Some(Err(failure)) => target.fail(failure),
                None => return,
            };
            settle(match handed_over {
                Ok(()) => tracker.resolve(()),
                Err(err) => tracker.fail(err.into()),
            });
        });
        tracked
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        self.cell.attach_writer();
        Deferred {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Deferred<T> {
    /// If this is the last handle of an unresolved promise, abandon it.
    fn drop(&mut self) {
        self.cell.detach_writer();
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.cell.resolution_name())
            .finish()
    }
}
