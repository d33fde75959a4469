use crate::cell::{panic_message, Cell, Resolution};
use crate::{Deferred, Error, Failure};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Called with the resolved promise when it succeeds. Returning a promise
/// delegates the chained promise to it, `None` resolves the chained promise
/// with the empty value.
pub type SuccessFn<T, R> =
    Box<dyn FnOnce(&Promise<T>) -> Result<Option<Promise<R>>, Failure> + Send>;

/// Called with the resolved promise when it fails. Returning an error
/// replaces the failure the chained promise is failed with.
pub type FailureFn<T> = Box<dyn FnOnce(&Promise<T>) -> Result<(), Failure> + Send>;

/// The read side of a [`Deferred`]. Clones share the same outcome.
///
/// # Examples
///
/// ```
/// use promise_out::{Deferred, Promise};
/// use futures::executor::block_on;
/// use std::thread;
/// let deferred = Deferred::<String>::new();
/// let consumer = deferred.promise();
/// let consumer2 = consumer.clone();
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received on task 1 {:?}", consumer.await);
/// }));
/// let task2 = thread::spawn(move || {
///     println!("Received on task 2 {:?}", consumer2.get_value());
/// });
/// deferred.resolve("Hi".into()).unwrap();
/// task1.join().expect("The task1 thread has panicked.");
/// task2.join().expect("The task2 thread has panicked.");
/// ```
pub struct Promise<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Promise<T> {
    pub(crate) fn from_cell(cell: Arc<Cell<T>>) -> Self {
        Promise { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<Cell<T>> {
        &self.cell
    }

    /// An already successful promise.
    pub fn resolved(value: T) -> Self {
        Self::from_cell(Arc::new(Cell::with_resolution(Resolution::Success(value))))
    }

    /// An already failed promise.
    pub fn failed(failure: Failure) -> Self {
        Self::from_cell(Arc::new(Cell::with_resolution(Resolution::Failure(failure))))
    }

    /// Whether the promise was resolved, successfully or with a failure.
    pub fn is_done(&self) -> bool {
        self.cell.is_done()
    }

    /// Whether both handles read the same promise.
    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Blocks until the promise is resolved.
    pub fn wait(&self) -> Result<(), Error> {
        self.cell.wait(None)
    }

    /// Blocks until the promise is resolved or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), Error> {
        self.cell.wait(Some(timeout))
    }
}

impl<T: Clone> Promise<T> {
    /// The value of the promise, blocking while it is pending.
    ///
    /// A failed promise yields [`Error::ResolutionFailed`] whose source is
    /// the original failure. [`Error::Interrupted`] is returned when the
    /// promise is abandoned and can never be resolved.
    pub fn get_value(&self) -> Result<T, Error> {
        self.cell.wait_outcome(None)?.map_err(Error::ResolutionFailed)
    }

    /// Like [`Promise::get_value`], giving up with [`Error::Timeout`].
    pub fn get_value_timeout(&self, timeout: Duration) -> Result<T, Error> {
        self.cell
            .wait_outcome(Some(timeout))?
            .map_err(Error::ResolutionFailed)
    }

    /// The failure of the promise, or `None` if it succeeded. Blocks while
    /// the promise is pending.
    pub fn get_failure(&self) -> Result<Option<Failure>, Error> {
        Ok(self.cell.wait_outcome(None)?.err())
    }

    /// Like [`Promise::get_failure`], giving up with [`Error::Timeout`].
    pub fn get_failure_timeout(&self, timeout: Duration) -> Result<Option<Failure>, Error> {
        Ok(self.cell.wait_outcome(Some(timeout))?.err())
    }

    pub(crate) fn outcome(&self) -> Option<Result<T, Failure>> {
        self.cell.outcome()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Calls `callback` once the promise is resolved.
    ///
    /// The callback runs on the resolving thread, or right away when the
    /// promise is already resolved.
    pub fn on_resolve<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Promise<T>) + Send + 'static,
    {
        self.cell.register(Box::new(callback));
        self
    }

    /// Chains a new promise to this one.
    ///
    /// On success `success` decides the chained outcome: a returned promise
    /// is delegated to, `None` resolves with `R::default()`, an error fails
    /// the chained promise. On failure `failure` runs first; the chained
    /// promise fails with the error it returns, or with the original failure
    /// if it returns normally.
    ///
    /// ```
    /// use promise_out::{Deferred, Promise};
    /// let deferred = Deferred::<i32>::new();
    /// let doubled = deferred.promise().then(
    ///     |resolved| Ok(Some(Promise::resolved(resolved.get_value()? * 2))),
    ///     |_| Ok(()),
    /// );
    /// deferred.resolve(21).unwrap();
    /// assert_eq!(doubled.get_value().unwrap(), 42);
    /// ```
    pub fn then<R, S, F>(&self, success: S, failure: F) -> Promise<R>
    where
        R: Default + Clone + Send + 'static,
        S: FnOnce(&Promise<T>) -> Result<Option<Promise<R>>, Failure> + Send + 'static,
        F: FnOnce(&Promise<T>) -> Result<(), Failure> + Send + 'static,
    {
        self.then_with(Some(Box::new(success)), Some(Box::new(failure)))
    }

    /// [`Promise::then`] without a failure callback.
    pub fn then_success<R, S>(&self, success: S) -> Promise<R>
    where
        R: Default + Clone + Send + 'static,
        S: FnOnce(&Promise<T>) -> Result<Option<Promise<R>>, Failure> + Send + 'static,
    {
        self.then_with(Some(Box::new(success)), None)
    }

    /// [`Promise::then`] with either callback optional.
    pub fn then_with<R>(
        &self,
        success: Option<SuccessFn<T, R>>,
        failure: Option<FailureFn<T>>,
    ) -> Promise<R>
    where
        R: Default + Clone + Send + 'static,
    {
        let chained = Deferred::new();
        let promise = chained.promise();
        self.on_resolve(move |resolved| match resolved.outcome() {
            Some(Ok(_)) => {
                let returned = match success {
                    Some(callback) => guard(|| callback(resolved)),
                    None => Ok(None),
                };
                match returned {
                    Ok(Some(next)) => {
                        chained.resolve_with(&next);
                    }
                    Ok(None) => settle(chained.resolve(R::default())),
                    Err(failure) => settle(chained.fail(failure)),
                }
            }
            Some(Err(original)) => {
                let returned = match failure {
                    Some(callback) => guard(|| callback(resolved)),
                    None => Ok(()),
                };
                settle(chained.fail(returned.err().unwrap_or(original)));
            }
            None => {}
        });
        promise
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.cell.poll_outcome(cx.waker()) {
            Poll::Ready(outcome) => {
                Poll::Ready(outcome.and_then(|outcome| outcome.map_err(Error::ResolutionFailed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.cell.resolution_name())
            .finish()
    }
}

/// Runs a user callback, turning a panic into [`Error::CallbackFailure`].
pub(crate) fn guard<X>(callback: impl FnOnce() -> Result<X, Failure>) -> Result<X, Failure> {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(returned) => returned,
        Err(payload) => Err(Error::CallbackFailure(panic_message(payload.as_ref())).into()),
    }
}

/// Resolutions of chained deferreds nobody else can reach only fail when a
/// delegated outcome lost a race; that is worth a trace, not an error.
pub(crate) fn settle(result: Result<(), Error>) {
    if let Err(err) = result {
        tracing::trace!(error = %err, "chained resolution skipped");
    }
}
