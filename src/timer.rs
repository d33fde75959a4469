//! Time-bounded combinators. Each call parks one named thread for the
//! duration; nothing here is pooled.
use crate::promise::settle;
use crate::{failure, Deferred, Error, Promise};
use std::io;
use std::thread;
use std::time::Duration;

impl<T: Clone + Send + 'static> Promise<T> {
    /// A promise mirroring this one that fails with [`Error::Timeout`] if
    /// this one is not resolved within `timeout`.
    ///
    /// ```
    /// use promise_out::{Deferred, Error};
    /// use std::time::Duration;
    /// let deferred = Deferred::<i32>::new();
    /// let bounded = deferred.promise().timeout(Duration::from_millis(10));
    /// let failure = bounded.get_failure().unwrap().unwrap();
    /// assert!(matches!(failure.downcast_ref::<Error>(), Some(Error::Timeout)));
    /// ```
    pub fn timeout(&self, timeout: Duration) -> Promise<T> {
        let bounded = Deferred::new();
        let promise = bounded.promise();
        bounded.resolve_with(self);

        let watched = self.clone();
        let on_spawn_error = bounded.clone();
        let spawned = spawn("promise-timeout", move || {
            // Interrupted means the upstream was abandoned; dropping
            // `bounded` here abandons the returned promise too.
            if let Err(Error::Timeout) = watched.wait_timeout(timeout) {
                settle(bounded.fail(Error::Timeout.into()));
            }
        });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn promise timeout thread");
            settle(on_spawn_error.fail(failure(err)));
        }
        promise
    }

    /// A promise resolved with this promise's outcome `delay` after this
    /// promise resolves.
    pub fn delay(&self, delay: Duration) -> Promise<T> {
        let delayed = Deferred::new();
        let promise = delayed.promise();
        self.on_resolve(move |resolved| {
            let Some(outcome) = resolved.outcome() else {
                return;
            };
            if delay.is_zero() {
                settle(hand_over(&delayed, outcome));
                return;
            }
            let on_spawn_error = delayed.clone();
            let spawned = spawn("promise-delay", move || {
                thread::sleep(delay);
                settle(hand_over(&delayed, outcome));
            });
            if let Err(err) = spawned {
                tracing::warn!(error = %err, "failed to spawn promise delay thread");
                settle(on_spawn_error.fail(failure(err)));
            }
        });
        promise
    }
}

fn hand_over<T>(target: &Deferred<T>, outcome: Result<T, crate::Failure>) -> Result<(), Error> {
    match outcome {
        Ok(value) => target.resolve(value),
        Err(failure) => target.fail(failure),
    }
}

fn spawn<F>(name: &str, task: F) -> io::Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(task)
        .map(drop)
}
