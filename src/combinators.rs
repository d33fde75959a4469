//! Combinators derived from [`Promise::then`]. Each one resolves its own
//! deferred from the `then` callbacks, the way a hand-written chain would.
use crate::promise::{guard, settle};
use crate::{Deferred, Error, Failure, Promise};

impl<T: Clone + Send + 'static> Promise<T> {
    /// A promise of `mapper` applied to this promise's value.
    ///
    /// ```
    /// use promise_out::Promise;
    /// let length = Promise::resolved("🍓🍓").map(|value| Ok(value.chars().count()));
    /// assert_eq!(length.get_value().unwrap(), 2);
    /// ```
    pub fn map<R, M>(&self, mapper: M) -> Promise<R>
    where
        R: Clone + Send + 'static,
        M: FnOnce(T) -> Result<R, Failure> + Send + 'static,
    {
        let mapped = Deferred::new();
        let promise = mapped.promise();
        let on_failure = pass_failure(mapped.clone());
        self.then(
            move |resolved: &Promise<T>| {
                let value = resolved.get_value()?;
                settle(match guard(|| mapper(value)) {
                    Ok(value) => mapped.resolve(value),
                    Err(failure) => mapped.fail(failure),
                });
                Ok(None::<Promise<()>>)
            },
            on_failure,
        );
        promise
    }

    /// A promise resolved by the promise `mapper` returns for this
    /// promise's value.
    pub fn flat_map<R, M>(&self, mapper: M) -> Promise<R>
    where
        R: Clone + Send + 'static,
        M: FnOnce(T) -> Result<Promise<R>, Failure> + Send + 'static,
    {
        let mapped = Deferred::new();
        let promise = mapped.promise();
        let on_failure = pass_failure(mapped.clone());
        self.then(
            move |resolved: &Promise<T>| {
                let value = resolved.get_value()?;
                match guard(|| mapper(value)) {
                    Ok(next) => {
                        mapped.resolve_with(&next);
                    }
                    Err(failure) => settle(mapped.fail(failure)),
                }
                Ok(None::<Promise<()>>)
            },
            on_failure,
        );
        promise
    }

    /// Keeps the value only if `predicate` accepts it; otherwise the returned
    /// promise fails with [`Error::NoSuchElement`].
    pub fn filter<P>(&self, predicate: P) -> Promise<T>
    where
        P: FnOnce(&T) -> Result<bool, Failure> + Send + 'static,
    {
        let filtered = Deferred::new();
        let promise = filtered.promise();
        let on_failure = pass_failure(filtered.clone());
        self.then(
            move |resolved: &Promise<T>| {
                let value = resolved.get_value()?;
                settle(match guard(|| predicate(&value)) {
                    Ok(true) => filtered.resolve(value),
                    Ok(false) => filtered.fail(Error::NoSuchElement.into()),
                    Err(failure) => filtered.fail(failure),
                });
                Ok(None::<Promise<()>>)
            },
            on_failure,
        );
        promise
    }

    /// Recovers from a failure with the value `recovery` produces.
    ///
    /// `None` is not a recovery: the returned promise then fails with the
    /// original failure. Use [`Promise::recover_with`] with a resolved
    /// promise to recover to an empty value.
    pub fn recover<F>(&self, recovery: F) -> Promise<T>
    where
        F: FnOnce(&Promise<T>) -> Result<Option<T>, Failure> + Send + 'static,
    {
        let recovered = Deferred::new();
        let promise = recovered.promise();
        self.then(pass_value(recovered.clone()), move |resolved| {
            let original = original_failure(resolved)?;
            settle(match guard(|| recovery(resolved)) {
                Ok(Some(value)) => recovered.resolve(value),
                Ok(None) => recovered.fail(original),
                Err(failure) => recovered.fail(failure),
            });
            Ok(())
        });
        promise
    }

    /// Recovers from a failure with the promise `recovery` returns.
    /// `None` keeps the original failure.
    pub fn recover_with<F>(&self, recovery: F) -> Promise<T>
    where
        F: FnOnce(&Promise<T>) -> Result<Option<Promise<T>>, Failure> + Send + 'static,
    {
        let recovered = Deferred::new();
        let promise = recovered.promise();
        self.then(pass_value(recovered.clone()), move |resolved| {
            let original = original_failure(resolved)?;
            match guard(|| recovery(resolved)) {
                Ok(Some(next)) => {
                    recovered.resolve_with(&next);
                }
                Ok(None) => settle(recovered.fail(original)),
                Err(failure) => settle(recovered.fail(failure)),
            }
            Ok(())
        });
        promise
    }

    /// Falls back to `fallback`'s value when this promise fails. If the
    /// fallback fails too, the returned promise keeps this promise's failure.
    pub fn fallback_to(&self, fallback: &Promise<T>) -> Promise<T> {
        let chosen = Deferred::new();
        let promise = chosen.promise();
        let fallback = fallback.clone();
        self.then(pass_value(chosen.clone()), move |resolved| {
            let original = original_failure(resolved)?;
            fallback.on_resolve(move |fallback| {
                settle(match fallback.outcome() {
                    Some(Ok(value)) => chosen.resolve(value),
                    _ => chosen.fail(original),
                });
            });
            Ok(())
        });
        promise
    }

    /// Runs `callback` once this promise resolves either way. The returned
    /// promise mirrors this one unless the callback fails.
    pub fn then_callback<F>(&self, callback: F) -> Promise<T>
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        let settled = Deferred::new();
        let promise = settled.promise();
        self.on_resolve(move |resolved| {
            let Some(outcome) = resolved.outcome() else {
                return;
            };
            settle(match (guard(callback), outcome) {
                (Err(failure), _) | (Ok(()), Err(failure)) => settled.fail(failure),
                (Ok(()), Ok(value)) => settled.resolve(value),
            });
        });
        promise
    }
}

fn original_failure<T: Clone>(resolved: &Promise<T>) -> Result<Failure, Failure> {
    resolved
        .get_failure()?
        .ok_or_else(|| Error::Interrupted.into())
}

/// Success arm that hands the value on to `target` unchanged.
fn pass_value<T>(
    target: Deferred<T>,
) -> impl FnOnce(&Promise<T>) -> Result<Option<Promise<()>>, Failure> + Send + 'static
where
    T: Clone + Send + 'static,
{
    move |resolved| {
        settle(target.resolve(resolved.get_value()?));
        Ok(None)
    }
}

/// Failure arm that hands the failure on to `target` unchanged.
fn pass_failure<T, R>(
    target: Deferred<R>,
) -> impl FnOnce(&Promise<T>) -> Result<(), Failure> + Send + 'static
where
    T: Clone + Send + 'static,
    R: Send + 'static,
{
    move |resolved| {
        settle(target.fail(original_failure(resolved)?));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{failure, Deferred, Error, Failure, Promise};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn boom() -> Failure {
        failure(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
    }

    fn failed_with<T: Clone>(promise: &Promise<T>) -> Failure {
        promise
            .get_failure()
            .expect("promise was abandoned")
            .expect("promise succeeded")
    }

    #[test]
    fn test_map() {
        let deferred = Deferred::<&str>::new();
        let mapped = deferred.promise().map(|value| Ok(format!("{}!", value)));
        assert!(!mapped.is_done());
        deferred.resolve("hello").unwrap();
        assert_eq!(mapped.get_value().unwrap(), "hello!");
    }

    #[test]
    fn test_map_error_and_passthrough() {
        let cause = boom();
        let thrown = cause.clone();
        let mapped = Promise::resolved(1).map(move |_| -> Result<i32, Failure> { Err(thrown) });
        assert!(Arc::ptr_eq(&failed_with(&mapped), &cause));

        let upstream = boom();
        let skipped = Arc::new(AtomicBool::new(true));
        let called = skipped.clone();
        let mapped = Promise::<i32>::failed(upstream.clone()).map(move |value| {
            called.store(false, Ordering::SeqCst);
            Ok(value)
        });
        assert!(Arc::ptr_eq(&failed_with(&mapped), &upstream));
        assert!(skipped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_map_panic() {
        let mapped = Promise::resolved(1).map(|_| -> Result<i32, Failure> { panic!("mapper") });
        assert!(matches!(
            failed_with(&mapped).downcast_ref::<Error>(),
            Some(Error::CallbackFailure(_))
        ));
    }

    #[test]
    fn test_flat_map() {
        let inner = Deferred::<String>::new();
        let inner_promise = inner.promise();
        let flat = Promise::resolved("hello").flat_map(move |_| Ok(inner_promise));
        assert!(!flat.is_done());
        inner.resolve("world".into()).unwrap();
        assert_eq!(flat.get_value().unwrap(), "world");

        let cause = boom();
        let thrown = cause.clone();
        let flat = Promise::resolved(1).flat_map(move |_| Ok(Promise::<i32>::failed(thrown)));
        assert!(Arc::ptr_eq(&failed_with(&flat), &cause));
    }

    #[test]
    fn test_filter() {
        let accepted = Promise::resolved("hello").filter(|value| Ok(!value.starts_with('!')));
        assert_eq!(accepted.get_value().unwrap(), "hello");

        let rejected = Promise::resolved("!reject").filter(|value| Ok(!value.starts_with('!')));
        assert!(matches!(
            failed_with(&rejected).downcast_ref::<Error>(),
            Some(Error::NoSuchElement)
        ));

        let cause = boom();
        let thrown = cause.clone();
        let errored = Promise::resolved("fail").filter(move |_| Err(thrown));
        assert!(Arc::ptr_eq(&failed_with(&errored), &cause));
    }

    #[test]
    fn test_recover() {
        let passthrough = Promise::resolved(1).recover(|_| Ok(Some(2)));
        assert_eq!(passthrough.get_value().unwrap(), 1);

        let recovered = Promise::<i32>::failed(boom()).recover(|_| Ok(Some(2)));
        assert_eq!(recovered.get_value().unwrap(), 2);
    }

    #[test]
    fn test_recover_none_keeps_original_failure() {
        let cause = boom();
        let recovered = Promise::<i32>::failed(cause.clone()).recover(|_| Ok(None));
        assert!(Arc::ptr_eq(&failed_with(&recovered), &cause));
    }

    #[test]
    fn test_recover_error() {
        let replacement = failure(Error::Timeout);
        let thrown = replacement.clone();
        let recovered = Promise::<i32>::failed(boom()).recover(move |_| Err(thrown));
        assert!(Arc::ptr_eq(&failed_with(&recovered), &replacement));
    }

    #[test]
    fn test_recover_with() {
        let recovered = Promise::<Option<i32>>::failed(boom())
            .recover_with(|_| Ok(Some(Promise::resolved(None))));
        assert_eq!(recovered.get_value().unwrap(), None);

        let cause = boom();
        let recovered = Promise::<i32>::failed(cause.clone()).recover_with(|_| Ok(None));
        assert!(Arc::ptr_eq(&failed_with(&recovered), &cause));

        let pending = Deferred::<i32>::new();
        let later = pending.promise();
        let recovered = Promise::<i32>::failed(boom()).recover_with(move |_| Ok(Some(later)));
        assert!(!recovered.is_done());
        pending.resolve(5).unwrap();
        assert_eq!(recovered.get_value().unwrap(), 5);
    }

    #[test]
    fn test_fallback_to() {
        let kept = Promise::resolved("hello").fallback_to(&Promise::resolved("world"));
        assert_eq!(kept.get_value().unwrap(), "hello");

        let fallen = Promise::<&str>::failed(boom()).fallback_to(&Promise::resolved("world"));
        assert_eq!(fallen.get_value().unwrap(), "world");

        let original = boom();
        let both = Promise::<&str>::failed(original.clone())
            .fallback_to(&Promise::failed(failure(Error::Timeout)));
        assert!(Arc::ptr_eq(&failed_with(&both), &original));
    }

    #[test]
    fn test_fallback_to_pending_fallback() {
        let fallback = Deferred::<i32>::new();
        let chosen = Promise::<i32>::failed(boom()).fallback_to(&fallback.promise());
        assert!(!chosen.is_done());
        fallback.resolve(3).unwrap();
        assert_eq!(chosen.get_value().unwrap(), 3);
    }

    #[test]
    fn test_then_callback() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mirrored = Promise::resolved(4).then_callback(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(mirrored.get_value().unwrap(), 4);
        assert!(ran.load(Ordering::SeqCst));

        let cause = boom();
        let thrown = cause.clone();
        let replaced = Promise::resolved(4).then_callback(move || Err(thrown));
        assert!(Arc::ptr_eq(&failed_with(&replaced), &cause));

        let original = boom();
        let mirrored = Promise::<i32>::failed(original.clone()).then_callback(|| Ok(()));
        assert!(Arc::ptr_eq(&failed_with(&mirrored), &original));
    }
}
