#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_out::{all, failure, Deferred, Error, Promise};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::{thread, time::Duration};

    #[test]
    fn test_promise_out() {
        let deferred = Deferred::<i32>::new();
        let promise = deferred.promise();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            deferred.resolve(42).unwrap();
        });

        assert_eq!(promise.get_value().unwrap(), 42);
    }

    #[test]
    fn test_concurrent_resolvers_single_winner() {
        const WRITERS: usize = 32;
        let deferred = Deferred::<usize>::new();
        let barrier = Arc::new(Barrier::new(WRITERS));
        let tasks: Vec<_> = (0..WRITERS)
            .map(|i| {
                let deferred = deferred.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        deferred.resolve(i).map(|()| i)
                    } else {
                        deferred.fail(failure(Error::NoSuchElement)).map(|()| i)
                    }
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut losers = 0;
        for task in tasks {
            match task.join().expect("writer thread panicked") {
                Ok(i) => winners.push(i),
                Err(Error::AlreadyResolved) => losers += 1,
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(losers, WRITERS - 1);

        let promise = deferred.promise();
        if winners[0] % 2 == 0 {
            assert_eq!(promise.get_value().unwrap(), winners[0]);
        } else {
            assert!(matches!(promise.get_value(), Err(Error::ResolutionFailed(_))));
        }
    }

    #[test]
    fn test_callbacks_racing_resolution_fire_once() {
        const REGISTRARS: usize = 8;
        const PER_THREAD: usize = 50;
        let deferred = Deferred::<u64>::new();
        let promise = deferred.promise();
        let fired = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(REGISTRARS + 1));

        let registrars: Vec<_> = (0..REGISTRARS)
            .map(|_| {
                let promise = promise.clone();
                let fired = fired.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..PER_THREAD {
                        let fired = fired.clone();
                        promise.on_resolve(move |resolved| {
                            // Resolution is visible to every callback.
                            assert!(resolved.is_done());
                            assert_eq!(resolved.get_value_timeout(Duration::ZERO).unwrap(), 7);
                            fired.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        barrier.wait();
        deferred.resolve(7).unwrap();
        for registrar in registrars {
            registrar.join().expect("registrar thread panicked");
        }
        assert_eq!(fired.load(Ordering::SeqCst), REGISTRARS * PER_THREAD);
    }

    #[test]
    fn test_many_readers() {
        let deferred = Deferred::<String>::new();
        let readers: Vec<_> = (0..4)
            .map(|i| {
                let promise = deferred.promise();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        block_on(async { promise.await })
                    } else {
                        promise.get_value()
                    }
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        deferred.resolve(String::from("🍓")).unwrap();
        for reader in readers {
            assert_eq!(reader.join().expect("reader thread panicked").unwrap(), "🍓");
        }
    }

    #[test]
    fn test_chain_resolved_from_other_thread() {
        let deferred = Deferred::<i32>::new();
        let chained = deferred
            .promise()
            .map(|value| Ok(value * 2))
            .filter(|value| Ok(*value > 10))
            .flat_map(|value| Ok(Promise::resolved(value.to_string())))
            .recover(|_| Ok(Some(String::from("small"))));

        let writer = thread::spawn(move || deferred.resolve(21));
        assert_eq!(chained.get_value().unwrap(), "42");
        writer.join().expect("writer thread panicked").unwrap();
    }

    #[test]
    fn test_chain_recovers_from_filter() {
        let deferred = Deferred::<i32>::new();
        let chained = deferred
            .promise()
            .map(|value| Ok(value * 2))
            .filter(|value| Ok(*value > 10))
            .map(|value| Ok(value.to_string()))
            .recover(|failed| match failed.get_failure()? {
                Some(cause)
                    if matches!(cause.downcast_ref::<Error>(), Some(Error::NoSuchElement)) =>
                {
                    Ok(Some(String::from("small")))
                }
                _ => Ok(None),
            });
        deferred.resolve(1).unwrap();
        assert_eq!(chained.get_value().unwrap(), "small");
    }

    #[test]
    fn test_get_value_with_longest_timeout() {
        let deferred = Deferred::<i32>::new();
        deferred.resolve(1).unwrap();
        assert_eq!(deferred.promise().get_value_timeout(Duration::MAX).unwrap(), 1);

        let deferred = Deferred::<i32>::new();
        let promise = deferred.promise();
        drop(deferred);
        assert!(matches!(
            promise.get_value_timeout(Duration::MAX),
            Err(Error::Interrupted)
        ));

        let deferred = Deferred::<i32>::new();
        let bounded = deferred.promise().timeout(Duration::MAX);
        deferred.resolve(5).unwrap();
        assert_eq!(bounded.get_value().unwrap(), 5);
    }

    #[test]
    fn test_all_with_mixed_outcomes() {
        let inputs: Vec<_> = (0..6).map(|_| Deferred::<usize>::new()).collect();
        let joined = all(inputs.iter().map(Deferred::promise));
        let failing: Vec<_> = vec![inputs[1].promise(), inputs[4].promise()];

        let writers: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(i, deferred)| {
                thread::spawn(move || {
                    if i == 1 || i == 4 {
                        deferred.fail(failure(Error::Timeout))
                    } else {
                        deferred.resolve(i)
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().expect("writer thread panicked").unwrap();
        }

        let aggregate = joined.get_failure().unwrap().unwrap();
        match aggregate.downcast_ref::<Error>() {
            Some(Error::AggregateFailure(failed)) => {
                assert_eq!(failed.indices(), vec![1, 4]);
                assert!(failing.iter().all(|promise| failed.contains(promise)));
            }
            other => panic!("unexpected failure {:?}", other),
        }
    }
}
