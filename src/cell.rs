//! The resolution cell shared by a [`Deferred`](crate::Deferred) and every
//! [`Promise`] handed out for it.
//!
//! A cell moves from `Pending` to either `Success` or `Failure` at most once.
//! The transition, the listener queue, the async wakers and the condvar that
//! blocking readers park on all sit behind one mutex, so "check state,
//! transition if pending, drain listeners" is a single step for every thread.
use crate::{Error, Failure, Promise};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Poll, Waker};
use std::time::{Duration, Instant};

pub(crate) type Listener<T> = Box<dyn FnOnce(&Promise<T>) + Send>;

#[derive(Debug, Clone)]
pub(crate) enum Resolution<T> {
    Pending,
    Success(T),
    Failure(Failure),
}

impl<T> Resolution<T> {
    fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }
}

struct Inner<T> {
    resolution: Resolution<T>,
    /// Set once the last write handle is dropped while still pending.
    abandoned: bool,
    listeners: Vec<Listener<T>>,
    wakers: Vec<Waker>,
}

pub(crate) struct Cell<T> {
    inner: Mutex<Inner<T>>,
    resolved: Condvar,
    writers: AtomicUsize,
}

impl<T> Cell<T> {
    pub(crate) fn new() -> Self {
        Self::with_resolution(Resolution::Pending)
    }

    pub(crate) fn with_resolution(resolution: Resolution<T>) -> Self {
        Cell {
            inner: Mutex::new(Inner {
                resolution,
                abandoned: false,
                listeners: Vec::new(),
                wakers: Vec::new(),
            }),
            resolved: Condvar::new(),
            writers: AtomicUsize::new(0),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        !self.inner.lock().resolution.is_pending()
    }

    pub(crate) fn attach_writer(&self) {
        self.writers.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one write handle. The last one out abandons a pending cell.
    pub(crate) fn detach_writer(self: &Arc<Self>) {
        if self.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.abandon();
        }
    }

    /// Performs the one and only `Pending -> Success|Failure` transition.
    pub(crate) fn complete(self: &Arc<Self>, resolution: Resolution<T>) -> Result<(), Error> {
        let (listeners, wakers) = {
            let mut inner = self.inner.lock();
            if !inner.resolution.is_pending() {
                tracing::debug!("rejected resolution of an already resolved promise");
                return Err(Error::AlreadyResolved);
            }
            inner.resolution = resolution;
            self.resolved.notify_all();
            (mem::take(&mut inner.listeners), mem::take(&mut inner.wakers))
        };
        tracing::trace!(listeners = listeners.len(), "promise resolved");

        for waker in wakers {
            waker.wake();
        }
        let promise = Promise::from_cell(Arc::clone(self));
        for listener in listeners {
            fire(&promise, listener);
        }
        Ok(())
    }

    /// Queues `listener`, or runs it right away when the cell is terminal.
    pub(crate) fn register(self: &Arc<Self>, listener: Listener<T>) {
        let mut inner = self.inner.lock();
        let pending = inner.resolution.is_pending();
        if pending && !inner.abandoned {
            inner.listeners.push(listener);
            return;
        }
        drop(inner);
        if pending {
            tracing::trace!("listener dropped, promise can no longer resolve");
            drop(listener);
        } else {
            fire(&Promise::from_cell(Arc::clone(self)), listener);
        }
    }

    fn abandon(&self) {
        let (listeners, wakers) = {
            let mut inner = self.inner.lock();
            if !inner.resolution.is_pending() || inner.abandoned {
                return;
            }
            inner.abandoned = true;
            self.resolved.notify_all();
            (mem::take(&mut inner.listeners), mem::take(&mut inner.wakers))
        };
        tracing::debug!(
            listeners = listeners.len(),
            "promise abandoned without being resolved"
        );
        // Dropping the listeners releases the write handles of chained
        // promises, which abandons them in turn.
        drop(listeners);
        for waker in wakers {
            waker.wake();
        }
    }

    pub(crate) fn resolution_name(&self) -> &'static str {
        let inner = self.inner.lock();
        match inner.resolution {
            Resolution::Pending if inner.abandoned => "Abandoned",
            Resolution::Pending => "Pending",
            Resolution::Success(_) => "Success",
            Resolution::Failure(_) => "Failure",
        }
    }

    /// Blocks until the cell is terminal, abandoned, or `timeout` elapses.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Result<(), Error> {
        // A deadline past what `Instant` can represent waits unbounded.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut inner = self.inner.lock();
        while inner.resolution.is_pending() {
            if inner.abandoned {
                return Err(Error::Interrupted);
            }
            match deadline {
                None => self.resolved.wait(&mut inner),
                Some(deadline) => {
                    if self.resolved.wait_until(&mut inner, deadline).timed_out()
                        && inner.resolution.is_pending()
                    {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
        Ok(())
    }
}

impl<T: Clone> Cell<T> {
    /// Non-blocking snapshot of a terminal outcome.
    pub(crate) fn outcome(&self) -> Option<Result<T, Failure>> {
        match &self.inner.lock().resolution {
            Resolution::Pending => None,
            Resolution::Success(value) => Some(Ok(value.clone())),
            Resolution::Failure(failure) => Some(Err(Arc::clone(failure))),
        }
    }

    pub(crate) fn wait_outcome(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Result<T, Failure>, Error> {
        self.wait(timeout)?;
        self.outcome().ok_or(Error::Interrupted)
    }

    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Poll<Result<Result<T, Failure>, Error>> {
        let mut inner = self.inner.lock();
        let ready = match &inner.resolution {
            Resolution::Success(value) => Some(Ok(Ok(value.clone()))),
            Resolution::Failure(failure) => Some(Ok(Err(Arc::clone(failure)))),
            Resolution::Pending if inner.abandoned => Some(Err(Error::Interrupted)),
            Resolution::Pending => None,
        };
        match ready {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !inner.wakers.iter().any(|queued| queued.will_wake(waker)) {
                    inner.wakers.push(waker.clone());
                }
                Poll::Pending
            }
        }
    }
}

fn fire<T>(promise: &Promise<T>, listener: Listener<T>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(promise))) {
        tracing::warn!(
            panic = %panic_message(payload.as_ref()),
            "promise listener panicked"
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}
