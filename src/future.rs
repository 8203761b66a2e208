//! Awaiting a promise from Rust.
//!
//! [`Promise::settled`] registers a continuation whose two callbacks feed a
//! [`Settled`] future. The callbacks share a `Producer`; if the promise is
//! dropped before settling, the callbacks go with it and the future resolves
//! to [`Error::Abandoned`].

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::{Error, Function, Promise, Value};

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

struct Inner {
    outcome: Option<Result<Value, Value>>,
    waker: Result<Waker, WakerState>,
}

/// Resolves to `Ok(value)` or `Err(reason)` once the promise settles.
///
/// Polling never drives the scheduler; something else has to run it, such
/// as [`Runtime::block_on`](crate::Runtime::block_on).
pub struct Settled {
    inner: Rc<RefCell<Inner>>,
}

struct Producer {
    inner: Rc<RefCell<Inner>>,
}

impl Producer {
    fn complete(&self, outcome: Result<Value, Value>) {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            inner.outcome.get_or_insert(outcome);
            std::mem::replace(&mut inner.waker, Err(WakerState::Tainted))
        };
        if let Ok(waker) = waker {
            waker.wake()
        }
    }
}

impl Drop for Producer {
    /// If the promise never settled, wake with an error.
    fn drop(&mut self) {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_none() {
                inner.outcome = Some(Err(Error::Abandoned.into()));
            }
            std::mem::replace(&mut inner.waker, Err(WakerState::Tainted))
        };
        if let Ok(waker) = waker {
            waker.wake()
        }
    }
}

impl Promise {
    /// A future for this promise's outcome.
    pub fn settled(&self) -> Settled {
        let inner = Rc::new(RefCell::new(Inner {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let producer = Rc::new(Producer {
            inner: inner.clone(),
        });
        let on_fulfilled = {
            let producer = producer.clone();
            Function::unary(move |value| {
                producer.complete(Ok(value));
                Ok(Value::Undefined)
            })
        };
        let on_rejected = Function::unary(move |reason| {
            producer.complete(Err(reason));
            Ok(Value::Undefined)
        });
        self.then(Some(on_fulfilled), Some(on_rejected));
        Settled { inner }
    }
}

impl Future for Settled {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                inner.waker = Ok(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
