//! The deferred value state machine.
//!
//! A [`Promise`] starts pending and settles at most once: fulfilled with a
//! value, rejected with a reason, or adopted, in which case it reports
//! whatever the adopted promise reports. Continuations registered with
//! [`Promise::then`] are queued while pending and handed to the scheduler
//! once the promise settles; they never run on the caller's stack.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::runtime::Shared;
use crate::{Error, Function, Runtime, Value};

enum State {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
    /// Redirect to another promise. Never observed from outside: readers
    /// follow the chain first.
    Adopted(Promise),
}

/// One `then` registration.
struct Continuation {
    on_fulfilled: Option<Function>,
    on_rejected: Option<Function>,
    derived: Promise,
}

/// Continuations waiting on a pending promise, in registration order.
#[derive(Default)]
enum Continuations {
    #[default]
    Empty,
    Single(Continuation),
    Multiple(Vec<Continuation>),
}

impl Continuations {
    fn push(&mut self, continuation: Continuation) {
        *self = match mem::take(self) {
            Continuations::Empty => Continuations::Single(continuation),
            Continuations::Single(first) => Continuations::Multiple(vec![first, continuation]),
            Continuations::Multiple(mut list) => {
                list.push(continuation);
                Continuations::Multiple(list)
            }
        };
    }
}

struct Inner {
    state: State,
    continuations: Continuations,
}

impl Inner {
    /// Moves out the promises this one keeps alive.
    fn unlink(&mut self, into: &mut Vec<Promise>) {
        if let State::Adopted(target) = mem::replace(&mut self.state, State::Pending) {
            into.push(target);
        }
        match mem::take(&mut self.continuations) {
            Continuations::Empty => {}
            Continuations::Single(continuation) => into.push(continuation.derived),
            Continuations::Multiple(list) => {
                into.extend(list.into_iter().map(|continuation| continuation.derived));
            }
        }
    }
}

impl Drop for Inner {
    /// Releases adoption and continuation chains with a worklist instead of
    /// nested drops.
    fn drop(&mut self) {
        let mut links = Vec::new();
        self.unlink(&mut links);
        while let Some(Promise { inner, .. }) = links.pop() {
            if let Ok(cell) = Rc::try_unwrap(inner) {
                cell.into_inner().unlink(&mut links);
            }
        }
    }
}

#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
    shared: Rc<Shared>,
}

/// Settles a promise at most once. Clones share the same `done` flag.
#[derive(Debug, Clone)]
pub(crate) struct Settler {
    promise: Promise,
    done: Rc<Cell<bool>>,
}

impl Settler {
    pub(crate) fn resolve(&self, value: Value) {
        if !self.done.replace(true) {
            self.promise.settle(value);
        }
    }

    pub(crate) fn reject(&self, reason: Value) {
        if !self.done.replace(true) {
            self.promise.fail(reason);
        }
    }

    /// The resolve and reject functions handed to setup routines.
    pub(crate) fn functions(&self) -> (Function, Function) {
        let resolve = {
            let settler = self.clone();
            Function::unary(move |value| {
                settler.resolve(value);
                Ok(Value::Undefined)
            })
        };
        let reject = {
            let settler = self.clone();
            Function::unary(move |reason| {
                settler.reject(reason);
                Ok(Value::Undefined)
            })
        };
        (resolve, reject)
    }
}

impl Promise {
    /// Creates a pending promise and runs `setup` once, synchronously.
    ///
    /// `setup` receives the resolve and reject functions. Only the first call
    /// to either has any effect. An `Err` returned by `setup` rejects the
    /// promise unless it already settled.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred::{Promise, Runtime, Value};
    ///
    /// let runtime = Runtime::new();
    /// let promise = Promise::new(&runtime, |resolve, _reject| {
    ///     resolve.invoke("done")?;
    ///     Ok(())
    /// });
    /// let outcome = runtime.block_on(promise.settled()).unwrap();
    /// assert_eq!(outcome, Ok(Value::from("done")));
    /// ```
    pub fn new<F>(runtime: &Runtime, setup: F) -> Self
    where
        F: FnOnce(Function, Function) -> Result<(), Value>,
    {
        Self::with_setup(runtime.shared(), setup)
    }

    /// Creates a promise from a dynamically typed executor.
    ///
    /// Anything other than a function is a construction error, reported
    /// synchronously rather than as a rejection.
    pub fn from_executor(runtime: &Runtime, executor: &Value) -> Result<Self, Error> {
        let Value::Function(executor) = executor else {
            return Err(Error::NotCallable);
        };
        Ok(Self::new(runtime, bind_then(executor.clone(), Value::Undefined)))
    }

    pub(crate) fn with_setup<F>(shared: &Rc<Shared>, setup: F) -> Self
    where
        F: FnOnce(Function, Function) -> Result<(), Value>,
    {
        let promise = Self::empty(shared);
        promise.run_setup(setup);
        promise
    }

    /// A pending promise nothing will settle except the crate itself.
    pub(crate) fn empty(shared: &Rc<Shared>) -> Self {
        Self::from_state(shared, State::Pending)
    }

    /// An already fulfilled promise. No observer is told about it.
    pub(crate) fn fulfilled(shared: &Rc<Shared>, value: Value) -> Self {
        Self::from_state(shared, State::Fulfilled(value))
    }

    fn from_state(shared: &Rc<Shared>, state: State) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state,
                continuations: Continuations::Empty,
            })),
            shared: shared.clone(),
        }
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers continuations and returns the promise their outcome feeds.
    ///
    /// A missing `on_fulfilled` passes the value through unchanged; a missing
    /// `on_rejected` passes the rejection through.
    pub fn then(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> Promise {
        let derived = Promise::empty(&self.shared);
        self.handle(Continuation {
            on_fulfilled,
            on_rejected,
            derived: derived.clone(),
        });
        derived
    }

    /// Like [`then`](Self::then), with non-function arguments treated as absent.
    pub fn then_values(&self, on_fulfilled: Value, on_rejected: Value) -> Promise {
        self.then(on_fulfilled.into_function(), on_rejected.into_function())
    }

    pub fn catch(&self, on_rejected: Function) -> Promise {
        self.then(None, Some(on_rejected))
    }

    /// The end of this promise's adoption chain.
    pub(crate) fn terminal(&self) -> Promise {
        let mut current = self.clone();
        loop {
            let next = match &current.inner.borrow().state {
                State::Adopted(target) => Some(target.clone()),
                _ => None,
            };
            match next {
                Some(target) => current = target,
                None => return current,
            }
        }
    }

    /// The outcome of the end of the adoption chain, if it has settled.
    pub(crate) fn peek(&self) -> Option<Result<Value, Value>> {
        let terminal = self.terminal();
        let inner = terminal.inner.borrow();
        match &inner.state {
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
            State::Pending | State::Adopted(_) => None,
        }
    }

    /// A fresh single-shot handle on this promise.
    pub(crate) fn settler(&self) -> Settler {
        Settler {
            promise: self.clone(),
            done: Rc::new(Cell::new(false)),
        }
    }

    fn run_setup<F>(&self, setup: F)
    where
        F: FnOnce(Function, Function) -> Result<(), Value>,
    {
        let settler = self.settler();
        let (resolve, reject) = settler.functions();
        if let Err(reason) = setup(resolve, reject) {
            settler.reject(reason);
        }
    }

    /// The promise resolution procedure.
    pub(crate) fn settle(&self, value: Value) {
        if let Value::Promise(other) = &value {
            return self.adopt(other);
        }
        if let Value::Object(object) = &value {
            match object.then() {
                Err(reason) => return self.fail(reason),
                Ok(Value::Function(then)) => {
                    trace!("following foreign thenable");
                    return self.run_setup(bind_then(then, value.clone()));
                }
                Ok(_) => {}
            }
        }
        if self.transition(State::Fulfilled(value)) {
            self.finale();
        }
    }

    fn adopt(&self, other: &Promise) {
        if other.ptr_eq(self) {
            debug!("promise resolved with itself");
            return self.fail(Error::SelfResolution.into());
        }
        if other.terminal().ptr_eq(self) {
            debug!("promise adoption would form a cycle");
            return self.fail(Error::ChainingCycle.into());
        }
        if self.transition(State::Adopted(other.clone())) {
            self.finale();
        }
    }

    pub(crate) fn fail(&self, reason: Value) {
        if self.transition(State::Rejected(reason.clone())) {
            self.shared.notify_reject(self, &reason);
            self.finale();
        }
    }

    fn transition(&self, next: State) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !matches!(inner.state, State::Pending) {
            trace!("ignoring settlement of a settled promise");
            return false;
        }
        inner.state = next;
        true
    }

    /// Hands every queued continuation on after settlement.
    fn finale(&self) {
        let continuations = mem::take(&mut self.inner.borrow_mut().continuations);
        match continuations {
            Continuations::Empty => {}
            Continuations::Single(continuation) => self.handle(continuation),
            Continuations::Multiple(list) => {
                for continuation in list {
                    self.handle(continuation);
                }
            }
        }
    }

    /// Queues `continuation` on the end of the adoption chain, or schedules
    /// it if that promise has settled.
    fn handle(&self, continuation: Continuation) {
        let target = self.terminal();
        target.shared.notify_handle(&target);
        {
            let mut inner = target.inner.borrow_mut();
            if matches!(inner.state, State::Pending) {
                inner.continuations.push(continuation);
                return;
            }
        }
        let source = target.clone();
        target
            .shared
            .schedule(Box::new(move || source.react(continuation)));
    }

    /// Runs one continuation against this settled promise.
    fn react(&self, continuation: Continuation) {
        let Some(outcome) = self.peek() else {
            return self.handle(continuation);
        };
        let Continuation {
            on_fulfilled,
            on_rejected,
            derived,
        } = continuation;
        let (callback, argument) = match &outcome {
            Ok(value) => (on_fulfilled, value.clone()),
            Err(reason) => (on_rejected, reason.clone()),
        };
        let Some(callback) = callback else {
            return match outcome {
                Ok(value) => derived.settle(value),
                Err(reason) => derived.fail(reason),
            };
        };
        match callback.call(&Value::Undefined, &[argument]) {
            Ok(value) => derived.settle(value),
            Err(reason) => derived.fail(reason),
        }
    }
}

/// Turns a `then` method into a setup routine called with `this` as receiver.
pub(crate) fn bind_then(
    then: Function,
    this: Value,
) -> impl FnOnce(Function, Function) -> Result<(), Value> {
    move |resolve, reject| {
        then.call(&this, &[resolve.into(), reject.into()])?;
        Ok(())
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.try_borrow() {
            Ok(inner) => match inner.state {
                State::Pending => "pending",
                State::Fulfilled(_) => "fulfilled",
                State::Rejected(_) => "rejected",
                State::Adopted(_) => "adopted",
            },
            Err(_) => "busy",
        };
        f.debug_tuple("Promise").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(runtime: &Runtime, promise: &Promise) -> Option<Result<Value, Value>> {
        runtime.run_until_idle();
        promise.peek()
    }

    #[test]
    fn test_continuation_list_grows_in_order() {
        let runtime = Runtime::new();
        let promise = Promise::empty(runtime.shared());
        for _ in 0..3 {
            promise.then(None, None);
        }
        match &promise.inner.borrow().continuations {
            Continuations::Multiple(list) => assert_eq!(list.len(), 3),
            _ => panic!("expected three continuations"),
        }
        promise.settle(Value::from(1));
        assert!(matches!(
            promise.inner.borrow().continuations,
            Continuations::Empty
        ));
    }

    #[test]
    fn test_adopted_promise_reports_target_state() {
        let runtime = Runtime::new();
        let target = Promise::empty(runtime.shared());
        let promise = Promise::empty(runtime.shared());
        promise.settle(Value::from(target.clone()));
        assert!(promise.terminal().ptr_eq(&target));
        assert_eq!(promise.peek(), None);

        target.settle(Value::from(7));
        assert_eq!(promise.peek(), Some(Ok(Value::from(7))));
    }

    #[test]
    fn test_continuations_move_to_adopted_target() {
        let runtime = Runtime::new();
        let target = Promise::empty(runtime.shared());
        let promise = Promise::empty(runtime.shared());
        let derived = promise.then(None, None);
        promise.settle(Value::from(target.clone()));
        assert!(matches!(
            target.inner.borrow().continuations,
            Continuations::Single(_)
        ));
        target.fail(Value::from("no"));
        assert_eq!(outcome(&runtime, &derived), Some(Err(Value::from("no"))));
    }

    #[test]
    fn test_mutual_adoption_is_rejected() {
        let runtime = Runtime::new();
        let a = Promise::empty(runtime.shared());
        let b = Promise::empty(runtime.shared());
        a.settle(Value::from(b.clone()));
        b.settle(Value::from(a.clone()));
        let reason = b.peek().and_then(Result::err);
        assert_eq!(
            reason.as_ref().and_then(Value::as_error),
            Some(&Error::ChainingCycle)
        );
        assert!(a.terminal().ptr_eq(&b));
    }

    #[test]
    fn test_second_settlement_is_ignored() {
        let runtime = Runtime::new();
        let promise = Promise::empty(runtime.shared());
        promise.settle(Value::from(1));
        promise.fail(Value::from(2));
        promise.settle(Value::from(3));
        assert_eq!(promise.peek(), Some(Ok(Value::from(1))));
    }

    #[test]
    fn test_setup_error_after_resolve_is_ignored() {
        let runtime = Runtime::new();
        let promise = Promise::new(&runtime, |resolve, _| {
            resolve.invoke(1)?;
            Err(Value::from("late"))
        });
        assert_eq!(promise.peek(), Some(Ok(Value::from(1))));
    }

    #[test]
    fn test_throwing_then_getter_rejects() {
        struct Hostile;
        impl crate::Object for Hostile {
            fn then(&self) -> Result<Value, Value> {
                Err(Value::from("getter"))
            }
        }
        let runtime = Runtime::new();
        let promise = Promise::empty(runtime.shared());
        promise.settle(Value::object(Hostile));
        assert_eq!(promise.peek(), Some(Err(Value::from("getter"))));
    }

    #[test]
    fn test_debug_shows_state() {
        let runtime = Runtime::new();
        let promise = Promise::empty(runtime.shared());
        assert_eq!(format!("{promise:?}"), "Promise(\"pending\")");
        promise.settle(Value::Null);
        assert_eq!(format!("{promise:?}"), "Promise(\"fulfilled\")");
    }

    fn countdown(runtime: &Runtime, n: i32) -> Promise {
        if n == 0 {
            return runtime.resolve(0);
        }
        let inner = runtime.clone();
        runtime.resolve(n).then(
            Some(Function::unary(move |_| Ok(countdown(&inner, n - 1).into()))),
            None,
        )
    }

    #[test]
    fn test_dropping_long_adoption_chain() {
        let runtime = Runtime::new();
        let promise = countdown(&runtime, 100_000);
        assert_eq!(runtime.block_on(promise.settled()), Ok(Ok(Value::from(0))));
        drop(promise);
    }

    #[test]
    fn test_dropping_long_pending_continuation_chain() {
        let runtime = Runtime::new();
        let root = Promise::empty(runtime.shared());
        let mut tail = root.clone();
        for _ in 0..100_000 {
            tail = tail.then(None, None);
        }
        drop(tail);
        drop(root);
    }
}
