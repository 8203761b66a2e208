//! The runtime that promises are bound to.
//!
//! A [`Runtime`] owns the scheduler, the observer slot and the cache of
//! pre-settled promises for common primitives. It is a cheap handle: clones
//! share the same state.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use tracing::{debug, trace};

use crate::scheduler::{Job, MicrotaskQueue, Scheduler};
use crate::{Error, Promise, PromiseObserver, Value};

/// State every promise of a runtime holds on to.
pub(crate) struct Shared {
    scheduler: Rc<dyn Scheduler>,
    observer: RefCell<Option<Rc<dyn PromiseObserver>>>,
    driving: Cell<bool>,
}

impl Shared {
    pub(crate) fn schedule(&self, job: Job) {
        self.scheduler.schedule(job);
    }

    fn observer(&self) -> Option<Rc<dyn PromiseObserver>> {
        self.observer.borrow().clone()
    }

    pub(crate) fn notify_handle(&self, promise: &Promise) {
        if let Some(observer) = self.observer() {
            observer.on_handle(promise);
        }
    }

    pub(crate) fn notify_reject(&self, promise: &Promise, reason: &Value) {
        if let Some(observer) = self.observer() {
            observer.on_reject(promise, reason);
        }
    }
}

/// Clears the driving flag when a turn ends, including by unwinding.
struct Driving<'a>(&'a Cell<bool>);

impl Drop for Driving<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Pre-settled promises handed out by [`Runtime::resolve`].
struct PrimitiveCache {
    undefined: Promise,
    null: Promise,
    true_: Promise,
    false_: Promise,
    zero: Promise,
    empty_string: Promise,
}

impl PrimitiveCache {
    fn new(shared: &Rc<Shared>) -> Self {
        let fulfilled = |value: Value| Promise::fulfilled(shared, value);
        Self {
            undefined: fulfilled(Value::Undefined),
            null: fulfilled(Value::Null),
            true_: fulfilled(Value::Bool(true)),
            false_: fulfilled(Value::Bool(false)),
            zero: fulfilled(Value::Number(0.0)),
            empty_string: fulfilled(Value::from("")),
        }
    }

    fn get(&self, value: &Value) -> Option<Promise> {
        let cached = match value {
            Value::Undefined => &self.undefined,
            Value::Null => &self.null,
            Value::Bool(true) => &self.true_,
            Value::Bool(false) => &self.false_,
            // Matches -0 as well.
            Value::Number(n) if *n == 0.0 => &self.zero,
            Value::String(s) if s.is_empty() => &self.empty_string,
            _ => return None,
        };
        Some(cached.clone())
    }
}

#[derive(Clone)]
pub struct Runtime {
    shared: Rc<Shared>,
    cache: Option<Rc<PrimitiveCache>>,
    turn_limit: Option<usize>,
}

impl Runtime {
    /// A runtime with a fresh [`MicrotaskQueue`] and default settings.
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn shared(&self) -> &Rc<Shared> {
        &self.shared
    }

    pub(crate) fn cached(&self, value: &Value) -> Option<Promise> {
        self.cache.as_ref().and_then(|cache| cache.get(value))
    }

    /// Installs `observer`, returning the one it replaces.
    pub fn set_observer(
        &self,
        observer: Rc<dyn PromiseObserver>,
    ) -> Option<Rc<dyn PromiseObserver>> {
        self.shared.observer.borrow_mut().replace(observer)
    }

    pub fn clear_observer(&self) -> Option<Rc<dyn PromiseObserver>> {
        self.shared.observer.borrow_mut().take()
    }

    /// Runs one scheduler turn. Returns `false` if nothing ran.
    ///
    /// Does nothing when called from inside a running job.
    pub fn run_next(&self) -> bool {
        if self.shared.driving.replace(true) {
            trace!("ignoring nested scheduler turn");
            return false;
        }
        let _driving = Driving(&self.shared.driving);
        self.shared.scheduler.run_next()
    }

    /// Runs jobs until the scheduler is idle. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut turns = 0;
        while self.run_next() {
            turns += 1;
        }
        turns
    }

    pub fn is_idle(&self) -> bool {
        self.shared.scheduler.is_idle()
    }

    /// Polls `future` to completion, running one scheduler turn between polls.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, Error> {
        if self.shared.driving.get() {
            return Err(Error::Reentrant);
        }
        let mut future = pin!(future);
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut turns = 0;
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Ok(output);
            }
            if let Some(limit) = self.turn_limit {
                if turns >= limit {
                    debug!(limit, "turn limit reached");
                    return Err(Error::TurnLimit(limit));
                }
            }
            if !self.run_next() {
                debug!(turns, "scheduler idle with future still pending");
                return Err(Error::Stalled);
            }
            turns += 1;
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RuntimeBuilder {
    scheduler: Option<Rc<dyn Scheduler>>,
    observer: Option<Rc<dyn PromiseObserver>>,
    cache_primitives: bool,
    turn_limit: Option<usize>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            scheduler: None,
            observer: None,
            cache_primitives: true,
            turn_limit: None,
        }
    }

    /// Use `scheduler` instead of a fresh [`MicrotaskQueue`].
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn observer(mut self, observer: Rc<dyn PromiseObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Share one settled promise per common primitive in `Runtime::resolve`.
    pub fn cache_primitives(mut self, enabled: bool) -> Self {
        self.cache_primitives = enabled;
        self
    }

    /// Maximum number of scheduler turns a single `block_on` may run.
    pub fn turn_limit(mut self, limit: usize) -> Self {
        self.turn_limit = Some(limit);
        self
    }

    pub fn build(self) -> Runtime {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Rc::new(MicrotaskQueue::new()));
        let shared = Rc::new(Shared {
            scheduler,
            observer: RefCell::new(self.observer),
            driving: Cell::new(false),
        });
        let cache = self
            .cache_primitives
            .then(|| Rc::new(PrimitiveCache::new(&shared)));
        Runtime {
            shared,
            cache,
            turn_limit: self.turn_limit,
        }
    }
}
