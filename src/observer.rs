//! Diagnostic hooks.
//!
//! A runtime holds at most one [`PromiseObserver`]. It is told about every
//! continuation registration (after following adoption) and every rejection.
//! Install it with [`RuntimeBuilder::observer`](crate::RuntimeBuilder::observer)
//! or [`Runtime::set_observer`](crate::Runtime::set_observer).

use tracing::{debug, trace};

use crate::{Promise, Value};

pub trait PromiseObserver {
    /// A continuation is being registered on `promise`.
    fn on_handle(&self, _promise: &Promise) {}

    /// `promise` has just been rejected with `reason`.
    fn on_reject(&self, _promise: &Promise, _reason: &Value) {}
}

/// Reports registrations and rejections through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PromiseObserver for TracingObserver {
    fn on_handle(&self, promise: &Promise) {
        trace!(?promise, "continuation registered");
    }

    fn on_reject(&self, promise: &Promise, reason: &Value) {
        debug!(?promise, ?reason, "promise rejected");
    }
}
