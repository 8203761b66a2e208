//! `resolve`, `reject`, `all` and `race`, built on the public promise
//! operations.

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

use crate::promise::bind_then;
use crate::{Function, Promise, Runtime, Value};

impl Runtime {
    /// A promise for `value`.
    ///
    /// Promises are returned as they are, foreign thenables are followed and
    /// anything else fulfills as-is.
    pub fn resolve(&self, value: impl Into<Value>) -> Promise {
        let value = value.into();
        match &value {
            Value::Promise(promise) => return promise.clone(),
            Value::Object(object) => match object.then() {
                Ok(Value::Function(then)) => {
                    return Promise::new(self, bind_then(then, value.clone()));
                }
                Ok(_) => {}
                Err(reason) => return self.reject(reason),
            },
            _ => {
                if let Some(cached) = self.cached(&value) {
                    return cached;
                }
            }
        }
        Promise::fulfilled(self.shared(), value)
    }

    /// A promise rejected with `reason`, which is never unwrapped.
    pub fn reject(&self, reason: impl Into<Value>) -> Promise {
        let reason = reason.into();
        Promise::new(self, move |_, reject| {
            reject.invoke(reason)?;
            Ok(())
        })
    }

    /// Fulfills with the list of all values, in input order, once every one
    /// has fulfilled. Rejects with the first rejection.
    pub fn all<I>(&self, values: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let runtime = self.clone();
        Promise::new(self, move |resolve, reject| {
            if values.is_empty() {
                resolve.invoke(Value::list(Vec::new()))?;
                return Ok(());
            }
            let gather = Rc::new(Gather {
                slots: RefCell::new(values.clone()),
                remaining: Cell::new(values.len()),
                resolve,
                reject,
                runtime,
            });
            for (index, value) in values.into_iter().enumerate() {
                Gather::collect(&gather, index, value)?;
            }
            Ok(())
        })
    }

    /// Settles like whichever of `values` settles first. Never settles if
    /// `values` is empty.
    pub fn race<I>(&self, values: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let runtime = self.clone();
        Promise::new(self, move |resolve, reject| {
            for value in values {
                runtime
                    .resolve(value)
                    .then(Some(resolve.clone()), Some(reject.clone()));
            }
            Ok(())
        })
    }
}

/// Bookkeeping for one `all` call.
struct Gather {
    slots: RefCell<Vec<Value>>,
    remaining: Cell<usize>,
    resolve: Function,
    reject: Function,
    runtime: Runtime,
}

impl Gather {
    fn collect(gather: &Rc<Gather>, index: usize, value: Value) -> Result<(), Value> {
        match &value {
            Value::Promise(promise) => {
                match promise.peek() {
                    Some(Ok(value)) => return Gather::collect(gather, index, value),
                    Some(Err(reason)) => {
                        gather.reject.invoke(reason)?;
                    }
                    None => {
                        promise.then(
                            Some(Gather::slot(gather, index)),
                            Some(gather.reject.clone()),
                        );
                    }
                }
                return Ok(());
            }
            Value::Object(object) => {
                if let Value::Function(then) = object.then()? {
                    Promise::new(&gather.runtime, bind_then(then, value.clone())).then(
                        Some(Gather::slot(gather, index)),
                        Some(gather.reject.clone()),
                    );
                    return Ok(());
                }
            }
            _ => {}
        }

        gather.slots.borrow_mut()[index] = value;
        let remaining = gather.remaining.get() - 1;
        gather.remaining.set(remaining);
        if remaining == 0 {
            let values = mem::take(&mut *gather.slots.borrow_mut());
            gather.resolve.invoke(Value::list(values))?;
        }
        Ok(())
    }

    /// The fulfillment callback that fills slot `index`.
    fn slot(gather: &Rc<Gather>, index: usize) -> Function {
        let gather = gather.clone();
        Function::unary(move |value| {
            Gather::collect(&gather, index, value)?;
            Ok(Value::Undefined)
        })
    }
}
