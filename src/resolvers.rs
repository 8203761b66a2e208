use crate::promise::Settler;
use crate::{Function, Promise, Runtime, Value};

/// The settling half of a promise created by [`Runtime::with_resolvers`].
///
/// Only the first `resolve` or `reject` has any effect. Clones settle the
/// same promise.
///
/// # Examples
///
/// ```
/// use deferred::{Runtime, Value};
///
/// let runtime = Runtime::new();
/// let (promise, resolvers) = runtime.with_resolvers();
/// resolvers.resolve("Hi");
/// resolvers.reject("ignored");
/// assert_eq!(runtime.block_on(promise.settled()), Ok(Ok(Value::from("Hi"))));
/// ```
#[derive(Debug, Clone)]
pub struct Resolvers {
    settler: Settler,
    resolve: Function,
    reject: Function,
}

impl Resolvers {
    pub fn resolve(&self, value: impl Into<Value>) {
        self.settler.resolve(value.into());
    }

    pub fn reject(&self, reason: impl Into<Value>) {
        self.settler.reject(reason.into());
    }

    /// The resolve function, for handing to code that expects a [`Value`].
    pub fn resolve_function(&self) -> &Function {
        &self.resolve
    }

    pub fn reject_function(&self) -> &Function {
        &self.reject
    }
}

impl Runtime {
    /// A pending promise together with the functions that settle it.
    pub fn with_resolvers(&self) -> (Promise, Resolvers) {
        let promise = Promise::empty(self.shared());
        let settler = promise.settler();
        let (resolve, reject) = settler.functions();
        let resolvers = Resolvers {
            settler,
            resolve,
            reject,
        };
        (promise, resolvers)
    }
}
