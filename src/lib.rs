//! Promises/A+ deferred values with ES6-style combinators.
//!
//! A [`Promise`] is created against a [`Runtime`], which owns the scheduler
//! that runs continuations. Continuations never run synchronously: they run
//! when the runtime is driven, with [`Runtime::run_until_idle`] or
//! [`Runtime::block_on`].
//!
//! # Examples
//!
//! ```
//! use deferred::{Function, Runtime, Value};
//!
//! let runtime = Runtime::new();
//! let doubled = runtime.resolve(21).then(
//!     Some(Function::unary(|v| Ok(Value::from(v.as_number().unwrap_or(0.0) * 2.0)))),
//!     None,
//! );
//! assert_eq!(runtime.block_on(doubled.settled()), Ok(Ok(Value::from(42))));
//! ```

mod combinators;
mod error;
mod future;
mod observer;
mod promise;
mod resolvers;
mod runtime;
pub mod scheduler;
mod value;

pub use error::Error;
pub use future::Settled;
pub use observer::{PromiseObserver, TracingObserver};
pub use promise::Promise;
pub use resolvers::Resolvers;
pub use runtime::{Runtime, RuntimeBuilder};
pub use scheduler::{Job, MicrotaskQueue, Scheduler};
pub use value::{Function, Object, Thenable, Value};
