//! Dynamic values carried by promises.
//!
//! Fulfillment values, rejection reasons and callback arguments are all
//! [`Value`]s. A [`Function`] reports failure by returning `Err(reason)`,
//! which the promise machinery turns into a rejection.

use std::fmt;
use std::rc::Rc;

use crate::{Error, Promise};

type Callable = dyn Fn(&Value, &[Value]) -> Result<Value, Value>;

/// A callable value.
///
/// Called with a `this` value and a list of arguments. Returning `Err`
/// is the equivalent of throwing.
#[derive(Clone)]
pub struct Function(Rc<Callable>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, Value> + 'static,
    {
        Self(Rc::new(f))
    }

    /// A function of one argument. Missing arguments read as `Undefined`.
    pub fn unary<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Value> + 'static,
    {
        Self::new(move |_, args| f(args.first().cloned().unwrap_or_default()))
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, Value> {
        (self.0)(this, args)
    }

    /// Calls with an `Undefined` receiver and a single argument.
    pub fn invoke(&self, arg: impl Into<Value>) -> Result<Value, Value> {
        self.call(&Value::Undefined, &[arg.into()])
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// An object value that is not a promise of this crate.
///
/// The only property the promise machinery ever reads is `then`. An
/// implementation that fails to produce it returns `Err(reason)`.
pub trait Object {
    fn then(&self) -> Result<Value, Value> {
        Ok(Value::Undefined)
    }
}

/// A foreign thenable: an object whose `then` property is `then`.
///
/// `then` is called with the thenable as `this` and the resolve/reject
/// functions as its two arguments.
pub struct Thenable {
    then: Function,
}

impl Thenable {
    pub fn new(then: Function) -> Self {
        Self { then }
    }
}

impl Object for Thenable {
    fn then(&self) -> Result<Value, Value> {
        Ok(Value::Function(self.then.clone()))
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    List(Rc<[Value]>),
    Error(Rc<Error>),
    Function(Function),
    Object(Rc<dyn Object>),
    Promise(Promise),
}

impl Value {
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(values.into())
    }

    pub fn object(object: impl Object + 'static) -> Self {
        Value::Object(Rc::new(object))
    }

    /// Shorthand for `Value::object(Thenable::new(then))`.
    pub fn thenable(then: Function) -> Self {
        Value::object(Thenable::new(then))
    }

    /// Normalizes a callback argument: anything but a function is absent.
    pub fn into_function(self) -> Option<Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(&**items),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Value::Error(e) => Some(&**e),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Error(e) => write!(f, "{e}"),
            Value::Function(func) => fmt::Debug::fmt(func, f),
            Value::Object(_) => f.write_str("Object"),
            Value::Promise(p) => fmt::Debug::fmt(p, f),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::list(values)
    }
}

impl From<Error> for Value {
    fn from(e: Error) -> Self {
        Value::Error(Rc::new(e))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}
