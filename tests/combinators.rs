use std::cell::Cell;
use std::rc::Rc;

use deferred::{Error, Function, Promise, Runtime, Value};

fn outcome(runtime: &Runtime, promise: &Promise) -> Result<Value, Value> {
    runtime
        .block_on(promise.settled())
        .expect("promise did not settle")
}

#[test]
fn test_resolve_primitives_fulfill_with_themselves() {
    let runtime = Runtime::new();
    for value in [
        Value::Undefined,
        Value::Null,
        Value::from(true),
        Value::from(0),
        Value::from(""),
        Value::from(7.5),
        Value::from("text"),
    ] {
        let promise = runtime.resolve(value.clone());
        assert_eq!(outcome(&runtime, &promise), Ok(value));
    }
}

#[test]
fn test_reject_does_not_unwrap() {
    let runtime = Runtime::new();
    let inner = runtime.resolve(1);
    let rejected = runtime.reject(inner.clone());
    let reason = outcome(&runtime, &rejected).unwrap_err();
    assert!(reason.as_promise().is_some_and(|p| p.ptr_eq(&inner)));

    let thenable = Value::thenable(Function::new(|_, _| Ok(Value::Undefined)));
    let rejected = runtime.reject(thenable.clone());
    assert_eq!(outcome(&runtime, &rejected), Err(thenable));
}

#[test]
fn test_all_empty_fulfills_with_empty_list() {
    let runtime = Runtime::new();
    let all = runtime.all(Vec::<Value>::new());
    assert_eq!(outcome(&runtime, &all), Ok(Value::list(Vec::new())));
}

#[test]
fn test_all_mixed_values() {
    let runtime = Runtime::new();
    let all = runtime.all([Value::from(1), runtime.resolve(2).into(), Value::from(3)]);
    assert_eq!(
        outcome(&runtime, &all),
        Ok(Value::list(vec![1.into(), 2.into(), 3.into()]))
    );
}

#[test]
fn test_all_keeps_input_order() {
    let runtime = Runtime::new();
    let (first, first_resolvers) = runtime.with_resolvers();
    let (second, second_resolvers) = runtime.with_resolvers();
    let thenable = Value::thenable(Function::new(|_, args| {
        args[0].clone().into_function().expect("resolve").invoke("c")
    }));
    let all = runtime.all([first.into(), second.into(), thenable]);
    second_resolvers.resolve("b");
    runtime.run_until_idle();
    first_resolvers.resolve("a");
    assert_eq!(
        outcome(&runtime, &all),
        Ok(Value::list(vec!["a".into(), "b".into(), "c".into()]))
    );
}

#[test]
fn test_all_rejects_with_first_rejection() {
    let runtime = Runtime::new();
    let (p1, r1) = runtime.with_resolvers();
    let (p2, r2) = runtime.with_resolvers();
    let (p3, r3) = runtime.with_resolvers();
    let all = runtime.all([p1, p2, p3]);
    r2.reject("second failed");
    runtime.run_until_idle();
    r1.resolve(1);
    r3.reject("third failed");
    assert_eq!(outcome(&runtime, &all), Err(Value::from("second failed")));
}

#[test]
fn test_all_with_already_rejected_input() {
    let runtime = Runtime::new();
    let all = runtime.all([runtime.resolve(1), runtime.reject("early")]);
    assert_eq!(outcome(&runtime, &all), Err(Value::from("early")));
}

#[test]
fn test_race_first_settlement_wins() {
    let runtime = Runtime::new();
    let (never, _resolvers) = runtime.with_resolvers();
    let race = runtime.race([never, runtime.resolve("fast")]);
    assert_eq!(outcome(&runtime, &race), Ok(Value::from("fast")));

    let race = runtime.race([Value::from(runtime.reject("nope")), Value::from(1)]);
    assert_eq!(outcome(&runtime, &race), Err(Value::from("nope")));
}

#[test]
fn test_race_empty_never_settles() {
    let runtime = Runtime::new();
    let race = runtime.race(Vec::<Value>::new());
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    race.then(
        Some(Function::unary(move |v| {
            counter.set(counter.get() + 1);
            Ok(v)
        })),
        None,
    );
    runtime.run_until_idle();
    assert_eq!(calls.get(), 0);
    assert_eq!(runtime.block_on(race.settled()), Err(Error::Stalled));
}
