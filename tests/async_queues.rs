//! Tests for `eval`, `apply`, `eval_async`, `apply_async` and `post_digest`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use scope_flow::inspector::{EventCollector, EventSinkTracer};
use scope_flow::{CallbackKind, ManualScheduler, NoopTracer, Scope, ScopeError, Value, Watch};

fn scope_with_scheduler() -> (Scope, Rc<ManualScheduler>) {
    let scheduler = Rc::new(ManualScheduler::new());
    let scope = Scope::builder()
        .scheduler(scheduler.clone())
        .tracer(NoopTracer)
        .build();
    (scope, scheduler)
}

fn count_changes(scope: &Scope, name: &'static str) -> Rc<Cell<u32>> {
    let calls = Rc::new(Cell::new(0));
    let count = calls.clone();
    scope.watch(
        move |scope| Ok(scope.get(name)),
        move |_, _, _| {
            count.set(count.get() + 1);
            Ok(())
        },
    );
    calls
}

fn count_evaluations(scope: &Scope, name: &'static str) -> Rc<Cell<u32>> {
    let runs = Rc::new(Cell::new(0));
    let count = runs.clone();
    scope.watch_with(Watch::new().watch_fn(move |scope| {
        count.set(count.get() + 1);
        Ok(scope.get(name))
    }));
    runs
}

// =============================================================================
// eval / apply
// =============================================================================

#[test]
fn test_eval_returns_result() {
    let scope = Scope::new();
    scope.set("aValue", 42);
    assert_eq!(scope.eval(|scope| scope.get("aValue")), Value::from(42));
}

#[test]
fn test_eval_passes_locals_through() {
    let scope = Scope::new();
    scope.set("aValue", 42);
    let result = scope.eval_with(
        |scope, arg| scope.get("aValue").as_f64().unwrap_or_default() + arg.as_f64().unwrap_or_default(),
        &Value::from(2),
    );
    assert_eq!(result, 44.0);
}

#[test]
fn test_apply_runs_expression_and_digests() {
    let (scope, _) = scope_with_scheduler();
    scope.set("aValue", "someValue");
    let calls = count_changes(&scope, "aValue");

    scope.digest().unwrap();
    assert_eq!(calls.get(), 1);

    let returned = scope
        .apply(|scope| {
            scope.set("aValue", "someOtherValue");
            Ok(7)
        })
        .unwrap();
    assert_eq!(returned, 7);
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_apply_surfaces_ttl_failure() {
    let (scope, _) = scope_with_scheduler();
    let flip = Rc::new(Cell::new(false));
    scope.watch_with(Watch::new().watch_fn(move |_| {
        flip.set(!flip.get());
        Ok(Value::from(flip.get()))
    }));

    let err = scope.apply(|_| Ok(())).unwrap_err();
    assert!(matches!(err, ScopeError::TtlExceeded { .. }));
    assert_eq!(scope.phase(), None);
}

#[test]
fn test_apply_reports_expression_error_when_digest_fails() {
    let collector = Arc::new(EventCollector::new());
    let scope = Scope::builder()
        .tracer(EventSinkTracer::new(collector.clone()))
        .build();
    let flip = Rc::new(Cell::new(false));
    scope.watch_with(Watch::new().watch_fn(move |_| {
        flip.set(!flip.get());
        Ok(Value::from(flip.get()))
    }));

    let err = scope.apply(|_| -> anyhow::Result<()> { anyhow::bail!("bad expression") });
    assert!(err.unwrap_err().is_ttl_exceeded());

    let trace = collector.trace();
    let errors: Vec<_> = trace.errors().collect();
    assert_eq!(errors, vec![(CallbackKind::Apply, "bad expression")]);
}

// =============================================================================
// eval_async
// =============================================================================

#[test]
fn test_eval_async_runs_later_in_the_same_digest() {
    let (scope, _) = scope_with_scheduler();
    scope.set("aValue", Value::array([1, 2, 3]));
    let evaluated_immediately = Rc::new(Cell::new(None));

    let immediately = evaluated_immediately.clone();
    scope.watch(
        |scope| Ok(scope.get("aValue")),
        move |_, _, scope| {
            scope.eval_async(|scope| {
                scope.set("asyncEvaluated", true);
                Ok(())
            });
            immediately.set(Some(scope.get("asyncEvaluated").as_bool() == Some(true)));
            Ok(())
        },
    );

    scope.digest().unwrap();
    assert_eq!(scope.get("asyncEvaluated"), Value::from(true));
    assert_eq!(evaluated_immediately.get(), Some(false));
}

#[test]
fn test_eval_async_from_watch_fn_runs() {
    let (scope, _) = scope_with_scheduler();
    scope.set("aValue", Value::array([1, 2, 3]));

    scope.watch_with(Watch::new().watch_fn(|scope| {
        if scope.get("asyncEvaluated").is_undefined() {
            scope.eval_async(|scope| {
                scope.set("asyncEvaluated", true);
                Ok(())
            });
        }
        Ok(scope.get("aValue"))
    }));

    scope.digest().unwrap();
    assert_eq!(scope.get("asyncEvaluated"), Value::from(true));
}

#[test]
fn test_eval_async_runs_even_when_not_dirty() {
    let (scope, _) = scope_with_scheduler();
    scope.set("times", 0);

    scope.watch_with(Watch::new().watch_fn(|scope| {
        if scope.get("times").as_f64().unwrap_or_default() < 2.0 {
            scope.eval_async(|scope| {
                let times = scope.get("times").as_f64().unwrap_or_default();
                scope.set("times", times + 1.0);
                Ok(())
            });
        }
        Ok(Value::Null)
    }));

    scope.digest().unwrap();
    assert_eq!(scope.get("times"), Value::from(2));
}

#[test]
fn test_endless_eval_async_hits_ttl() {
    let (scope, _) = scope_with_scheduler();
    scope.watch_with(Watch::new().watch_fn(|scope| {
        scope.eval_async(|_| Ok(()));
        Ok(Value::Null)
    }));

    assert!(scope.digest().unwrap_err().is_ttl_exceeded());
}

#[test]
fn test_eval_async_schedules_a_digest() {
    let (scope, scheduler) = scope_with_scheduler();
    scope.set("aValue", "abc");
    let calls = count_changes(&scope, "aValue");

    scope.eval_async(|_| Ok(()));
    assert_eq!(calls.get(), 0);

    scheduler.run_turn();
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_digest_cancels_eval_async_fallback() {
    let (scope, scheduler) = scope_with_scheduler();
    let runs = count_evaluations(&scope, "aValue");

    scope.eval_async(|_| Ok(()));
    assert_eq!(scheduler.pending(), 1);
    scope.digest().unwrap();
    assert_eq!(scheduler.pending(), 0);

    let after_digest = runs.get();
    scheduler.run_until_idle();
    assert_eq!(runs.get(), after_digest);
}

#[test]
fn test_explicit_digests_leave_no_deferred_work_behind() {
    let (scope, scheduler) = scope_with_scheduler();

    for _ in 0..100 {
        scope.eval_async(|_| Ok(()));
        scope.digest().unwrap();
    }
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_eval_async_rearms_after_fallback_ran() {
    let (scope, scheduler) = scope_with_scheduler();
    let ran = Rc::new(Cell::new(0));

    for _ in 0..2 {
        let count = ran.clone();
        scope.eval_async(move |_| {
            count.set(count.get() + 1);
            Ok(())
        });
        assert_eq!(scheduler.pending(), 1);
        scheduler.run_turn();
    }
    assert_eq!(ran.get(), 2);
}

#[test]
fn test_eval_async_inside_digest_arms_no_fallback() {
    let (scope, scheduler) = scope_with_scheduler();
    scope.watch(
        |_| Ok(Value::Null),
        |_, _, scope| {
            scope.eval_async(|_| Ok(()));
            Ok(())
        },
    );

    scope.digest().unwrap();
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn test_eval_async_failures_do_not_stop_the_digest() {
    let (scope, scheduler) = scope_with_scheduler();
    scope.set("value", "a");
    let calls = count_changes(&scope, "value");

    scope.eval_async(|_| anyhow::bail!("broken task"));
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    scope.eval_async(move |_| {
        flag.set(true);
        Ok(())
    });

    scheduler.run_until_idle();
    assert!(ran.get());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_eval_async_tasks_run_in_fifo_order() {
    let (scope, _) = scope_with_scheduler();
    let order = Rc::new(RefCell::new(Vec::new()));

    for i in 0..3 {
        let order = order.clone();
        scope.eval_async(move |scope| {
            order.borrow_mut().push(i);
            if i == 0 {
                let order = order.clone();
                scope.eval_async(move |_| {
                    order.borrow_mut().push(10);
                    Ok(())
                });
            }
            Ok(())
        });
    }

    scope.digest().unwrap();
    assert_eq!(*order.borrow(), vec![0, 1, 2, 10]);
}

// =============================================================================
// apply_async
// =============================================================================

#[test]
fn test_apply_async_runs_on_a_later_turn() {
    let (scope, scheduler) = scope_with_scheduler();
    let calls = count_changes(&scope, "aValue");

    scope.digest().unwrap();
    assert_eq!(calls.get(), 1);

    scope.apply_async(|scope| {
        scope.set("aValue", "abc");
        Ok(())
    });
    assert_eq!(calls.get(), 1);

    scheduler.run_until_idle();
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_apply_async_never_runs_in_the_same_digest() {
    let (scope, scheduler) = scope_with_scheduler();
    scope.set("aValue", Value::array([1, 2, 3]));

    scope.watch(
        |scope| Ok(scope.get("aValue")),
        |_, _, scope| {
            scope.apply_async(|scope| {
                scope.set("asyncApplied", true);
                Ok(())
            });
            Ok(())
        },
    );

    scope.digest().unwrap();
    assert!(scope.get("asyncApplied").is_undefined());

    scheduler.run_until_idle();
    assert_eq!(scope.get("asyncApplied"), Value::from(true));
}

#[test]
fn test_apply_async_coalesces_calls() {
    let (scope, scheduler) = scope_with_scheduler();
    let runs = count_evaluations(&scope, "aValue");

    scope.apply_async(|scope| {
        scope.set("aValue", "abc");
        Ok(())
    });
    scope.apply_async(|scope| {
        scope.set("aValue", "def");
        Ok(())
    });
    assert_eq!(scheduler.pending(), 1);

    scheduler.run_until_idle();
    // One digest: a dirty pass and a confirming pass.
    assert_eq!(runs.get(), 2);
    assert_eq!(scope.get("aValue"), Value::from("def"));
}

#[test]
fn test_digest_cancels_and_flushes_apply_async() {
    let (scope, scheduler) = scope_with_scheduler();
    let runs = count_evaluations(&scope, "aValue");

    scope.apply_async(|scope| {
        scope.set("aValue", "abc");
        Ok(())
    });
    scope.apply_async(|scope| {
        scope.set("aValue", "def");
        Ok(())
    });

    scope.digest().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(scope.get("aValue"), Value::from("def"));
    assert_eq!(scheduler.pending(), 0);

    scheduler.run_until_idle();
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_apply_async_failures_do_not_stop_the_flush() {
    let (scope, scheduler) = scope_with_scheduler();

    scope.apply_async(|_| anyhow::bail!("first"));
    scope.apply_async(|_| anyhow::bail!("second"));
    scope.apply_async(|scope| {
        scope.set("applied", true);
        Ok(())
    });

    scheduler.run_until_idle();
    assert_eq!(scope.get("applied"), Value::from(true));
}

#[test]
fn test_apply_async_rearms_after_flush() {
    let (scope, scheduler) = scope_with_scheduler();
    let calls = count_changes(&scope, "n");

    scope.apply_async(|scope| {
        scope.set("n", 1);
        Ok(())
    });
    scheduler.run_until_idle();
    assert_eq!(calls.get(), 1);

    scope.apply_async(|scope| {
        scope.set("n", 2);
        Ok(())
    });
    assert_eq!(scheduler.pending(), 1);
    scheduler.run_until_idle();
    assert_eq!(calls.get(), 2);
}

// =============================================================================
// post_digest
// =============================================================================

#[test]
fn test_post_digest_runs_once_after_next_digest() {
    let (scope, _) = scope_with_scheduler();
    let runs = Rc::new(Cell::new(0));

    let count = runs.clone();
    scope.post_digest(move || {
        count.set(count.get() + 1);
        Ok(())
    });
    assert_eq!(runs.get(), 0);

    scope.digest().unwrap();
    assert_eq!(runs.get(), 1);

    scope.digest().unwrap();
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_post_digest_is_not_included_in_the_digest() {
    let (scope, _) = scope_with_scheduler();
    scope.set("value", "original");

    let target = scope.clone();
    scope.post_digest(move || {
        target.set("value", "changed");
        Ok(())
    });
    scope.watch(
        |scope| Ok(scope.get("value")),
        |new, _, scope| {
            scope.set("watchedValue", new.clone());
            Ok(())
        },
    );

    scope.digest().unwrap();
    assert_eq!(scope.get("watchedValue"), Value::from("original"));

    scope.digest().unwrap();
    assert_eq!(scope.get("watchedValue"), Value::from("changed"));
}

#[test]
fn test_post_digest_failures_do_not_stop_the_queue() {
    let (scope, _) = scope_with_scheduler();
    let did_run = Rc::new(Cell::new(false));

    scope.post_digest(|| anyhow::bail!("broken"));
    let flag = did_run.clone();
    scope.post_digest(move || {
        flag.set(true);
        Ok(())
    });

    scope.digest().unwrap();
    assert!(did_run.get());
}

#[test]
fn test_post_digest_runs_outside_the_phase() {
    let (scope, _) = scope_with_scheduler();
    let phase = Rc::new(Cell::new(None));

    let target = scope.clone();
    let seen = phase.clone();
    scope.post_digest(move || {
        seen.set(Some(target.phase()));
        Ok(())
    });

    scope.digest().unwrap();
    assert_eq!(phase.get(), Some(None));
}
