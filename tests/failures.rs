use spark_observe::{
    EffectOptions, EffectState, Field, ReactiveError, Runtime, RuntimeConfig, cloned, field,
};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

struct Job {
    attempt: u32,
    status: String,
}

const ATTEMPT: Field<Job, u32> = field!(Job, attempt);
const STATUS: Field<Job, String> = field!(Job, status);

struct PingPong {
    ping: u32,
    pong: u32,
}

const PING: Field<PingPong, u32> = field!(PingPong, ping);
const PONG: Field<PingPong, u32> = field!(PingPong, pong);

struct Stage {
    input: i32,
    output: i32,
}

const INPUT: Field<Stage, i32> = field!(Stage, input);
const OUTPUT: Field<Stage, i32> = field!(Stage, output);

fn job(rt: &Runtime) -> spark_observe::Observed<Job> {
    rt.observe(Job {
        attempt: 0,
        status: "idle".into(),
    })
}

#[test]
fn test_first_run_panic_is_returned() {
    let rt = Runtime::new();
    let err = rt.register_effect(|| panic!("boom")).unwrap_err();

    match err {
        ReactiveError::EffectPanicked { message, .. } => assert_eq!(message, "boom"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!rt.is_tracking(), "active-effect stack restored");
}

#[test]
fn test_panic_during_flush_is_recorded_and_isolated() {
    let rt = Runtime::new();
    let work = job(&rt);
    let healthy_runs = Rc::new(Cell::new(0));

    let flaky = rt
        .register_effect(cloned!(work => move || {
            let attempt = work.get(&ATTEMPT);
            if attempt == 1 {
                panic!("attempt {attempt} exploded");
            }
        }))
        .unwrap();

    rt.register_effect(cloned!(work, healthy_runs => move || {
        let _ = work.get(&ATTEMPT);
        healthy_runs.set(healthy_runs.get() + 1);
    }))
    .unwrap();

    work.set(&ATTEMPT, 1);
    rt.tick();

    // The other effect in the same flush still ran
    assert_eq!(healthy_runs.get(), 2);

    let failures = rt.take_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].effect(), Some(flaky.id()));
    assert_eq!(
        failures[0].to_string(),
        format!("{} panicked: attempt 1 exploded", flaky.id())
    );
    assert!(rt.take_failures().is_empty());

    assert_eq!(flaky.state(), EffectState::Idle);
    assert!(!rt.is_flush_pending());

    // Reads made before the panic are still tracked
    work.set(&ATTEMPT, 2);
    rt.tick();
    assert_eq!(flaky.run_count(), 3);
    assert!(rt.take_failures().is_empty());
}

#[test]
fn test_later_effects_track_correctly_after_panic() {
    let rt = Runtime::new();
    let work = job(&rt);

    let _ = rt.register_effect(cloned!(work => move || {
        let _ = work.get(&ATTEMPT);
        panic!("always");
    }));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let effect = rt
        .register_effect(cloned!(work, seen => move || {
            seen.borrow_mut().push(work.get(&STATUS));
        }))
        .unwrap();

    // Only the status field, nothing leaked from the panicked effect
    assert_eq!(effect.dependency_count(), 1);
    assert_eq!(work.subscriber_count("status"), 1);

    work.set(&STATUS, "running".into());
    rt.tick();
    assert_eq!(
        *seen.borrow(),
        vec!["idle".to_string(), "running".to_string()]
    );
}

#[test]
fn test_fallible_effect_error_during_flush() {
    let rt = Runtime::new();
    let work = job(&rt);

    let effect = rt
        .try_register_effect(
            cloned!(work => move || {
                let status = work.get(&STATUS);
                if status == "failed" {
                    anyhow::bail!("job reported {status}");
                }
                Ok(())
            }),
            EffectOptions::new(),
        )
        .unwrap();

    work.set(&STATUS, "failed".into());
    rt.tick();

    let failures = rt.take_failures();
    assert_eq!(failures.len(), 1);
    match &failures[0] {
        ReactiveError::EffectFailed { effect: id, source } => {
            assert_eq!(*id, effect.id());
            assert_eq!(source.to_string(), "job reported failed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_uncaught_panic_still_restores_runtime() {
    let rt = Runtime::with_config(RuntimeConfig::default().with_catch_panics(false));
    assert!(!rt.config().catch_panics);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = rt.register_effect(|| panic!("propagated"));
    }));
    assert!(result.is_err());
    assert!(!rt.is_tracking());

    let work = job(&rt);
    let effect = rt
        .register_effect(cloned!(work => move || {
            let _ = work.get(&ATTEMPT);
        }))
        .unwrap();
    assert_eq!(effect.dependency_count(), 1);
}

#[test]
fn test_uncaught_panic_in_flush_reschedules_queued_effects() {
    let rt = Runtime::with_config(RuntimeConfig::default().with_catch_panics(false));
    let stage = rt.observe(Stage { input: 0, output: 0 });
    let after_runs = Rc::new(Cell::new(0));
    let reader_runs = Rc::new(Cell::new(0));

    // Copies input to output
    rt.register_effect(cloned!(stage => move || {
        let n = stage.get(&INPUT);
        stage.set(&OUTPUT, n);
    }))
    .unwrap();

    rt.register_effect(cloned!(stage => move || {
        if stage.get(&INPUT) == 1 {
            panic!("bad input");
        }
    }))
    .unwrap();

    // Queued behind the panicking effect in the same cycle
    let after = rt
        .register_effect(cloned!(stage, after_runs => move || {
            let _ = stage.get(&INPUT);
            after_runs.set(after_runs.get() + 1);
        }))
        .unwrap();

    // Queued by the copy while the cycle was running
    let reader = rt
        .register_effect(cloned!(stage, reader_runs => move || {
            let _ = stage.get(&OUTPUT);
            reader_runs.set(reader_runs.get() + 1);
        }))
        .unwrap();

    stage.set(&INPUT, 1);
    let result = panic::catch_unwind(AssertUnwindSafe(|| rt.tick()));
    assert!(result.is_err());

    assert!(!rt.is_tracking());
    assert!(rt.is_flush_pending());
    assert_eq!(rt.queued_effect_count(), 2);
    assert_eq!(after.state(), EffectState::Queued);
    assert_eq!(reader.state(), EffectState::Queued);
    assert_eq!(after_runs.get(), 1);
    assert_eq!(reader_runs.get(), 1);

    assert_eq!(rt.tick(), 1);
    assert_eq!(after_runs.get(), 2, "the unrun job keeps its write");
    assert_eq!(reader_runs.get(), 2);
    assert_eq!(reader.state(), EffectState::Idle);

    // Later writes still reach the reader
    stage.set(&OUTPUT, 5);
    rt.tick();
    assert_eq!(reader_runs.get(), 3);
}

#[test]
fn test_ping_pong_effects_hit_flush_limit() {
    let rt = Runtime::with_config(RuntimeConfig::default().with_max_chained_flushes(5));
    let pair = rt.observe(PingPong { ping: 0, pong: 0 });

    let ping = rt
        .register_effect(cloned!(pair => move || {
            let n = pair.get(&PING);
            pair.set(&PONG, n + 1);
        }))
        .unwrap();
    let pong = rt
        .register_effect(cloned!(pair => move || {
            let n = pair.get(&PONG);
            pair.set(&PING, n + 1);
        }))
        .unwrap();

    // One initial flush plus five chained ones
    assert_eq!(rt.tick(), 6);
    assert_eq!(ping.run_count(), 4);
    assert_eq!(pong.run_count(), 4);

    let failures = rt.take_failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        ReactiveError::FlushLimitExceeded { limit: 5, dropped: 1 }
    ));

    assert!(!rt.is_flush_pending());
    assert_eq!(rt.queued_effect_count(), 0);
    assert_eq!(ping.state(), EffectState::Idle);

    // The runtime recovers once the cycle is broken
    pair.set(&PING, 100);
    assert_eq!(rt.tick(), 6);
}

#[test]
fn test_dropped_record_leaves_store() {
    let rt = Runtime::new();
    let slot = Rc::new(RefCell::new(Some(job(&rt))));

    let effect = rt
        .register_effect(cloned!(slot => move || {
            if let Some(work) = slot.borrow().as_ref() {
                let _ = work.get(&ATTEMPT);
                let _ = work.get(&STATUS);
            }
        }))
        .unwrap();
    assert_eq!(rt.tracked_record_count(), 1);
    assert_eq!(effect.dependency_count(), 2);

    // Last handle gone: the record's dependency sets go with it
    slot.borrow_mut().take();
    assert_eq!(rt.tracked_record_count(), 0);
    assert_eq!(effect.dependency_count(), 0);
    assert_eq!(effect.state(), EffectState::Idle);
}
