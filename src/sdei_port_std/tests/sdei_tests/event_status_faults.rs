//! Dispatcher and watchdog misbehavior observed after the watchdog is armed
use sdei_port_std::{Context, Faults, Op, SimConfig, FIRST_BOUND_EVENT_NUM};
use sdei_test_suite::TestOutcome;

use crate::{default_config, SimTestUtil, SHORT_TIMEOUT};

const EVENT: u32 = FIRST_BOUND_EVENT_NUM;

#[test]
fn dead_watchdog_times_out() {
    let util = SimTestUtil::new(
        SimConfig::default().with_faults(Faults::TIMER_DEAD),
        default_config().with_interrupt_timeout(SHORT_TIMEOUT),
    );
    assert_eq!(util.run(), TestOutcome::Fail);

    let calls = util.platform().calls();
    assert!(calls.iter().all(|c| c.context == Context::Task));

    let ops: Vec<Op> = calls.iter().map(|c| c.op).collect();
    let arm = ops
        .iter()
        .position(|op| *op == Op::SetWs0 { index: 0, ticks: 1 })
        .unwrap();
    assert_eq!(ops[arm + 1], Op::SetWs0 { index: 0, ticks: 0 });
    assert_eq!(ops[arm + 2], Op::EventUnregister(EVENT));
    assert_eq!(ops[arm + 3], Op::InterruptRelease(EVENT));
    assert!(!ops.iter().any(|op| matches!(op, Op::Deliver(_))));

    assert!(util.platform().bound_events().is_empty());
    assert!(util.platform().live_mappings().is_empty());
}

#[test]
fn event_stays_running() {
    let util = SimTestUtil::new(
        SimConfig::default().with_faults(Faults::COMPLETE_IGNORED),
        default_config().with_settle_timeout(SHORT_TIMEOUT),
    );
    assert_eq!(util.run(), TestOutcome::Fail);

    let ops = util.platform().ops();
    let releases = ops
        .iter()
        .filter(|op| **op == Op::InterruptRelease(EVENT))
        .count();
    assert_eq!(releases, 1);
    // The release was denied, so the binding is still there
    assert_eq!(util.platform().bound_events(), [EVENT]);
}

#[test]
fn stuck_registration_is_an_error() {
    let util = SimTestUtil::with_faults(Faults::STUCK_REGISTERED);
    assert_eq!(util.run(), TestOutcome::Error);
    assert_eq!(util.platform().published(), [(0, TestOutcome::Error)]);

    let calls = util.platform().calls();
    assert!(!calls
        .iter()
        .any(|c| matches!(c.op, Op::InterruptRelease(_))));

    // The handler unregisters first, then the cleanup tries again
    let unregisters: Vec<Context> = calls
        .iter()
        .filter(|c| c.op == Op::EventUnregister(EVENT))
        .map(|c| c.context)
        .collect();
    assert_eq!(unregisters, [Context::Interrupt, Context::Task]);

    assert_eq!(util.platform().bound_events(), [EVENT]);
    assert!(util.platform().live_mappings().is_empty());
}

#[test]
fn immediate_unregistration_fails() {
    let util = SimTestUtil::with_faults(Faults::UNREGISTER_IMMEDIATE);
    assert_eq!(util.run(), TestOutcome::Fail);

    // The handler's unregistration took effect, so the cleanup has nothing
    // to unregister
    let unregisters = util
        .platform()
        .calls()
        .iter()
        .filter(|c| c.op == Op::EventUnregister(EVENT))
        .count();
    assert_eq!(unregisters, 1);
    assert!(util.platform().bound_events().is_empty());
}

#[test]
fn release_failure_is_not_retried() {
    let util = SimTestUtil::with_faults(Faults::RELEASE_FAILS);
    assert_eq!(util.run(), TestOutcome::Fail);

    let releases = util
        .platform()
        .ops()
        .iter()
        .filter(|op| **op == Op::InterruptRelease(EVENT))
        .count();
    assert_eq!(releases, 1);
    assert!(util.platform().live_mappings().is_empty());
}

#[test]
fn hidden_running_bit_fails_in_handler() {
    let util = SimTestUtil::with_faults(Faults::HIDES_RUNNING);
    assert_eq!(util.run(), TestOutcome::Fail);

    // Both in-handler checks ran regardless
    let handler_queries = util
        .platform()
        .calls()
        .iter()
        .filter(|c| c.context == Context::Interrupt && c.op == Op::EventStatus(EVENT))
        .count();
    assert_eq!(handler_queries, 2);
}

#[test]
fn settle_budget_exhausted_while_registered() {
    let util = SimTestUtil::new(
        SimConfig::default()
            .with_faults(Faults::COMPLETE_IGNORED | Faults::PENDING_REPORTS_REGISTERED),
        default_config().with_settle_timeout(SHORT_TIMEOUT),
    );
    assert_eq!(util.run(), TestOutcome::Error);
    assert_eq!(util.platform().published(), [(0, TestOutcome::Error)]);

    let ops = util.platform().ops();
    assert!(!ops.iter().any(|op| matches!(op, Op::InterruptRelease(_))));
    assert_eq!(util.platform().bound_events(), [EVENT]);
}

#[test]
fn denied_unregistration_in_handler_is_unwound() {
    let util = SimTestUtil::with_faults(Faults::DENIES_RUNNING_UNREGISTER);
    assert_eq!(util.run(), TestOutcome::Fail);
    assert_eq!(util.platform().published(), [(0, TestOutcome::Fail)]);

    // The handler's attempt is denied, so the cleanup unregisters the idle
    // event and releases the binding
    let calls = util.platform().calls();
    let unregisters: Vec<Context> = calls
        .iter()
        .filter(|c| c.op == Op::EventUnregister(EVENT))
        .map(|c| c.context)
        .collect();
    assert_eq!(unregisters, [Context::Interrupt, Context::Task]);
    assert!(calls
        .iter()
        .any(|c| c.context == Context::Task && c.op == Op::InterruptRelease(EVENT)));

    assert!(util.platform().bound_events().is_empty());
    assert!(util.platform().live_mappings().is_empty());
}

#[test]
fn failed_unregistration_still_attempts_release() {
    let util = SimTestUtil::with_faults(Faults::UNREGISTER_FAILS);
    assert_eq!(util.run(), TestOutcome::Fail);

    let releases = util
        .platform()
        .ops()
        .iter()
        .filter(|op| **op == Op::InterruptRelease(EVENT))
        .count();
    assert_eq!(releases, 1);
    assert!(util.platform().live_mappings().is_empty());
}
