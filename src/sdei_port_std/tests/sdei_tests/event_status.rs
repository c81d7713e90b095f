//! Checks the exact sequence of platform calls made by the event status test
use sdei_port_std::{Call, Context, Faults, Op, WatchdogDesc, FIRST_BOUND_EVENT_NUM, VA_OFFSET};
use sdei_test_suite::{platform::VirtAddr, TestOutcome};

use crate::SimTestUtil;

fn ops_in(calls: &[Call], context: Context) -> Vec<Op> {
    calls
        .iter()
        .filter(|c| c.context == context)
        .map(|c| c.op)
        .collect()
}

#[test]
fn conforming_trace() {
    let util = SimTestUtil::with_faults(Faults::empty());
    assert_eq!(util.run(), TestOutcome::Pass);

    let desc = WatchdogDesc::non_secure(0);
    let event = FIRST_BOUND_EVENT_NUM;
    let calls = util.platform().calls();

    let task = ops_in(&calls, Context::Task);
    assert_eq!(
        task[..9],
        [
            Op::PaToVa(desc.ctrl_base),
            Op::DisableInterrupt(desc.gsiv),
            Op::InterruptBind(desc.gsiv),
            Op::EventStatus(event),
            Op::EventRegister(event),
            Op::EventStatus(event),
            Op::EventEnable(event),
            Op::EventStatus(event),
            Op::SetWs0 { index: 0, ticks: 1 },
        ]
    );
    // Polls until `RUNNING` clears
    assert!(task[9..task.len() - 3]
        .iter()
        .all(|op| *op == Op::EventStatus(event)));
    assert_eq!(
        task[task.len() - 3..],
        [
            Op::InterruptRelease(event),
            Op::VaFree(VirtAddr(VA_OFFSET + desc.ctrl_base.0 as usize)),
            Op::SetTestStatus {
                pe_index: 0,
                outcome: TestOutcome::Pass
            },
        ]
    );

    // The handler stops the watchdog before anything else and unregisters
    // the event exactly once
    assert_eq!(
        ops_in(&calls, Context::Interrupt),
        [
            Op::Deliver(event),
            Op::SetWs0 { index: 0, ticks: 0 },
            Op::EventStatus(event),
            Op::EventUnregister(event),
            Op::EventStatus(event),
            Op::Complete(event),
        ]
    );

    assert!(util.platform().bound_events().is_empty());
    assert!(util.platform().live_mappings().is_empty());
}

#[test]
fn registered_too_early_releases_binding() {
    let util = SimTestUtil::with_faults(Faults::REPORTS_REGISTERED_EARLY);
    assert_eq!(util.run(), TestOutcome::Fail);

    let ops = util.platform().ops();
    assert!(!ops.iter().any(|op| matches!(op, Op::EventRegister(_))));
    assert!(ops.contains(&Op::InterruptRelease(FIRST_BOUND_EVENT_NUM)));
    assert!(util.platform().bound_events().is_empty());
}

#[test]
fn bind_failure_skips_register_and_release() {
    let util = SimTestUtil::with_faults(Faults::BIND_FAILS);
    assert_eq!(util.run(), TestOutcome::Fail);

    let ops = util.platform().ops();
    assert!(!ops.iter().any(|op| matches!(
        op,
        Op::EventRegister(_) | Op::EventUnregister(_) | Op::InterruptRelease(_)
    )));
    assert!(ops.iter().any(|op| matches!(op, Op::VaFree(_))));
}

#[test]
fn map_failure_touches_nothing_else() {
    let util = SimTestUtil::with_faults(Faults::MAP_FAILS);
    assert_eq!(util.run(), TestOutcome::Fail);

    assert_eq!(
        util.platform().ops(),
        [
            Op::PaToVa(WatchdogDesc::non_secure(0).ctrl_base),
            Op::SetTestStatus {
                pe_index: 0,
                outcome: TestOutcome::Fail
            },
        ]
    );
}

#[test]
fn gic_failure_frees_mapping() {
    let util = SimTestUtil::with_faults(Faults::GIC_DISABLE_FAILS);
    assert_eq!(util.run(), TestOutcome::Fail);

    let ops = util.platform().ops();
    assert!(!ops.iter().any(|op| matches!(op, Op::InterruptBind(_))));
    assert!(ops.iter().any(|op| matches!(op, Op::VaFree(_))));
    assert!(util.platform().live_mappings().is_empty());
}

#[test]
fn enabled_too_early_unwinds_registration() {
    let util = SimTestUtil::with_faults(Faults::REPORTS_ENABLED_EARLY);
    assert_eq!(util.run(), TestOutcome::Fail);

    let event = FIRST_BOUND_EVENT_NUM;
    let ops = util.platform().ops();
    let register = ops
        .iter()
        .position(|op| *op == Op::EventRegister(event))
        .unwrap();
    // Fails at the Handler-Registered check, before enabling
    assert_eq!(
        ops[register + 1..],
        [
            Op::EventStatus(event),
            Op::EventUnregister(event),
            Op::InterruptRelease(event),
            Op::VaFree(VirtAddr(VA_OFFSET + WatchdogDesc::non_secure(0).ctrl_base.0 as usize)),
            Op::SetTestStatus {
                pe_index: 0,
                outcome: TestOutcome::Fail
            },
        ]
    );
    assert!(util.platform().bound_events().is_empty());
}

#[test]
fn enable_ignored_cleans_up() {
    let util = SimTestUtil::with_faults(Faults::ENABLE_IGNORED);
    assert_eq!(util.run(), TestOutcome::Fail);

    let ops = util.platform().ops();
    // Never armed
    assert!(!ops.iter().any(|op| matches!(op, Op::SetWs0 { .. })));
    assert!(ops.contains(&Op::EventUnregister(FIRST_BOUND_EVENT_NUM)));
    assert!(ops.contains(&Op::InterruptRelease(FIRST_BOUND_EVENT_NUM)));
    assert!(util.platform().bound_events().is_empty());
}

#[test]
fn outcome_is_reported_for_configured_pe() {
    let util = SimTestUtil::new(
        sdei_port_std::SimConfig::default().with_pe_index(3),
        crate::default_config(),
    );
    assert_eq!(util.run(), TestOutcome::Pass);
    assert_eq!(util.platform().published(), [(3, TestOutcome::Pass)]);
}
