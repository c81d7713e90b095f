//! Watchdog selection and the per-device entry point
use quickcheck_macros::quickcheck;
use sdei_port_std::{Op, SimConfig, WatchdogDesc};
use sdei_test_suite::TestOutcome;

use crate::{default_config, SimTestUtil};

fn table(secure: &[bool]) -> Vec<WatchdogDesc> {
    secure
        .iter()
        .enumerate()
        .map(|(i, &is_secure)| {
            if is_secure {
                WatchdogDesc::secure(i)
            } else {
                WatchdogDesc::non_secure(i)
            }
        })
        .collect()
}

fn util_with_table(secure: &[bool]) -> SimTestUtil {
    SimTestUtil::new(
        SimConfig::default().with_watchdogs(table(secure)),
        default_config(),
    )
}

fn assert_no_device_fails(secure: &[bool]) {
    let util = util_with_table(secure);
    assert_eq!(util.run(), TestOutcome::Fail);
    assert_eq!(
        util.platform().ops(),
        [Op::SetTestStatus {
            pe_index: 0,
            outcome: TestOutcome::Fail
        }]
    );
}

#[test]
fn empty_table() {
    assert_no_device_fails(&[]);
}

#[test]
fn all_secure() {
    assert_no_device_fails(&[true, true, true]);
}

#[test]
fn last_non_secure_is_selected() {
    let util = util_with_table(&[false, false, true]);
    assert_eq!(util.run(), TestOutcome::Pass);

    let ops = util.platform().ops();
    let desc = WatchdogDesc::non_secure(1);
    assert_eq!(ops[0], Op::PaToVa(desc.ctrl_base));
    assert!(ops.contains(&Op::InterruptBind(desc.gsiv)));
    assert!(ops.contains(&Op::SetWs0 { index: 1, ticks: 1 }));
}

#[test]
fn every_non_secure_device_passes() {
    let secure = [false, true, false, false];
    let util = util_with_table(&secure);

    for (index, _) in secure.iter().enumerate().filter(|&(_, &s)| !s) {
        assert_eq!(util.check.run_on_watchdog(index), TestOutcome::Pass);
    }
    // Repeating a device gives the same outcome
    assert_eq!(util.check.run_on_watchdog(0), TestOutcome::Pass);
    util.platform().shutdown();

    // Nothing is published by the per-device entry point
    assert!(util.platform().published().is_empty());
    assert!(util.platform().bound_events().is_empty());
    assert!(util.platform().live_mappings().is_empty());
}

#[test]
fn secure_or_missing_device_is_rejected() {
    let util = util_with_table(&[true]);
    assert_eq!(util.check.run_on_watchdog(0), TestOutcome::Fail);
    assert_eq!(util.check.run_on_watchdog(1), TestOutcome::Fail);
    util.platform().shutdown();
    assert!(util.platform().ops().is_empty());
}

#[quickcheck]
fn selected_device_matches_table(secure: Vec<bool>) -> bool {
    let secure = &secure[..secure.len().min(6)];
    let util = util_with_table(secure);
    let outcome = util.run();
    let mapped = util.platform().ops().iter().find_map(|op| match *op {
        Op::PaToVa(pa) => Some(pa),
        _ => None,
    });

    match secure.iter().rposition(|&s| !s) {
        Some(index) => {
            outcome == TestOutcome::Pass
                && mapped == Some(WatchdogDesc::non_secure(index).ctrl_base)
        }
        None => outcome == TestOutcome::Fail && mapped.is_none(),
    }
}
