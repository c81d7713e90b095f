//! Runs the test cases defined in `sdei_test_suite` against the simulated
//! platform.
use sdei_port_std::{Faults, SimConfig, SimPlatform};
use sdei_test_suite::{
    sdei_tests::event_status::{Config, EventStatusCheck, WATCHDOG_TIMEOUT},
    TestOutcome,
};

/// A poll budget for waits that are expected to succeed. Generous because
/// the timer thread may be descheduled while the host is busy.
pub const GENEROUS_TIMEOUT: u64 = WATCHDOG_TIMEOUT * 16;

/// A poll budget for waits that are expected to time out.
pub const SHORT_TIMEOUT: u64 = 0x400;

pub struct SimTestUtil {
    pub check: &'static EventStatusCheck<SimPlatform>,
}

impl SimTestUtil {
    pub fn new(sim_config: SimConfig, config: Config) -> Self {
        sdei_port_std::init_logger();

        let check = Box::leak(Box::new(EventStatusCheck::new(
            SimPlatform::new(sim_config),
            config,
        )));
        Self { check }
    }

    /// A conforming single-watchdog platform with `faults` applied.
    pub fn with_faults(faults: Faults) -> Self {
        Self::new(SimConfig::default().with_faults(faults), default_config())
    }

    pub fn platform(&self) -> &'static SimPlatform {
        self.check.platform()
    }

    /// Run the test case and stop the interrupt context. Resumes any panic
    /// that occurred in the interrupt context.
    pub fn run(&self) -> TestOutcome {
        let outcome = self.check.run();
        self.platform().shutdown();
        outcome
    }
}

pub fn default_config() -> Config {
    Config::DEFAULT
        .with_interrupt_timeout(GENEROUS_TIMEOUT)
        .with_settle_timeout(GENEROUS_TIMEOUT)
}

mod sdei_tests {
    pub mod event_status;
    pub mod event_status_faults;
    pub mod watchdog_selection;
}

macro_rules! instantiate_outcome_tests {
    ( $(
        {
            name_ident: $name_ident:ident,
            faults: $faults:expr,
            outcome: $outcome:ident,
            $($rest:tt)*
        },
    )* ) => {$(
        mod $name_ident {
            use super::*;

            #[test]
            fn run() {
                let util = SimTestUtil::with_faults($faults);
                assert_eq!(util.run(), TestOutcome::$outcome);
                assert_eq!(util.platform().published(), [(0, TestOutcome::$outcome)]);
                assert!(util.platform().live_mappings().is_empty());
            }
        }
    )*};
}

instantiate_outcome_tests!(
    { name_ident: conforming, faults: Faults::empty(), outcome: Pass, },
    { name_ident: gic_disable_fails, faults: Faults::GIC_DISABLE_FAILS, outcome: Fail, },
    { name_ident: map_fails, faults: Faults::MAP_FAILS, outcome: Fail, },
    { name_ident: bind_fails, faults: Faults::BIND_FAILS, outcome: Fail, },
    {
        name_ident: reports_registered_early,
        faults: Faults::REPORTS_REGISTERED_EARLY,
        outcome: Fail,
    },
    { name_ident: register_fails, faults: Faults::REGISTER_FAILS, outcome: Fail, },
    { name_ident: reports_enabled_early, faults: Faults::REPORTS_ENABLED_EARLY, outcome: Fail, },
    { name_ident: enable_fails, faults: Faults::ENABLE_FAILS, outcome: Fail, },
    { name_ident: enable_ignored, faults: Faults::ENABLE_IGNORED, outcome: Fail, },
    { name_ident: hides_running, faults: Faults::HIDES_RUNNING, outcome: Fail, },
    { name_ident: unregister_immediate, faults: Faults::UNREGISTER_IMMEDIATE, outcome: Fail, },
    { name_ident: unregister_fails, faults: Faults::UNREGISTER_FAILS, outcome: Fail, },
    {
        name_ident: denies_running_unregister,
        faults: Faults::DENIES_RUNNING_UNREGISTER,
        outcome: Fail,
    },
    {
        name_ident: pending_reports_registered,
        faults: Faults::PENDING_REPORTS_REGISTERED,
        outcome: Pass,
    },
    { name_ident: stuck_registered, faults: Faults::STUCK_REGISTERED, outcome: Error, },
    { name_ident: release_fails, faults: Faults::RELEASE_FAILS, outcome: Fail, },
    { name_ident: status_fails, faults: Faults::STATUS_FAILS, outcome: Fail, },
);
