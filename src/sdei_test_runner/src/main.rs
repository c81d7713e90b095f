use clap::Parser;
use itertools::Itertools;
use sdei_port_std::SimPlatform;
use sdei_test_suite::{
    platform::non_secure_watchdogs,
    sdei_tests::{self, event_status},
    TestOutcome,
};
use std::time::Duration;
use thiserror::Error;

mod selection;
mod sim;

fn main() {
    let opt = Opt::parse();

    let level = opt.log_level.filter();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(format!(
        "sdei_test_runner=info,sdei_test_suite={level},sdei_port_std={level}"
    )))
    .init();

    if let Err(e) = main_inner(opt) {
        log::error!("Command failed.\n{:?}", e);
        std::process::exit(1);
    }
}

#[derive(Error, Debug)]
enum MainError {
    #[error("The test '{0}' has no runner.")]
    NoRunner(&'static str),
    #[error("The outcomes of '{0}' differ between watchdogs.")]
    Inconsistent(String),
    #[error("Test failed.")]
    TestFail,
}

/// Runs the SDEI test suite against a simulated platform
#[derive(Parser)]
struct Opt {
    /// If specified, only run tests matching one of these filters
    ///
    /// See the documentation of `TestFilter::from_str` for full syntax.
    tests: Vec<selection::TestFilter>,
    /// Print the list of test cases and exit
    #[arg(long = "list")]
    list: bool,
    /// The security of each simulated watchdog, from index 0
    #[arg(long = "watchdogs", value_enum, value_delimiter = ',', default_value = "ns")]
    watchdogs: Vec<sim::WatchdogKind>,
    /// Make the simulated platform misbehave
    #[arg(long = "fault", value_enum)]
    faults: Vec<sim::Fault>,
    /// The duration of one watchdog tick in microseconds
    #[arg(long = "tick-us", default_value_t = 100)]
    tick_us: u64,
    /// The index of the simulated PE
    #[arg(long = "pe-index", default_value_t = 0)]
    pe_index: usize,
    /// The WS0 timeout in watchdog ticks
    #[arg(long = "expire-ticks", default_value_t = 1)]
    expire_ticks: u64,
    /// The number of polls for the watchdog interrupt
    #[arg(long = "interrupt-timeout", default_value_t = event_status::WATCHDOG_TIMEOUT)]
    interrupt_timeout: u64,
    /// The number of polls for the event to stop running
    #[arg(long = "settle-timeout", default_value_t = event_status::SETTLE_TIMEOUT)]
    settle_timeout: u64,
    /// Run the test on every non-secure watchdog and check that the outcomes
    /// agree
    #[arg(long = "all-devices")]
    all_devices: bool,
    /// Log level of the test suite and the simulated platform
    #[arg(short = 'l', long = "log-level", value_enum, ignore_case = true, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn main_inner(opt: Opt) -> anyhow::Result<()> {
    // If `--list` is specified, print all test cases and exit
    if opt.list {
        println!("Test cases:");
        for case in sdei_tests::TESTS {
            println!("  {:03} {:20}{}", case.id, case.name, case.description);
        }
        return Ok(());
    }

    let test_filter = if opt.tests.is_empty() {
        selection::TestFilter::Pass
    } else {
        selection::TestFilter::Disjuction(opt.tests.clone())
    };
    let cases: Vec<_> = test_filter.all_matching_cases().collect();

    log::info!("Performing {} test case(s)", cases.len());
    if !opt.faults.is_empty() {
        log::info!(
            "Injected faults: {}",
            opt.faults.iter().map(|f| format!("{f:?}")).join(", ")
        );
    }

    let mut num_runs = 0;
    let mut failed_tests = Vec::new();

    for case in cases {
        log::info!(" - sdei_tests::{}", case.name);

        let results = match case.name {
            name if name == event_status::META.name => run_event_status(&opt),
            name => return Err(MainError::NoRunner(name).into()),
        };

        if opt.all_devices && !results.iter().map(|(_, outcome)| outcome).all_equal() {
            log::error!(
                "Outcomes: {}",
                results
                    .iter()
                    .map(|(run, outcome)| format!("{run}: {outcome}"))
                    .join(", ")
            );
            return Err(MainError::Inconsistent(case.name.to_owned()).into());
        }

        for (test_run, outcome) in results {
            num_runs += 1;
            if outcome.is_pass() {
                log::info!("Test run '{}' was successful", test_run);
            } else {
                log::error!("Test run '{}' failed: {}", test_run, outcome);
                failed_tests.push(test_run.to_string());
            }
        }
    }

    log::info!(
        "Summary: {} success, {} fail",
        num_runs - failed_tests.len(),
        failed_tests.len(),
    );

    if !failed_tests.is_empty() {
        log::error!("Failed tests:");

        for test_run_name in failed_tests {
            log::error!(" - {}", test_run_name);
        }

        return Err(MainError::TestFail.into());
    }

    Ok(())
}

fn run_event_status(opt: &Opt) -> Vec<(selection::TestRun, TestOutcome)> {
    let sim_config = sim::sim_config(
        &opt.watchdogs,
        &opt.faults,
        Duration::from_micros(opt.tick_us),
        opt.pe_index,
    );
    let config = event_status::Config::DEFAULT
        .with_timer_expire_ticks(opt.expire_ticks)
        .with_interrupt_timeout(opt.interrupt_timeout)
        .with_settle_timeout(opt.settle_timeout);

    // The handler argument must outlive the registration, which the
    // dispatcher may keep if the test case fails
    let check: &'static _ = Box::leak(Box::new(event_status::EventStatusCheck::new(
        SimPlatform::new(sim_config),
        config,
    )));

    let results = if opt.all_devices {
        let indices: Vec<usize> = non_secure_watchdogs(check.platform())
            .map(|(index, _)| index)
            .collect();
        if indices.is_empty() {
            log::error!("No non-secure Watchdogs reported");
            check.platform().shutdown();
            let run = selection::TestRun {
                case: &event_status::META,
                watchdog: None,
            };
            return vec![(run, TestOutcome::Fail)];
        }
        indices
            .into_iter()
            .map(|index| {
                let run = selection::TestRun {
                    case: &event_status::META,
                    watchdog: Some(index),
                };
                (run, check.run_on_watchdog(index))
            })
            .collect()
    } else {
        let run = selection::TestRun {
            case: &event_status::META,
            watchdog: None,
        };
        vec![(run, check.run())]
    };

    check.platform().shutdown();
    results
}
