//! Command-line description of the simulated platform
use sdei_port_std::{Faults, SimConfig, WatchdogDesc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum WatchdogKind {
    /// Non-secure
    Ns,
    /// Secure
    S,
}

/// A deviation from a conforming platform. See [`Faults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Fault {
    GicDisableFails,
    MapFails,
    BindFails,
    ReportsRegisteredEarly,
    RegisterFails,
    EnableFails,
    EnableIgnored,
    TimerDead,
    HidesRunning,
    UnregisterImmediate,
    StuckRegistered,
    CompleteIgnored,
    UnregisterFails,
    ReleaseFails,
    StatusFails,
    ReportsEnabledEarly,
    PendingReportsRegistered,
    DeniesRunningUnregister,
}

impl From<Fault> for Faults {
    fn from(x: Fault) -> Self {
        match x {
            Fault::GicDisableFails => Faults::GIC_DISABLE_FAILS,
            Fault::MapFails => Faults::MAP_FAILS,
            Fault::BindFails => Faults::BIND_FAILS,
            Fault::ReportsRegisteredEarly => Faults::REPORTS_REGISTERED_EARLY,
            Fault::RegisterFails => Faults::REGISTER_FAILS,
            Fault::EnableFails => Faults::ENABLE_FAILS,
            Fault::EnableIgnored => Faults::ENABLE_IGNORED,
            Fault::TimerDead => Faults::TIMER_DEAD,
            Fault::HidesRunning => Faults::HIDES_RUNNING,
            Fault::UnregisterImmediate => Faults::UNREGISTER_IMMEDIATE,
            Fault::StuckRegistered => Faults::STUCK_REGISTERED,
            Fault::CompleteIgnored => Faults::COMPLETE_IGNORED,
            Fault::UnregisterFails => Faults::UNREGISTER_FAILS,
            Fault::ReleaseFails => Faults::RELEASE_FAILS,
            Fault::StatusFails => Faults::STATUS_FAILS,
            Fault::ReportsEnabledEarly => Faults::REPORTS_ENABLED_EARLY,
            Fault::PendingReportsRegistered => Faults::PENDING_REPORTS_REGISTERED,
            Fault::DeniesRunningUnregister => Faults::DENIES_RUNNING_UNREGISTER,
        }
    }
}

pub(crate) fn sim_config(
    watchdogs: &[WatchdogKind],
    faults: &[Fault],
    tick: Duration,
    pe_index: usize,
) -> SimConfig {
    let watchdogs = watchdogs.iter().enumerate().map(|(i, kind)| match kind {
        WatchdogKind::Ns => WatchdogDesc::non_secure(i),
        WatchdogKind::S => WatchdogDesc::secure(i),
    });
    let faults = faults
        .iter()
        .fold(Faults::empty(), |acc, &fault| acc | Faults::from(fault));

    SimConfig::default()
        .with_watchdogs(watchdogs)
        .with_tick(tick)
        .with_pe_index(pe_index)
        .with_faults(faults)
}
