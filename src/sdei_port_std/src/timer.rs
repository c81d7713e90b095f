//! The watchdog timer thread, which also serves as the interrupt context
use std::{
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Instant,
};

use crate::{Inner, ThreadRole, THREAD_ROLE};

pub(crate) enum TimerCmd {
    /// Assert the watchdog's WS0 signal at `at`.
    Arm { index: usize, at: Instant },
    Disarm { index: usize },
}

pub(crate) fn spawn(inner: Arc<Inner>, timer_cmd_recv: mpsc::Receiver<TimerCmd>) -> JoinHandle<()> {
    log::trace!("starting the timer thread");
    thread::Builder::new()
        .name("sdei-interrupt".to_owned())
        .spawn(move || {
            THREAD_ROLE.with(|role| role.set(ThreadRole::Interrupt));

            let mut deadlines: Vec<Option<Instant>> = vec![None; inner.watchdogs.len()];
            loop {
                let next_deadline = deadlines.iter().flatten().min().copied();
                let recv_result = if let Some(next_deadline) = next_deadline {
                    timer_cmd_recv
                        .recv_timeout(next_deadline.saturating_duration_since(Instant::now()))
                } else {
                    timer_cmd_recv
                        .recv()
                        .map_err(|_| mpsc::RecvTimeoutError::Disconnected)
                };

                match recv_result {
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        break;
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let now = Instant::now();
                        for index in 0..deadlines.len() {
                            if matches!(deadlines[index], Some(at) if at <= now) {
                                deadlines[index] = None;
                                inner.assert_ws0(index);
                            }
                        }
                    }
                    Ok(TimerCmd::Arm { index, at }) => {
                        deadlines[index] = Some(at);
                    }
                    Ok(TimerCmd::Disarm { index }) => {
                        deadlines[index] = None;
                    }
                }
            }
            log::trace!("the timer thread is exiting");
        })
        .expect("failed to spawn the timer thread")
}
