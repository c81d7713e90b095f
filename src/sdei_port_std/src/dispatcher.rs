//! The simulated SDEI dispatcher's event table
use sdei_test_suite::sdei::{
    EnableEventError, EventHandler, EventNum, EventStatus, EventStatusError, IntId,
    InterruptBindError, InterruptReleaseError, RegisterEventError, ResultCode, Routing,
};

use crate::Faults;

/// The first event number assigned by `SDEI_INTERRUPT_BIND`.
pub const FIRST_BOUND_EVENT_NUM: EventNum = 1000;

/// The affinity of the only simulated PE.
pub const PE_AFFINITY: u64 = 0;

#[derive(Debug)]
struct BoundEvent {
    num: EventNum,
    int_id: IntId,
    handler: Option<EventHandler>,
    registered: bool,
    enabled: bool,
    running: bool,
    unregister_pending: bool,
}

impl BoundEvent {
    fn drop_registration(&mut self) {
        self.registered = false;
        self.enabled = false;
        self.handler = None;
    }
}

#[derive(Debug)]
pub(crate) struct Dispatcher {
    events: Vec<BoundEvent>,
    next_event_num: EventNum,
    faults: Faults,
}

impl Dispatcher {
    pub(crate) fn new(faults: Faults) -> Self {
        Self {
            events: Vec::new(),
            next_event_num: FIRST_BOUND_EVENT_NUM,
            faults,
        }
    }

    fn event(&self, num: EventNum) -> Option<&BoundEvent> {
        self.events.iter().find(|e| e.num == num)
    }

    fn event_mut(&mut self, num: EventNum) -> Option<&mut BoundEvent> {
        self.events.iter_mut().find(|e| e.num == num)
    }

    pub(crate) fn bound_events(&self) -> Vec<EventNum> {
        self.events.iter().map(|e| e.num).collect()
    }

    pub(crate) fn status(&self, num: EventNum) -> Result<EventStatus, EventStatusError> {
        if self.faults.contains(Faults::STATUS_FAILS) {
            return Err(EventStatusError::NotSupported);
        }
        let event = self.event(num).ok_or(EventStatusError::InvalidParameters)?;

        let mut status = EventStatus::empty();
        status.set(EventStatus::REGISTERED, event.registered);
        status.set(EventStatus::ENABLED, event.enabled);
        status.set(EventStatus::RUNNING, event.running);

        let faults = self.faults;
        if faults.contains(Faults::REPORTS_REGISTERED_EARLY)
            || (event.unregister_pending && faults.contains(Faults::PENDING_REPORTS_REGISTERED))
        {
            status |= EventStatus::REGISTERED;
        }
        if faults.contains(Faults::REPORTS_ENABLED_EARLY) {
            status |= EventStatus::ENABLED;
        }
        if faults.contains(Faults::HIDES_RUNNING) {
            status -= EventStatus::RUNNING;
        }
        Ok(status)
    }

    pub(crate) fn bind(&mut self, int_id: IntId) -> Result<EventNum, InterruptBindError> {
        if self.faults.contains(Faults::BIND_FAILS) {
            return Err(InterruptBindError::OutOfResource);
        }
        if self.events.iter().any(|e| e.int_id == int_id) {
            return Err(InterruptBindError::Denied);
        }

        let num = self.next_event_num;
        self.next_event_num += 1;
        self.events.push(BoundEvent {
            num,
            int_id,
            handler: None,
            registered: false,
            enabled: false,
            running: false,
            unregister_pending: false,
        });
        Ok(num)
    }

    pub(crate) fn register(
        &mut self,
        num: EventNum,
        handler: EventHandler,
        routing: Routing,
    ) -> Result<(), RegisterEventError> {
        let faults = self.faults;
        let event = self
            .event_mut(num)
            .ok_or(RegisterEventError::InvalidParameters)?;

        if matches!(routing, Routing::Pe(affinity) if affinity != PE_AFFINITY) {
            return Err(RegisterEventError::InvalidParameters);
        }
        if event.registered || event.unregister_pending || faults.contains(Faults::REGISTER_FAILS)
        {
            return Err(RegisterEventError::Denied);
        }

        event.registered = true;
        event.handler = Some(handler);
        Ok(())
    }

    pub(crate) fn enable(&mut self, num: EventNum) -> Result<(), EnableEventError> {
        let faults = self.faults;
        let event = self
            .event_mut(num)
            .ok_or(EnableEventError::InvalidParameters)?;

        if !event.registered || faults.contains(Faults::ENABLE_FAILS) {
            return Err(EnableEventError::Denied);
        }
        if !faults.contains(Faults::ENABLE_IGNORED) {
            event.enabled = true;
        }
        Ok(())
    }

    /// `SDEI_EVENT_UNREGISTER`. Returns the raw result, which distinguishes
    /// two kinds of success.
    pub(crate) fn unregister(&mut self, num: EventNum) -> i64 {
        let faults = self.faults;
        let Some(event) = self.event_mut(num) else {
            return ResultCode::InvalidParameters as i64;
        };

        if !event.registered
            || faults.contains(Faults::UNREGISTER_FAILS)
            || (event.running && faults.contains(Faults::DENIES_RUNNING_UNREGISTER))
        {
            return ResultCode::Denied as i64;
        }

        if event.running && !faults.contains(Faults::UNREGISTER_IMMEDIATE) {
            // Takes effect on completion
            event.registered = false;
            event.unregister_pending = true;
            ResultCode::Pending as i64
        } else {
            event.drop_registration();
            ResultCode::Success as i64
        }
    }

    pub(crate) fn release(&mut self, num: EventNum) -> Result<(), InterruptReleaseError> {
        let event = self
            .event(num)
            .ok_or(InterruptReleaseError::InvalidParameters)?;

        if event.registered
            || event.running
            || event.unregister_pending
            || self.faults.contains(Faults::RELEASE_FAILS)
        {
            return Err(InterruptReleaseError::Denied);
        }

        self.events.retain(|e| e.num != num);
        Ok(())
    }

    /// Start handling the interrupt `int_id`. Returns the event to deliver
    /// and its handler, or `None` if the interrupt isn't delivered as an
    /// event.
    pub(crate) fn begin_delivery(&mut self, int_id: IntId) -> Option<(EventNum, EventHandler)> {
        let event = self.events.iter_mut().find(|e| e.int_id == int_id)?;
        if !event.registered || !event.enabled || event.running {
            return None;
        }
        let handler = event.handler?;
        event.running = true;
        Some((event.num, handler))
    }

    /// `SDEI_EVENT_COMPLETE`
    pub(crate) fn complete(&mut self, num: EventNum) {
        let faults = self.faults;
        let Some(event) = self.event_mut(num) else {
            log::warn!("completing unknown event {num}");
            return;
        };

        if faults.contains(Faults::COMPLETE_IGNORED) {
            return;
        }

        event.running = false;
        if event.unregister_pending {
            event.unregister_pending = false;
            if faults.contains(Faults::STUCK_REGISTERED) {
                event.registered = true;
            } else {
                event.drop_registration();
            }
        }
    }
}
