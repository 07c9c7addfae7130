//! Non-blocking guards for the mutually exclusive activities.
//!
//! Bootstrap, full refresh and poll never overlap. A trigger that finds
//! another activity in flight gets `None` from [`ActivityGate::try_begin`]
//! and gives up; nothing is queued.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Bootstrap,
    FullRefresh,
    Polling,
}

impl Activity {
    fn code(self) -> u8 {
        match self {
            Activity::Bootstrap => 1,
            Activity::FullRefresh => 2,
            Activity::Polling => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Activity::Bootstrap),
            2 => Some(Activity::FullRefresh),
            3 => Some(Activity::Polling),
            _ => None,
        }
    }

    /// Loading activities replace state wholesale; polling applies messages.
    pub fn is_loading(self) -> bool {
        matches!(self, Activity::Bootstrap | Activity::FullRefresh)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Activity::Bootstrap => "bootstrap",
            Activity::FullRefresh => "full refresh",
            Activity::Polling => "message poll",
        })
    }
}

#[derive(Debug, Default)]
pub struct ActivityGate {
    current: AtomicU8,
}

impl ActivityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate for `activity`, or `None` if anything else holds it.
    pub fn try_begin(&self, activity: Activity) -> Option<ActivityGuard<'_>> {
        self.current
            .compare_exchange(IDLE, activity.code(), Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ActivityGuard { gate: self })
    }

    pub fn current(&self) -> Option<Activity> {
        Activity::from_code(self.current.load(Ordering::Acquire))
    }
}

/// Releases the gate on drop.
#[must_use = "the activity ends when the guard is dropped"]
#[derive(Debug)]
pub struct ActivityGuard<'a> {
    gate: &'a ActivityGate,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.gate.current.store(IDLE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_is_rejected() {
        let gate = ActivityGate::new();
        let guard = gate.try_begin(Activity::Polling).expect("gate is idle");
        assert_eq!(gate.current(), Some(Activity::Polling));
        assert!(gate.try_begin(Activity::FullRefresh).is_none());
        assert!(gate.try_begin(Activity::Polling).is_none());
        drop(guard);
        assert_eq!(gate.current(), None);
        assert!(gate.try_begin(Activity::FullRefresh).is_some());
    }
}
