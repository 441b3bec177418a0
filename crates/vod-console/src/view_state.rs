use std::time::{Duration, Instant};

/// How long a delete control stays armed waiting for the confirming
/// second request.
pub const CONFIRM_WINDOW: Duration = Duration::from_millis(3000);

/// Distance from the bottom of a log panel, in rows, within which new
/// content is still considered "followed".
pub const SCROLL_TOLERANCE: usize = 5;

/// Two-step deletion control. Timers are deadlines checked on the UI
/// tick, so a state that outlives its window reverts on the next tick
/// rather than via a stray callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteConfirm {
    #[default]
    Idle,
    Armed {
        deadline: Instant,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAction {
    /// First request: the control is now awaiting confirmation.
    Armed,
    /// Second request inside the window: issue the destructive call.
    Confirmed,
}

impl DeleteConfirm {
    pub fn is_armed(&self) -> bool {
        matches!(self, DeleteConfirm::Armed { .. })
    }

    /// A delete request on an idle control arms it; on an armed control it
    /// cancels the window and asks the caller to issue the real delete.
    /// After a failed delete the caller simply leaves the state idle.
    pub fn request(&mut self, now: Instant) -> DeleteAction {
        match *self {
            DeleteConfirm::Idle => {
                *self = DeleteConfirm::Armed {
                    deadline: now + CONFIRM_WINDOW,
                };
                DeleteAction::Armed
            }
            DeleteConfirm::Armed { .. } => {
                *self = DeleteConfirm::Idle;
                DeleteAction::Confirmed
            }
        }
    }

    /// Reverts an expired window. Returns true when the visual state
    /// changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let DeleteConfirm::Armed { deadline } = *self {
            if now >= deadline {
                *self = DeleteConfirm::Idle;
                return true;
            }
        }
        false
    }

    /// Cancels any pending window, for when the entry itself goes away.
    pub fn cancel(&mut self) {
        *self = DeleteConfirm::Idle;
    }
}

/// Follow-the-tail tracker for one log panel. Armed while the view sits
/// near the bottom; every scroll event re-evaluates it edge-triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoScroll {
    armed: bool,
}

impl AutoScroll {
    pub fn new(armed: bool) -> Self {
        Self { armed }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Called on every scroll movement with the current distance from the
    /// bottom of the panel.
    pub fn observe(&mut self, distance_from_bottom: usize) {
        self.armed = distance_from_bottom <= SCROLL_TOLERANCE;
    }

    /// Expanding a collapsed panel always re-arms following.
    pub fn rearm(&mut self) {
        self.armed = true;
    }

    /// Whether a content update should snap the panel to the bottom.
    pub fn should_follow(&self) -> bool {
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_arms_second_confirms() {
        let now = Instant::now();
        let mut c = DeleteConfirm::default();
        assert_eq!(c.request(now), DeleteAction::Armed);
        assert!(c.is_armed());
        assert_eq!(
            c.request(now + Duration::from_millis(500)),
            DeleteAction::Confirmed
        );
        assert!(!c.is_armed());
    }

    #[test]
    fn window_expiry_reverts_to_idle() {
        let now = Instant::now();
        let mut c = DeleteConfirm::default();
        c.request(now);
        assert!(!c.tick(now + Duration::from_millis(2999)));
        assert!(c.is_armed());
        assert!(c.tick(now + CONFIRM_WINDOW));
        assert!(!c.is_armed());
        // The next request starts a fresh cycle.
        assert_eq!(c.request(now + Duration::from_secs(10)), DeleteAction::Armed);
    }

    #[test]
    fn cancel_clears_a_pending_window() {
        let now = Instant::now();
        let mut c = DeleteConfirm::default();
        c.request(now);
        c.cancel();
        assert!(!c.is_armed());
        assert!(!c.tick(now + Duration::from_secs(60)));
    }

    #[test]
    fn scrolling_away_disarms_scrolling_back_rearms() {
        let mut s = AutoScroll::new(true);
        s.observe(SCROLL_TOLERANCE + 1);
        assert!(!s.should_follow());
        s.observe(SCROLL_TOLERANCE + 40);
        assert!(!s.should_follow());
        s.observe(SCROLL_TOLERANCE);
        assert!(s.should_follow());
        s.observe(0);
        assert!(s.should_follow());
    }

    #[test]
    fn expand_rearms_regardless_of_position() {
        let mut s = AutoScroll::new(false);
        assert!(!s.should_follow());
        s.rearm();
        assert!(s.should_follow());
    }
}
