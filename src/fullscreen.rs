use std::time::{Duration, Instant};

// How long a request may go unanswered before the window is taken to have refused it.
const PENDING_TIMEOUT: Duration = Duration::from_millis(1500);

/// Which way a toggle asked the window to go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FullscreenRequest {
    Enter,
    Exit,
}

/// Fullscreen flag mirrored from the window. Requests are fire-and-forget; only
/// [`Fullscreen::on_change`] updates the flag, since the window system may
/// refuse a request.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fullscreen {
    active: bool,
    pending: Option<(FullscreenRequest, Instant)>,
}

impl Fullscreen {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pending(&self) -> Option<FullscreenRequest> {
        self.pending.map(|(request, _)| request)
    }

    pub fn request_toggle(&mut self) -> FullscreenRequest {
        let request = if self.active {
            FullscreenRequest::Exit
        } else {
            FullscreenRequest::Enter
        };
        self.pending = Some((request, Instant::now()));
        request
    }

    /// Drops a request the window never answered. Returns true if one expired.
    pub fn expire_pending(&mut self, now: Instant) -> bool {
        match self.pending {
            Some((request, since)) if now.saturating_duration_since(since) >= PENDING_TIMEOUT => {
                log::warn!("fullscreen {request:?} request went unanswered");
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Fullscreen-change notification. Returns true if the flag flipped.
    pub fn on_change(&mut self, active: bool) -> bool {
        self.pending = None;
        let changed = self.active != active;
        self.active = active;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_alone_does_not_flip_state() {
        let mut fullscreen = Fullscreen::default();
        assert_eq!(fullscreen.request_toggle(), FullscreenRequest::Enter);
        assert!(!fullscreen.is_active());
        assert_eq!(fullscreen.pending(), Some(FullscreenRequest::Enter));
    }

    #[test]
    fn notification_sets_actual_state() {
        let mut fullscreen = Fullscreen::default();
        fullscreen.request_toggle();
        assert!(fullscreen.on_change(true));
        assert!(fullscreen.is_active());
        assert_eq!(fullscreen.request_toggle(), FullscreenRequest::Exit);
    }

    #[test]
    fn denied_request_leaves_state_unchanged() {
        let mut fullscreen = Fullscreen::default();
        fullscreen.request_toggle();
        assert!(!fullscreen.on_change(false));
        assert!(!fullscreen.is_active());
        assert_eq!(fullscreen.pending(), None);
    }

    #[test]
    fn exit_triggered_elsewhere_is_reflected() {
        let mut fullscreen = Fullscreen::default();
        fullscreen.on_change(true);
        assert!(fullscreen.on_change(false));
        assert!(!fullscreen.is_active());
    }

    #[test]
    fn unanswered_request_expires() {
        let mut fullscreen = Fullscreen::default();
        fullscreen.request_toggle();
        assert!(!fullscreen.expire_pending(Instant::now()));
        assert_eq!(fullscreen.pending(), Some(FullscreenRequest::Enter));

        assert!(fullscreen.expire_pending(Instant::now() + Duration::from_secs(5)));
        assert_eq!(fullscreen.pending(), None);
        assert!(!fullscreen.is_active());
        assert!(!fullscreen.expire_pending(Instant::now() + Duration::from_secs(10)));
    }
}
