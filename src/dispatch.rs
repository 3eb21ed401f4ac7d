//! Per-category debounced reload dispatch.
//!
//! A burst of filesystem changes must not become a burst of control-plane
//! calls. Each category runs an immediate-plus-trailing debounce: the first
//! event in a quiet period fires a reload at once, further events inside
//! the window only arm a single trailing call that fires after quiescence.
//! Worst case per burst per category: two calls.
//!
//! The timing policy lives in [`DebounceState`], which takes `now` as a
//! parameter instead of sampling the clock, so coalescing is tested with
//! synthetic instants. [`DebouncedDispatcher`] wraps it with real time and
//! fire-and-forget gateway calls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classify::{ChangeKind, ReloadCategory};
use crate::gateway::ReloadGateway;

/// Debounce state for one category.
///
/// At most one of these exists per category at a time; a new event for the
/// category resets `deadline` rather than creating a second timer.
#[derive(Debug)]
struct PendingReload {
    /// When the quiescence window ends.
    deadline: Instant,
    /// Whether any event arrived after the immediate call fired.
    dirty: bool,
}

/// Pure immediate-plus-trailing debounce per category.
#[derive(Debug)]
pub struct DebounceState {
    pending: HashMap<ReloadCategory, PendingReload>,
    window: Duration,
}

impl DebounceState {
    pub fn new(window: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            window,
        }
    }

    /// Record an event for a category.
    ///
    /// Returns true when the caller should fire the immediate reload: the
    /// category was idle and this event opens a new window. Otherwise the
    /// existing window is extended and the trailing call armed.
    pub fn submit(&mut self, category: ReloadCategory, now: Instant) -> bool {
        let deadline = now + self.window;
        match self.pending.get_mut(&category) {
            Some(pending) => {
                pending.deadline = deadline;
                pending.dirty = true;
                false
            }
            None => {
                self.pending.insert(
                    category,
                    PendingReload {
                        deadline,
                        dirty: false,
                    },
                );
                true
            }
        }
    }

    /// Close every window that has reached quiescence.
    ///
    /// Returns the categories whose trailing call is due; windows that saw
    /// no events after their immediate call close silently.
    pub fn take_due(&mut self, now: Instant) -> Vec<ReloadCategory> {
        let mut due = Vec::new();
        self.pending.retain(|category, pending| {
            if now < pending.deadline {
                return true;
            }
            if pending.dirty {
                due.push(*category);
            }
            false
        });
        due
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Drives [`ReloadGateway::reload_category`] from classified change events.
///
/// All state mutation happens on the single control flow that owns this
/// value; gateway calls are spawned so a slow or failing remote never
/// blocks event processing, and a failure for one category never affects
/// another (it is logged and swallowed).
pub struct DebouncedDispatcher {
    state: DebounceState,
    gateway: Arc<dyn ReloadGateway>,
}

impl DebouncedDispatcher {
    pub fn new(window: Duration, gateway: Arc<dyn ReloadGateway>) -> Self {
        Self {
            state: DebounceState::new(window),
            gateway,
        }
    }

    /// Submit a classified change event.
    pub fn submit(&mut self, category: ReloadCategory, kind: ChangeKind, path: &Path) {
        crate::debug_event!("dispatch", "change", "{kind} {} -> {category}", path.display());

        if self.state.submit(category, Instant::now()) {
            self.fire(category, "immediate");
        }
    }

    /// Fire trailing calls for every category whose window has closed.
    ///
    /// Called periodically from the watch loop.
    pub fn poll_due(&mut self) {
        for category in self.state.take_due(Instant::now()) {
            self.fire(category, "trailing");
        }
    }

    pub fn has_pending(&self) -> bool {
        self.state.has_pending()
    }

    fn fire(&self, category: ReloadCategory, phase: &'static str) {
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            match gateway.reload_category(category).await {
                Ok(message) => {
                    crate::log_event!("dispatch", "reloaded", "{category} ({phase}): {message}");
                }
                Err(e) => {
                    tracing::warn!("[dispatch] reload {category} ({phase}) failed: {e}");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn first_submit_fires_immediately() {
        let mut state = DebounceState::new(WINDOW);
        let start = Instant::now();

        assert!(state.submit(ReloadCategory::Dashboards, start));
        assert!(state.has_pending());
    }

    #[test]
    fn burst_coalesces_to_immediate_plus_trailing() {
        let mut state = DebounceState::new(WINDOW);
        let start = Instant::now();

        // Five events within 100ms: one immediate fire, the rest coalesce.
        let mut fired = 0;
        for ms in [0, 25, 50, 75, 100] {
            if state.submit(ReloadCategory::Dashboards, at(start, ms)) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);

        // Nothing due before the last event's window closes.
        assert!(state.take_due(at(start, 599)).is_empty());

        // One trailing call after quiescence. Two calls total.
        assert_eq!(
            state.take_due(at(start, 600)),
            vec![ReloadCategory::Dashboards]
        );
        assert!(!state.has_pending());
    }

    #[test]
    fn isolated_submit_has_no_trailing_call() {
        let mut state = DebounceState::new(WINDOW);
        let start = Instant::now();

        assert!(state.submit(ReloadCategory::Dashboards, start));

        // Window closes with no further events: no trailing call.
        assert!(state.take_due(at(start, 501)).is_empty());
        assert!(!state.has_pending());
    }

    #[test]
    fn new_event_resets_the_window() {
        let mut state = DebounceState::new(WINDOW);
        let start = Instant::now();

        state.submit(ReloadCategory::Dashboards, start);
        state.submit(ReloadCategory::Dashboards, at(start, 400));

        // 501ms after the first event the window is still open, because the
        // second event pushed the deadline to 900ms.
        assert!(state.take_due(at(start, 501)).is_empty());
        assert_eq!(
            state.take_due(at(start, 900)),
            vec![ReloadCategory::Dashboards]
        );
    }

    #[test]
    fn categories_debounce_independently() {
        let mut state = DebounceState::new(WINDOW);
        let start = Instant::now();

        assert!(state.submit(ReloadCategory::Dashboards, start));
        assert!(state.submit(ReloadCategory::Datasources, at(start, 50)));

        // Both see follow-up events; dashboards keeps resetting for longer.
        state.submit(ReloadCategory::Datasources, at(start, 100));
        state.submit(ReloadCategory::Dashboards, at(start, 300));

        // Datasources reaches quiescence first and fires alone.
        assert_eq!(
            state.take_due(at(start, 601)),
            vec![ReloadCategory::Datasources]
        );

        // Dashboards' trailing call is still pending on its own schedule.
        assert_eq!(
            state.take_due(at(start, 801)),
            vec![ReloadCategory::Dashboards]
        );
    }

    #[test]
    fn quiet_window_then_new_event_fires_immediately_again() {
        let mut state = DebounceState::new(WINDOW);
        let start = Instant::now();

        assert!(state.submit(ReloadCategory::Dashboards, start));
        assert!(state.take_due(at(start, 501)).is_empty());

        // Back to idle: the next event is a fresh immediate fire.
        assert!(state.submit(ReloadCategory::Dashboards, at(start, 700)));
    }
}
