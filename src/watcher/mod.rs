//! Filesystem watch loop feeding the debounced dispatcher.
//!
//! A single `notify::RecommendedWatcher` watches the provisioning root
//! recursively and forwards raw events over an mpsc channel into one
//! `tokio::select!` loop. That loop is the only owner of the dispatcher's
//! debounce state, so no locking is needed: classification and submission
//! happen inline, reload calls are spawned by the dispatcher and never
//! block the loop.

mod error;

use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::classify::{ChangeClassifier, ChangeKind};
use crate::dispatch::DebouncedDispatcher;

pub use error::WatchError;

/// How often the loop sweeps for due trailing calls.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Watches the provisioning root and drives the dispatcher.
pub struct ConfigWatcher {
    root: PathBuf,
    classifier: ChangeClassifier,
    dispatcher: DebouncedDispatcher,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(root: PathBuf, dispatcher: DebouncedDispatcher) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(100);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        Ok(Self {
            root,
            classifier: ChangeClassifier::new(),
            dispatcher,
            event_rx: rx,
            watcher,
        })
    }

    /// Watch until the event channel closes.
    ///
    /// Runs as the steady state of the process; shutdown simply drops this
    /// future, abandoning any pending trailing calls.
    pub async fn watch(mut self) -> Result<(), WatchError> {
        let root = self.root.clone();
        self.watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::RootWatchFailed {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        crate::log_event!("watcher", "watching", "{}", root.display());

        loop {
            let tick = sleep(POLL_INTERVAL);
            tokio::pin!(tick);

            tokio::select! {
                maybe = self.event_rx.recv() => {
                    match maybe {
                        Some(Ok(event)) => self.handle_event(event),
                        Some(Err(e)) => {
                            tracing::error!("[watcher] file watch error: {e}");
                        }
                        None => return Err(WatchError::ChannelClosed),
                    }
                }

                _ = &mut tick => {
                    self.dispatcher.poll_due();
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        let Some(kind) = change_kind(&event.kind) else {
            return;
        };

        for path in event.paths {
            let categories = self.classifier.classify(&path);
            if categories.is_empty() {
                crate::debug_event!("watcher", "unmatched", "{kind} {}", path.display());
                continue;
            }

            for category in categories {
                self.dispatcher.submit(category, kind, &path);
            }
        }
    }
}

/// Map notify's event kinds onto the three changes that matter here.
///
/// Access and other metadata-only events are ignored; create, update and
/// delete of a provisioning file all mean "reload".
fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Create),
        EventKind::Modify(_) => Some(ChangeKind::Update),
        EventKind::Remove(_) => Some(ChangeKind::Delete),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn relevant_event_kinds_map_to_change_kinds() {
        assert_eq!(
            change_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Create)
        );
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeKind::Update)
        );
        assert_eq!(
            change_kind(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Delete)
        );
        assert_eq!(change_kind(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }
}
