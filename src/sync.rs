//! Keeps the raw document view and the structured editors in step.
//!
//! Both views edit the same [Store]. Structured edits go to the store
//! directly and the raw view is re-rendered from it. Raw keystrokes are
//! imported back into the store. Two rules keep the views from fighting:
//!
//! - while the user is typing in the raw view (until [SyncConfig::debounce]
//!   after the last keystroke), the raw view is never re-rendered
//! - after a keystroke was applied to the store, the next re-render is
//!   skipped once, so the store write doesn't echo back into the raw view
//!
//! [LiveSync] is the state machine; [LiveSync::run] drives it from a stream
//! of [ViewEvent]s and the store's change notifications.

use crate::{
    document::{export_string, parse_document, ImportError},
    store::Store,
};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};
use tracing::{debug, trace, warn};

/// Quiet time after the last raw keystroke before the raw view counts as idle
pub const EDITING_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: EDITING_DEBOUNCE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Store changes re-render the raw view
    Idle,
    /// User is typing in the raw view
    Editing {
        deadline: Instant,
        /// A keystroke was applied to the store during this burst
        suppress_next: bool,
    },
    /// Next re-render is skipped
    SuppressedOnce,
}

/// Outcome of a raw view keystroke
#[derive(Debug)]
pub enum RawEdit {
    /// Document was valid and replaced the collection
    Applied { flags: usize },
    /// Document didn't parse; store left untouched
    Ignored(ImportError),
    /// Empty text, nothing happened
    Empty,
}

/// Something the user did in the raw view
#[derive(Clone, Debug)]
pub enum ViewEvent {
    Edit(String),
    Leave,
}

/// Live sync controller for one raw document view
pub struct LiveSync<S> {
    store: S,
    config: SyncConfig,
    state: SyncState,
    text: String,
}

impl<S: Store> LiveSync<S> {
    /// Start idle, with the raw view showing the current store contents
    pub fn new(store: S, config: SyncConfig) -> Self {
        let text = render(&store).unwrap_or_default();
        Self {
            store,
            config,
            state: SyncState::Idle,
            text,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Current content of the raw view
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// When the current typing burst ends
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            SyncState::Editing { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// Handle a keystroke in the raw view, carrying the view's full text.
    ///
    /// The text is imported into the store when it is a valid document.
    /// Invalid text is expected while typing and is dropped silently.
    pub fn raw_edit(&mut self, text: &str, now: Instant) -> RawEdit {
        if text.is_empty() {
            return RawEdit::Empty;
        }
        self.text = text.to_owned();

        let outcome = match parse_document(text) {
            Ok(doc) => {
                let set = doc.into_flag_set();
                let flags = set.flags.len();
                self.store.replace_all(set);
                RawEdit::Applied { flags }
            }
            Err(error) => {
                trace!(%error, "raw document not applied");
                RawEdit::Ignored(error)
            }
        };

        let applied = matches!(outcome, RawEdit::Applied { .. });
        let suppress_next = match self.state {
            SyncState::Editing { suppress_next, .. } => suppress_next || applied,
            _ => applied,
        };
        self.state = SyncState::Editing {
            deadline: now + self.config.debounce,
            suppress_next,
        };
        outcome
    }

    /// End the typing burst if its deadline has passed.
    ///
    /// Returns `true` when editing ended; call [LiveSync::refresh] next.
    pub fn finish_editing(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.leave_view(),
            _ => false,
        }
    }

    /// The user left the raw view; ends the typing burst right away.
    ///
    /// Returns `true` when editing ended; call [LiveSync::refresh] next.
    pub fn leave_view(&mut self) -> bool {
        match self.state {
            SyncState::Editing { suppress_next, .. } => {
                self.state = if suppress_next {
                    SyncState::SuppressedOnce
                } else {
                    SyncState::Idle
                };
                debug!(state = ?self.state, "raw view editing ended");
                true
            }
            _ => false,
        }
    }

    /// Re-render the raw view from the store.
    ///
    /// Returns the new text if the view changed. Does nothing while the user
    /// is typing, and consumes a pending one-shot suppression instead of
    /// rendering.
    pub fn refresh(&mut self) -> Option<&str> {
        match self.state {
            SyncState::Editing { .. } => None,
            SyncState::SuppressedOnce => {
                trace!("skipping re-render after raw edit");
                self.state = SyncState::Idle;
                None
            }
            SyncState::Idle => {
                let text = render(&self.store)?;
                if text == self.text {
                    return None;
                }
                self.text = text;
                Some(&self.text)
            }
        }
    }

    /// Drive the controller until `events` ends.
    ///
    /// Re-rendered raw text is published on `view`. Store writes from any
    /// source are picked up through [Store::subscribe].
    pub async fn run<E>(mut self, mut events: E, view: watch::Sender<String>) -> Self
    where
        E: Stream<Item = ViewEvent> + Unpin,
    {
        let mut changes = self.store.subscribe();
        changes.borrow_and_update();
        view.send_replace(self.text.clone());

        loop {
            let deadline = self.deadline();
            let ended = tokio::select! {
                event = events.next() => match event {
                    Some(ViewEvent::Edit(text)) => {
                        self.raw_edit(&text, Instant::now());
                        false
                    }
                    Some(ViewEvent::Leave) => self.leave_view(),
                    None => break,
                },
                changed = changes.changed() => {
                    if changed.is_err() {
                        warn!("store went away, stopping live sync");
                        break;
                    }
                    true
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.finish_editing(Instant::now())
                }
            };
            if ended {
                if let Some(text) = self.refresh() {
                    view.send_replace(text.to_owned());
                }
            }
        }
        self
    }
}

fn render<S: Store>(store: &S) -> Option<String> {
    match export_string(&store.snapshot()) {
        Ok(text) => Some(text),
        Err(error) => {
            warn!(%error, "failed to render flag document");
            None
        }
    }
}
