use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::layout::Panel;

/// Events emitted by the core to presentation listeners.
#[derive(Debug, Clone)]
pub enum HuddleEvent {
    StateChanged(CallPhase),
    Notice { level: NoticeLevel, message: String },
    ChatMessageAdded(ChatMessage),
    SuggestionsUpdated(Vec<String>),
    SuggestionsLoading(bool),
    PanelChanged { panel: Panel, open: bool, width: f64 },
    NavigateAway,
    SignedOut,
}

/// Coarse state of the local participant, derived from the session flags.
/// `muted` is orthogonal and not part of the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Disconnected,
    Idle,
    VideoLive,
    AudioOnly,
    ScreenSharing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Which capture a media resource came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    Camera,
    Screen,
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Camera => f.write_str("camera"),
            MediaSource::Screen => f.write_str("screen capture"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: u64,
    pub sender: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_own_message: bool,
    pub avatar_ref: Option<String>,
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (suggestion results arrive from tokio tasks).
pub trait HuddleEventListener: Send + Sync {
    fn on_event(&self, event: HuddleEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn HuddleEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn HuddleEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn emit(&self, event: HuddleEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }

    pub fn notify(&self, message: impl Into<String>) {
        self.emit(HuddleEvent::Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        });
    }

    pub fn report(&self, error: &crate::HuddleError) {
        self.emit(HuddleEvent::Notice {
            level: NoticeLevel::Error,
            message: error.to_string(),
        });
    }
}

/// Listener that records every event, for tests and the shell's transcript.
#[derive(Default)]
pub struct EventLog {
    events: std::sync::Mutex<Vec<HuddleEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<HuddleEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn snapshot(&self) -> Vec<HuddleEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl HuddleEventListener for EventLog {
    fn on_event(&self, event: HuddleEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        count: Arc<AtomicUsize>,
    }

    impl HuddleEventListener for CountingListener {
        fn on_event(&self, _event: HuddleEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn emitter_dispatches_to_multiple_listeners() {
        let emitter = EventEmitter::new();
        let count1 = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::new(AtomicUsize::new(0));

        emitter.add_listener(Arc::new(CountingListener { count: count1.clone() }));
        emitter.add_listener(Arc::new(CountingListener { count: count2.clone() }));

        emitter.emit(HuddleEvent::StateChanged(CallPhase::Idle));

        assert_eq!(count1.load(Ordering::SeqCst), 1);
        assert_eq!(count2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn report_turns_errors_into_error_notices() {
        let emitter = EventEmitter::new();
        let log = Arc::new(EventLog::new());
        emitter.add_listener(log.clone());

        emitter.report(&crate::HuddleError::PermissionDenied(MediaSource::Camera));

        let events = log.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            HuddleEvent::Notice { level, message } => {
                assert_eq!(*level, NoticeLevel::Error);
                assert_eq!(message, "permission denied for camera");
            }
            other => panic!("expected Notice, got {other:?}"),
        }
        assert!(log.take().is_empty());
    }
}
