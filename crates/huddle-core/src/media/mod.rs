//! Local capture resources and the gateway that acquires them.
//!
//! The gateway is the only component that talks to capture hardware.
//! Resources it hands out are owned by the conference session; the
//! roster and the render state only ever see [`MediaStreamRef`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::HuddleError;
use crate::events::{MediaSource, TrackKind};

pub mod simulated;

/// Platform side of a live capture: the tracks behind a [`MediaResource`].
pub trait CaptureTracks: Send + Sync {
    fn has_track(&self, kind: TrackKind) -> bool;
    fn is_enabled(&self, kind: TrackKind) -> bool;
    fn set_enabled(&self, kind: TrackKind, enabled: bool);
    /// Stop every track. Must tolerate being called more than once.
    fn stop(&self);
}

struct ResourceInner {
    id: Uuid,
    source: MediaSource,
    tracks: Arc<dyn CaptureTracks>,
    released: AtomicBool,
}

/// Owning handle to a live capture (camera+mic, or screen+optional audio).
///
/// Dropping the handle releases the capture.
pub struct MediaResource {
    inner: Arc<ResourceInner>,
}

impl MediaResource {
    pub fn new(source: MediaSource, tracks: Arc<dyn CaptureTracks>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                id: Uuid::new_v4(),
                source,
                tracks,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn source(&self) -> MediaSource {
        self.inner.source
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.inner.tracks.has_track(kind)
    }

    /// `None` when the resource has no track of that kind or is released.
    pub fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        if self.is_released() || !self.has_track(kind) {
            return None;
        }
        Some(self.inner.tracks.is_enabled(kind))
    }

    /// Toggle a track without tearing the capture down.
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) {
        if self.is_released() || !self.has_track(kind) {
            return;
        }
        self.inner.tracks.set_enabled(kind, enabled);
    }

    /// Stop all tracks. Only the first call has an effect.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.tracks.stop();
        tracing::info!(id = %self.inner.id, source = %self.inner.source, "media resource released");
    }

    pub fn stream_ref(&self) -> MediaStreamRef {
        MediaStreamRef {
            id: self.inner.id,
            source: self.inner.source,
            handle: Arc::downgrade(&self.inner),
        }
    }
}

impl Drop for MediaResource {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResource")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Non-owning reference to a live resource, handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct MediaStreamRef {
    pub id: Uuid,
    pub source: MediaSource,
    #[serde(skip)]
    handle: Weak<ResourceInner>,
}

impl MediaStreamRef {
    /// Whether the underlying capture still exists and has not been released.
    pub fn is_live(&self) -> bool {
        self.handle
            .upgrade()
            .is_some_and(|inner| !inner.released.load(Ordering::SeqCst))
    }
}

impl PartialEq for MediaStreamRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.source == other.source
    }
}

/// Events that reach the session from outside the intent path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalEvent {
    /// The platform withdrew a screen capture (e.g. the shared window was closed).
    ScreenCaptureEnded { token: u64 },
}

/// Registered against the platform's "sharing ended" signal for one capture.
#[derive(Debug, Clone)]
pub struct CaptureEndedHook {
    token: u64,
    tx: mpsc::UnboundedSender<ExternalEvent>,
}

impl CaptureEndedHook {
    pub(crate) fn new(token: u64, tx: mpsc::UnboundedSender<ExternalEvent>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn fire(&self) {
        if self
            .tx
            .send(ExternalEvent::ScreenCaptureEnded { token: self.token })
            .is_err()
        {
            tracing::debug!(token = self.token, "capture ended after the session went away");
        }
    }
}

/// Acquires and tears down local capture resources.
pub trait MediaDeviceGateway: Send + Sync {
    /// Suspends until the platform grants or denies camera+microphone access.
    /// Calling again after a denial re-prompts.
    fn acquire_camera_and_mic(&self) -> BoxFuture<'_, Result<MediaResource, HuddleError>>;

    /// Suspends until the user picks a surface to share. `on_ended` fires if the
    /// platform withdraws the capture later on.
    fn acquire_screen_capture(
        &self,
        on_ended: CaptureEndedHook,
    ) -> BoxFuture<'_, Result<MediaResource, HuddleError>>;

    fn release(&self, resource: Option<&MediaResource>) {
        if let Some(resource) = resource {
            resource.release();
        }
    }

    fn set_track_enabled(&self, resource: Option<&MediaResource>, kind: TrackKind, enabled: bool) {
        if let Some(resource) = resource {
            resource.set_track_enabled(kind, enabled);
        }
    }
}
