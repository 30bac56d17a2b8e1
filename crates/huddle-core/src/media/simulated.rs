//! Scriptable stand-in for the platform capture APIs.
//!
//! Used by the headless shell and by tests: outcomes of the next
//! acquisitions can be set up front, and a screen capture can be ended
//! "from the OS side" to exercise the capture-ended path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use super::{CaptureEndedHook, CaptureTracks, MediaDeviceGateway, MediaResource};
use crate::errors::HuddleError;
use crate::events::{MediaSource, TrackKind};

/// What the next acquisition request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Grant,
    Deny,
    Unavailable,
    Unsupported,
}

#[derive(Debug)]
pub struct SimulatedTracks {
    has_audio: bool,
    has_video: bool,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    stops: AtomicUsize,
}

impl SimulatedTracks {
    pub fn new(has_audio: bool, has_video: bool) -> Self {
        Self {
            has_audio,
            has_video,
            audio_enabled: AtomicBool::new(has_audio),
            video_enabled: AtomicBool::new(has_video),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stops.load(Ordering::SeqCst) > 0
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn flag(&self, kind: TrackKind) -> &AtomicBool {
        match kind {
            TrackKind::Audio => &self.audio_enabled,
            TrackKind::Video => &self.video_enabled,
        }
    }
}

impl CaptureTracks for SimulatedTracks {
    fn has_track(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.has_audio,
            TrackKind::Video => self.has_video,
        }
    }

    fn is_enabled(&self, kind: TrackKind) -> bool {
        self.has_track(kind) && self.flag(kind).load(Ordering::SeqCst)
    }

    fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        self.flag(kind).store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.audio_enabled.store(false, Ordering::SeqCst);
        self.video_enabled.store(false, Ordering::SeqCst);
    }
}

struct SimState {
    camera_outcome: Outcome,
    screen_outcome: Outcome,
    screen_audio: bool,
    camera_requests: usize,
    screen_requests: usize,
    camera_tracks: Option<Arc<SimulatedTracks>>,
    screen: Option<(CaptureEndedHook, Arc<SimulatedTracks>)>,
}

pub struct SimulatedGateway {
    state: Mutex<SimState>,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                camera_outcome: Outcome::Grant,
                screen_outcome: Outcome::Grant,
                screen_audio: false,
                camera_requests: 0,
                screen_requests: 0,
                camera_tracks: None,
                screen: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_camera_outcome(&self, outcome: Outcome) {
        self.lock().camera_outcome = outcome;
    }

    pub fn set_screen_outcome(&self, outcome: Outcome) {
        self.lock().screen_outcome = outcome;
    }

    /// Whether screen captures come with a system-audio track.
    pub fn set_screen_audio(&self, with_audio: bool) {
        self.lock().screen_audio = with_audio;
    }

    pub fn camera_requests(&self) -> usize {
        self.lock().camera_requests
    }

    pub fn screen_requests(&self) -> usize {
        self.lock().screen_requests
    }

    pub fn camera_tracks(&self) -> Option<Arc<SimulatedTracks>> {
        self.lock().camera_tracks.clone()
    }

    pub fn screen_tracks(&self) -> Option<Arc<SimulatedTracks>> {
        self.lock().screen.as_ref().map(|(_, tracks)| tracks.clone())
    }

    /// End the most recent screen capture the way the OS would: the tracks
    /// stop first, then the registered hook fires. Returns false when there
    /// is no capture to end.
    pub fn end_screen_capture(&self) -> bool {
        let screen = self.lock().screen.take();
        match screen {
            Some((hook, tracks)) => {
                tracks.stop();
                tracing::info!(token = hook.token(), "simulated screen capture ended by platform");
                hook.fire();
                true
            }
            None => false,
        }
    }

    fn outcome_error(outcome: Outcome, source: MediaSource) -> Option<HuddleError> {
        match outcome {
            Outcome::Grant => None,
            Outcome::Deny => Some(HuddleError::PermissionDenied(source)),
            Outcome::Unavailable => Some(HuddleError::DeviceUnavailable(format!(
                "no {source} device found"
            ))),
            Outcome::Unsupported => Some(HuddleError::Unsupported(format!(
                "{source} is not available on this platform"
            ))),
        }
    }
}

impl MediaDeviceGateway for SimulatedGateway {
    fn acquire_camera_and_mic(&self) -> BoxFuture<'_, Result<MediaResource, HuddleError>> {
        Box::pin(async move {
            // The real prompt suspends; give other tasks a chance to run.
            tokio::task::yield_now().await;
            let mut state = self.lock();
            state.camera_requests += 1;
            if let Some(err) = Self::outcome_error(state.camera_outcome, MediaSource::Camera) {
                return Err(err);
            }
            let tracks = Arc::new(SimulatedTracks::new(true, true));
            state.camera_tracks = Some(tracks.clone());
            Ok(MediaResource::new(MediaSource::Camera, tracks))
        })
    }

    fn acquire_screen_capture(
        &self,
        on_ended: CaptureEndedHook,
    ) -> BoxFuture<'_, Result<MediaResource, HuddleError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let mut state = self.lock();
            state.screen_requests += 1;
            if let Some(err) = Self::outcome_error(state.screen_outcome, MediaSource::Screen) {
                return Err(err);
            }
            let tracks = Arc::new(SimulatedTracks::new(state.screen_audio, true));
            state.screen = Some((on_ended, tracks.clone()));
            Ok(MediaResource::new(MediaSource::Screen, tracks))
        })
    }
}
