//! Local conference state: what the user asked for, reconciled against the
//! camera and screen captures the session owns.
//!
//! Intents take `&mut self`, so they never interleave. Acquisition is the
//! only suspension point. Capture-ended signals from the platform arrive
//! on a channel and go through the same stop path as the user's own
//! "stop sharing".

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::errors::HuddleError;
use crate::events::{CallPhase, EventEmitter, HuddleEvent, MediaSource, TrackKind};
use crate::media::{CaptureEndedHook, ExternalEvent, MediaDeviceGateway, MediaResource};
use crate::participants::{self, MemberGroup, Participant, ParticipantId, Roster};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPermission {
    Unknown,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    pub mic_enabled: bool,
    /// Probe the camera right away instead of on first enable.
    pub camera_enabled: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self { mic_enabled: true, camera_enabled: false }
    }
}

impl From<&Settings> for JoinOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            mic_enabled: settings.mic_enabled_on_join,
            camera_enabled: settings.camera_enabled_on_join,
        }
    }
}

/// Plain copy of the session flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: CallPhase,
    pub muted: bool,
    pub video_enabled: bool,
    pub audio_only: bool,
    pub screen_sharing: bool,
    pub active_screen_sharer: Option<ParticipantId>,
    pub camera_permission: CameraPermission,
    pub has_camera: bool,
    pub has_screen: bool,
}

/// Which controls the presentation layer should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlsView {
    pub mute: bool,
    pub video: bool,
    pub audio_only: bool,
    pub screen_share: bool,
    pub end_call: bool,
}

struct ScreenShare {
    resource: MediaResource,
    token: u64,
}

pub struct ConferenceSession {
    gateway: Arc<dyn MediaDeviceGateway>,
    emitter: EventEmitter,
    joined: bool,
    muted: bool,
    video_enabled: bool,
    audio_only: bool,
    camera: Option<MediaResource>,
    screen: Option<ScreenShare>,
    camera_permission: CameraPermission,
    roster: Roster,
    next_capture_token: u64,
    external_tx: mpsc::UnboundedSender<ExternalEvent>,
    external_rx: mpsc::UnboundedReceiver<ExternalEvent>,
    last_phase: CallPhase,
}

impl ConferenceSession {
    pub fn new(gateway: Arc<dyn MediaDeviceGateway>, emitter: EventEmitter) -> Self {
        let (external_tx, external_rx) = mpsc::unbounded_channel();
        Self {
            gateway,
            emitter,
            joined: false,
            muted: true,
            video_enabled: false,
            audio_only: false,
            camera: None,
            screen: None,
            camera_permission: CameraPermission::Unknown,
            roster: Roster::new(),
            next_capture_token: 0,
            external_tx,
            external_rx,
            last_phase: CallPhase::Disconnected,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> CallPhase {
        if !self.joined {
            CallPhase::Disconnected
        } else if self.screen.is_some() {
            CallPhase::ScreenSharing
        } else if self.audio_only {
            CallPhase::AudioOnly
        } else if self.video_enabled {
            CallPhase::VideoLive
        } else {
            CallPhase::Idle
        }
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn audio_only(&self) -> bool {
        self.audio_only
    }

    pub fn screen_sharing(&self) -> bool {
        self.screen.is_some()
    }

    /// The local participant while it shares its screen, `None` otherwise.
    pub fn active_screen_sharer(&self) -> Option<&str> {
        self.screen.as_ref().and(self.roster.local_id())
    }

    pub fn camera_permission(&self) -> CameraPermission {
        self.camera_permission
    }

    pub fn camera(&self) -> Option<&MediaResource> {
        self.camera.as_ref()
    }

    pub fn screen(&self) -> Option<&MediaResource> {
        self.screen.as_ref().map(|s| &s.resource)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Remote entries only; the roster refuses media updates to the local one.
    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            muted: self.muted,
            video_enabled: self.video_enabled,
            audio_only: self.audio_only,
            screen_sharing: self.screen_sharing(),
            active_screen_sharer: self.active_screen_sharer().map(str::to_string),
            camera_permission: self.camera_permission,
            has_camera: self.camera.is_some(),
            has_screen: self.screen.is_some(),
        }
    }

    pub fn controls(&self) -> ControlsView {
        let devices_allowed = self.joined && self.camera_permission != CameraPermission::Denied;
        ControlsView {
            mute: devices_allowed,
            video: devices_allowed && !self.audio_only,
            audio_only: self.joined,
            screen_share: self.joined,
            end_call: self.joined,
        }
    }

    /// Render-ready roster. Pure: may be called any number of times.
    ///
    /// The local entry is projected from the session flags; remote entries
    /// never carry a stream since there is no transport behind them.
    pub fn derive_render_state(&self) -> Vec<Participant> {
        let sharing = self.screen.is_some();
        self.roster
            .participants()
            .iter()
            .map(|p| {
                let mut view = p.clone();
                if p.is_local {
                    view.muted = self.muted;
                    view.video_enabled = !sharing && self.video_enabled;
                    view.screen_sharing = sharing;
                    view.media_stream = match (&self.screen, &self.camera) {
                        (Some(share), _) => Some(share.resource.stream_ref()),
                        (None, Some(camera)) if self.video_enabled && !self.audio_only => {
                            Some(camera.stream_ref())
                        }
                        _ => None,
                    };
                } else {
                    view.screen_sharing = false;
                    view.media_stream = None;
                }
                view
            })
            .collect()
    }

    /// Member list sections built from the derived render state.
    pub fn member_groups(&self) -> Vec<MemberGroup> {
        participants::member_groups(&self.derive_render_state())
    }

    // ── Intents ──────────────────────────────────────────────────────

    /// Enter the call: seed the roster and apply the join options.
    pub async fn join(
        &mut self,
        local: Participant,
        remotes: Vec<Participant>,
        options: JoinOptions,
    ) -> Result<(), HuddleError> {
        if self.joined {
            let e = HuddleError::ValidationRejected("already in a call".into());
            self.emitter.report(&e);
            return Err(e);
        }

        self.roster.clear();
        for remote in remotes {
            self.roster.add_participant(remote);
        }
        self.roster.seed_local(local);
        self.joined = true;
        self.muted = !options.mic_enabled;
        tracing::info!(
            local = ?self.roster.local_id(),
            participants = self.roster.participant_count(),
            "joined call"
        );
        self.phase_changed();

        if options.camera_enabled {
            // Failures are recorded and reported; joining still succeeds.
            if let Err(e) = self.toggle_video().await {
                tracing::warn!("camera probe on join failed: {e}");
            }
        }
        Ok(())
    }

    pub fn toggle_mute(&mut self) {
        if !self.joined {
            tracing::debug!("ignoring mute toggle outside a call");
            return;
        }
        self.muted = !self.muted;
        self.apply_audio_tracks();
        tracing::info!(muted = self.muted, "microphone toggled");
        self.emitter.notify(if self.muted {
            "Microphone muted"
        } else {
            "Microphone unmuted"
        });
    }

    pub async fn toggle_video(&mut self) -> Result<(), HuddleError> {
        self.ensure_joined()?;
        if self.audio_only {
            return Err(self.reject(HuddleError::ValidationRejected(
                "Video is unavailable in audio-only mode".into(),
            )));
        }

        if self.video_enabled {
            self.gateway
                .set_track_enabled(self.camera.as_ref(), TrackKind::Video, false);
            self.video_enabled = false;
            tracing::info!("camera disabled");
            self.emitter.notify("Camera off");
            self.phase_changed();
            return Ok(());
        }

        if self.camera.is_none() {
            if self.camera_permission == CameraPermission::Denied {
                return Err(self.reject(HuddleError::PermissionDenied(MediaSource::Camera)));
            }
            match self.gateway.acquire_camera_and_mic().await {
                Ok(resource) => {
                    tracing::info!(id = %resource.id(), "camera acquired");
                    self.camera_permission = CameraPermission::Granted;
                    self.camera = Some(resource);
                    self.apply_audio_tracks();
                }
                Err(e) => {
                    self.camera_permission = CameraPermission::Denied;
                    self.video_enabled = false;
                    tracing::warn!("camera acquisition failed: {e}");
                    return Err(self.reject(e));
                }
            }
        }

        self.video_enabled = true;
        self.apply_camera_video_track();
        tracing::info!("camera enabled");
        self.emitter.notify("Camera on");
        self.phase_changed();
        Ok(())
    }

    pub fn toggle_audio_only(&mut self) -> Result<(), HuddleError> {
        self.ensure_joined()?;
        self.audio_only = !self.audio_only;
        if self.audio_only {
            self.video_enabled = false;
        }
        self.apply_camera_video_track();
        tracing::info!(audio_only = self.audio_only, "audio-only mode toggled");
        self.emitter.notify(if self.audio_only {
            "Audio-only mode on"
        } else {
            "Audio-only mode off"
        });
        self.phase_changed();
        Ok(())
    }

    pub async fn toggle_screen_share(&mut self) -> Result<(), HuddleError> {
        self.ensure_joined()?;
        if self.screen.is_some() {
            self.stop_screen_share("Screen sharing stopped");
            return Ok(());
        }

        self.next_capture_token += 1;
        let token = self.next_capture_token;
        let hook = CaptureEndedHook::new(token, self.external_tx.clone());

        match self.gateway.acquire_screen_capture(hook).await {
            Ok(resource) => {
                tracing::info!(id = %resource.id(), token, "screen capture started");
                self.screen = Some(ScreenShare { resource, token });
                self.apply_audio_tracks();
                self.apply_camera_video_track();
                self.emitter.notify("Screen sharing started");
                self.phase_changed();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("screen capture failed: {e}");
                Err(self.reject(e))
            }
        }
    }

    /// Release everything and fall back to the disconnected baseline.
    /// Safe to call any number of times.
    pub fn end_call(&mut self) {
        self.gateway.release(self.camera.as_ref());
        self.camera = None;
        if let Some(share) = self.screen.take() {
            self.gateway.release(Some(&share.resource));
        }
        while self.external_rx.try_recv().is_ok() {}

        self.muted = true;
        self.video_enabled = false;
        self.audio_only = false;
        self.camera_permission = CameraPermission::Unknown;
        self.roster.disconnect();
        if self.joined {
            tracing::info!("call ended");
        }
        self.joined = false;
        self.phase_changed();
    }

    // ── External events ──────────────────────────────────────────────

    /// Wait for the next event raised outside the intent path.
    pub async fn next_external_event(&mut self) -> Option<ExternalEvent> {
        self.external_rx.recv().await
    }

    /// Handle every external event that has already arrived.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.external_rx.try_recv() {
            self.handle_external(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_external(&mut self, event: ExternalEvent) {
        match event {
            ExternalEvent::ScreenCaptureEnded { token } => {
                if self.screen.as_ref().is_some_and(|s| s.token == token) {
                    tracing::info!(token, "screen capture ended by the platform");
                    self.stop_screen_share("Screen sharing ended");
                } else {
                    tracing::debug!(token, "ignoring end of a capture that is no longer active");
                }
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn stop_screen_share(&mut self, notice: &str) {
        let Some(share) = self.screen.take() else {
            return;
        };
        self.gateway.release(Some(&share.resource));
        self.apply_camera_video_track();
        tracing::info!(token = share.token, "screen share stopped");
        self.emitter.notify(notice);
        self.phase_changed();
    }

    /// Camera video is live only when wanted and not superseded by a share.
    fn apply_camera_video_track(&self) {
        let enabled = self.video_enabled && !self.audio_only && self.screen.is_none();
        self.gateway
            .set_track_enabled(self.camera.as_ref(), TrackKind::Video, enabled);
    }

    fn apply_audio_tracks(&self) {
        let enabled = !self.muted;
        self.gateway
            .set_track_enabled(self.camera.as_ref(), TrackKind::Audio, enabled);
        self.gateway
            .set_track_enabled(self.screen(), TrackKind::Audio, enabled);
    }

    fn ensure_joined(&self) -> Result<(), HuddleError> {
        if self.joined {
            Ok(())
        } else {
            Err(self.reject(HuddleError::ValidationRejected("not in a call".into())))
        }
    }

    fn reject(&self, error: HuddleError) -> HuddleError {
        self.emitter.report(&error);
        error
    }

    fn phase_changed(&mut self) {
        let phase = self.phase();
        if phase != self.last_phase {
            self.last_phase = phase;
            self.emitter.emit(HuddleEvent::StateChanged(phase));
        }
    }
}

impl Drop for ConferenceSession {
    fn drop(&mut self) {
        self.end_call();
    }
}
