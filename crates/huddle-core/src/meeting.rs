use std::sync::Arc;

use serde::Serialize;

use crate::auth::{SessionContext, User};
use crate::chat::{ChatSession, ChatView};
use crate::errors::HuddleError;
use crate::events::{ChatMessage, EventEmitter, HuddleEvent, HuddleEventListener};
use crate::layout::{LayoutView, Panel, PanelLayout};
use crate::media::{ExternalEvent, MediaDeviceGateway};
use crate::participants::{MemberGroup, Participant};
use crate::session::{ConferenceSession, ControlsView, JoinOptions, SessionSnapshot};
use crate::settings::Settings;
use crate::suggest::ReplySuggester;

/// Everything the presentation layer reads, derived fresh on each call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeetingView {
    pub state: SessionSnapshot,
    pub controls: ControlsView,
    pub participants: Vec<Participant>,
    pub members: Vec<MemberGroup>,
    pub chat: ChatView,
    pub layout: LayoutView,
}

/// One user's meeting page: conference state, chat and side panels bound
/// to the authenticated session.
pub struct Meeting {
    emitter: EventEmitter,
    context: Option<SessionContext>,
    session: ConferenceSession,
    chat: ChatSession,
    panels: PanelLayout,
}

impl Meeting {
    pub fn new(
        context: SessionContext,
        gateway: Arc<dyn MediaDeviceGateway>,
        suggester: Option<Arc<dyn ReplySuggester>>,
        settings: &Settings,
        viewport_width: f64,
    ) -> Self {
        let emitter = EventEmitter::new();
        Self {
            session: ConferenceSession::new(gateway, emitter.clone()),
            chat: ChatSession::new(emitter.clone(), suggester, settings.suggestion_debounce()),
            panels: PanelLayout::new(
                emitter.clone(),
                viewport_width,
                settings.chat_panel_width,
                settings.members_panel_width,
            ),
            context: Some(context),
            emitter,
        }
    }

    /// Register a listener for meeting events.
    pub fn add_listener(&self, listener: Arc<dyn HuddleEventListener>) {
        self.emitter.add_listener(listener);
    }

    pub fn context(&self) -> Option<&SessionContext> {
        self.context.as_ref()
    }

    pub fn session(&self) -> &ConferenceSession {
        &self.session
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn panels(&self) -> &PanelLayout {
        &self.panels
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.session.derive_render_state()
    }

    pub fn view(&self) -> MeetingView {
        MeetingView {
            state: self.session.snapshot(),
            controls: self.session.controls(),
            participants: self.session.derive_render_state(),
            members: self.session.member_groups(),
            chat: self.chat.view(),
            layout: self.panels.view(),
        }
    }

    // ── Call ─────────────────────────────────────────────────────────

    pub async fn join(
        &mut self,
        remotes: Vec<Participant>,
        options: JoinOptions,
    ) -> Result<(), HuddleError> {
        let Some(context) = self.context.as_ref() else {
            let e = HuddleError::Auth("sign in to join a call".into());
            self.emitter.report(&e);
            return Err(e);
        };
        let local = context.local_participant();
        self.session.join(local, remotes, options).await
    }

    pub fn toggle_mute(&mut self) {
        self.session.toggle_mute();
    }

    pub async fn toggle_video(&mut self) -> Result<(), HuddleError> {
        self.session.toggle_video().await
    }

    pub fn toggle_audio_only(&mut self) -> Result<(), HuddleError> {
        self.session.toggle_audio_only()
    }

    pub async fn toggle_screen_share(&mut self) -> Result<(), HuddleError> {
        self.session.toggle_screen_share().await
    }

    /// Tear the call down. With `logging_out` the user is also signed out
    /// and the session context dropped; otherwise the page navigates away.
    pub async fn end_call(&mut self, logging_out: bool) {
        self.chat.clear();
        self.session.end_call();

        if !logging_out {
            self.emitter.emit(HuddleEvent::NavigateAway);
            return;
        }
        if let Some(context) = self.context.take() {
            if let Err(e) = context.sign_out().await {
                tracing::warn!("sign-out failed, dropping local session anyway: {e}");
            }
        }
        self.emitter.emit(HuddleEvent::SignedOut);
    }

    /// Feed a session change from the auth provider. Losing the user ends
    /// the call the same way an explicit logout does, minus the sign-out call.
    pub fn on_session_changed(&mut self, user: Option<User>) {
        match (user, self.context.as_ref()) {
            (None, Some(context)) => {
                tracing::info!(user = %context.user().id, "session ended elsewhere");
                self.chat.clear();
                self.session.end_call();
                self.context = None;
                self.emitter.emit(HuddleEvent::SignedOut);
            }
            (Some(user), Some(context)) if user.id != context.user().id => {
                tracing::warn!(user = %user.id, "signed-in user changed mid-call");
            }
            _ => {}
        }
    }

    pub async fn next_external_event(&mut self) -> Option<ExternalEvent> {
        self.session.next_external_event().await
    }

    pub fn handle_external(&mut self, event: ExternalEvent) {
        self.session.handle_external(event);
    }

    pub fn process_pending_events(&mut self) -> usize {
        self.session.process_pending_events()
    }

    // ── Chat ─────────────────────────────────────────────────────────

    pub fn send_message(&mut self, text: &str) -> Result<ChatMessage, HuddleError> {
        let msg = self.chat.send(self.context.as_ref(), text)?;
        self.refresh_suggestions();
        Ok(msg)
    }

    pub fn receive_message(&mut self, sender: &str, text: &str) -> Option<ChatMessage> {
        let avatar = self
            .session
            .roster()
            .participants()
            .iter()
            .find(|p| p.display_name == sender)
            .and_then(|p| p.avatar_ref.clone());
        let msg = self.chat.receive(sender, text, avatar)?;
        self.refresh_suggestions();
        Some(msg)
    }

    pub fn set_compose(&mut self, text: &str) {
        self.chat.set_compose(text);
    }

    pub fn apply_suggestion(&mut self, text: &str) {
        self.chat.apply_suggestion(text);
    }

    fn refresh_suggestions(&mut self) {
        let panel_open = self.panels.is_open(Panel::Chat);
        self.chat.request_suggestions(self.context.as_ref(), panel_open);
    }

    // ── Panels ───────────────────────────────────────────────────────

    pub fn toggle_panel(&mut self, panel: Panel) -> bool {
        let open = self.panels.toggle(panel);
        if panel == Panel::Chat {
            self.refresh_suggestions();
        }
        open
    }

    pub fn begin_resize(&mut self, panel: Panel) {
        self.panels.begin_resize(panel);
    }

    pub fn resize_to(&mut self, panel: Panel, pointer_x: f64) -> Option<f64> {
        self.panels.resize_to(panel, pointer_x)
    }

    pub fn end_resize(&mut self, panel: Panel) {
        self.panels.end_resize(panel);
    }

    pub fn set_viewport_width(&mut self, width: f64) {
        self.panels.set_viewport_width(width);
    }
}
