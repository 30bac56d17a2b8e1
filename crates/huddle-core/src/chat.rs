use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::auth::SessionContext;
use crate::errors::HuddleError;
use crate::events::{ChatMessage, EventEmitter, HuddleEvent};
use crate::suggest::{ReplySuggester, serialize_transcript};

#[derive(Debug, Default)]
struct SuggestionState {
    suggestions: Vec<String>,
    /// Generation of the request currently shown as loading.
    loading_for: Option<u64>,
}

/// Read-only chat state for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatView {
    pub messages: Vec<ChatMessage>,
    pub suggestions: Vec<String>,
    pub loading: bool,
    pub compose: String,
}

/// Message log for the current call plus debounced reply suggestions.
///
/// Every trigger bumps a generation counter. A fetch only publishes its
/// result if no newer trigger happened while it was waiting or in flight.
pub struct ChatSession {
    emitter: EventEmitter,
    messages: Vec<ChatMessage>,
    compose: String,
    next_id: u64,
    suggester: Option<Arc<dyn ReplySuggester>>,
    debounce: Duration,
    suggestions: Arc<Mutex<SuggestionState>>,
    generation: Arc<AtomicU64>,
    pending: Option<JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(
        emitter: EventEmitter,
        suggester: Option<Arc<dyn ReplySuggester>>,
        debounce: Duration,
    ) -> Self {
        Self {
            emitter,
            messages: Vec::new(),
            compose: String::new(),
            next_id: 1,
            suggester,
            debounce,
            suggestions: Arc::new(Mutex::new(SuggestionState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
        }
    }

    fn push(
        &mut self,
        sender: String,
        text: String,
        is_own_message: bool,
        avatar_ref: Option<String>,
    ) -> ChatMessage {
        let msg = ChatMessage {
            id: self.next_id,
            sender,
            text,
            created_at: Utc::now(),
            is_own_message,
            avatar_ref,
        };
        self.next_id += 1;
        self.messages.push(msg.clone());
        self.emitter.emit(HuddleEvent::ChatMessageAdded(msg.clone()));
        msg
    }

    /// Append a message authored by the signed-in user and clear the compose buffer.
    pub fn send(
        &mut self,
        session: Option<&SessionContext>,
        text: &str,
    ) -> Result<ChatMessage, HuddleError> {
        let text = text.trim();
        let result = match session {
            _ if text.is_empty() => Err(HuddleError::ValidationRejected("message is empty".into())),
            None => Err(HuddleError::ValidationRejected("sign in to chat".into())),
            Some(session) => Ok(session),
        };
        let session = match result {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!("chat send rejected: {e}");
                self.emitter.report(&e);
                return Err(e);
            }
        };

        let msg = self.push(session.display_name(), text.to_string(), true, session.avatar_ref());
        self.compose.clear();
        tracing::info!(id = msg.id, "chat message sent");
        Ok(msg)
    }

    /// Append a message authored by someone else.
    pub fn receive(&mut self, sender: &str, text: &str, avatar_ref: Option<String>) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(self.push(sender.to_string(), text.to_string(), false, avatar_ref))
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn compose(&self) -> &str {
        &self.compose
    }

    pub fn set_compose(&mut self, text: &str) {
        self.compose = text.to_string();
    }

    /// Put a suggestion into the compose buffer. Does not send it.
    pub fn apply_suggestion(&mut self, text: &str) {
        self.set_compose(text);
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.state().suggestions.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading_for.is_some()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SuggestionState> {
        self.suggestions.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn view(&self) -> ChatView {
        let state = self.state();
        ChatView {
            messages: self.messages.clone(),
            suggestions: state.suggestions.clone(),
            loading: state.loading_for.is_some(),
            compose: self.compose.clone(),
        }
    }

    /// (Re)arm the suggestion timer. When it fires, the transcript is sent
    /// to the suggestion service once.
    ///
    /// Nothing is scheduled while the chat panel is closed, nobody is signed
    /// in, the log is empty or no service is configured.
    pub fn request_suggestions(&mut self, session: Option<&SessionContext>, panel_open: bool) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }

        let suggester = match &self.suggester {
            Some(s) if panel_open && session.is_some() && !self.messages.is_empty() => s.clone(),
            _ => {
                tracing::debug!(
                    panel_open,
                    signed_in = session.is_some(),
                    messages = self.messages.len(),
                    "suggestions suppressed"
                );
                if self.state().loading_for.take().is_some() {
                    self.emitter.emit(HuddleEvent::SuggestionsLoading(false));
                }
                return;
            }
        };

        let transcript = serialize_transcript(&self.messages);
        let debounce = self.debounce;
        let latest = self.generation.clone();
        let state = self.suggestions.clone();
        let emitter = self.emitter.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }

            state.lock().unwrap_or_else(|p| p.into_inner()).loading_for = Some(generation);
            emitter.emit(HuddleEvent::SuggestionsLoading(true));

            // Detached so a newer trigger only discards the result instead of
            // cancelling the request.
            tokio::spawn(async move {
                let result = suggester.suggest(&transcript).await;

                let mut guard = state.lock().unwrap_or_else(|p| p.into_inner());
                if latest.load(Ordering::SeqCst) != generation {
                    tracing::debug!(generation, "discarding superseded suggestions");
                    let was_loading = guard.loading_for == Some(generation);
                    if was_loading {
                        guard.loading_for = None;
                    }
                    drop(guard);
                    if was_loading {
                        emitter.emit(HuddleEvent::SuggestionsLoading(false));
                    }
                    return;
                }

                guard.loading_for = None;
                match result {
                    Ok(suggestions) => {
                        tracing::info!(count = suggestions.len(), "reply suggestions updated");
                        guard.suggestions = suggestions.clone();
                        drop(guard);
                        emitter.emit(HuddleEvent::SuggestionsUpdated(suggestions));
                    }
                    Err(e) => {
                        guard.suggestions.clear();
                        drop(guard);
                        let e = match e {
                            HuddleError::SuggestionService(_) => e,
                            other => HuddleError::SuggestionService(other.to_string()),
                        };
                        tracing::warn!("reply suggestions failed: {e}");
                        emitter.report(&e);
                        emitter.emit(HuddleEvent::SuggestionsUpdated(Vec::new()));
                    }
                }
                emitter.emit(HuddleEvent::SuggestionsLoading(false));
            });
        }));
    }

    /// Drop the log, the compose buffer and any suggestion work.
    pub fn clear(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.messages.clear();
        self.compose.clear();
        let mut state = self.state();
        state.suggestions.clear();
        state.loading_for = None;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthProvider, LocalAuthProvider};
    use crate::events::EventLog;
    use futures_util::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    type Scripted = (Duration, Result<Vec<String>, HuddleError>);

    #[derive(Default)]
    struct ScriptedSuggester {
        calls: AtomicUsize,
        histories: Mutex<Vec<String>>,
        script: Mutex<VecDeque<Scripted>>,
    }

    impl ScriptedSuggester {
        fn with(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ReplySuggester for ScriptedSuggester {
        fn suggest<'a>(&'a self, chat_history: &'a str) -> BoxFuture<'a, Result<Vec<String>, HuddleError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.histories.lock().unwrap().push(chat_history.to_string());
                let next = self.script.lock().unwrap().pop_front();
                let (delay, result) =
                    next.unwrap_or((Duration::ZERO, Ok(vec!["ok".to_string()])));
                tokio::time::sleep(delay).await;
                result
            })
        }
    }

    async fn signed_in() -> SessionContext {
        let provider = Arc::new(LocalAuthProvider::new());
        provider.sign_up("carol@example.com", "secret1").await.unwrap();
        SessionContext::establish(provider).await.unwrap()
    }

    fn chat_with(suggester: Arc<ScriptedSuggester>) -> (ChatSession, Arc<EventLog>) {
        let emitter = EventEmitter::new();
        let log = Arc::new(EventLog::new());
        emitter.add_listener(log.clone());
        let chat = ChatSession::new(emitter, Some(suggester), Duration::from_millis(1000));
        (chat, log)
    }

    #[tokio::test]
    async fn blank_messages_are_rejected() {
        let ctx = signed_in().await;
        let (mut chat, _log) = chat_with(ScriptedSuggester::with(vec![]));

        assert!(chat.send(Some(&ctx), "").is_err());
        assert!(chat.send(Some(&ctx), "   ").is_err());
        assert!(chat.messages().is_empty());

        let msg = chat.send(Some(&ctx), "hi").unwrap();
        assert_eq!(chat.messages().len(), 1);
        assert!(msg.is_own_message);
        assert_eq!(msg.sender, "carol");
        assert_eq!(msg.text, "hi");
    }

    #[tokio::test]
    async fn send_without_user_is_rejected() {
        let (mut chat, log) = chat_with(ScriptedSuggester::with(vec![]));
        chat.set_compose("draft");
        assert!(matches!(
            chat.send(None, "hello"),
            Err(HuddleError::ValidationRejected(_))
        ));
        assert!(chat.messages().is_empty());
        assert_eq!(chat.compose(), "draft");
        assert!(log.take().iter().any(|e| matches!(e, HuddleEvent::Notice { .. })));
    }

    #[tokio::test]
    async fn ids_are_increasing_and_send_clears_compose() {
        let ctx = signed_in().await;
        let (mut chat, _log) = chat_with(ScriptedSuggester::with(vec![]));
        chat.receive("Alice", "hello there", None);
        chat.apply_suggestion("hey Alice");
        assert_eq!(chat.compose(), "hey Alice");
        assert_eq!(chat.messages().len(), 1);

        let draft = chat.compose().to_string();
        let own = chat.send(Some(&ctx), &draft).unwrap();
        assert_eq!(chat.compose(), "");
        assert!(own.id > chat.messages()[0].id);
        assert!(chat.receive("Alice", "  ", None).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_triggers_collapse_into_one_request() {
        let ctx = signed_in().await;
        let suggester = ScriptedSuggester::with(vec![(
            Duration::ZERO,
            Ok(vec!["Sure".into(), "Maybe".into(), "No".into()]),
        )]);
        let (mut chat, _log) = chat_with(suggester.clone());

        for text in ["one", "two", "three"] {
            chat.send(Some(&ctx), text).unwrap();
            chat.request_suggestions(Some(&ctx), true);
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(suggester.calls(), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(suggester.calls(), 1);
        assert_eq!(
            suggester.histories.lock().unwrap()[0],
            "carol: one\ncarol: two\ncarol: three"
        );
        assert_eq!(chat.suggestions(), ["Sure", "Maybe", "No"]);
        assert!(!chat.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn suppressed_when_panel_closed_or_log_empty() {
        let ctx = signed_in().await;
        let suggester = ScriptedSuggester::with(vec![]);
        let (mut chat, _log) = chat_with(suggester.clone());

        chat.request_suggestions(Some(&ctx), true);
        tokio::time::sleep(Duration::from_secs(2)).await;

        chat.receive("Alice", "ping", None);
        chat.request_suggestions(Some(&ctx), false);
        tokio::time::sleep(Duration::from_secs(2)).await;

        chat.request_suggestions(None, true);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(suggester.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_clears_suggestions_and_reports() {
        let ctx = signed_in().await;
        let suggester = ScriptedSuggester::with(vec![
            (Duration::ZERO, Ok(vec!["first".into()])),
            (Duration::ZERO, Err(HuddleError::Http("connection reset".into()))),
        ]);
        let (mut chat, log) = chat_with(suggester.clone());

        chat.receive("Alice", "ping", None);
        chat.request_suggestions(Some(&ctx), true);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(chat.suggestions(), ["first"]);
        log.take();

        chat.receive("Alice", "pong", None);
        chat.request_suggestions(Some(&ctx), true);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(chat.suggestions().is_empty());
        assert!(!chat.is_loading());
        let reported = log.take().into_iter().any(|e| match e {
            HuddleEvent::Notice { message, .. } => message.contains("suggestion service failed"),
            _ => false,
        });
        assert!(reported);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_in_flight_result_is_discarded() {
        let ctx = signed_in().await;
        let suggester = ScriptedSuggester::with(vec![
            (Duration::from_secs(5), Ok(vec!["stale".into()])),
            (Duration::ZERO, Ok(vec!["fresh".into()])),
        ]);
        let (mut chat, _log) = chat_with(suggester.clone());

        chat.receive("Alice", "first", None);
        chat.request_suggestions(Some(&ctx), true);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(suggester.calls(), 1);
        assert!(chat.is_loading());

        chat.receive("Alice", "second", None);
        chat.request_suggestions(Some(&ctx), true);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(chat.suggestions(), ["fresh"]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(suggester.calls(), 2);
        assert_eq!(chat.suggestions(), ["fresh"]);
        assert!(!chat.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_log_and_pending_request() {
        let ctx = signed_in().await;
        let suggester = ScriptedSuggester::with(vec![]);
        let (mut chat, _log) = chat_with(suggester.clone());

        chat.send(Some(&ctx), "bye").unwrap();
        chat.request_suggestions(Some(&ctx), true);
        chat.clear();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(suggester.calls(), 0);
        assert_eq!(chat.view().messages.len(), 0);
    }
}
