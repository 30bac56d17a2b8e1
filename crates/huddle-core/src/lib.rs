//! Huddle meeting client core.
//!
//! Pure Rust crate with no platform capture code. Capture devices, the
//! identity provider and the reply-suggestion service are reached through
//! traits; presentation shells read derived views and send intents.

pub mod auth;
pub mod chat;
pub mod errors;
pub mod events;
pub mod layout;
pub mod media;
pub mod meeting;
pub mod participants;
pub mod session;
pub mod settings;
pub mod suggest;

pub use auth::{AuthProvider, LocalAuthProvider, OAuthProvider, Profile, SessionContext, User};
pub use chat::{ChatSession, ChatView};
pub use errors::HuddleError;
pub use events::{
    CallPhase, ChatMessage, EventEmitter, EventLog, HuddleEvent, HuddleEventListener, MediaSource,
    NoticeLevel, TrackKind,
};
pub use layout::{LayoutView, MIN_PANEL_WIDTH, Panel, PanelLayout, PanelState};
pub use media::{
    CaptureEndedHook, CaptureTracks, ExternalEvent, MediaDeviceGateway, MediaResource,
    MediaStreamRef,
};
pub use meeting::{Meeting, MeetingView};
pub use participants::{member_groups, MemberGroup, Participant, ParticipantId, Presence, Role, Roster};
pub use session::{CameraPermission, ConferenceSession, ControlsView, JoinOptions, SessionSnapshot};
pub use settings::{Settings, SettingsStore};
pub use suggest::{HttpReplySuggester, ReplySuggester};
