//! Headless front end for the huddle core.
//!
//! Reads one command per line on stdin and prints the derived meeting view
//! as JSON on stdout. Logs go to stderr.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use huddle_core::media::simulated::SimulatedGateway;
use huddle_core::{
    AuthProvider, HttpReplySuggester, HuddleEvent, HuddleEventListener, JoinOptions,
    LocalAuthProvider, Meeting, Participant, Presence, Profile, ReplySuggester, Role,
    SessionContext, SettingsStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{Command, HELP};

const DEMO_PASSWORD: &str = "huddle-demo";
const VIEWPORT_WIDTH: f64 = 1280.0;

/// Prints notices and navigation events as they happen.
struct ConsoleListener;

impl HuddleEventListener for ConsoleListener {
    fn on_event(&self, event: HuddleEvent) {
        match event {
            HuddleEvent::Notice { level, message } => eprintln!("[{level:?}] {message}"),
            HuddleEvent::SuggestionsUpdated(suggestions) if !suggestions.is_empty() => {
                for (i, s) in suggestions.iter().enumerate() {
                    eprintln!("  suggestion {}: {s}", i + 1);
                }
            }
            HuddleEvent::NavigateAway => eprintln!("left the call"),
            HuddleEvent::SignedOut => eprintln!("signed out"),
            other => tracing::debug!(?other, "event"),
        }
    }
}

fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("HUDDLE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|dir| dir.join("huddle"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn demo_roster() -> Vec<Participant> {
    let host = Role { name: "Hosts".into(), color: "#e67e22".into(), rank: 0 };
    vec![
        Participant::new("u-alice", "Alice").with_role(host),
        Participant::new("u-bob", "Bob"),
        Participant::new("u-chen", "Chen").with_presence(Presence::Offline),
    ]
}

fn print_view(meeting: &Meeting) {
    match serde_json::to_string_pretty(&meeting.view()) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("failed to serialize meeting view: {e}"),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("huddle_core=info,huddle_shell=info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = data_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(dir = %dir.display(), "cannot create data dir: {e}");
    }
    let store = SettingsStore::new(&dir);
    let settings = store.get();

    let auth = Arc::new(LocalAuthProvider::new());
    let email = std::env::var("HUDDLE_EMAIL").unwrap_or_else(|_| "guest@huddle.local".into());
    let user = auth.sign_up(&email, DEMO_PASSWORD).await?;
    if settings.display_name.is_some() {
        auth.set_profile(
            &user.id,
            Profile { name: settings.display_name.clone(), avatar_url: None },
        );
    }
    let context = SessionContext::establish(auth.clone()).await?;
    let mut session_changes = context.subscribe();

    let gateway = Arc::new(SimulatedGateway::new());
    let suggester = settings.suggestion_endpoint.clone().map(|endpoint| {
        tracing::info!(%endpoint, "reply suggestions enabled");
        Arc::new(HttpReplySuggester::new(endpoint)) as Arc<dyn ReplySuggester>
    });

    let mut meeting = Meeting::new(context, gateway.clone(), suggester, &settings, VIEWPORT_WIDTH);
    meeting.add_listener(Arc::new(ConsoleListener));
    meeting.join(demo_roster(), JoinOptions::from(&settings)).await?;
    tracing::info!(user = %user.email, "huddle shell ready, type 'help'");
    print_view(&meeting);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut logging_out = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match Command::parse(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        eprintln!("{message}");
                        continue;
                    }
                };
                match command {
                    Command::Quit => break,
                    Command::Help => {
                        eprintln!("{HELP}");
                        continue;
                    }
                    Command::Logout => {
                        logging_out = true;
                        break;
                    }
                    command => execute(&mut meeting, &gateway, &store, command).await,
                }
                print_view(&meeting);
            }
            Some(event) = meeting.next_external_event() => {
                meeting.handle_external(event);
                print_view(&meeting);
            }
            Ok(()) = session_changes.changed() => {
                let user = session_changes.borrow_and_update().clone();
                meeting.on_session_changed(user);
            }
        }
    }

    leave(&mut meeting, logging_out).await;
    print_view(&meeting);
    Ok(())
}

/// End the call exactly once on the way out.
async fn leave(meeting: &mut Meeting, logging_out: bool) {
    meeting.end_call(logging_out).await;
}

/// Apply one command. Failures were already reported as notices.
async fn execute(
    meeting: &mut Meeting,
    gateway: &SimulatedGateway,
    store: &SettingsStore,
    command: Command,
) {
    let result = match command {
        Command::Join => {
            let options = JoinOptions::from(&store.get());
            meeting.join(demo_roster(), options).await
        }
        Command::Mute => {
            meeting.toggle_mute();
            Ok(())
        }
        Command::Video => meeting.toggle_video().await,
        Command::AudioOnly => meeting.toggle_audio_only(),
        Command::Share => meeting.toggle_screen_share().await,
        Command::PlatformStopShare => {
            if !gateway.end_screen_capture() {
                eprintln!("no screen capture to end");
            }
            // Let the select loop pick the event up like any other platform signal.
            Ok(())
        }
        Command::Say(text) => meeting.send_message(&text).map(|_| ()),
        Command::Receive { sender, text } => {
            meeting.receive_message(&sender, &text);
            Ok(())
        }
        Command::Compose(text) => {
            meeting.set_compose(&text);
            Ok(())
        }
        Command::UseSuggestion(index) => {
            match meeting.chat().suggestions().get(index).cloned() {
                Some(text) => meeting.apply_suggestion(&text),
                None => eprintln!("no suggestion {}", index + 1),
            }
            Ok(())
        }
        Command::TogglePanel(panel) => {
            meeting.toggle_panel(panel);
            Ok(())
        }
        Command::Resize { panel, pointer_x } => {
            meeting.begin_resize(panel);
            meeting.resize_to(panel, pointer_x);
            meeting.end_resize(panel);
            let layout = meeting.view().layout;
            store.set_panel_widths(layout.chat.width, layout.members.width);
            Ok(())
        }
        Command::Viewport(width) => {
            meeting.set_viewport_width(width);
            Ok(())
        }
        Command::End => {
            meeting.end_call(false).await;
            Ok(())
        }
        Command::State | Command::Help | Command::Logout | Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        tracing::debug!("command failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::{EventLog, Settings};

    async fn joined_meeting() -> (Meeting, Arc<LocalAuthProvider>, Arc<EventLog>) {
        let auth = Arc::new(LocalAuthProvider::new());
        auth.sign_up("shell@example.com", DEMO_PASSWORD).await.unwrap();
        let context = SessionContext::establish(auth.clone()).await.unwrap();
        let mut meeting = Meeting::new(
            context,
            Arc::new(SimulatedGateway::new()),
            None,
            &Settings::default(),
            VIEWPORT_WIDTH,
        );
        let log = Arc::new(EventLog::new());
        meeting.add_listener(log.clone());
        meeting.join(demo_roster(), JoinOptions::default()).await.unwrap();
        (meeting, auth, log)
    }

    #[tokio::test]
    async fn logout_signs_out_without_navigating_away() {
        let (mut meeting, auth, log) = joined_meeting().await;
        leave(&mut meeting, true).await;

        let events = log.take();
        assert!(events.iter().any(|e| matches!(e, HuddleEvent::SignedOut)));
        assert!(!events.iter().any(|e| matches!(e, HuddleEvent::NavigateAway)));
        assert!(auth.current_user().is_none());
    }

    #[tokio::test]
    async fn quitting_keeps_the_user_signed_in() {
        let (mut meeting, auth, log) = joined_meeting().await;
        leave(&mut meeting, false).await;

        let events = log.take();
        assert_eq!(
            events.iter().filter(|e| matches!(e, HuddleEvent::NavigateAway)).count(),
            1
        );
        assert!(!events.iter().any(|e| matches!(e, HuddleEvent::SignedOut)));
        assert!(auth.current_user().is_some());
    }

    #[test]
    fn demo_roster_has_an_offline_member() {
        let groups = huddle_core::member_groups(&demo_roster());
        let titles: Vec<_> = groups.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(titles, ["Hosts", "Members", "Offline"]);
    }
}
