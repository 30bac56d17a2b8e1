use huddle_core::Panel;

/// One line of shell input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join,
    Mute,
    Video,
    AudioOnly,
    Share,
    /// Simulate the OS ending the screen capture (e.g. the browser's "stop sharing" bar).
    PlatformStopShare,
    Say(String),
    Receive { sender: String, text: String },
    Compose(String),
    UseSuggestion(usize),
    TogglePanel(Panel),
    Resize { panel: Panel, pointer_x: f64 },
    Viewport(f64),
    State,
    End,
    Logout,
    Help,
    Quit,
}

fn parse_panel(word: Option<&str>) -> Result<Panel, String> {
    match word {
        Some("chat") => Ok(Panel::Chat),
        Some("members") => Ok(Panel::Members),
        Some(other) => Err(format!("unknown panel '{other}'")),
        None => Err("expected a panel: chat or members".into()),
    }
}

fn parse_number(word: Option<&str>, what: &str) -> Result<f64, String> {
    let word = word.ok_or_else(|| format!("expected {what}"))?;
    word.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("invalid {what} '{word}'"))
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let mut words = rest.split_whitespace();

        let command = match verb {
            "join" => Command::Join,
            "mute" => Command::Mute,
            "video" => Command::Video,
            "audio-only" => Command::AudioOnly,
            "share" => Command::Share,
            "os-stop-share" => Command::PlatformStopShare,
            "say" | "chat" => Command::Say(rest.to_string()),
            "recv" => {
                let (sender, text) = rest
                    .split_once(':')
                    .ok_or("usage: recv <sender>: <text>")?;
                Command::Receive {
                    sender: sender.trim().to_string(),
                    text: text.trim().to_string(),
                }
            }
            "compose" => Command::Compose(rest.to_string()),
            "suggestion" => {
                let n = words
                    .next()
                    .and_then(|w| w.parse::<usize>().ok())
                    .filter(|n| *n >= 1)
                    .ok_or("usage: suggestion <1-3>")?;
                Command::UseSuggestion(n - 1)
            }
            "panel" => Command::TogglePanel(parse_panel(words.next())?),
            "resize" => {
                let panel = parse_panel(words.next())?;
                let pointer_x = parse_number(words.next(), "pointer x")?;
                Command::Resize { panel, pointer_x }
            }
            "viewport" => Command::Viewport(parse_number(words.next(), "viewport width")?),
            "state" | "" => Command::State,
            "end" => Command::End,
            "logout" => Command::Logout,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(command)
    }
}

pub const HELP: &str = "\
commands:
  join                     rejoin after ending the call
  mute | video | audio-only | share
  os-stop-share            end the screen capture from the platform side
  say <text>               send a chat message
  recv <sender>: <text>    deliver a message from someone else
  compose <text>           set the compose buffer
  suggestion <n>           copy reply suggestion n into the compose buffer
  panel chat|members       open or close a side panel
  resize chat|members <x>  drag a panel handle to pointer x
  viewport <width>         resize the window
  state                    print the current state
  end | logout | quit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_verbs() {
        assert_eq!(Command::parse("mute"), Ok(Command::Mute));
        assert_eq!(Command::parse("  audio-only "), Ok(Command::AudioOnly));
        assert_eq!(Command::parse(""), Ok(Command::State));
        assert_eq!(Command::parse("exit"), Ok(Command::Quit));
    }

    #[test]
    fn chat_keeps_the_full_text() {
        assert_eq!(
            Command::parse("say hello there  world"),
            Ok(Command::Say("hello there  world".into()))
        );
        assert_eq!(
            Command::parse("recv Alice: lunch at noon?"),
            Ok(Command::Receive { sender: "Alice".into(), text: "lunch at noon?".into() })
        );
        assert!(Command::parse("recv Alice").is_err());
    }

    #[test]
    fn panel_commands() {
        assert_eq!(Command::parse("panel members"), Ok(Command::TogglePanel(Panel::Members)));
        assert_eq!(
            Command::parse("resize chat 880.5"),
            Ok(Command::Resize { panel: Panel::Chat, pointer_x: 880.5 })
        );
        assert!(Command::parse("resize chat").is_err());
        assert!(Command::parse("resize sidebar 10").is_err());
        assert!(Command::parse("viewport NaN").is_err());
    }

    #[test]
    fn suggestions_are_one_based() {
        assert_eq!(Command::parse("suggestion 1"), Ok(Command::UseSuggestion(0)));
        assert!(Command::parse("suggestion 0").is_err());
    }

    #[test]
    fn unknown_verbs_are_errors() {
        assert!(Command::parse("dance").is_err());
    }
}
