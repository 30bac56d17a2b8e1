use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub mic_enabled_on_join: bool,
    /// Probe the camera as soon as the call is joined.
    #[serde(default)]
    pub camera_enabled_on_join: bool,
    #[serde(default)]
    pub suggestion_endpoint: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub suggestion_debounce_ms: u64,
    #[serde(default = "default_chat_width")]
    pub chat_panel_width: f64,
    #[serde(default = "default_members_width")]
    pub members_panel_width: f64,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_chat_width() -> f64 {
    320.0
}

fn default_members_width() -> f64 {
    280.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_name: None,
            mic_enabled_on_join: true,
            camera_enabled_on_join: false,
            suggestion_endpoint: None,
            suggestion_debounce_ms: default_debounce_ms(),
            chat_panel_width: default_chat_width(),
            members_panel_width: default_members_width(),
        }
    }
}

impl Settings {
    pub fn suggestion_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.lock().display_name = name;
        self.save();
    }

    pub fn set_mic_enabled_on_join(&self, enabled: bool) {
        self.lock().mic_enabled_on_join = enabled;
        self.save();
    }

    pub fn set_camera_enabled_on_join(&self, enabled: bool) {
        self.lock().camera_enabled_on_join = enabled;
        self.save();
    }

    pub fn set_suggestion_endpoint(&self, endpoint: Option<String>) {
        self.lock().suggestion_endpoint = endpoint;
        self.save();
    }

    pub fn set_panel_widths(&self, chat: f64, members: f64) {
        {
            let mut settings = self.lock();
            settings.chat_panel_width = chat;
            settings.members_panel_width = members;
        }
        self.save();
    }

    fn save(&self) {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("cannot create {}: {e}", parent.display());
            }
        }
        match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("cannot write {}: {e}", self.file_path.display());
                }
            }
            Err(e) => tracing::warn!("cannot serialize settings: {e}"),
        }
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn defaults_match_a_fresh_install() {
        let s = Settings::default();
        assert_eq!(s.display_name, None);
        assert!(s.mic_enabled_on_join);
        assert!(!s.camera_enabled_on_join);
        assert_eq!(s.suggestion_debounce(), Duration::from_secs(1));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = temp_dir();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn every_setter_survives_a_reload() {
        let dir = temp_dir();
        {
            let store = SettingsStore::new(dir.path());
            store.set_display_name(Some("Alice".to_string()));
            store.set_mic_enabled_on_join(false);
            store.set_camera_enabled_on_join(true);
            store.set_suggestion_endpoint(Some("http://localhost:9000/suggest".into()));
            store.set_panel_widths(400.0, 250.0);
        }
        let s = SettingsStore::new(dir.path()).get();
        assert_eq!(s.display_name, Some("Alice".to_string()));
        assert!(!s.mic_enabled_on_join);
        assert!(s.camera_enabled_on_join);
        assert_eq!(s.suggestion_endpoint.as_deref(), Some("http://localhost:9000/suggest"));
        assert_eq!(s.chat_panel_width, 400.0);
        assert_eq!(s.members_panel_width, 250.0);
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = temp_dir();
        fs::write(dir.path().join("settings.json"), "not json!!!").unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn absent_fields_take_their_defaults() {
        let dir = temp_dir();
        fs::write(
            dir.path().join("settings.json"),
            r#"{"display_name":"Eve","suggestion_debounce_ms":250}"#,
        )
        .unwrap();
        let s = SettingsStore::new(dir.path()).get();
        assert_eq!(s.display_name, Some("Eve".to_string()));
        assert!(s.mic_enabled_on_join);
        assert_eq!(s.suggestion_debounce_ms, 250);
        assert_eq!(s.chat_panel_width, 320.0);
    }
}
