use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::model::settings::{PlaybackDefaults, PrecountMode};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    playback: PlaybackConfig,
    #[serde(default)]
    generation: GenerationConfig,
}

#[derive(Deserialize, Default)]
struct PlaybackConfig {
    tempo: Option<u16>,
    loop_count: Option<i32>,
    click_enabled: Option<bool>,
    click_pitch_high: Option<u8>,
    click_pitch_low: Option<u8>,
    click_velocity_high: Option<u8>,
    click_velocity_low: Option<u8>,
    precount_enabled: Option<bool>,
    precount_mode: Option<String>,
    playback_key_transposition: Option<i8>,
}

#[derive(Deserialize, Default)]
struct GenerationConfig {
    pre_update_buffer_ms: Option<u64>,
    midi_activity_window_ticks: Option<i64>,
    auto_update: Option<bool>,
}

pub struct Config {
    playback: PlaybackConfig,
    generation: GenerationConfig,
}

impl Config {
    /// Embedded defaults merged with the user file, if any.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::embedded(),
        }
    }

    /// Embedded defaults merged with the file at `path`. A missing or
    /// malformed file is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        if !path.exists() {
            return config;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => {
                    merge_playback(&mut config.playback, user.playback);
                    merge_generation(&mut config.generation, user.generation);
                }
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
        config
    }

    fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is invalid: {}", e);
            ConfigFile::default()
        });
        Config {
            playback: base.playback,
            generation: base.generation,
        }
    }

    pub fn playback_defaults(&self) -> PlaybackDefaults {
        let fallback = PlaybackDefaults::default();
        PlaybackDefaults {
            tempo: self.playback.tempo.unwrap_or(fallback.tempo).clamp(20, 400),
            loop_count: self
                .playback
                .loop_count
                .unwrap_or(fallback.loop_count)
                .max(crate::session::LOOP_CONTINUOUSLY),
            click_enabled: self.playback.click_enabled.unwrap_or(fallback.click_enabled),
            click_pitch_high: self
                .playback
                .click_pitch_high
                .unwrap_or(fallback.click_pitch_high)
                .min(127),
            click_pitch_low: self
                .playback
                .click_pitch_low
                .unwrap_or(fallback.click_pitch_low)
                .min(127),
            click_velocity_high: self
                .playback
                .click_velocity_high
                .unwrap_or(fallback.click_velocity_high)
                .min(127),
            click_velocity_low: self
                .playback
                .click_velocity_low
                .unwrap_or(fallback.click_velocity_low)
                .min(127),
            precount_enabled: self
                .playback
                .precount_enabled
                .unwrap_or(fallback.precount_enabled),
            precount_mode: self
                .playback
                .precount_mode
                .as_deref()
                .and_then(parse_precount_mode)
                .unwrap_or(fallback.precount_mode),
            playback_key_transposition: self
                .playback
                .playback_key_transposition
                .unwrap_or(fallback.playback_key_transposition)
                .clamp(-11, 11),
        }
    }

    /// Delay the generation queue waits to coalesce bursts of requests.
    pub fn pre_update_buffer(&self) -> Duration {
        Duration::from_millis(self.generation.pre_update_buffer_ms.unwrap_or(300).min(5_000))
    }

    /// Ticks during which further MIDI activity on a channel is folded into one event.
    pub fn midi_activity_window_ticks(&self) -> i64 {
        self.generation
            .midi_activity_window_ticks
            .unwrap_or(240)
            .max(1)
    }

    /// Whether new sessions regenerate in the background instead of going outdated.
    pub fn auto_update_enabled(&self) -> bool {
        self.generation.auto_update.unwrap_or(false)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("comping").join("config.toml"))
}

fn merge_playback(base: &mut PlaybackConfig, user: PlaybackConfig) {
    if user.tempo.is_some() {
        base.tempo = user.tempo;
    }
    if user.loop_count.is_some() {
        base.loop_count = user.loop_count;
    }
    if user.click_enabled.is_some() {
        base.click_enabled = user.click_enabled;
    }
    if user.click_pitch_high.is_some() {
        base.click_pitch_high = user.click_pitch_high;
    }
    if user.click_pitch_low.is_some() {
        base.click_pitch_low = user.click_pitch_low;
    }
    if user.click_velocity_high.is_some() {
        base.click_velocity_high = user.click_velocity_high;
    }
    if user.click_velocity_low.is_some() {
        base.click_velocity_low = user.click_velocity_low;
    }
    if user.precount_enabled.is_some() {
        base.precount_enabled = user.precount_enabled;
    }
    if user.precount_mode.is_some() {
        base.precount_mode = user.precount_mode;
    }
    if user.playback_key_transposition.is_some() {
        base.playback_key_transposition = user.playback_key_transposition;
    }
}

fn merge_generation(base: &mut GenerationConfig, user: GenerationConfig) {
    if user.pre_update_buffer_ms.is_some() {
        base.pre_update_buffer_ms = user.pre_update_buffer_ms;
    }
    if user.midi_activity_window_ticks.is_some() {
        base.midi_activity_window_ticks = user.midi_activity_window_ticks;
    }
    if user.auto_update.is_some() {
        base.auto_update = user.auto_update;
    }
}

fn parse_precount_mode(s: &str) -> Option<PrecountMode> {
    match s {
        "One" | "1" | "OneBar" => Some(PrecountMode::One),
        "Two" | "2" | "TwoBars" => Some(PrecountMode::Two),
        "Auto" => Some(PrecountMode::Auto),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::embedded();
        let defaults = config.playback_defaults();
        assert_eq!(defaults.tempo, 120);
        assert_eq!(defaults.loop_count, 0);
        assert_eq!(defaults.click_pitch_high, 34);
        assert_eq!(defaults.precount_mode, PrecountMode::Auto);
        assert!(!defaults.click_enabled);
        assert_eq!(config.pre_update_buffer(), Duration::from_millis(300));
        assert_eq!(config.midi_activity_window_ticks(), 240);
        assert!(!config.auto_update_enabled());
    }

    #[test]
    fn test_auto_update_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[generation]\nauto_update = true\n").unwrap();
        assert!(Config::load_from(&path).auto_update_enabled());
    }

    #[test]
    fn test_user_file_overrides_single_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[playback]\nclick_enabled = true\nprecount_mode = \"Two\"").unwrap();
        writeln!(f, "[generation]\npre_update_buffer_ms = 50").unwrap();
        drop(f);

        let config = Config::load_from(&path);
        let defaults = config.playback_defaults();
        assert!(defaults.click_enabled);
        assert_eq!(defaults.precount_mode, PrecountMode::Two);
        // Untouched keys keep embedded values
        assert_eq!(defaults.click_velocity_low, 80);
        assert_eq!(config.pre_update_buffer(), Duration::from_millis(50));
    }

    #[test]
    fn test_malformed_user_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[playback\ntempo = ").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.playback_defaults().tempo, 120);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[playback]\nplayback_key_transposition = 40\nloop_count = -7\n",
        )
        .unwrap();
        let defaults = Config::load_from(&path).playback_defaults();
        assert_eq!(defaults.playback_key_transposition, 11);
        assert_eq!(defaults.loop_count, -1);
    }
}
