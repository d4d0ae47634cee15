//! Global playback settings shared by every session.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use thiserror::Error;

use crate::context::SongContext;
use crate::notify::{Notifier, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecountMode {
    One,
    Two,
    /// Two bars from 120 bpm up, otherwise one.
    Auto,
}

impl PrecountMode {
    pub fn nb_bars(self, tempo: u16) -> i32 {
        match self {
            PrecountMode::One => 1,
            PrecountMode::Two => 2,
            PrecountMode::Auto if tempo >= 120 => 2,
            PrecountMode::Auto => 1,
        }
    }
}

/// Startup values for [`PlaybackSettings`], usually from the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackDefaults {
    pub tempo: u16,
    pub loop_count: i32,
    pub click_enabled: bool,
    pub click_pitch_high: u8,
    pub click_pitch_low: u8,
    pub click_velocity_high: u8,
    pub click_velocity_low: u8,
    pub precount_enabled: bool,
    pub precount_mode: PrecountMode,
    pub playback_key_transposition: i8,
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            tempo: 120,
            loop_count: 0,
            click_enabled: false,
            click_pitch_high: 34,
            click_pitch_low: 33,
            click_velocity_high: 110,
            click_velocity_low: 80,
            precount_enabled: false,
            precount_mode: PrecountMode::Auto,
            playback_key_transposition: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEvent {
    ClickPitchChanged,
    ClickVelocityChanged,
    PrecountModeChanged(PrecountMode),
    PlaybackKeyTranspositionChanged(i8),
    /// Defaults used for new sessions only.
    ClickEnabledChanged(bool),
    PrecountEnabledChanged(bool),
    LoopCountChanged(i32),
}

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("{name} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        name: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },
}

fn check_range(name: &'static str, value: i32, min: i32, max: i32) -> Result<(), SettingsError> {
    if value < min || value > max {
        return Err(SettingsError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

type VetoHook = Arc<dyn Fn(&SongContext) -> Result<(), String> + Send + Sync>;

#[derive(Default)]
struct VetoHooks {
    next_id: u64,
    hooks: Vec<(u64, VetoHook)>,
}

struct SettingsShared {
    values: RwLock<PlaybackDefaults>,
    notifier: Notifier<SettingsEvent>,
    vetoes: Arc<Mutex<VetoHooks>>,
}

/// Shared playback settings. Clones refer to the same settings.
#[derive(Clone)]
pub struct PlaybackSettings {
    inner: Arc<SettingsShared>,
}

impl PlaybackSettings {
    pub fn new(defaults: PlaybackDefaults) -> Self {
        Self {
            inner: Arc::new(SettingsShared {
                values: RwLock::new(defaults),
                notifier: Notifier::new(),
                vetoes: Arc::new(Mutex::new(VetoHooks::default())),
            }),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.playback_defaults())
    }

    fn values(&self) -> RwLockReadGuard<'_, PlaybackDefaults> {
        self.inner.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> PlaybackDefaults {
        self.values().clone()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&SettingsEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.notifier.subscribe(callback)
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.notifier.listener_count()
    }

    fn update(&self, event: SettingsEvent, f: impl FnOnce(&mut PlaybackDefaults)) {
        {
            let mut values = self.inner.values.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut values);
        }
        log::debug!(target: "settings", "{:?}", event);
        self.inner.notifier.notify(&event);
    }

    pub fn tempo(&self) -> u16 {
        self.values().tempo
    }

    pub fn loop_count(&self) -> i32 {
        self.values().loop_count
    }

    pub fn set_loop_count(&self, loop_count: i32) -> Result<(), SettingsError> {
        check_range("loop count", loop_count, crate::session::LOOP_CONTINUOUSLY, i32::MAX)?;
        self.update(SettingsEvent::LoopCountChanged(loop_count), |v| {
            v.loop_count = loop_count
        });
        Ok(())
    }

    pub fn is_click_enabled(&self) -> bool {
        self.values().click_enabled
    }

    pub fn set_click_enabled(&self, enabled: bool) {
        self.update(SettingsEvent::ClickEnabledChanged(enabled), |v| {
            v.click_enabled = enabled
        });
    }

    /// (high, low) click pitches.
    pub fn click_pitches(&self) -> (u8, u8) {
        let v = self.values();
        (v.click_pitch_high, v.click_pitch_low)
    }

    pub fn set_click_pitches(&self, high: u8, low: u8) -> Result<(), SettingsError> {
        check_range("click pitch high", high as i32, 0, 127)?;
        check_range("click pitch low", low as i32, 0, 127)?;
        self.update(SettingsEvent::ClickPitchChanged, |v| {
            v.click_pitch_high = high;
            v.click_pitch_low = low;
        });
        Ok(())
    }

    /// (high, low) click velocities.
    pub fn click_velocities(&self) -> (u8, u8) {
        let v = self.values();
        (v.click_velocity_high, v.click_velocity_low)
    }

    pub fn set_click_velocities(&self, high: u8, low: u8) -> Result<(), SettingsError> {
        check_range("click velocity high", high as i32, 1, 127)?;
        check_range("click velocity low", low as i32, 1, 127)?;
        self.update(SettingsEvent::ClickVelocityChanged, |v| {
            v.click_velocity_high = high;
            v.click_velocity_low = low;
        });
        Ok(())
    }

    pub fn is_precount_enabled(&self) -> bool {
        self.values().precount_enabled
    }

    pub fn set_precount_enabled(&self, enabled: bool) {
        self.update(SettingsEvent::PrecountEnabledChanged(enabled), |v| {
            v.precount_enabled = enabled
        });
    }

    pub fn precount_mode(&self) -> PrecountMode {
        self.values().precount_mode
    }

    pub fn set_precount_mode(&self, mode: PrecountMode) {
        self.update(SettingsEvent::PrecountModeChanged(mode), |v| {
            v.precount_mode = mode
        });
    }

    pub fn playback_key_transposition(&self) -> i8 {
        self.values().playback_key_transposition
    }

    pub fn set_playback_key_transposition(&self, semitones: i8) -> Result<(), SettingsError> {
        check_range("playback key transposition", semitones as i32, -11, 11)?;
        self.update(
            SettingsEvent::PlaybackKeyTranspositionChanged(semitones),
            |v| v.playback_key_transposition = semitones,
        );
        Ok(())
    }

    /// Register a hook that may abort an imminent playback start by returning
    /// `Err(reason)`. Removed when the returned subscription is dropped.
    pub fn add_veto_hook(
        &self,
        hook: impl Fn(&SongContext) -> Result<(), String> + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut vetoes = self.inner.vetoes.lock().unwrap_or_else(PoisonError::into_inner);
            let id = vetoes.next_id;
            vetoes.next_id += 1;
            vetoes.hooks.push((id, Arc::new(hook)));
            id
        };
        let weak = Arc::downgrade(&self.inner.vetoes);
        Subscription::from_cancel(move || {
            if let Some(vetoes) = weak.upgrade() {
                let mut vetoes = vetoes.lock().unwrap_or_else(PoisonError::into_inner);
                vetoes.hooks.retain(|(hook_id, _)| *hook_id != id);
            }
        })
    }

    /// Run every veto hook; the first refusal wins.
    pub fn check_pre_playback(&self, context: &SongContext) -> Result<(), String> {
        let hooks: Vec<VetoHook> = {
            let vetoes = self.inner.vetoes.lock().unwrap_or_else(PoisonError::into_inner);
            vetoes.hooks.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for hook in hooks {
            hook(context)?;
        }
        Ok(())
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self::new(PlaybackDefaults::default())
    }
}

impl std::fmt::Debug for PlaybackSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSettings")
            .field("values", &*self.values())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_precount_depends_on_tempo() {
        assert_eq!(PrecountMode::Auto.nb_bars(100), 1);
        assert_eq!(PrecountMode::Auto.nb_bars(160), 2);
        assert_eq!(PrecountMode::One.nb_bars(160), 1);
    }

    #[test]
    fn click_pitch_bounds_are_checked() {
        let settings = PlaybackSettings::default();
        assert!(settings.set_click_pitches(200, 33).is_err());
        assert_eq!(settings.click_pitches(), (34, 33));
        settings.set_click_pitches(76, 77).unwrap();
        assert_eq!(settings.click_pitches(), (76, 77));
    }

    #[test]
    fn transposition_bounds_are_checked() {
        let settings = PlaybackSettings::default();
        let err = settings.set_playback_key_transposition(12).unwrap_err();
        assert!(matches!(err, SettingsError::OutOfRange { value: 12, .. }));
    }

    #[test]
    fn setters_notify() {
        let settings = PlaybackSettings::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = settings.subscribe(move |e| s.lock().unwrap().push(e.clone()));
        settings.set_precount_mode(PrecountMode::Two);
        settings.set_click_enabled(true);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SettingsEvent::PrecountModeChanged(PrecountMode::Two),
                SettingsEvent::ClickEnabledChanged(true)
            ]
        );
    }
}
