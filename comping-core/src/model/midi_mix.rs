//! Observable MIDI mix handle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use comping_types::{Instrument, InstrumentMix, MidiMix, RhythmVoiceId, Song};

use crate::notify::{Notifier, Subscription};

static NEXT_MIX_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub enum MidiMixEvent {
    InstrumentChanged { channel: u8 },
    ChannelAdded { channel: u8 },
    ChannelRemoved { channel: u8 },
    DrumsRerouted { channel: u8, rerouted: bool },
    VelocityShiftChanged { channel: u8, shift: i8 },
    TranspositionChanged { channel: u8, semitones: i8 },
    MuteChanged { channel: u8, mute: bool },
    VolumeChanged { channel: u8, volume: u8 },
    PanChanged { channel: u8, pan: u8 },
}

impl MidiMixEvent {
    /// Mute, volume and pan are applied live by the sequencer and never
    /// require new music.
    pub fn is_music_relevant(&self) -> bool {
        !matches!(
            self,
            MidiMixEvent::MuteChanged { .. }
                | MidiMixEvent::VolumeChanged { .. }
                | MidiMixEvent::PanChanged { .. }
        )
    }

    pub fn channel(&self) -> u8 {
        match self {
            MidiMixEvent::InstrumentChanged { channel }
            | MidiMixEvent::ChannelAdded { channel }
            | MidiMixEvent::ChannelRemoved { channel }
            | MidiMixEvent::DrumsRerouted { channel, .. }
            | MidiMixEvent::VelocityShiftChanged { channel, .. }
            | MidiMixEvent::TranspositionChanged { channel, .. }
            | MidiMixEvent::MuteChanged { channel, .. }
            | MidiMixEvent::VolumeChanged { channel, .. }
            | MidiMixEvent::PanChanged { channel, .. } => *channel,
        }
    }
}

struct MixShared {
    id: u64,
    mix: RwLock<MidiMix>,
    notifier: Notifier<MidiMixEvent>,
}

/// Shared, identity-compared MIDI mix. Clones refer to the same mix.
#[derive(Clone)]
pub struct MidiMixHandle {
    inner: Arc<MixShared>,
}

impl MidiMixHandle {
    pub fn new(mix: MidiMix) -> Self {
        Self {
            inner: Arc::new(MixShared {
                id: NEXT_MIX_ID.fetch_add(1, Ordering::Relaxed),
                mix: RwLock::new(mix),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Mix with one channel per rhythm voice of `song`.
    pub fn for_song(song: &Song) -> Self {
        Self::new(MidiMix::from_rhythms(song.rhythms()))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &MidiMixHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&MidiMix) -> R) -> R {
        let mix = self.inner.mix.read().unwrap_or_else(PoisonError::into_inner);
        f(&mix)
    }

    pub fn snapshot(&self) -> MidiMix {
        self.read(|m| m.clone())
    }

    pub fn deep_copy(&self) -> MidiMixHandle {
        MidiMixHandle::new(self.snapshot())
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&MidiMixEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.notifier.subscribe(callback)
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.notifier.listener_count()
    }

    /// Apply `f` to the channel's mix; fire `event` only if the channel exists.
    fn update_channel(
        &self,
        channel: u8,
        event: MidiMixEvent,
        f: impl FnOnce(&mut InstrumentMix),
    ) -> bool {
        let found = {
            let mut mix = self.inner.mix.write().unwrap_or_else(PoisonError::into_inner);
            match mix.instrument_mix_mut(channel) {
                Some(im) => {
                    f(im);
                    true
                }
                None => false,
            }
        };
        if found {
            log::debug!(target: "midimix", "mix#{} {:?}", self.inner.id, event);
            self.inner.notifier.notify(&event);
        } else {
            log::warn!(target: "midimix", "mix#{} has no channel {}", self.inner.id, channel);
        }
        found
    }

    pub fn set_instrument(&self, channel: u8, instrument: Instrument) -> bool {
        self.update_channel(channel, MidiMixEvent::InstrumentChanged { channel }, |im| {
            im.instrument = instrument
        })
    }

    pub fn set_drums_rerouted(&self, channel: u8, rerouted: bool) -> bool {
        self.update_channel(
            channel,
            MidiMixEvent::DrumsRerouted { channel, rerouted },
            |im| im.drums_rerouted = rerouted,
        )
    }

    pub fn set_velocity_shift(&self, channel: u8, shift: i8) -> bool {
        self.update_channel(
            channel,
            MidiMixEvent::VelocityShiftChanged { channel, shift },
            |im| im.velocity_shift = shift,
        )
    }

    pub fn set_transposition(&self, channel: u8, semitones: i8) -> bool {
        self.update_channel(
            channel,
            MidiMixEvent::TranspositionChanged { channel, semitones },
            |im| im.transposition = semitones,
        )
    }

    pub fn set_mute(&self, channel: u8, mute: bool) -> bool {
        self.update_channel(channel, MidiMixEvent::MuteChanged { channel, mute }, |im| {
            im.mute = mute
        })
    }

    pub fn set_volume(&self, channel: u8, volume: u8) -> bool {
        let volume = volume.min(127);
        self.update_channel(channel, MidiMixEvent::VolumeChanged { channel, volume }, |im| {
            im.volume = volume
        })
    }

    pub fn set_pan(&self, channel: u8, pan: u8) -> bool {
        let pan = pan.min(127);
        self.update_channel(channel, MidiMixEvent::PanChanged { channel, pan }, |im| {
            im.pan = pan
        })
    }

    pub fn set_channel(&self, channel: u8, voice: RhythmVoiceId, mix: InstrumentMix) {
        {
            let mut m = self.inner.mix.write().unwrap_or_else(PoisonError::into_inner);
            m.set_channel(channel, voice, mix);
        }
        self.inner
            .notifier
            .notify(&MidiMixEvent::ChannelAdded { channel });
    }

    pub fn remove_channel(&self, channel: u8) -> Option<InstrumentMix> {
        let removed = {
            let mut m = self.inner.mix.write().unwrap_or_else(PoisonError::into_inner);
            m.remove_channel(channel)
        };
        if removed.is_some() {
            self.inner
                .notifier
                .notify(&MidiMixEvent::ChannelRemoved { channel });
        }
        removed
    }

    /// Channels that would need drums rerouting if `remap` were applied,
    /// using `song`'s rhythms to know which voices are drums.
    pub fn channels_needing_drums_rerouting(
        &self,
        remap: &BTreeMap<u8, Instrument>,
        song: &Song,
    ) -> Vec<u8> {
        let rhythms = song.rhythms();
        let is_drums = |voice: &RhythmVoiceId| {
            rhythms
                .iter()
                .filter_map(|r| r.voice(voice))
                .any(|v| v.kind.is_drums())
        };
        self.read(|m| m.channels_needing_drums_rerouting(remap, is_drums))
    }
}

impl PartialEq for MidiMixHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for MidiMixHandle {}

impl std::hash::Hash for MidiMixHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl std::fmt::Debug for MidiMixHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiMixHandle")
            .field("id", &self.inner.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comping_types::{Rhythm, TimeSignature};
    use std::sync::Mutex;

    fn mix() -> MidiMixHandle {
        let r = Rhythm::jazz_trio("swing", TimeSignature::FOUR_FOUR);
        MidiMixHandle::new(MidiMix::from_rhythms([&r]))
    }

    #[test]
    fn unknown_channel_fires_nothing() {
        let m = mix();
        let seen = Arc::new(Mutex::new(0));
        let s = Arc::clone(&seen);
        let _sub = m.subscribe(move |_| *s.lock().unwrap() += 1);
        assert!(!m.set_mute(14, true));
        assert!(m.set_mute(1, true));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn live_mix_properties_are_not_relevant() {
        assert!(!MidiMixEvent::MuteChanged { channel: 0, mute: true }.is_music_relevant());
        assert!(!MidiMixEvent::VolumeChanged { channel: 0, volume: 3 }.is_music_relevant());
        assert!(MidiMixEvent::InstrumentChanged { channel: 0 }.is_music_relevant());
        assert!(MidiMixEvent::TranspositionChanged { channel: 0, semitones: 2 }.is_music_relevant());
    }

    #[test]
    fn volume_is_clamped() {
        let m = mix();
        m.set_volume(1, 200);
        assert_eq!(m.read(|mm| mm.instrument_mix(1).unwrap().volume), 127);
    }
}
