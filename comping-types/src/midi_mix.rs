//! Per-channel instrument mix for the rhythm voices of a song.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Rhythm, RhythmVoiceId};

/// General MIDI drums channel (0-based).
pub const DRUMS_CHANNEL: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrumKeyMap {
    GeneralMidi,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub program: u8,
    /// Set for drum kits.
    pub drum_kit: Option<DrumKeyMap>,
}

impl Instrument {
    pub fn melodic(name: &str, program: u8) -> Self {
        Self {
            name: name.to_string(),
            program: program.min(127),
            drum_kit: None,
        }
    }

    pub fn drum_kit(name: &str, key_map: DrumKeyMap) -> Self {
        Self {
            name: name.to_string(),
            program: 0,
            drum_kit: Some(key_map),
        }
    }

    pub fn is_gm_drum_kit(&self) -> bool {
        self.drum_kit == Some(DrumKeyMap::GeneralMidi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMix {
    pub instrument: Instrument,
    pub volume: u8,
    pub pan: u8,
    pub mute: bool,
    /// Added to every note velocity of the channel.
    pub velocity_shift: i8,
    /// Semitones added to every note of the channel.
    pub transposition: i8,
    /// Drum notes of this channel are played on [`DRUMS_CHANNEL`] instead.
    pub drums_rerouted: bool,
}

impl InstrumentMix {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            volume: 100,
            pan: 64,
            mute: false,
            velocity_shift: 0,
            transposition: 0,
            drums_rerouted: false,
        }
    }
}

/// Channel assignment and mix settings of the rhythm voices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MidiMix {
    voice_channels: BTreeMap<RhythmVoiceId, u8>,
    mixes: BTreeMap<u8, InstrumentMix>,
}

impl MidiMix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mix for all voices of `rhythms`, honoring preferred channels when free.
    pub fn from_rhythms<'a>(rhythms: impl IntoIterator<Item = &'a Rhythm>) -> Self {
        let mut mix = MidiMix::new();
        for rhythm in rhythms {
            for voice in &rhythm.voices {
                let instrument = if voice.kind.is_drums() {
                    Instrument::drum_kit("Standard Kit", DrumKeyMap::GeneralMidi)
                } else {
                    Instrument::melodic(&voice.name, voice.preferred_program)
                };
                let channel = if mix.mixes.contains_key(&voice.preferred_channel) {
                    match mix.first_free_channel() {
                        Some(c) => c,
                        None => continue,
                    }
                } else {
                    voice.preferred_channel
                };
                mix.set_channel(channel, voice.id.clone(), InstrumentMix::new(instrument));
            }
        }
        mix
    }

    fn first_free_channel(&self) -> Option<u8> {
        (0..16u8).find(|c| *c != DRUMS_CHANNEL && !self.mixes.contains_key(c))
    }

    /// Assign `voice` to `channel`, replacing whatever was there.
    pub fn set_channel(&mut self, channel: u8, voice: RhythmVoiceId, mix: InstrumentMix) {
        self.remove_channel(channel);
        if let Some(old) = self.voice_channels.insert(voice, channel) {
            self.mixes.remove(&old);
        }
        self.mixes.insert(channel, mix);
    }

    pub fn remove_channel(&mut self, channel: u8) -> Option<InstrumentMix> {
        self.voice_channels.retain(|_, c| *c != channel);
        self.mixes.remove(&channel)
    }

    pub fn channel_of(&self, voice: &RhythmVoiceId) -> Option<u8> {
        self.voice_channels.get(voice).copied()
    }

    pub fn voice_at(&self, channel: u8) -> Option<&RhythmVoiceId> {
        self.voice_channels
            .iter()
            .find(|(_, c)| **c == channel)
            .map(|(v, _)| v)
    }

    pub fn instrument_mix(&self, channel: u8) -> Option<&InstrumentMix> {
        self.mixes.get(&channel)
    }

    pub fn instrument_mix_mut(&mut self, channel: u8) -> Option<&mut InstrumentMix> {
        self.mixes.get_mut(&channel)
    }

    pub fn used_channels(&self) -> Vec<u8> {
        self.mixes.keys().copied().collect()
    }

    /// Channels whose drum voice could not be played correctly if `remap`
    /// (channel -> proposed instrument) were applied: a drums voice outside
    /// [`DRUMS_CHANNEL`] whose new instrument is not a General MIDI drum kit.
    pub fn channels_needing_drums_rerouting(
        &self,
        remap: &BTreeMap<u8, Instrument>,
        is_drums_voice: impl Fn(&RhythmVoiceId) -> bool,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        for (voice, &channel) in &self.voice_channels {
            if channel == DRUMS_CHANNEL || !is_drums_voice(voice) {
                continue;
            }
            let instrument = match remap.get(&channel) {
                Some(ins) => ins,
                None => match self.mixes.get(&channel) {
                    Some(mix) => &mix.instrument,
                    None => continue,
                },
            };
            if !instrument.is_gm_drum_kit() {
                out.push(channel);
            }
        }
        out.sort_unstable();
        out
    }
}
